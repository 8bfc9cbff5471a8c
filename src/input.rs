use crate::error::InputError;
use crate::utils::legalize_filename;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, info};

static TIMESTAMP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+):(\d+)\s*$").unwrap());

/// A `[start, end)` window of the narration, in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: u64,
    pub end: u64,
}

impl TimeRange {
    /// Both ends must survive conversion to milliseconds.
    pub fn new(start: u64, end: u64) -> Result<Self, InputError> {
        for secs in [start, end] {
            if secs.checked_mul(1000).is_none() {
                return Err(InputError::RangeTooLarge(secs));
            }
        }
        if start > end {
            return Err(InputError::InvertedRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start_ms(&self) -> u64 {
        self.start * 1000
    }

    pub fn end_ms(&self) -> u64 {
        self.end * 1000
    }

    pub fn len_secs(&self) -> u64 {
        self.end - self.start
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeSpec {
    pub title: String,
    pub narration_id: String,
    pub source_urls: Vec<String>,
    pub ranges: Vec<TimeRange>,
}

#[derive(Debug, Deserialize)]
struct RawEpisode {
    title: String,
    audio_url: String,
    #[serde(default)]
    timestamps: Vec<[RawTimestamp; 2]>,
    #[serde(default)]
    source_urls: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Seconds(u64),
    Text(String),
}

impl RawTimestamp {
    fn seconds(&self) -> Result<u64, InputError> {
        match self {
            RawTimestamp::Seconds(s) => Ok(*s),
            RawTimestamp::Text(t) => parse_timestamp(t),
        }
    }
}

/// Converts `MM:SS` into total seconds.
pub fn parse_timestamp(value: &str) -> Result<u64, InputError> {
    let caps = TIMESTAMP_RE
        .captures(value)
        .ok_or_else(|| InputError::Timestamp(value.to_string()))?;
    let malformed = || InputError::Timestamp(value.to_string());
    let minutes: u64 = caps[1].parse().map_err(|_| malformed())?;
    let seconds: u64 = caps[2].parse().map_err(|_| malformed())?;
    minutes
        .checked_mul(60)
        .and_then(|m| m.checked_add(seconds))
        .ok_or_else(malformed)
}

/// Pulls the file id out of a share link shaped like
/// `https://drive.google.com/file/d/<id>/view?usp=sharing`.
pub fn extract_drive_id(url: &str) -> Result<String, InputError> {
    let after = url
        .split_once("/d/")
        .map(|(_, rest)| rest)
        .ok_or_else(|| InputError::DriveUrl(url.to_string()))?;
    let id = after
        .split_once("/view")
        .map(|(id, _)| id)
        .ok_or_else(|| InputError::DriveUrl(url.to_string()))?;
    if id.is_empty() {
        return Err(InputError::DriveUrl(url.to_string()));
    }
    Ok(id.to_string())
}

impl RawEpisode {
    fn into_spec(self) -> Result<EpisodeSpec, InputError> {
        let narration_id = extract_drive_id(&self.audio_url)?;
        let ranges = self
            .timestamps
            .iter()
            .map(|[start, end]| TimeRange::new(start.seconds()?, end.seconds()?))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(EpisodeSpec {
            title: self.title,
            narration_id,
            source_urls: self.source_urls,
            ranges,
        })
    }
}

/// Reads the YAML episode list and validates every entry up front, so a typo
/// in the last episode is reported before the first one starts downloading.
pub fn load_episodes(path: &Path) -> Result<Vec<EpisodeSpec>, InputError> {
    let data = fs::read_to_string(path).map_err(|source| InputError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let raw: Vec<RawEpisode> = serde_yaml::from_str(&data).map_err(|source| InputError::Yaml {
        path: path.to_path_buf(),
        source,
    })?;

    let mut episodes = Vec::with_capacity(raw.len());
    let mut file_names: HashMap<String, String> = HashMap::new();
    for entry in raw {
        let spec = entry.into_spec()?;
        // Output videos are named after the cleaned title.
        if let Some(first) = file_names.insert(legalize_filename(&spec.title), spec.title.clone()) {
            return Err(InputError::DuplicateTitle {
                first,
                second: spec.title,
            });
        }
        debug!(
            "Parsed episode '{}' ({} ranges, {} sources)",
            spec.title,
            spec.ranges.len(),
            spec.source_urls.len()
        );
        episodes.push(spec);
    }
    info!("Loaded {} episodes from {}", episodes.len(), path.display());
    Ok(episodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parses_minutes_and_seconds() {
        assert_eq!(parse_timestamp("01:30").unwrap(), 90);
        assert_eq!(parse_timestamp("00:00").unwrap(), 0);
        assert_eq!(parse_timestamp("12:05").unwrap(), 725);
    }

    #[test]
    fn rejects_malformed_timestamps() {
        for bad in ["1-30", "", "ab:cd", "1:2:3", ":30", "01:"] {
            assert!(
                matches!(parse_timestamp(bad), Err(InputError::Timestamp(_))),
                "expected '{}' to be rejected",
                bad
            );
        }
    }

    #[test]
    fn extracts_drive_id() {
        let id = extract_drive_id("https://drive.google.com/file/d/ABC123/view?usp=sharing").unwrap();
        assert_eq!(id, "ABC123");
    }

    #[test]
    fn drive_url_without_markers_is_an_error() {
        assert!(extract_drive_id("https://drive.google.com/open?id=ABC123").is_err());
        assert!(extract_drive_id("https://drive.google.com/file/d/ABC123/edit").is_err());
        assert!(extract_drive_id("https://drive.google.com/file/d//view").is_err());
    }

    #[test]
    fn oversized_timestamp_is_a_parse_error() {
        assert!(matches!(
            parse_timestamp("999999999999999999:00"),
            Err(InputError::Timestamp(_))
        ));
        assert!(matches!(
            parse_timestamp("99999999999999999999:00"),
            Err(InputError::Timestamp(_))
        ));
    }

    #[test]
    fn range_must_fit_in_milliseconds() {
        assert!(matches!(
            TimeRange::new(u64::MAX, u64::MAX),
            Err(InputError::RangeTooLarge(u64::MAX))
        ));
        let limit = u64::MAX / 1000;
        let range = TimeRange::new(0, limit).unwrap();
        assert_eq!(range.end_ms(), limit * 1000);
        assert!(TimeRange::new(0, limit + 1).is_err());
    }

    #[test]
    fn huge_integer_timestamps_are_rejected_on_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("episodes.yaml");
        fs::write(
            &path,
            r#"
- title: Overflow
  audio_url: https://drive.google.com/file/d/XYZ/view
  timestamps:
    - [18446744073709551615, 18446744073709551615]
"#,
        )
        .unwrap();

        assert!(matches!(load_episodes(&path), Err(InputError::RangeTooLarge(_))));
    }

    #[test]
    fn titles_sharing_a_file_name_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("episodes.yaml");
        fs::write(
            &path,
            r#"
- title: "A?"
  audio_url: https://drive.google.com/file/d/one/view
- title: A
  audio_url: https://drive.google.com/file/d/two/view
"#,
        )
        .unwrap();

        match load_episodes(&path) {
            Err(InputError::DuplicateTitle { first, second }) => {
                assert_eq!(first, "A?");
                assert_eq!(second, "A");
            }
            other => panic!("expected duplicate title error, got {:?}", other),
        }
    }

    #[test]
    fn inverted_range_is_rejected() {
        assert!(matches!(
            TimeRange::new(40, 10),
            Err(InputError::InvertedRange { start: 40, end: 10 })
        ));
        assert_eq!(TimeRange::new(10, 10).unwrap().len_secs(), 0);
    }

    #[test]
    fn loads_episode_list() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("episodes.yaml");
        fs::write(
            &path,
            r#"
- title: First Episode
  audio_url: https://drive.google.com/file/d/XYZ/view?usp=sharing
  timestamps:
    - ["0:10", "0:40"]
    - ["1:00", "1:20"]
  source_urls:
    - https://www.youtube.com/watch?v=one
    - https://www.youtube.com/watch?v=two
- title: Second
  audio_url: https://drive.google.com/file/d/QQ/view
  timestamps:
    - [5, 65]
"#,
        )
        .unwrap();

        let episodes = load_episodes(&path).unwrap();
        assert_eq!(episodes.len(), 2);
        assert_eq!(episodes[0].title, "First Episode");
        assert_eq!(episodes[0].narration_id, "XYZ");
        assert_eq!(
            episodes[0].ranges,
            vec![TimeRange { start: 10, end: 40 }, TimeRange { start: 60, end: 80 }]
        );
        assert_eq!(episodes[0].source_urls.len(), 2);
        assert_eq!(episodes[1].ranges, vec![TimeRange { start: 5, end: 65 }]);
        assert!(episodes[1].source_urls.is_empty());
    }

    #[test]
    fn bad_timestamp_fails_the_whole_list() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("episodes.yaml");
        fs::write(
            &path,
            r#"
- title: Broken
  audio_url: https://drive.google.com/file/d/XYZ/view
  timestamps:
    - ["1-30", "2:00"]
  source_urls: []
"#,
        )
        .unwrap();

        assert!(matches!(load_episodes(&path), Err(InputError::Timestamp(t)) if t == "1-30"));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempdir().unwrap();
        let result = load_episodes(&dir.path().join("nope.yaml"));
        assert!(matches!(result, Err(InputError::Read { .. })));
    }
}
