use std::path::PathBuf;
use thiserror::Error;

/// Problems with the episode list itself. These abort the run before any
/// episode starts.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("failed to read episode list {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("episode list {path} is not valid YAML")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("malformed timestamp '{0}', expected MM:SS")]
    Timestamp(String),

    #[error("cannot extract a drive id from '{0}', expected .../d/<id>/view")]
    DriveUrl(String),

    #[error("timestamp {0}s is too large")]
    RangeTooLarge(u64),

    #[error("episodes '{first}' and '{second}' would write to the same output files")]
    DuplicateTitle { first: String, second: String },

    #[error("time range starts after it ends ({start}s > {end}s)")]
    InvertedRange { start: u64, end: u64 },
}

#[derive(Debug, Error)]
pub enum StitchError {
    #[error("part {requested} requested but only {max} part separators are available")]
    TooManyParts { requested: usize, max: usize },
}
