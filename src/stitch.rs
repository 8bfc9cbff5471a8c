//! Concatenation of audio pieces with "part N" + silence bracketing.
//!
//! Each stitch is a single ffmpeg run: every piece becomes one labelled
//! filter chain, normalized to a common sample format, and the chains are
//! joined by one `concat` filter.

use crate::audio::run_ffmpeg;
use crate::input::TimeRange;
use crate::separators::PartSeparatorCache;
use std::ffi::OsString;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const PAD_MS: u64 = 500;
const SAMPLE_RATE: u32 = 44100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Piece {
    Marker(PathBuf),
    Silence { ms: u64 },
    Slice { path: PathBuf, start_ms: u64, end_ms: u64 },
    Track(PathBuf),
}

impl Piece {
    fn input(&self) -> Option<&Path> {
        match self {
            Piece::Marker(path) | Piece::Track(path) | Piece::Slice { path, .. } => {
                Some(path.as_path())
            }
            Piece::Silence { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterGraph {
    pub inputs: Vec<PathBuf>,
    pub filter: String,
}

/// marker → pad → body → pad, for every body in order.
fn bracket(separators: &[PathBuf], bodies: Vec<Piece>) -> Vec<Piece> {
    separators
        .iter()
        .zip(bodies)
        .flat_map(|(marker, body)| {
            [
                Piece::Marker(marker.clone()),
                Piece::Silence { ms: PAD_MS },
                body,
                Piece::Silence { ms: PAD_MS },
            ]
        })
        .collect()
}

pub fn segment_plan(source: &Path, ranges: &[TimeRange], separators: &[PathBuf]) -> Vec<Piece> {
    let bodies = ranges
        .iter()
        .map(|range| Piece::Slice {
            path: source.to_path_buf(),
            start_ms: range.start_ms(),
            end_ms: range.end_ms(),
        })
        .collect();
    bracket(separators, bodies)
}

pub fn track_plan(tracks: &[PathBuf], separators: &[PathBuf]) -> Vec<Piece> {
    let bodies = tracks.iter().cloned().map(Piece::Track).collect();
    bracket(separators, bodies)
}

fn secs(ms: u64) -> String {
    format!("{}.{:03}", ms / 1000, ms % 1000)
}

/// Builds the `filter_complex` for a plan. `None` for an empty plan, which
/// ffmpeg cannot concat.
pub fn build_graph(pieces: &[Piece]) -> Option<FilterGraph> {
    if pieces.is_empty() {
        return None;
    }
    let normalize = format!(
        "aresample={rate},aformat=sample_fmts=fltp:sample_rates={rate}:channel_layouts=stereo",
        rate = SAMPLE_RATE
    );

    let mut inputs = Vec::new();
    let mut chains = Vec::with_capacity(pieces.len() + 1);
    for (k, piece) in pieces.iter().enumerate() {
        let input_index = inputs.len();
        if let Some(path) = piece.input() {
            inputs.push(path.to_path_buf());
        }
        let chain = match piece {
            Piece::Marker(_) | Piece::Track(_) => {
                format!("[{}:a]{}[p{}]", input_index, normalize, k)
            }
            Piece::Slice {
                start_ms, end_ms, ..
            } => format!(
                "[{}:a]atrim=start={}:end={},asetpts=PTS-STARTPTS,{}[p{}]",
                input_index,
                secs(*start_ms),
                secs(*end_ms),
                normalize,
                k
            ),
            Piece::Silence { ms } => format!(
                "anullsrc=r={}:cl=stereo,atrim=duration={},{}[p{}]",
                SAMPLE_RATE,
                secs(*ms),
                normalize,
                k
            ),
        };
        chains.push(chain);
    }

    let mut concat = String::new();
    for k in 0..pieces.len() {
        let _ = write!(concat, "[p{}]", k);
    }
    let _ = write!(concat, "concat=n={}:v=0:a=1[out]", pieces.len());
    chains.push(concat);

    Some(FilterGraph {
        inputs,
        filter: chains.join(";"),
    })
}

fn mp3_output(out_path: &Path) -> Vec<OsString> {
    vec![
        "-c:a".into(),
        "libmp3lame".into(),
        "-q:a".into(),
        "2".into(),
        out_path.into(),
    ]
}

pub fn ffmpeg_args(graph: &FilterGraph, out_path: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::new();
    for input in &graph.inputs {
        args.push("-i".into());
        args.push(input.into());
    }
    args.push("-filter_complex".into());
    args.push(graph.filter.clone().into());
    args.push("-map".into());
    args.push("[out]".into());
    args.extend(mp3_output(out_path));
    args
}

async fn write_empty_mp3(out_path: &Path) -> anyhow::Result<()> {
    let mut args: Vec<OsString> = vec![
        "-f".into(),
        "lavfi".into(),
        "-i".into(),
        format!("anullsrc=r={}:cl=stereo", SAMPLE_RATE).into(),
        "-t".into(),
        "0".into(),
    ];
    args.extend(mp3_output(out_path));
    run_ffmpeg(args, "write an empty track").await
}

async fn render_plan(pieces: &[Piece], out_path: &Path) -> anyhow::Result<()> {
    match build_graph(pieces) {
        Some(graph) => run_ffmpeg(ffmpeg_args(&graph, out_path), "stitch audio").await,
        None => {
            warn!("Nothing to stitch; writing empty {}", out_path.display());
            write_empty_mp3(out_path).await
        }
    }
}

async fn separators_for(cache: &PartSeparatorCache, count: usize) -> anyhow::Result<Vec<PathBuf>> {
    cache.check_capacity(count)?;
    let mut separators = Vec::with_capacity(count);
    for index in 1..=count {
        separators.push(cache.separator(index).await?);
    }
    Ok(separators)
}

/// Keeps `ranges` of `source` (in list order) and writes them as one MP3.
pub async fn stitch_segments(
    cache: &PartSeparatorCache,
    source: &Path,
    ranges: &[TimeRange],
    out_path: &Path,
) -> anyhow::Result<()> {
    let separators = separators_for(cache, ranges.len()).await?;
    let plan = segment_plan(source, ranges, &separators);
    info!(
        "Stitching {} ranges ({}s kept) of {} into {}",
        ranges.len(),
        ranges.iter().map(TimeRange::len_secs).sum::<u64>(),
        source.display(),
        out_path.display()
    );
    render_plan(&plan, out_path).await
}

/// Joins whole `tracks` (in list order) into one MP3.
pub async fn stitch_tracks(
    cache: &PartSeparatorCache,
    tracks: &[PathBuf],
    out_path: &Path,
) -> anyhow::Result<()> {
    let separators = separators_for(cache, tracks.len()).await?;
    let plan = track_plan(tracks, &separators);
    info!("Stitching {} tracks into {}", tracks.len(), out_path.display());
    render_plan(&plan, out_path).await
}
