use anyhow::Context;
use hound::WavReader;
use serde::Deserialize;
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, error};

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: ProbeFormat,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

pub fn wav_duration_seconds(path: &Path) -> anyhow::Result<f64> {
    let reader = WavReader::open(path)
        .with_context(|| format!("Failed to open WAV file {}", path.display()))?;
    let spec = reader.spec();
    let samples = reader.len();
    let frames = samples as f64 / spec.channels as f64;
    let duration = frames / spec.sample_rate as f64;
    Ok(duration)
}

fn parse_probe_duration(json: &str) -> anyhow::Result<f64> {
    let probe: ProbeOutput =
        serde_json::from_str(json).context("ffprobe returned unexpected JSON")?;
    match probe.format.duration {
        Some(d) => d
            .trim()
            .parse()
            .with_context(|| format!("Failed to parse ffprobe duration '{}'", d)),
        // Zero-length streams carry no duration field.
        None => Ok(0.0),
    }
}

/// Duration of any media file ffprobe understands, in seconds.
pub async fn probe_duration_seconds(path: &Path) -> anyhow::Result<f64> {
    let output = Command::new("ffprobe")
        .args(["-v", "error", "-show_entries", "format=duration", "-of", "json"])
        .arg(path)
        .output()
        .await
        .with_context(|| format!("Failed to run ffprobe for {}", path.display()))?;

    if !output.status.success() {
        anyhow::bail!(
            "ffprobe failed for {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    parse_probe_duration(&String::from_utf8_lossy(&output.stdout))
}

/// Runs ffmpeg with `-y -hide_banner -loglevel error` prepended and fails
/// with its stderr when it exits non-zero.
pub async fn run_ffmpeg(args: Vec<OsString>, what: &str) -> anyhow::Result<()> {
    debug!("ffmpeg {:?}", args);
    let output = Command::new("ffmpeg")
        .args(["-y", "-hide_banner", "-loglevel", "error"])
        .args(&args)
        .stdin(Stdio::null())
        .output()
        .await
        .with_context(|| format!("Failed to spawn ffmpeg to {}", what))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        error!("ffmpeg failed to {}: {}", what, stderr.trim());
        anyhow::bail!("ffmpeg failed to {} (status {:?})", what, output.status.code());
    }
    Ok(())
}
