use crate::audio::probe_duration_seconds;
use crate::drive::DriveFetcher;
use crate::input::{EpisodeSpec, TimeRange};
use crate::render::{VideoRenderer, Variant, output_path};
use crate::separators::PartSeparatorCache;
use crate::source::SourceFetcher;
use crate::stitch;
use anyhow::Context;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Every external step an episode goes through.
#[async_trait]
pub trait EpisodeTools: Send + Sync {
    /// One-time setup before the first episode.
    async fn prepare(&self) -> anyhow::Result<()>;

    async fn fetch_narration(&self, id: &str, dest: &Path) -> anyhow::Result<()>;

    /// Downloads `url` next to `stem` and returns the produced file.
    async fn fetch_source(&self, url: &str, stem: &Path) -> anyhow::Result<PathBuf>;

    async fn stitch_ranges(
        &self,
        narration: &Path,
        ranges: &[TimeRange],
        out_path: &Path,
    ) -> anyhow::Result<()>;

    async fn stitch_tracks(&self, tracks: &[PathBuf], out_path: &Path) -> anyhow::Result<()>;

    async fn render(&self, audio: &Path, out_path: &Path) -> anyhow::Result<()>;
}

/// The real thing: drive downloads, yt-dlp, ffmpeg.
pub struct ExternalTools {
    pub drive: DriveFetcher,
    pub sources: SourceFetcher,
    pub separators: PartSeparatorCache,
    pub renderer: VideoRenderer,
}

#[async_trait]
impl EpisodeTools for ExternalTools {
    async fn prepare(&self) -> anyhow::Result<()> {
        self.separators.prepare().await
    }

    async fn fetch_narration(&self, id: &str, dest: &Path) -> anyhow::Result<()> {
        self.drive.fetch(id, dest).await
    }

    async fn fetch_source(&self, url: &str, stem: &Path) -> anyhow::Result<PathBuf> {
        self.sources.fetch(url, stem).await
    }

    async fn stitch_ranges(
        &self,
        narration: &Path,
        ranges: &[TimeRange],
        out_path: &Path,
    ) -> anyhow::Result<()> {
        match probe_duration_seconds(narration).await {
            Ok(duration) => {
                for range in ranges.iter().filter(|r| r.end as f64 > duration) {
                    warn!(
                        "Range {}s-{}s runs past the end of the narration ({:.1}s)",
                        range.start, range.end, duration
                    );
                }
            }
            Err(e) => debug!("Could not probe narration length: {:#}", e),
        }
        stitch::stitch_segments(&self.separators, narration, ranges, out_path).await
    }

    async fn stitch_tracks(&self, tracks: &[PathBuf], out_path: &Path) -> anyhow::Result<()> {
        stitch::stitch_tracks(&self.separators, tracks, out_path).await
    }

    async fn render(&self, audio: &Path, out_path: &Path) -> anyhow::Result<()> {
        self.renderer.render(audio, out_path).await
    }
}

#[derive(Debug, Clone)]
pub struct EpisodeSettings {
    pub output_dir: PathBuf,
    /// Parent of the per-episode scratch directories.
    pub work_dir: PathBuf,
    pub max_parallel_fetches: usize,
}

fn scratch_dir(settings: &EpisodeSettings, prefix: &str) -> anyhow::Result<TempDir> {
    tempfile::Builder::new()
        .prefix(prefix)
        .tempdir_in(&settings.work_dir)
        .with_context(|| {
            format!(
                "Failed to create scratch directory in {}",
                settings.work_dir.display()
            )
        })
}

type SourceFetch = anyhow::Result<(usize, PathBuf)>;

/// Fetches the narration and every source, renders the three videos and
/// returns their paths. Intermediate audio lives in two scratch directories
/// that are removed when the episode ends, whether or not it succeeded.
pub async fn run_episode<T>(
    tools: Arc<T>,
    spec: &EpisodeSpec,
    settings: &EpisodeSettings,
) -> anyhow::Result<Vec<PathBuf>>
where
    T: EpisodeTools + 'static,
{
    let narration_dir = scratch_dir(settings, "narration-")?;
    let source_dir = scratch_dir(settings, "sources-")?;
    let limiter = Arc::new(Semaphore::new(settings.max_parallel_fetches.max(1)));

    // All downloads start now; stitching and rendering wait on them one
    // branch at a time.
    let narration_path = narration_dir.path().join("audio.mp3");
    let mut narration_fetch = JoinSet::new();
    {
        let tools = tools.clone();
        let limiter = limiter.clone();
        let id = spec.narration_id.clone();
        let dest = narration_path.clone();
        narration_fetch.spawn(async move {
            let _permit = limiter.acquire_owned().await?;
            tools.fetch_narration(&id, &dest).await
        });
    }

    let mut source_fetches = JoinSet::new();
    for (i, url) in spec.source_urls.iter().enumerate() {
        let tools = tools.clone();
        let limiter = limiter.clone();
        let url = url.clone();
        let stem = source_dir.path().join(format!("temp_{}", i));
        source_fetches.spawn(async move {
            let _permit = limiter.acquire_owned().await?;
            let path = tools.fetch_source(&url, &stem).await?;
            anyhow::Ok((i, path))
        });
    }

    let result = assemble(
        tools.as_ref(),
        spec,
        settings,
        narration_dir,
        source_dir.path(),
        &mut narration_fetch,
        &mut source_fetches,
    )
    .await;

    // Downloads still running must be gone before their directory is.
    narration_fetch.shutdown().await;
    source_fetches.shutdown().await;
    drop(source_dir);
    debug!("Removed source scratch files for '{}'", spec.title);
    result
}

async fn assemble<T: EpisodeTools>(
    tools: &T,
    spec: &EpisodeSpec,
    settings: &EpisodeSettings,
    narration_dir: TempDir,
    source_dir: &Path,
    narration_fetch: &mut JoinSet<anyhow::Result<()>>,
    source_fetches: &mut JoinSet<SourceFetch>,
) -> anyhow::Result<Vec<PathBuf>> {
    let mut outputs = Vec::with_capacity(3);
    let narration_path = narration_dir.path().join("audio.mp3");

    narration_fetch
        .join_next()
        .await
        .context("Narration download was never started")?
        .context("Narration download task panicked")??;

    let stitched = narration_dir.path().join("stitched_audio.mp3");
    if !spec.ranges.is_empty() {
        tools
            .stitch_ranges(&narration_path, &spec.ranges, &stitched)
            .await?;
    }

    let full_out = output_path(&settings.output_dir, &spec.title, Variant::FullNarration);
    tools.render(&narration_path, &full_out).await?;
    outputs.push(full_out);

    if spec.ranges.is_empty() {
        warn!("'{}' has no timestamps; skipping the trimmed video", spec.title);
    } else {
        let trimmed_out =
            output_path(&settings.output_dir, &spec.title, Variant::TrimmedNarration);
        tools.render(&stitched, &trimmed_out).await?;
        outputs.push(trimmed_out);
    }
    drop(narration_dir);
    debug!("Removed narration scratch files for '{}'", spec.title);

    if spec.source_urls.is_empty() {
        warn!("'{}' has no source urls; skipping the source video", spec.title);
        return Ok(outputs);
    }

    let mut tracks: Vec<Option<PathBuf>> = vec![None; spec.source_urls.len()];
    while let Some(joined) = source_fetches.join_next().await {
        let (i, path) = joined.context("Source download task panicked")??;
        tracks[i] = Some(path);
    }
    let tracks: Vec<PathBuf> = tracks.into_iter().flatten().collect();

    let combined = source_dir.join("source.mp3");
    if let [single] = tracks.as_slice() {
        tokio::fs::copy(single, &combined)
            .await
            .with_context(|| format!("Failed to copy {}", single.display()))?;
    } else {
        tools.stitch_tracks(&tracks, &combined).await?;
    }
    let source_out = output_path(&settings.output_dir, &spec.title, Variant::Source);
    tools.render(&combined, &source_out).await?;
    outputs.push(source_out);

    info!("Finished '{}' ({} videos)", spec.title, outputs.len());
    Ok(outputs)
}
