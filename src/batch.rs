use crate::episode::{EpisodeSettings, EpisodeTools, run_episode};
use crate::input::EpisodeSpec;
use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// What happened to each episode of a run.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub completed: Vec<(String, Vec<PathBuf>)>,
    pub failed: Vec<(String, anyhow::Error)>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn log_summary(&self) {
        info!(
            "{} of {} episodes completed",
            self.completed.len(),
            self.completed.len() + self.failed.len()
        );
        for (title, err) in &self.failed {
            warn!("Failed: '{}': {:#}", title, err);
        }
    }
}

/// Sets up the output directory and separator cache once, then runs every
/// episode in order. A failing episode is recorded and the batch moves on.
pub async fn run_batch<T>(
    tools: Arc<T>,
    episodes: &[EpisodeSpec],
    settings: &EpisodeSettings,
) -> anyhow::Result<BatchReport>
where
    T: EpisodeTools + 'static,
{
    tokio::fs::create_dir_all(&settings.output_dir)
        .await
        .with_context(|| format!("Failed to create {}", settings.output_dir.display()))?;
    tokio::fs::create_dir_all(&settings.work_dir)
        .await
        .with_context(|| format!("Failed to create {}", settings.work_dir.display()))?;
    tools.prepare().await.context("Failed to prepare part separators")?;

    let mut report = BatchReport::default();
    for (n, spec) in episodes.iter().enumerate() {
        info!("Episode {}/{}: '{}'", n + 1, episodes.len(), spec.title);
        match run_episode(tools.clone(), spec, settings).await {
            Ok(outputs) => report.completed.push((spec.title.clone(), outputs)),
            Err(e) => {
                error!("Episode '{}' failed: {:#}", spec.title, e);
                report.failed.push((spec.title.clone(), e));
            }
        }
    }
    Ok(report)
}
