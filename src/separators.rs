use crate::error::StitchError;
use crate::tts::Synthesizer;
use crate::utils::RetryPolicy;
use anyhow::Context;
use std::path::PathBuf;
use tracing::info;

pub const DEFAULT_MAX_PARTS: usize = 9;

/// Spoken "part N" clips shared by every stitch in a run.
///
/// Files live at `<dir>/{n}.mp3`. Once written they are only read.
pub struct PartSeparatorCache {
    dir: PathBuf,
    max_parts: usize,
    synth: Box<dyn Synthesizer>,
    retry: RetryPolicy,
}

impl PartSeparatorCache {
    pub fn new(
        dir: impl Into<PathBuf>,
        max_parts: usize,
        synth: Box<dyn Synthesizer>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            dir: dir.into(),
            max_parts,
            synth,
            retry,
        }
    }

    fn path_for(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{}.mp3", index))
    }

    /// Fails before any work if `count` parts would exceed the cache.
    pub fn check_capacity(&self, count: usize) -> Result<(), StitchError> {
        if count > self.max_parts {
            return Err(StitchError::TooManyParts {
                requested: count,
                max: self.max_parts,
            });
        }
        Ok(())
    }

    /// One-time setup. A missing directory is created and filled with every
    /// marker up to the bound; an existing one is trusted as-is.
    pub async fn prepare(&self) -> anyhow::Result<()> {
        if self.dir.exists() {
            info!("Using existing part separators in {}", self.dir.display());
            return Ok(());
        }
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;
        info!(
            "Generating {} part separators in {}",
            self.max_parts,
            self.dir.display()
        );
        for index in 1..=self.max_parts {
            self.generate(index).await?;
        }
        Ok(())
    }

    /// Path to the marker for 1-based `index`, generated if it went missing.
    pub async fn separator(&self, index: usize) -> anyhow::Result<PathBuf> {
        if index == 0 || index > self.max_parts {
            return Err(StitchError::TooManyParts {
                requested: index,
                max: self.max_parts,
            }
            .into());
        }
        let path = self.path_for(index);
        if !path.exists() {
            tokio::fs::create_dir_all(&self.dir).await?;
            self.generate(index).await?;
        }
        Ok(path)
    }

    async fn generate(&self, index: usize) -> anyhow::Result<()> {
        let path = self.path_for(index);
        let text = format!("part {}", index);
        self.retry
            .run(&format!("synthesizing '{}'", text), || {
                self.synth.synthesize(&text, &path)
            })
            .await
            .with_context(|| format!("Failed to generate part separator {}", index))?;
        info!("Generated part separator {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tempfile::tempdir;

    /// Writes the requested phrase as the file body and records every call.
    #[derive(Clone, Default)]
    pub(crate) struct RecordingSynth {
        pub(crate) calls: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Synthesizer for RecordingSynth {
        async fn synthesize(&self, text: &str, out_path: &Path) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(text.to_string());
            tokio::fs::write(out_path, text.as_bytes()).await?;
            Ok(())
        }
    }

    fn cache_in(dir: &Path, max: usize) -> (PartSeparatorCache, RecordingSynth) {
        let synth = RecordingSynth::default();
        let cache = PartSeparatorCache::new(
            dir.join("partSeparators"),
            max,
            Box::new(synth.clone()),
            RetryPolicy::new(1, Duration::ZERO),
        );
        (cache, synth)
    }

    #[tokio::test]
    async fn prepare_generates_every_marker_once() {
        let dir = tempdir().unwrap();
        let (cache, synth) = cache_in(dir.path(), DEFAULT_MAX_PARTS);

        cache.prepare().await.unwrap();
        cache.prepare().await.unwrap();

        let calls = synth.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 9);
        assert_eq!(calls[0], "part 1");
        assert_eq!(calls[8], "part 9");
        for i in 1..=9 {
            let body = std::fs::read_to_string(cache.dir.join(format!("{}.mp3", i))).unwrap();
            assert_eq!(body, format!("part {}", i));
        }
    }

    #[tokio::test]
    async fn separator_reuses_existing_files() {
        let dir = tempdir().unwrap();
        let (cache, synth) = cache_in(dir.path(), 3);
        cache.prepare().await.unwrap();

        let path = cache.separator(2).await.unwrap();
        assert_eq!(path, cache.dir.join("2.mp3"));
        assert_eq!(synth.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn missing_marker_is_generated_on_demand() {
        let dir = tempdir().unwrap();
        let (cache, synth) = cache_in(dir.path(), 4);

        let path = cache.separator(4).await.unwrap();
        assert!(path.exists());
        assert_eq!(*synth.calls.lock().unwrap(), vec!["part 4".to_string()]);
    }

    #[tokio::test]
    async fn index_past_bound_is_rejected() {
        let dir = tempdir().unwrap();
        let (cache, synth) = cache_in(dir.path(), 9);

        let err = cache.separator(10).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StitchError>(),
            Some(StitchError::TooManyParts { requested: 10, max: 9 })
        ));
        assert!(cache.separator(0).await.is_err());
        assert!(cache.check_capacity(9).is_ok());
        assert!(cache.check_capacity(10).is_err());
        assert!(synth.calls.lock().unwrap().is_empty());
    }
}
