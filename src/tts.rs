use crate::audio::{run_ffmpeg, wav_duration_seconds};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, error};

const GOOGLE_TTS_URL: &str = "https://translate.google.com/translate_tts";

/// Turns a short English phrase into an MP3 file.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, out_path: &Path) -> anyhow::Result<()>;
}

/// The free Google Translate voice. Good enough for "part 3".
pub struct GoogleTts {
    client: reqwest::Client,
    lang: String,
}

impl GoogleTts {
    pub fn new(lang: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            lang: lang.into(),
        }
    }
}

#[async_trait]
impl Synthesizer for GoogleTts {
    async fn synthesize(&self, text: &str, out_path: &Path) -> anyhow::Result<()> {
        let bytes = self
            .client
            .get(GOOGLE_TTS_URL)
            .header(USER_AGENT, "Mozilla/5.0 episode-stitcher/0.1")
            .query(&[
                ("ie", "UTF-8"),
                ("client", "tw-ob"),
                ("tl", self.lang.as_str()),
                ("q", text),
            ])
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        if bytes.is_empty() {
            anyhow::bail!("TTS service returned no audio for '{}'", text);
        }
        tokio::fs::write(out_path, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", out_path.display()))?;
        Ok(())
    }
}

/// Local Piper voice model; output is transcoded from WAV to MP3.
pub struct PiperTts {
    program: PathBuf,
    model: PathBuf,
}

impl PiperTts {
    pub fn new(model: impl Into<PathBuf>) -> Self {
        Self {
            program: PathBuf::from("piper"),
            model: model.into(),
        }
    }

    #[cfg(test)]
    fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }
}

#[async_trait]
impl Synthesizer for PiperTts {
    async fn synthesize(&self, text: &str, out_path: &Path) -> anyhow::Result<()> {
        let wav_path = out_path.with_extension("wav");
        let mut child = Command::new(&self.program)
            .arg("--model")
            .arg(&self.model)
            .arg("--output_file")
            .arg(&wav_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .context("Failed to spawn piper process")?;

        {
            let mut stdin = child.stdin.take().context("Failed to open piper stdin")?;
            stdin.write_all(text.as_bytes()).await?;
        }

        let status = child.wait().await?;
        if !status.success() {
            error!("Piper TTS command failed for: {}", wav_path.display());
            anyhow::bail!("TTS engine failed for '{}', command returned non-zero", text);
        }
        if let Ok(duration) = wav_duration_seconds(&wav_path) {
            debug!("Piper produced {:.2}s of audio for '{}'", duration, text);
        }

        let args: Vec<OsString> = vec![
            "-i".into(),
            wav_path.clone().into(),
            "-c:a".into(),
            "libmp3lame".into(),
            "-q:a".into(),
            "2".into(),
            out_path.into(),
        ];
        let result = run_ffmpeg(args, "encode piper output as mp3").await;
        let _ = tokio::fs::remove_file(&wav_path).await;
        result
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    /// Stands in for piper: swallows stdin and writes bytes that are not a WAV.
    const FAKE_PIPER: &str = r#"#!/bin/sh
while [ $# -gt 0 ]; do
    if [ "$1" = "--output_file" ]; then out="$2"; fi
    shift
done
cat > /dev/null
echo "not a wav" > "$out"
"#;

    #[tokio::test]
    async fn unreadable_piper_output_is_still_cleaned_up() {
        let dir = tempdir().unwrap();
        let program = dir.path().join("fake-piper");
        std::fs::write(&program, FAKE_PIPER).unwrap();
        std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();

        let tts = PiperTts::new(dir.path().join("voice.onnx")).with_program(&program);
        let out_path = dir.path().join("1.mp3");

        // The transcode cannot succeed on this input.
        assert!(tts.synthesize("part 1", &out_path).await.is_err());
        assert!(!dir.path().join("1.wav").exists());
    }
}
