use crate::utils::RetryPolicy;
use anyhow::Context;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::{debug, info};

const AUDIO_QUALITY: &str = "192K";

/// Pulls the audio track out of video-hosting URLs with yt-dlp.
pub struct SourceFetcher {
    retry: RetryPolicy,
}

/// Sends SIGKILL to a whole process group when dropped, unless disarmed.
#[cfg(unix)]
struct GroupKiller {
    pgid: Option<i32>,
}

#[cfg(unix)]
impl GroupKiller {
    fn disarm(&mut self) {
        self.pgid = None;
    }
}

#[cfg(unix)]
impl Drop for GroupKiller {
    fn drop(&mut self) {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        if let Some(pgid) = self.pgid {
            if let Err(e) = killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
                debug!("Process group {} already gone: {}", pgid, e);
            }
        }
    }
}

/// Runs `command` to completion and collects its output.
///
/// On unix the tool gets its own process group. Dropping the returned future
/// before the tool exits kills the whole group, including any helpers the
/// tool started (yt-dlp hands conversion off to ffmpeg).
pub(crate) async fn output_in_group(command: &mut Command) -> std::io::Result<Output> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    let child = command.spawn()?;
    #[cfg(unix)]
    let mut killer = GroupKiller {
        pgid: child.id().and_then(|id| i32::try_from(id).ok()),
    };
    let output = child.wait_with_output().await?;
    #[cfg(unix)]
    killer.disarm();
    Ok(output)
}

fn ytdlp_args(url: &str, stem: &Path) -> Vec<OsString> {
    let mut template = stem.as_os_str().to_os_string();
    template.push(".%(ext)s");
    vec![
        "--no-playlist".into(),
        "--no-part".into(),
        "--quiet".into(),
        "--no-warnings".into(),
        "-f".into(),
        "bestaudio/best".into(),
        "-x".into(),
        "--audio-format".into(),
        "mp3".into(),
        "--audio-quality".into(),
        AUDIO_QUALITY.into(),
        "-o".into(),
        template,
        url.into(),
    ]
}

impl SourceFetcher {
    pub fn new(retry: RetryPolicy) -> Self {
        Self { retry }
    }

    /// Downloads `url` as `<stem>.mp3` and returns that path.
    pub async fn fetch(&self, url: &str, stem: &Path) -> anyhow::Result<PathBuf> {
        info!("Fetching source audio {}", url);
        self.retry
            .run(&format!("fetching {}", url), || self.download(url, stem))
            .await
            .with_context(|| format!("Failed to fetch source audio from {}", url))
    }

    async fn download(&self, url: &str, stem: &Path) -> anyhow::Result<PathBuf> {
        let output = output_in_group(Command::new("yt-dlp").args(ytdlp_args(url, stem)))
            .await
            .with_context(|| format!("Failed to spawn yt-dlp for {}", url))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp failed to download {}: {}", url, stderr.trim());
        }

        let produced = stem.with_extension("mp3");
        if !produced.exists() {
            anyhow::bail!(
                "yt-dlp reported success but {} was not created",
                produced.display()
            );
        }
        info!("Saved {} to {}", url, produced.display());
        Ok(produced)
    }
}
