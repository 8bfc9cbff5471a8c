use crate::audio::run_ffmpeg;
use crate::utils::legalize_filename;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::info;

/// Which audio an output video carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    FullNarration,
    TrimmedNarration,
    Source,
}

impl Variant {
    fn suffix(self) -> &'static str {
        match self {
            Variant::FullNarration => " (Full Audio)",
            Variant::TrimmedNarration => "",
            Variant::Source => " (Source)",
        }
    }
}

pub fn output_path(output_dir: &Path, title: &str, variant: Variant) -> PathBuf {
    output_dir.join(format!(
        "{}{}.mp4",
        legalize_filename(title),
        variant.suffix()
    ))
}

/// Holds a still image under an audio track.
pub struct VideoRenderer {
    image: PathBuf,
}

impl VideoRenderer {
    pub fn new(image: impl Into<PathBuf>) -> Self {
        Self {
            image: image.into(),
        }
    }

    fn args(&self, audio: &Path, out_path: &Path) -> Vec<OsString> {
        vec![
            "-loop".into(),
            "1".into(),
            "-framerate".into(),
            "1".into(),
            "-i".into(),
            self.image.clone().into(),
            "-i".into(),
            audio.into(),
            "-map".into(),
            "0:v:0".into(),
            "-map".into(),
            "1:a:0".into(),
            "-c:v".into(),
            "libx264".into(),
            "-tune".into(),
            "stillimage".into(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-vf".into(),
            "scale=trunc(iw/2)*2:trunc(ih/2)*2".into(),
            "-r".into(),
            "1".into(),
            "-c:a".into(),
            "aac".into(),
            "-b:a".into(),
            "192k".into(),
            "-shortest".into(),
            out_path.into(),
        ]
    }

    pub async fn render(&self, audio: &Path, out_path: &Path) -> anyhow::Result<()> {
        info!("Rendering {} over {}", audio.display(), self.image.display());
        run_ffmpeg(self.args(audio, out_path), "render video").await?;
        info!("Video written to {}", out_path.display());
        Ok(())
    }
}
