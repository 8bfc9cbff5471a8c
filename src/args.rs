use crate::separators::DEFAULT_MAX_PARTS;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TtsBackend {
    /// Google Translate voice, fetched over HTTP
    Google,
    /// Local piper binary with an ONNX voice model
    Piper,
}

#[derive(Parser, Debug)]
#[command(version, about = "Stitch narrated episodes and render them as videos")]
pub struct Args {
    /// YAML list of episodes to build
    pub input: PathBuf,

    #[clap(long, default_value = "output")]
    pub output_dir: PathBuf,

    #[clap(long, default_value = "partSeparators")]
    pub separator_dir: PathBuf,

    #[clap(long, default_value = "thumbnail.png")]
    pub thumbnail: PathBuf,

    /// Highest "part N" marker available to a single stitch
    #[clap(long, default_value_t = DEFAULT_MAX_PARTS)]
    pub max_parts: usize,

    #[clap(long, value_enum, default_value_t = TtsBackend::Google)]
    pub tts: TtsBackend,

    #[clap(long, default_value = "./tts/en_US-hfc_male-medium.onnx")]
    pub piper_model: PathBuf,

    /// Attempts per download before an episode is given up
    #[clap(long, default_value_t = 3)]
    pub retries: u32,

    #[clap(long, default_value_t = 1000)]
    pub retry_delay_ms: u64,

    #[clap(long, default_value_t = 4)]
    pub max_parallel_fetches: usize,

    /// Where per-episode scratch directories are created
    #[clap(long)]
    pub work_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_expected_layout() {
        let args = Args::try_parse_from(["episode-stitcher", "episodes.yaml"]).unwrap();
        assert_eq!(args.input, PathBuf::from("episodes.yaml"));
        assert_eq!(args.output_dir, PathBuf::from("output"));
        assert_eq!(args.separator_dir, PathBuf::from("partSeparators"));
        assert_eq!(args.max_parts, 9);
        assert_eq!(args.tts, TtsBackend::Google);
        assert!(args.work_dir.is_none());
    }

    #[test]
    fn input_is_required() {
        assert!(Args::try_parse_from(["episode-stitcher"]).is_err());
    }

    #[test]
    fn selects_piper_backend() {
        let args =
            Args::try_parse_from(["episode-stitcher", "in.yaml", "--tts", "piper", "--retries", "5"])
                .unwrap();
        assert_eq!(args.tts, TtsBackend::Piper);
        assert_eq!(args.retries, 5);
    }
}
