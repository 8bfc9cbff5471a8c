mod args;
mod audio;
mod batch;
mod drive;
mod episode;
mod error;
mod input;
mod render;
mod separators;
mod source;
mod stitch;
mod tts;
mod utils;

use args::{Args, TtsBackend};
use batch::run_batch;
use clap::Parser;
use clap::error::ErrorKind;
use drive::DriveFetcher;
use episode::{EpisodeSettings, ExternalTools};
use render::VideoRenderer;
use separators::PartSeparatorCache;
use source::SourceFetcher;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tts::{GoogleTts, PiperTts, Synthesizer};
use utils::RetryPolicy;

fn usage_exit() -> ! {
    let bin = std::env::args()
        .next()
        .unwrap_or_else(|| "episode-stitcher".to_string());
    eprintln!("Usage: {} <input_path>", bin);
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            let _ = e.print();
            usage_exit();
        }
    };

    if !args.input.exists() {
        error!("Input file not found: {}", args.input.display());
        usage_exit();
    }
    if !args.thumbnail.exists() {
        error!("Thumbnail image not found: {}", args.thumbnail.display());
        std::process::exit(1);
    }
    if args.tts == TtsBackend::Piper && !args.piper_model.exists() {
        error!("Piper model not found: {}", args.piper_model.display());
        std::process::exit(1);
    }

    let episodes = match input::load_episodes(&args.input) {
        Ok(episodes) => episodes,
        Err(e) => {
            error!("{:#}", anyhow::Error::from(e));
            std::process::exit(1);
        }
    };

    let retry = RetryPolicy::new(args.retries, Duration::from_millis(args.retry_delay_ms));
    let synth: Box<dyn Synthesizer> = match args.tts {
        TtsBackend::Google => Box::new(GoogleTts::new("en")),
        TtsBackend::Piper => Box::new(PiperTts::new(&args.piper_model)),
    };
    let tools = Arc::new(ExternalTools {
        drive: DriveFetcher::new(retry),
        sources: SourceFetcher::new(retry),
        separators: PartSeparatorCache::new(&args.separator_dir, args.max_parts, synth, retry),
        renderer: VideoRenderer::new(&args.thumbnail),
    });
    let settings = EpisodeSettings {
        output_dir: args.output_dir.clone(),
        work_dir: args.work_dir.clone().unwrap_or_else(std::env::temp_dir),
        max_parallel_fetches: args.max_parallel_fetches,
    };

    info!("Building {} episodes into {}", episodes.len(), settings.output_dir.display());
    let report = run_batch(tools, &episodes, &settings).await?;
    report.log_summary();

    if !report.is_success() {
        std::process::exit(1);
    }
    info!("Process complete.");
    Ok(())
}
