mod action;
mod capture;
mod corpus;
mod matcher;
mod ocr;
mod preprocess;
mod worker;

use snapmatch_common::config::Config;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        mode = config.capture.mode,
        interval_secs = config.capture.interval_secs,
        library = config.library.dir,
        policy = config.action.policy,
        ocr_command = config.ocr.command,
        "starting snapmatch watcher"
    );

    // The photo library and the staging area must exist before the first cycle.
    if let Err(e) = std::fs::create_dir_all(&config.library.dir) {
        error!(error = %e, dir = config.library.dir, "failed to create photo library directory");
        std::process::exit(1);
    }

    let source: Box<dyn capture::FrameSource> = match config.capture.mode.as_str() {
        "command" => {
            if let Err(e) = std::fs::create_dir_all(&config.capture.staging_dir) {
                error!(error = %e, dir = config.capture.staging_dir, "failed to create staging directory");
                std::process::exit(1);
            }
            Box::new(capture::CommandCamera::new(&config.capture))
        }
        "http" => match capture::HttpCamera::new(&config.capture) {
            Ok(camera) => Box::new(camera),
            Err(e) => {
                error!(error = %e, "failed to build HTTP camera client");
                std::process::exit(1);
            }
        },
        other => {
            error!(mode = other, "unknown capture mode, expected 'command' or 'http'");
            std::process::exit(1);
        }
    };

    let policy = match action::ActionPolicy::parse(&config.action.policy) {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, "invalid action policy");
            std::process::exit(1);
        }
    };

    let handle = worker::CaptureLoop::new(
        Duration::from_secs_f64(config.capture.interval_secs),
        source,
        config.preprocess.clone(),
        Box::new(ocr::TesseractOcr::new(&config.ocr)),
        corpus::PhotoLibrary::new(&config.library.dir),
        matcher::MatchEngine::new(config.action.min_match_len),
        action::Dispatcher::new(policy, Box::new(action::LogSurface)),
    )
    .spawn();

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to wait for shutdown signal");
    }

    handle.request_stop();
    handle.stopped().await;
}
