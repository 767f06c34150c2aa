//! lipcut binary.

use std::process::ExitCode;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lipcut_pipeline::{Cli, PipelineConfig, PipelineRunner};

fn init_tracing(level: &str) {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("lipcut={level},lipcut_media={level},lipcut_pipeline={level},ort=warn"))
    });

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse_args();
    init_tracing(cli.log_level());

    match run(&cli).await {
        Ok(()) => {
            info!("Pipeline finished");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Pipeline failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = PipelineConfig::from_env();
    config.validate().context("invalid configuration")?;
    info!("Pipeline config: {:?}", config);

    // First Ctrl-C kills a running ffmpeg and stops before the next stage,
    // a second one exits at once
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("Interrupt received, stopping (press Ctrl-C again to exit now)");
        cancel_tx.send(true).ok();
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });

    PipelineRunner::new(config)
        .with_cancel(cancel_rx)
        .run(cli)
        .await?;
    Ok(())
}
