//! `busalert-monitor` -- live view of the worker fleet.
//!
//! Polls the object store and redraws a table of worker heartbeats,
//! GPU lease holders and job status counts. Read-only.
//!
//! # Environment variables
//!
//! | Variable               | Default          | Description                         |
//! |------------------------|------------------|-------------------------------------|
//! | `MINIO_ENDPOINT`       | `localhost:9000` | Object store endpoint               |
//! | `MINIO_BUCKET`         | `bus-alerts`     | Bucket holding jobs and heartbeats  |
//! | `MONITOR_REFRESH_SECS` | `2`              | Seconds between redraws             |
//! | `MONITOR_JOB_COUNTS`   | `true`           | Scan job records for status counts  |

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use busalert_monitor::config::MonitorConfig;
use busalert_monitor::{render, view};
use busalert_store::s3::S3Store;

/// ANSI clear-screen and cursor-home.
const CLEAR_SCREEN: &str = "\x1B[2J\x1B[H";

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "busalert_monitor=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match MonitorConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };

    let store = S3Store::connect(&config.store).await;
    println!("Monitoring bus alert workers on {}...", config.store.endpoint);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });

    let mut ticker = tokio::time::interval(config.refresh);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                match view::collect(&store, config.job_counts).await {
                    Ok(view) => {
                        print!("{CLEAR_SCREEN}{}", render::render(&view));
                        println!("Press Ctrl+C to exit");
                    }
                    Err(e) => tracing::error!(error = %e, "Failed to read fleet state"),
                }
            }
        }
    }

    println!("\nExiting...");
}
