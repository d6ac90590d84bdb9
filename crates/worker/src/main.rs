use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use busalert_inference::InferenceApi;
use busalert_store::s3::S3Store;
use busalert_store::ObjectStore;
use busalert_worker::config::WorkerConfig;
use busalert_worker::lease::LeaseManager;
use busalert_worker::processor::JobProcessor;
use busalert_worker::runner::Worker;
use busalert_worker::{heartbeat, shutdown};

/// Time allowed for the heartbeat task to finish after the loop stops.
const HEARTBEAT_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "busalert_worker=info,busalert_store=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match WorkerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };

    tracing::info!(
        worker_id = %config.worker_id,
        store = %config.store.endpoint,
        bucket = %config.store.bucket,
        inference = %config.inference_url,
        lease_limit = config.lease_limit,
        poll_interval_secs = config.poll_interval.as_secs(),
        "Worker starting",
    );

    let s3 = S3Store::connect(&config.store).await;
    if let Err(e) = s3.ensure_bucket().await {
        tracing::warn!(bucket = %config.store.bucket, error = %e, "Could not verify bucket");
    }
    let store: Arc<dyn ObjectStore> = Arc::new(s3);

    let api = InferenceApi::new(config.inference_url.clone());
    match api.health().await {
        Ok(()) => tracing::info!(url = %api.api_url(), "Inference backend reachable"),
        Err(e) => tracing::warn!(url = %api.api_url(), error = %e, "Inference backend health check failed"),
    }

    let leases = LeaseManager::new(
        store.clone(),
        config.worker_id.clone(),
        config.lease_limit,
        config.lease_retry_interval,
    );
    let processor = JobProcessor::new(
        store.clone(),
        Arc::new(api),
        leases,
        config.processor_settings(),
    );
    let worker = Worker::new(store.clone(), processor, config.loop_settings());

    let cancel = CancellationToken::new();
    shutdown::spawn_signal_listener(cancel.clone());

    let heartbeat_handle = tokio::spawn(heartbeat::run(
        store,
        config.worker_id.clone(),
        config.heartbeat_interval,
        worker.subscribe(),
        cancel.clone(),
    ));

    let stats = worker.run(cancel.clone()).await;
    cancel.cancel();

    if tokio::time::timeout(HEARTBEAT_JOIN_TIMEOUT, heartbeat_handle)
        .await
        .is_err()
    {
        tracing::warn!("Heartbeat task did not stop in time");
    }

    let report = stats.report();
    tracing::info!(
        worker_id = %config.worker_id,
        processed = report.processed,
        failed = report.failed,
        uptime_secs = report.uptime.as_secs(),
        "Worker stopped: {report}",
    );
}
