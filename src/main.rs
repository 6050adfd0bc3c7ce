//! Invoice Risk Pipeline - Main Entry Point
//!
//! Answers client payment-risk requests over NATS request/reply, reading the
//! ERP database and the installed risk model. The model can be reloaded at
//! runtime through the reload subject.

use anyhow::{Context, Result};
use futures::StreamExt;
use invoice_risk_pipeline::{
    config::{AppConfig, DEFAULT_CONFIG_PATH},
    consumer::{handle_assess, handle_reload, AssessmentConsumer, WorkerPool},
    logging,
    metrics::{MetricsReporter, RiskMetrics},
    models::{ModelHandle, ModelLoader},
    producer::ReplyPublisher,
    service::RiskService,
    store::SqliteStore,
    types::RiskReply,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    let config_arg = std::env::args().nth(1);
    let config = match &config_arg {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    let config_path = config_arg.as_deref().unwrap_or(DEFAULT_CONFIG_PATH);
    logging::init(&config.logging, "invoice_risk_pipeline")?;

    info!(config = %config_path, "Starting invoice risk service");

    let metrics = Arc::new(RiskMetrics::new());

    let store = SqliteStore::open_read_only(
        &config.store.database_path,
        config.store.read_connections,
    )
    .with_context(|| {
        format!(
            "Failed to open ERP database {}",
            config.store.database_path.display()
        )
    })?;
    info!(path = %config.store.database_path.display(), "ERP database opened read-only");

    // A missing model is not fatal: clients without invoices are still
    // answered and an operator can install one through the reload subject.
    let loader = Arc::new(ModelLoader::with_threads(
        &config.model.artifact_path,
        config.model.onnx_threads,
    ));
    let model = Arc::new(ModelHandle::empty());
    if let Err(e) = model.reload(&loader) {
        error!(
            error = %e,
            path = %loader.artifact_path().display(),
            "Starting without a risk model"
        );
    }

    let service = RiskService::new(Arc::new(store), model.clone()).with_metrics(metrics.clone());

    let client = async_nats::connect(&config.nats.url).await?;
    info!(url = %config.nats.url, "Connected to NATS");

    let consumer = AssessmentConsumer::new(
        client.clone(),
        &config.nats.assess_subject,
        &config.nats.reload_subject,
    );
    let publisher = ReplyPublisher::new(client.clone());
    let mut assess_requests = consumer.subscribe_assess().await?;
    let mut reload_requests = consumer.subscribe_reload().await?;

    if config.service.metrics_interval_secs > 0 {
        let reporter = MetricsReporter::new(metrics.clone(), config.service.metrics_interval_secs);
        tokio::spawn(reporter.start());
    }

    let workers = config.service.workers.max(1);
    // Bounds concurrent store reads and inferences
    let pool = WorkerPool::new(workers);
    info!(workers, "Risk responder ready");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(message) = assess_requests.next() => {
                let pool = pool.clone();
                let service = service.clone();
                let publisher = publisher.clone();
                let request_id = Uuid::new_v4();

                tokio::spawn(
                    async move {
                        let start = Instant::now();
                        let payload = message.payload.clone();
                        let reply = pool
                            .run(move || handle_assess(&service, &payload))
                            .await
                            .unwrap_or_else(|e| {
                                error!(error = %e, "Assessment task failed");
                                RiskReply::internal("assessment task failed", None)
                            });

                        debug!(
                            ok = reply.is_ok(),
                            elapsed_us = start.elapsed().as_micros() as u64,
                            "Request handled"
                        );
                        if let Err(e) = publisher.reply(message.reply, &reply).await {
                            warn!(error = %e, "Failed to publish reply");
                        }
                    }
                    .instrument(info_span!("assess", %request_id)),
                );
            }
            Some(message) = reload_requests.next() => {
                let model = model.clone();
                let loader = loader.clone();
                let metrics = metrics.clone();
                let publisher = publisher.clone();

                tokio::spawn(async move {
                    info!(path = %loader.artifact_path().display(), "Model reload requested");
                    let reply = tokio::task::spawn_blocking(move || {
                        handle_reload(&model, &loader, Some(&metrics))
                    })
                    .await
                    .unwrap_or_else(|e| {
                        error!(error = %e, "Reload task panicked");
                        RiskReply::internal("reload task failed", None)
                    });

                    if let Err(e) = publisher.reply(message.reply, &reply).await {
                        warn!(error = %e, "Failed to publish reload reply");
                    }
                });
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
            else => break,
        }
    }

    info!("Risk service shutting down...");
    metrics.print_summary();

    Ok(())
}
