//! Risk Request Client
//!
//! Sends assessment requests to the risk responder and prints the replies.
//! Falls back to printing the request bodies when NATS is unreachable.
//!
//! Usage: risk_requester [nats_url] [subject] [client_ids|reload] [delay_ms]
//!   client_ids: comma separated, or a range such as `1-20`

use anyhow::{bail, Result};
use invoice_risk_pipeline::types::{AssessmentRequest, ClientId, RiskReply};
use std::time::{Duration, Instant};
use tracing::{info, warn};
use uuid::Uuid;

fn parse_client_ids(arg: &str) -> Result<Vec<ClientId>> {
    if let Some((start, end)) = arg.split_once('-') {
        let (start, end): (ClientId, ClientId) = (start.trim().parse()?, end.trim().parse()?);
        if start > end {
            bail!("empty client range {arg}");
        }
        return Ok((start..=end).collect());
    }
    arg.split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.trim().parse::<ClientId>().map_err(anyhow::Error::from))
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("risk_requester=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let nats_url = args.get(1).map(|s| s.as_str()).unwrap_or("nats://localhost:4222");
    let subject = args.get(2).map(|s| s.as_str()).unwrap_or("risk.assess");
    let target = args.get(3).map(|s| s.as_str()).unwrap_or("1-4");
    let delay_ms: u64 = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(100);

    let client = match async_nats::connect(nats_url).await {
        Ok(c) => {
            info!(nats_url = %nats_url, "Connected to NATS");
            c
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to NATS. Running in dry-run mode.");
            if target != "reload" {
                run_dry_mode(&parse_client_ids(target)?)?;
            }
            return Ok(());
        }
    };

    if target == "reload" {
        let reply = client.request(subject.to_string(), Vec::<u8>::new().into()).await?;
        let reply: RiskReply = serde_json::from_slice(&reply.payload)?;
        info!(reply = ?reply, "Reload reply");
        return Ok(());
    }

    let client_ids = parse_client_ids(target)?;
    info!(subject = %subject, count = client_ids.len(), "Sending assessment requests");

    let mut failures = 0;
    for client_id in &client_ids {
        let request = AssessmentRequest::new(*client_id).with_request_id(Uuid::new_v4().to_string());
        let payload = serde_json::to_vec(&request)?;

        let start = Instant::now();
        let message = client.request(subject.to_string(), payload.into()).await?;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match serde_json::from_slice::<RiskReply>(&message.payload)? {
            RiskReply::Ok { assessment, .. } => info!(
                client_id,
                tier = assessment.tier.as_str(),
                label = assessment.label,
                source = ?assessment.source,
                confidence = ?assessment.confidence,
                elapsed_ms,
                "Assessed"
            ),
            RiskReply::Error { kind, message, .. } => {
                failures += 1;
                warn!(client_id, kind = %kind, message = %message, elapsed_ms, "Assessment failed");
            }
            other => warn!(reply = ?other, "Unexpected reply"),
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    info!(
        "Completed! {} requests ({} failed)",
        client_ids.len(),
        failures
    );
    Ok(())
}

fn run_dry_mode(client_ids: &[ClientId]) -> Result<()> {
    info!("Running in dry-run mode (no NATS connection)");
    for client_id in client_ids {
        let request = AssessmentRequest::new(*client_id).with_request_id(Uuid::new_v4().to_string());
        info!("Request: {}", serde_json::to_string(&request)?);
    }
    Ok(())
}
