//! NATS reply publisher for risk assessments

use crate::types::RiskReply;
use anyhow::Result;
use async_nats::{Client, Subject};
use tracing::{debug, warn};

/// Publishes replies on the inbox subject carried by each request
#[derive(Clone)]
pub struct ReplyPublisher {
    client: Client,
}

impl ReplyPublisher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Send `reply` to `reply_to`. Requests published without a reply
    /// subject are answered into the void and only logged.
    pub async fn reply(&self, reply_to: Option<Subject>, reply: &RiskReply) -> Result<()> {
        let Some(subject) = reply_to else {
            warn!(reply = ?reply, "Request had no reply subject, dropping reply");
            return Ok(());
        };

        let payload = serde_json::to_vec(reply)?;
        self.client.publish(subject.clone(), payload.into()).await?;

        debug!(subject = %subject, ok = reply.is_ok(), "Published reply");
        Ok(())
    }
}
