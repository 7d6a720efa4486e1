//! HTTP client for the external push gateway.

use async_trait::async_trait;
use kairan_core::{PushConfig, PushError, PushGateway, PushMessage};
use tracing::debug;

/// Posts `{recipients, title, body, link}` JSON to the configured
/// gateway endpoint. The client-side timeout keeps a slow gateway from
/// holding a request open; the engine treats any error here as
/// best-effort delivery loss.
pub struct HttpPushGateway {
    client: reqwest::Client,
    config: PushConfig,
}

impl HttpPushGateway {
    pub fn new(config: PushConfig) -> Result<Self, PushError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| PushError::Request(e.to_string()))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl PushGateway for HttpPushGateway {
    async fn send(&self, message: &PushMessage) -> Result<(), PushError> {
        let mut request = self.client.post(&self.config.gateway_url).json(message);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                PushError::Timeout
            } else {
                PushError::Request(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PushError::Status(status.as_u16()));
        }
        debug!(
            recipients = message.recipients.len(),
            title = %message.title,
            "push delivered"
        );
        Ok(())
    }
}
