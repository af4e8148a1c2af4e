use std::time::Duration;

use reqwest::{Client, StatusCode};
use unitrack::notify::{PushError, PushPayload, PushSender, Subscription};

/// Posts the payload as JSON to the subscription endpoint. `404` and `410`
/// mean the subscription is gone.
#[derive(Debug, Clone)]
pub struct WebhookSender {
    client: Client,
}

impl WebhookSender {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self { client })
    }
}

impl PushSender for WebhookSender {
    async fn send(
        &self,
        subscription: &Subscription,
        payload: &PushPayload,
    ) -> Result<(), PushError> {
        let response = self
            .client
            .post(&subscription.endpoint)
            .header("TTL", "86400")
            .json(payload)
            .send()
            .await
            .inspect_err(|e| log::error!("HTTP error: {e:?}"))
            .map_err(|e| PushError::Failed(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::GONE => Err(PushError::Gone {
                status: response.status().as_u16(),
            }),
            status if status.is_success() => Ok(()),
            status => Err(PushError::Failed(format!("HTTP {}", status))),
        }
    }
}
