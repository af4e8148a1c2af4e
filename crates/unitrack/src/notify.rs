//! Push subscriptions and broadcast of announcements to every subscriber.

use std::fmt::Display;
use std::future::Future;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

/// A browser push subscription. Two subscriptions are the same when their
/// endpoints are.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub endpoint: String,
    #[serde(default)]
    pub expiration_time: Option<i64>,
    pub keys: SubscriptionKeys,
}

/// Who an announcement comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Act {
    Server,
    Dev,
    Aiub,
}

impl FromStr for Act {
    type Err = NotifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "server" => Ok(Act::Server),
            "dev" => Ok(Act::Dev),
            "aiub" => Ok(Act::Aiub),
            _ => Err(NotifyError::InvalidAct),
        }
    }
}

impl Display for Act {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Act::Server => "server",
            Act::Dev => "dev",
            Act::Aiub => "aiub",
        };
        write!(f, "{}", s)
    }
}

/// What a subscriber receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushPayload {
    pub title: String,
    pub message: String,
    pub act: Act,
}

impl PushPayload {
    pub fn welcome() -> Self {
        Self {
            title: "Thank you".to_string(),
            message: "You would be updated with the future notifications".to_string(),
            act: Act::Server,
        }
    }
}

/// An unvalidated announcement request as it arrives from outside.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushRequest {
    #[serde(default)]
    pub auth: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub act: Option<String>,
}

impl PushRequest {
    /// Checks, in order: the shared secret, title and message, act present,
    /// act known.
    pub fn validate(&self, auth_token: &str) -> Result<PushPayload, NotifyError> {
        if self.auth.as_deref() != Some(auth_token) {
            return Err(NotifyError::InvalidAuthentication);
        }

        let title = self.title.as_deref().unwrap_or_default().trim();
        let message = self.message.as_deref().unwrap_or_default().trim();
        if title.is_empty() || message.is_empty() {
            return Err(NotifyError::MissingContent);
        }

        let act = self
            .act
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .ok_or(NotifyError::MissingAct)?
            .parse::<Act>()?;

        Ok(PushPayload {
            title: title.to_string(),
            message: message.to_string(),
            act,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("Subscription is no longer valid (HTTP {status})")]
    Gone { status: u16 },
    #[error("Push delivery failed: {0}")]
    Failed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Invalid authentication")]
    InvalidAuthentication,
    #[error("Title and message are required")]
    MissingContent,
    #[error("Act as type is required")]
    MissingAct,
    #[error("Act must be either server, dev or aiub")]
    InvalidAct,
    #[error("Subscription not found")]
    NotFound,
    #[error(transparent)]
    Push(#[from] PushError),
}

/// Persistent set of subscriptions, keyed by endpoint.
pub trait SubscriptionStore {
    /// Returns false if the endpoint was already stored.
    fn add(&self, subscription: Subscription) -> impl Future<Output = bool> + Send;
    fn remove(&self, endpoint: &str) -> impl Future<Output = bool> + Send;
    fn contains(&self, endpoint: &str) -> impl Future<Output = bool> + Send;
    fn all(&self) -> impl Future<Output = Vec<Subscription>> + Send;
}

/// Delivers one payload to one subscription.
pub trait PushSender {
    fn send(
        &self,
        subscription: &Subscription,
        payload: &PushPayload,
    ) -> impl Future<Output = Result<(), PushError>> + Send;
}

/// In-process [`SubscriptionStore`]; contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    subscriptions: Mutex<IndexMap<String, Subscription>>,
}

impl SubscriptionStore for MemoryStore {
    async fn add(&self, subscription: Subscription) -> bool {
        let mut subscriptions = self.subscriptions.lock().await;
        subscriptions
            .insert(subscription.endpoint.clone(), subscription)
            .is_none()
    }

    async fn remove(&self, endpoint: &str) -> bool {
        self.subscriptions
            .lock()
            .await
            .shift_remove(endpoint)
            .is_some()
    }

    async fn contains(&self, endpoint: &str) -> bool {
        self.subscriptions.lock().await.contains_key(endpoint)
    }

    async fn all(&self) -> Vec<Subscription> {
        self.subscriptions.lock().await.values().cloned().collect()
    }
}

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastSummary {
    pub delivered: usize,
    pub removed: usize,
    pub failed: usize,
}

impl Display for BroadcastSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} delivered, {} removed, {} failed",
            self.delivered, self.removed, self.failed
        )
    }
}

pub struct NotificationHub<St, P> {
    store: St,
    sender: P,
    auth_token: String,
}

impl<St, P> NotificationHub<St, P>
where
    St: SubscriptionStore + Sync,
    P: PushSender + Sync,
{
    pub fn new(store: St, sender: P, auth_token: impl Into<String>) -> Self {
        Self {
            store,
            sender,
            auth_token: auth_token.into(),
        }
    }

    /// Stores the subscription and greets it with a welcome push.
    pub async fn subscribe(&self, subscription: Subscription) -> Result<(), NotifyError> {
        if !self.store.add(subscription.clone()).await {
            log::debug!("Subscription {} refreshed", subscription.endpoint);
        }
        log::info!("New subscription: {}", subscription.endpoint);

        match self.sender.send(&subscription, &PushPayload::welcome()).await {
            Ok(()) => Ok(()),
            Err(e @ PushError::Gone { .. }) => {
                self.store.remove(&subscription.endpoint).await;
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn unsubscribe(&self, endpoint: &str) -> Result<(), NotifyError> {
        if !self.store.remove(endpoint).await {
            return Err(NotifyError::NotFound);
        }
        log::info!("Unsubscribed: {}", endpoint);
        Ok(())
    }

    pub async fn status(&self, endpoint: &str) -> bool {
        self.store.contains(endpoint).await
    }

    /// Validates an announcement request and sends it to everyone.
    pub async fn push(&self, request: &PushRequest) -> Result<BroadcastSummary, NotifyError> {
        let payload = request.validate(&self.auth_token)?;
        Ok(self.broadcast(&payload).await)
    }

    /// Sends `payload` to every subscription, dropping the ones the push
    /// service reports as gone.
    pub async fn broadcast(&self, payload: &PushPayload) -> BroadcastSummary {
        let mut summary = BroadcastSummary::default();

        for subscription in self.store.all().await {
            match self.sender.send(&subscription, payload).await {
                Ok(()) => summary.delivered += 1,
                Err(PushError::Gone { status }) => {
                    log::info!(
                        "Removing subscription {} (HTTP {})",
                        subscription.endpoint,
                        status
                    );
                    self.store.remove(&subscription.endpoint).await;
                    summary.removed += 1;
                }
                Err(e) => {
                    log::warn!("Push to {} failed: {}", subscription.endpoint, e);
                    summary.failed += 1;
                }
            }
        }

        log::info!("Broadcast '{}': {}", payload.title, summary);
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    fn subscription(endpoint: &str) -> Subscription {
        Subscription {
            endpoint: endpoint.to_string(),
            expiration_time: None,
            keys: SubscriptionKeys {
                p256dh: "key".to_string(),
                auth: "secret".to_string(),
            },
        }
    }

    /// Records deliveries; endpoints mapped to a status fail with it.
    #[derive(Default)]
    struct RecordingSender {
        failures: HashMap<String, u16>,
        sent: StdMutex<Vec<(String, String)>>,
    }

    impl PushSender for RecordingSender {
        async fn send(
            &self,
            subscription: &Subscription,
            payload: &PushPayload,
        ) -> Result<(), PushError> {
            match self.failures.get(&subscription.endpoint) {
                Some(status @ (404 | 410)) => Err(PushError::Gone { status: *status }),
                Some(status) => Err(PushError::Failed(format!("HTTP {status}"))),
                None => {
                    self.sent
                        .lock()
                        .unwrap()
                        .push((subscription.endpoint.clone(), payload.title.clone()));
                    Ok(())
                }
            }
        }
    }

    fn hub(failures: &[(&str, u16)]) -> NotificationHub<MemoryStore, RecordingSender> {
        let sender = RecordingSender {
            failures: failures.iter().map(|(e, s)| (e.to_string(), *s)).collect(),
            ..Default::default()
        };
        NotificationHub::new(MemoryStore::default(), sender, "token")
    }

    fn request(auth: &str, title: &str, message: &str, act: Option<&str>) -> PushRequest {
        PushRequest {
            auth: Some(auth.to_string()),
            title: Some(title.to_string()),
            message: Some(message.to_string()),
            act: act.map(str::to_string),
        }
    }

    #[test]
    fn test_subscription_wire_format() {
        let json = r#"{"endpoint":"https://push.example/abc","expirationTime":null,"keys":{"p256dh":"BNc","auth":"tBH"}}"#;
        let sub: Subscription = serde_json::from_str(json).unwrap();
        assert_eq!(sub.endpoint, "https://push.example/abc");
        assert_eq!(sub.keys.auth, "tBH");
        assert_eq!(sub.expiration_time, None);
    }

    #[test]
    fn test_push_request_validation_order() {
        let cases = [
            (request("wrong", "", "", None), "Invalid authentication"),
            (request("token", "", "body", Some("dev")), "Title and message are required"),
            (request("token", "Hi", "body", None), "Act as type is required"),
            (request("token", "Hi", "body", Some("admin")), "Act must be either server, dev or aiub"),
        ];
        for (req, expected) in cases {
            assert_eq!(req.validate("token").unwrap_err().to_string(), expected);
        }

        let payload = request("token", "Hi", "body", Some("aiub")).validate("token").unwrap();
        assert_eq!(payload.act, Act::Aiub);
        assert!(PushRequest::default().validate("token").is_err());
    }

    #[tokio::test]
    async fn test_subscribe_sends_welcome_and_tracks_status() {
        let hub = hub(&[]);
        hub.subscribe(subscription("https://push.example/a")).await.unwrap();

        assert!(hub.status("https://push.example/a").await);
        assert_eq!(
            *hub.sender.sent.lock().unwrap(),
            vec![("https://push.example/a".to_string(), "Thank you".to_string())]
        );

        hub.unsubscribe("https://push.example/a").await.unwrap();
        assert!(!hub.status("https://push.example/a").await);
        assert!(matches!(
            hub.unsubscribe("https://push.example/a").await,
            Err(NotifyError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_broadcast_drops_gone_subscriptions() {
        let hub = hub(&[("https://push.example/gone", 410), ("https://push.example/flaky", 500)]);
        for endpoint in ["https://push.example/a", "https://push.example/flaky"] {
            hub.store.add(subscription(endpoint)).await;
        }
        hub.store.add(subscription("https://push.example/gone")).await;

        let summary = hub
            .push(&request("token", "Exam", "Schedule posted", Some("aiub")))
            .await
            .unwrap();

        assert_eq!(
            summary,
            BroadcastSummary {
                delivered: 1,
                removed: 1,
                failed: 1,
            }
        );
        assert!(!hub.status("https://push.example/gone").await);
        assert!(hub.status("https://push.example/flaky").await, "transient failures are kept");
    }

    #[tokio::test]
    async fn test_push_rejects_bad_token_before_sending() {
        let hub = hub(&[]);
        hub.store.add(subscription("https://push.example/a")).await;

        let err = hub
            .push(&request("nope", "Exam", "Schedule posted", Some("aiub")))
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::InvalidAuthentication));
        assert!(hub.sender.sent.lock().unwrap().is_empty());
    }
}
