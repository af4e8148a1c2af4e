use std::sync::Arc;

use axum::Router;
use axum::extract::{Json, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{Html, Redirect};
use axum::routing::{get, post};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use unitrack::notify::{MemoryStore, NotificationHub, PushRequest, PushSender, Subscription};
use unitrack::{Credentials, PortalConfig, PortalScraper, ProgressEvent, ScrapeError};

use crate::WebConfig;

pub struct AppState<P> {
    hub: Arc<NotificationHub<MemoryStore, P>>,
    portal: PortalConfig,
    vapid_public_key: Arc<str>,
    shutdown: CancellationToken,
}

impl<P> Clone for AppState<P> {
    fn clone(&self) -> Self {
        Self {
            hub: self.hub.clone(),
            portal: self.portal.clone(),
            vapid_public_key: self.vapid_public_key.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<P> AppState<P>
where
    P: PushSender + Send + Sync + 'static,
{
    pub fn new(config: &WebConfig, sender: P, shutdown: CancellationToken) -> Self {
        Self {
            hub: Arc::new(NotificationHub::new(
                MemoryStore::default(),
                sender,
                config.push_auth.clone(),
            )),
            portal: PortalConfig {
                base_url: config.portal_url.clone(),
                ..Default::default()
            },
            vapid_public_key: config.vapid_public_key.as_str().into(),
            shutdown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiResponse {
    status: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    subscribed: Option<bool>,
}

impl ApiResponse {
    fn success(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            status: "success",
            message: message.into(),
            subscribed: None,
        })
    }

    fn error(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            status: "error",
            message: message.into(),
            subscribed: None,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginParams {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

pub fn router<P>(state: AppState<P>) -> Router
where
    P: PushSender + Send + Sync + 'static,
{
    Router::new()
        .route("/", get(index))
        .route("/getkey", get(get_key::<P>))
        .route("/login", get(login::<P>))
        .route("/subscribe", post(subscribe::<P>))
        .route("/unsubscribe", post(unsubscribe::<P>))
        .route("/subscription-status", post(subscription_status::<P>))
        .route("/push", post(push::<P>))
        .fallback(|| async { Redirect::to("/") })
        .with_state(state)
}

async fn index() -> Html<String> {
    Html(format!(
        "<h2>unitrack</h2><p>Academic reports from the student portal.</p><pre>version: {}</pre>",
        env!("CARGO_PKG_VERSION")
    ))
}

async fn get_key<P>(State(state): State<AppState<P>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "publicKey": &*state.vapid_public_key }))
}

/// Runs one scrape in the background and yields its progress events.
///
/// The stream ends after the terminal event. Dropping it makes the scrape
/// stop at its next step; so does `shutdown`.
pub fn login_events(
    portal: &PortalConfig,
    shutdown: CancellationToken,
    credentials: Credentials,
) -> impl Stream<Item = ProgressEvent> + Send + use<> {
    let (tx, rx) = mpsc::channel::<ProgressEvent>(16);

    match PortalScraper::new(portal) {
        Ok(scraper) => {
            tokio::spawn(async move {
                let mut tx = tx;
                let interrupted = tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => true,
                    result = scraper.run(&credentials, &mut tx) => {
                        if let Err(ScrapeError::Cancelled) = result {
                            log::info!("Client left before the report for {} was ready", credentials.username);
                        }
                        false
                    }
                };

                if interrupted {
                    log::info!("Server shutting down, abandoning scrape");
                    let terminal = ProgressEvent::Error {
                        message: "Server shutting down".to_string(),
                    };
                    if tx.send(terminal).await.is_err() {
                        log::debug!("Client already gone at shutdown");
                    }
                }
            });
        }
        Err(e) => {
            log::error!("Failed to create scraper: {e:?}");
            let terminal = ProgressEvent::Error {
                message: e.to_string(),
            };
            if let Err(e) = tx.try_send(terminal) {
                log::warn!("Could not queue error event: {e}");
            }
        }
    }

    futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (event, rx))
    })
}

async fn login<P>(
    State(state): State<AppState<P>>,
    Query(params): Query<LoginParams>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let events = login_events(
        &state.portal,
        state.shutdown.child_token(),
        Credentials::new(params.username, params.password),
    );
    Sse::new(events.map(|event| Event::default().json_data(&event))).keep_alive(KeepAlive::default())
}

async fn subscribe<P>(
    State(state): State<AppState<P>>,
    Json(subscription): Json<Subscription>,
) -> Json<ApiResponse>
where
    P: PushSender + Send + Sync + 'static,
{
    match state.hub.subscribe(subscription).await {
        Ok(()) => ApiResponse::success("Subscribed successfully"),
        Err(e) => {
            log::error!("Error in subscription process: {e}");
            ApiResponse::error("Subscription failed")
        }
    }
}

async fn unsubscribe<P>(
    State(state): State<AppState<P>>,
    Json(subscription): Json<Subscription>,
) -> Json<ApiResponse>
where
    P: PushSender + Send + Sync + 'static,
{
    match state.hub.unsubscribe(&subscription.endpoint).await {
        Ok(()) => ApiResponse::success("Unsubscribed successfully"),
        Err(e) => ApiResponse::error(e.to_string()),
    }
}

async fn subscription_status<P>(
    State(state): State<AppState<P>>,
    Json(subscription): Json<Subscription>,
) -> Json<ApiResponse>
where
    P: PushSender + Send + Sync + 'static,
{
    let subscribed = state.hub.status(&subscription.endpoint).await;
    let Json(mut response) = if subscribed {
        ApiResponse::success("Subscription exists")
    } else {
        ApiResponse::error("Subscription not found")
    };
    response.subscribed = Some(subscribed);
    Json(response)
}

async fn push<P>(
    State(state): State<AppState<P>>,
    Json(request): Json<PushRequest>,
) -> Json<ApiResponse>
where
    P: PushSender + Send + Sync + 'static,
{
    match state.hub.push(&request).await {
        Ok(summary) => {
            log::info!("Push delivered: {}", summary);
            ApiResponse::success("Notification sent successfully")
        }
        Err(e) => {
            log::warn!("Push rejected: {}", e);
            ApiResponse::error(e.to_string())
        }
    }
}
