use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::{CookieStore, Jar};
use reqwest::{Client, Url};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// What the portal answered after redirects were followed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalResponse {
    pub status: u16,
    pub final_url: String,
    pub body: String,
}

impl PortalResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_server_error(&self) -> bool {
        self.status >= 500
    }
}

/// A cookie-carrying conversation with the portal, owned by one request.
pub trait PortalSession {
    fn post_form(
        &self,
        url: &str,
        fields: &[(&str, &str)],
    ) -> impl Future<Output = Result<PortalResponse, SessionError>> + Send;

    fn get(&self, url: &str) -> impl Future<Output = Result<PortalResponse, SessionError>> + Send;

    /// Cookies currently held for `url`'s host.
    fn cookies(&self, url: &str) -> HashMap<String, String>;
}

#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout: Duration,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: crate::BASE_URL.to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// [`PortalSession`] over `reqwest` with its own cookie jar.
#[derive(Debug, Clone)]
pub struct HttpSession {
    client: Client,
    jar: Arc<Jar>,
}

impl HttpSession {
    pub fn new(config: &PortalConfig) -> Result<Self, SessionError> {
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .cookie_provider(jar.clone())
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()?;

        Ok(Self { client, jar })
    }

    async fn read(response: reqwest::Response) -> Result<PortalResponse, SessionError> {
        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let body = response
            .text()
            .await
            .inspect_err(|e| log::error!("Decode error: {e:?}"))?;
        log::debug!("{} -> {} ({} bytes)", final_url, status, body.len());

        Ok(PortalResponse {
            status,
            final_url,
            body,
        })
    }
}

fn parse_url(url: &str) -> Result<Url, SessionError> {
    Url::parse(url).map_err(|e| SessionError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

impl PortalSession for HttpSession {
    async fn post_form(
        &self,
        url: &str,
        fields: &[(&str, &str)],
    ) -> Result<PortalResponse, SessionError> {
        let target = parse_url(url)?;
        let response = self
            .client
            .post(target)
            .header(reqwest::header::REFERER, url)
            .form(fields)
            .send()
            .await
            .inspect_err(|e| log::error!("HTTP error: {e:?}"))?;
        Self::read(response).await
    }

    async fn get(&self, url: &str) -> Result<PortalResponse, SessionError> {
        let target = parse_url(url)?;
        let response = self
            .client
            .get(target)
            .send()
            .await
            .inspect_err(|e| log::error!("HTTP error: {e:?}"))?;
        Self::read(response).await
    }

    fn cookies(&self, url: &str) -> HashMap<String, String> {
        let Ok(url) = Url::parse(url) else {
            return HashMap::new();
        };
        self.jar
            .cookies(&url)
            .and_then(|header| header.to_str().ok().map(str::to_string))
            .map(|header| {
                header
                    .split(';')
                    .filter_map(|pair| pair.trim().split_once('='))
                    .map(|(name, value)| (name.to_string(), value.to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }
}
