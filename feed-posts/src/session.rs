use crate::config::Credentials;
use crate::fetcher::{check_status, xrpc_url};
use crate::types::{ClientConfig, IngestError, Result};
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const CREATE_SESSION: &str = "com.atproto.server.createSession";
pub const REFRESH_SESSION: &str = "com.atproto.server.refreshSession";

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTokens {
    pub access_jwt: String,
    pub refresh_jwt: String,
    #[serde(default)]
    pub did: Option<String>,
    #[serde(default)]
    pub handle: Option<String>,
}

impl std::fmt::Debug for SessionTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTokens")
            .field("access_jwt", &"***")
            .field("refresh_jwt", &"***")
            .field("did", &self.did)
            .field("handle", &self.handle)
            .finish()
    }
}

/// Authenticated XRPC session shared by every request.
pub struct XrpcSession {
    client: Client,
    host: String,
    tokens: RwLock<SessionTokens>,
}

impl XrpcSession {
    pub fn from_tokens(client: Client, host: impl Into<String>, tokens: SessionTokens) -> Self {
        Self {
            client,
            host: host.into(),
            tokens: RwLock::new(tokens),
        }
    }

    /// Log in with `credentials`, retrying transport failures, 429s and 5xx
    /// responses with exponential backoff. Any final failure is a
    /// configuration error.
    pub async fn create(client: Client, config: &ClientConfig, credentials: &Credentials) -> Result<Self> {
        let url = xrpc_url(&config.host, CREATE_SESSION);

        let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
            current_interval: Duration::from_secs(config.retry_delay_seconds),
            initial_interval: Duration::from_secs(config.retry_delay_seconds),
            max_interval: Duration::from_secs(config.retry_delay_seconds * 32),
            multiplier: 2.0,
            max_elapsed_time: Some(Duration::from_secs(config.retry_delay_seconds * 60)),
            ..Default::default()
        };

        let mut attempt = 0;
        let tokens = loop {
            match Self::request_session(&client, &url, credentials).await {
                Ok(tokens) => break tokens,
                Err(e) if e.is_transient() && attempt < config.max_retries => match backoff.next_backoff() {
                    Some(delay) => {
                        attempt += 1;
                        warn!("Session attempt {} failed: {}, retrying in {:?}", attempt, e, delay);
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        return Err(IngestError::Configuration(format!(
                            "could not create session for {}: {}",
                            credentials.identifier, e
                        )))
                    }
                },
                Err(e) => {
                    return Err(IngestError::Configuration(format!(
                        "could not create session for {}: {}",
                        credentials.identifier, e
                    )))
                }
            }
        };

        info!(
            "Session created for {}",
            tokens.handle.as_deref().unwrap_or(&credentials.identifier)
        );
        Ok(Self::from_tokens(client, config.host.clone(), tokens))
    }

    async fn request_session(client: &Client, url: &str, credentials: &Credentials) -> Result<SessionTokens> {
        let response = client
            .post(url)
            .json(&serde_json::json!({
                "identifier": credentials.identifier,
                "password": credentials.password,
            }))
            .send()
            .await?;

        let body = check_status(response).await?.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    pub async fn access_token(&self) -> String {
        self.tokens.read().await.access_jwt.clone()
    }

    /// Exchange the refresh JWT for a new token pair and install it.
    pub async fn refresh(&self) -> Result<SessionTokens> {
        let refresh_jwt = self.tokens.read().await.refresh_jwt.clone();

        let response = self
            .client
            .post(xrpc_url(&self.host, REFRESH_SESSION))
            .header(ACCEPT, "application/json")
            .bearer_auth(refresh_jwt)
            .send()
            .await?;

        let body = check_status(response).await?.bytes().await?;
        let tokens: SessionTokens = serde_json::from_slice(&body)?;

        *self.tokens.write().await = tokens.clone();
        Ok(tokens)
    }

    /// Refresh on a fixed timer until `cancel` fires. A failed refresh keeps
    /// the current tokens.
    pub fn spawn_refresh_task(self: Arc<Self>, every: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => match self.refresh().await {
                        Ok(_) => info!("Session refreshed"),
                        Err(e) => warn!("Error refreshing session: {}", e),
                    },
                }
            }
            debug!("Session refresh task stopped");
        })
    }
}
