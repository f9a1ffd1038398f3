use crate::session::XrpcSession;
use crate::traits::FeedSource;
use crate::types::{ClientConfig, Cursor, FeedIdentifier, FeedPage, IngestError, RawItem, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

pub const GET_FEED: &str = "app.bsky.feed.getFeed";

pub fn build_http_client(config: &ClientConfig) -> Result<Client> {
    Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_seconds))
        .gzip(true)
        .deflate(true)
        .brotli(true)
        .build()
        .map_err(|e| IngestError::Configuration(format!("failed to create HTTP client: {}", e)))
}

pub fn xrpc_url(host: &str, nsid: &str) -> String {
    format!("{}/xrpc/{}", host.trim_end_matches('/'), nsid)
}

/// Turn a non-2xx response into an API error carrying the response body.
pub async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| status.canonical_reason().unwrap_or("Unknown").to_string());
    Err(IngestError::Api {
        status: status.as_u16(),
        message,
    })
}

#[derive(Debug, Deserialize)]
struct GetFeedResponse {
    #[serde(default)]
    cursor: Option<String>,
    #[serde(default)]
    feed: Vec<Value>,
}

/// Decode a `getFeed` response body.
///
/// Each feed entry keeps its full JSON as payload; its `post.uri` is the
/// content ID.
pub fn decode_feed_response(body: &[u8]) -> Result<FeedPage> {
    let response: GetFeedResponse = serde_json::from_slice(body)?;

    let items = response
        .feed
        .into_iter()
        .enumerate()
        .map(|(position, entry)| {
            let content_id = entry
                .pointer("/post/uri")
                .and_then(Value::as_str)
                .ok_or_else(|| IngestError::Malformed(format!("feed entry {} has no post.uri", position)))?
                .to_string();
            Ok(RawItem {
                content_id,
                payload: entry,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(FeedPage {
        cursor: response.cursor.map(Cursor::new),
        items,
    })
}

/// `FeedSource` backed by the XRPC `getFeed` endpoint.
pub struct XrpcFeedClient {
    client: Client,
    host: String,
    session: Arc<XrpcSession>,
}

impl XrpcFeedClient {
    pub fn new(client: Client, config: &ClientConfig, session: Arc<XrpcSession>) -> Self {
        Self {
            client,
            host: config.host.clone(),
            session,
        }
    }
}

#[async_trait]
impl FeedSource for XrpcFeedClient {
    async fn get_feed(
        &self,
        identifier: &FeedIdentifier,
        cursor: Option<&Cursor>,
        limit: u32,
    ) -> Result<FeedPage> {
        let start_time = Instant::now();

        let mut request = self
            .client
            .get(xrpc_url(&self.host, GET_FEED))
            .bearer_auth(self.session.access_token().await)
            .query(&[("feed", identifier.as_str())])
            .query(&[("limit", limit)]);

        if let Some(cursor) = cursor {
            request = request.query(&[("cursor", cursor.as_str())]);
        }

        let response = check_status(request.send().await?).await?;
        let body = response.bytes().await?;
        let page = decode_feed_response(&body)?;

        debug!(
            "Fetched {} items for {} in {}ms",
            page.items.len(),
            identifier,
            start_time.elapsed().as_millis()
        );
        Ok(page)
    }
}
