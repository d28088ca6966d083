//! Media token exchange.

use async_trait::async_trait;
use callwait_core::net::{HttpClient, HttpRequest};
use callwait_core::types::{ChannelId, RtcToken};
use log::debug;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Upper bound (inclusive) for generated local uids. Zero is reserved by
/// the media service for "assign one for me".
pub const MAX_LOCAL_UID: u32 = 999_999;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("http error: {0}")]
    Http(#[from] anyhow::Error),

    #[error("token endpoint returned status {0}")]
    Status(u16),

    #[error("malformed token response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("token response has no rtcToken")]
    MissingToken,

    #[error("token request timed out after {0:?}")]
    Timeout(Duration),
}

/// Issues media credentials for a `(channel, uid)` pair.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn fetch_token(&self, channel: &ChannelId, uid: u32) -> Result<RtcToken, TokenError>;
}

/// Draws a fresh local uid, uniform over `1..=MAX_LOCAL_UID`.
pub fn generate_local_uid() -> u32 {
    use rand::Rng;
    rand::rng().random_range(1..=MAX_LOCAL_UID)
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(rename = "rtcToken")]
    rtc_token: Option<String>,
}

/// [`TokenProvider`] backed by `GET /rtcToken` on the rendezvous server.
pub struct HttpTokenProvider {
    base_url: String,
    http_client: Arc<dyn HttpClient>,
}

impl HttpTokenProvider {
    pub fn new(base_url: impl Into<String>, http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            base_url: base_url.into(),
            http_client,
        }
    }

    fn token_url(&self, channel: &ChannelId, uid: u32) -> String {
        format!(
            "{}/rtcToken?channelName={}&uid={}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(channel.as_str()),
            uid
        )
    }
}

#[async_trait]
impl TokenProvider for HttpTokenProvider {
    async fn fetch_token(&self, channel: &ChannelId, uid: u32) -> Result<RtcToken, TokenError> {
        let url = self.token_url(channel, uid);
        debug!(target: "Call/Token", "Requesting token: {url}");

        let response = self.http_client.execute(HttpRequest::get(url)).await?;
        if !response.is_success() {
            return Err(TokenError::Status(response.status_code));
        }

        let parsed: TokenResponse = serde_json::from_slice(&response.body)?;
        parsed
            .rtc_token
            .filter(|t| !t.is_empty())
            .map(RtcToken::new)
            .ok_or(TokenError::MissingToken)
    }
}
