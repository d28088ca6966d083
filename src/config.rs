use callwait_core::types::PeerId;
use std::time::Duration;

pub const DEFAULT_SERVER_URL: &str = "https://server-w411.onrender.com";
pub const DEFAULT_USER_ID: &str = "doctor";
pub const DEFAULT_APP_ID: &str = "60bdf4f5f1b641f583d20d28d7a923d1";
pub const DEFAULT_TOKEN_TIMEOUT: Duration = Duration::from_secs(10);

/// Reconnection behaviour of the signaling client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CallConfig {
    /// Base URL of the rendezvous server. Serves both the Socket.IO
    /// endpoint and `/rtcToken`.
    pub server_url: String,
    /// Identity announced with `register`.
    pub user_id: PeerId,
    /// Application id forwarded to the video widget.
    pub app_id: String,
    pub token_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            user_id: PeerId::new(DEFAULT_USER_ID),
            app_id: DEFAULT_APP_ID.to_string(),
            token_timeout: DEFAULT_TOKEN_TIMEOUT,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl CallConfig {
    /// Engine.IO WebSocket endpoint derived from [`Self::server_url`].
    pub fn socket_url(&self) -> String {
        let base = self.server_url.trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        format!("{base}/socket.io/?EIO=4&transport=websocket")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_url_rewrites_scheme() {
        let config = CallConfig::default();
        assert_eq!(
            config.socket_url(),
            "wss://server-w411.onrender.com/socket.io/?EIO=4&transport=websocket"
        );

        let local = CallConfig {
            server_url: "http://127.0.0.1:3000/".into(),
            ..Default::default()
        };
        assert_eq!(
            local.socket_url(),
            "ws://127.0.0.1:3000/socket.io/?EIO=4&transport=websocket"
        );
    }
}
