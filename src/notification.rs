//! Push-notification entry points.
//!
//! Three OS delivery paths carry the same logical `incoming_call`:
//!
//! - foreground delivery: informational only, the live socket event is
//!   what actually rings;
//! - a tap while backgrounded ([`NotificationBridge::on_response`]);
//! - a tap that cold-started the process
//!   ([`NotificationBridge::recover_cold_start`]).
//!
//! Both tap paths go through the same injection so the machine cannot
//! tell them apart.

use crate::session::{CallHandle, SessionError};
use crate::signaling::{SignalingError, SignalingSink};
use async_trait::async_trait;
use callwait_core::notification::{Notification, NotificationResponse};
use callwait_core::protocol::OutboundEvent;
use callwait_core::types::PeerId;
use log::{debug, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Host API for the notification that launched the app, if any.
#[async_trait]
pub trait NotificationSource: Send + Sync {
    async fn last_response(&self) -> anyhow::Result<Option<NotificationResponse>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TapPath {
    Background,
    ColdStart,
}

pub struct NotificationBridge {
    calls: CallHandle,
    signaling: Arc<dyn SignalingSink>,
    user_id: PeerId,
    cold_start_checked: AtomicBool,
}

impl NotificationBridge {
    pub fn new(calls: CallHandle, signaling: Arc<dyn SignalingSink>, user_id: PeerId) -> Self {
        Self {
            calls,
            signaling,
            user_id,
            cold_start_checked: AtomicBool::new(false),
        }
    }

    /// Foreground delivery. Never changes call state.
    pub fn on_foreground_delivery(&self, notification: &Notification) {
        info!(
            target: "Call/Notify",
            "Notification received in foreground: {}",
            notification.title.as_deref().unwrap_or("<untitled>")
        );
    }

    /// The user tapped a notification while the app was backgrounded.
    /// Returns whether an offer was injected.
    pub async fn on_response(&self, response: &NotificationResponse) -> Result<bool, SessionError> {
        self.inject(response, TapPath::Background).await
    }

    /// Checks, once per process, whether a notification tap launched the
    /// app and injects its offer exactly like a background tap.
    pub async fn recover_cold_start(
        &self,
        source: &dyn NotificationSource,
    ) -> Result<bool, SessionError> {
        if self.cold_start_checked.swap(true, Ordering::SeqCst) {
            debug!(target: "Call/Notify", "Cold start already checked");
            return Ok(false);
        }
        match source.last_response().await {
            Ok(Some(response)) => self.inject(&response, TapPath::ColdStart).await,
            Ok(None) => Ok(false),
            Err(e) => {
                warn!(target: "Call/Notify", "Failed to query launch notification: {e}");
                Ok(false)
            }
        }
    }

    /// Announces a freshly issued push token to the signaling server.
    pub async fn register_push_token(&self, push_token: &str) -> Result<(), SignalingError> {
        self.signaling
            .emit(OutboundEvent::register_push(self.user_id.clone(), push_token))
            .await?;
        info!(target: "Call/Notify", "Push token registered for {}", self.user_id);
        Ok(())
    }

    async fn inject(
        &self,
        response: &NotificationResponse,
        path: TapPath,
    ) -> Result<bool, SessionError> {
        let offer = match response.call_offer() {
            Ok(Some(offer)) => offer,
            Ok(None) => {
                debug!(target: "Call/Notify", "{path:?} tap is not a call, ignoring");
                return Ok(false);
            }
            Err(e) => {
                warn!(target: "Call/Notify", "Dropping {path:?} tap with bad payload: {e}");
                return Ok(false);
            }
        };
        info!(
            target: "Call/Notify",
            "{path:?} tap for call from {}",
            offer.from
        );
        self.calls.incoming_call(offer).await?;
        Ok(true)
    }
}
