//! Push notification payloads and their normalization into call offers.

use crate::protocol::{IncomingCallPayload, ProtocolError};
use crate::types::CallOffer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The `type` data field value that marks a call invitation.
pub const INCOMING_CALL_TYPE: &str = "incoming_call";

/// A delivered notification as reported by the host OS.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub data: Map<String, Value>,
}

/// The user's interaction with a notification (a tap or an action button).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationResponse {
    #[serde(default)]
    pub action_identifier: String,
    pub notification: Notification,
}

impl Notification {
    pub fn is_incoming_call(&self) -> bool {
        self.data.get("type").and_then(Value::as_str) == Some(INCOMING_CALL_TYPE)
    }

    /// Extracts the call offer carried in the data fields.
    ///
    /// Returns `Ok(None)` for notifications of any other type.
    pub fn call_offer(&self) -> Result<Option<CallOffer>, ProtocolError> {
        if !self.is_incoming_call() {
            return Ok(None);
        }
        let payload = IncomingCallPayload::from_value(Value::Object(self.data.clone()))?;
        payload.into_offer().map(Some)
    }
}

impl NotificationResponse {
    pub fn call_offer(&self) -> Result<Option<CallOffer>, ProtocolError> {
        self.notification.call_offer()
    }
}
