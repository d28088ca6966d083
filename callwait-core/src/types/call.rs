use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a signaling peer (the caller, or ourselves).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Name of the media channel both parties join.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Short-lived media credential issued for one `(channel, uid)` pair.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RtcToken(String);

impl RtcToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RtcToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RtcToken(<{} bytes>)", self.0.len())
    }
}

/// An inbound, not yet answered call invitation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallOffer {
    pub from: PeerId,
    pub channel: ChannelId,
    pub patient_id: Option<String>,
    pub name: Option<String>,
    pub symptoms: Option<String>,
}

impl CallOffer {
    pub fn new(from: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            from: PeerId::new(from),
            channel: ChannelId::new(channel),
            patient_id: None,
            name: None,
            symptoms: None,
        }
    }

    pub fn with_patient_id(mut self, patient_id: impl Into<String>) -> Self {
        self.patient_id = Some(patient_id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_symptoms(mut self, symptoms: impl Into<String>) -> Self {
        self.symptoms = Some(symptoms.into());
        self
    }

    /// Name shown on the incoming-call banner.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.from.as_str())
    }
}

/// An accepted call holding the credential for the media channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSession {
    pub peer: PeerId,
    pub channel: ChannelId,
    pub local_uid: u32,
    pub token: RtcToken,
}

impl CallSession {
    /// Parameters handed to the embedded video widget.
    pub fn connection_data(&self, app_id: &str) -> ConnectionData {
        ConnectionData {
            app_id: app_id.to_string(),
            channel: self.channel.clone(),
            token: self.token.clone(),
            uid: self.local_uid,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionData {
    pub app_id: String,
    pub channel: ChannelId,
    pub token: RtcToken,
    pub uid: u32,
}
