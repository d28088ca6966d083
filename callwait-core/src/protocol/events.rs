//! Typed call-control events exchanged with the rendezvous server.

use super::codec::SocketPacket;
use super::error::ProtocolError;
use crate::types::{CallOffer, ChannelId, PeerId};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPayload {
    pub user_id: PeerId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPushPayload {
    pub user_id: PeerId,
    pub push_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptCallPayload {
    pub to: PeerId,
    pub from: PeerId,
    pub channel: ChannelId,
    pub callee_uid: u32,
}

/// Addressing shared by `reject_call` and `end_call`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerPayload {
    pub to: PeerId,
    pub from: PeerId,
}

/// Events we send to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    Register(RegisterPayload),
    RegisterPush(RegisterPushPayload),
    AcceptCall(AcceptCallPayload),
    RejectCall(PeerPayload),
    EndCall(PeerPayload),
}

impl OutboundEvent {
    pub fn register(user_id: PeerId) -> Self {
        Self::Register(RegisterPayload { user_id })
    }

    pub fn register_push(user_id: PeerId, push_token: impl Into<String>) -> Self {
        Self::RegisterPush(RegisterPushPayload {
            user_id,
            push_token: push_token.into(),
        })
    }

    pub fn accept_call(to: PeerId, from: PeerId, channel: ChannelId, callee_uid: u32) -> Self {
        Self::AcceptCall(AcceptCallPayload {
            to,
            from,
            channel,
            callee_uid,
        })
    }

    pub fn reject_call(to: PeerId, from: PeerId) -> Self {
        Self::RejectCall(PeerPayload { to, from })
    }

    pub fn end_call(to: PeerId, from: PeerId) -> Self {
        Self::EndCall(PeerPayload { to, from })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Register(_) => "register",
            Self::RegisterPush(_) => "register_push",
            Self::AcceptCall(_) => "accept_call",
            Self::RejectCall(_) => "reject_call",
            Self::EndCall(_) => "end_call",
        }
    }

    /// Encodes the event as a ready-to-send text frame.
    ///
    /// Payloads are written straight from their structs so keys keep
    /// declaration order on the wire.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        let name = self.name();
        let args = match self {
            Self::Register(p) => serde_json::to_string(&(name, p)),
            Self::RegisterPush(p) => serde_json::to_string(&(name, p)),
            Self::AcceptCall(p) => serde_json::to_string(&(name, p)),
            Self::RejectCall(p) | Self::EndCall(p) => serde_json::to_string(&(name, p)),
        }?;
        // Engine.IO message carrying a Socket.IO event.
        Ok(format!("42{args}"))
    }
}

/// Raw `incoming_call` payload as it appears on the wire or in a
/// notification's data fields.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingCallPayload {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub channel: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub patient_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub symptoms: Option<String>,
}

impl IncomingCallPayload {
    /// Validates required fields and converts into a [`CallOffer`].
    pub fn into_offer(self) -> Result<CallOffer, ProtocolError> {
        if self.from.trim().is_empty() {
            return Err(ProtocolError::MissingField("from"));
        }
        if self.channel.trim().is_empty() {
            return Err(ProtocolError::MissingField("channel"));
        }
        Ok(CallOffer {
            from: PeerId::new(self.from),
            channel: ChannelId::new(self.channel),
            patient_id: self.patient_id,
            name: self.name,
            symptoms: self.symptoms,
        })
    }

    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        if !value.is_object() {
            return Err(ProtocolError::MalformedEvent(
                "incoming_call payload is not an object".into(),
            ));
        }
        Ok(serde_json::from_value(value)?)
    }
}

// Patient ids arrive as either numbers or strings depending on the sender.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

/// Events the server sends to us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    IncomingCall(CallOffer),
    CallRejected,
    EndCall,
}

impl InboundEvent {
    /// Maps a decoded Socket.IO event onto a typed inbound event.
    pub fn from_event(name: &str, data: Value) -> Result<Self, ProtocolError> {
        match name {
            "incoming_call" => Ok(Self::IncomingCall(
                IncomingCallPayload::from_value(data)?.into_offer()?,
            )),
            "call_rejected" => Ok(Self::CallRejected),
            "end_call" => Ok(Self::EndCall),
            other => Err(ProtocolError::UnknownEvent(other.to_string())),
        }
    }

    /// Returns `Ok(None)` for Socket.IO packets that are not events.
    pub fn from_packet(packet: &SocketPacket) -> Result<Option<Self>, ProtocolError> {
        match packet {
            SocketPacket::Event { name, data, .. } => {
                Self::from_event(name, data.clone()).map(Some)
            }
            _ => Ok(None),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::IncomingCall(_) => "incoming_call",
            Self::CallRejected => "call_rejected",
            Self::EndCall => "end_call",
        }
    }
}
