//! Engine.IO / Socket.IO text packet codec.

use super::error::ProtocolError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Handshake data carried by the Engine.IO `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    pub ping_interval: u64,
    pub ping_timeout: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<u64>,
}

/// Outer Engine.IO packet.
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenHandshake),
    Close,
    Ping,
    Pong,
    Message(SocketPacket),
    Upgrade,
    Noop,
}

/// Socket.IO packet carried inside an Engine.IO `message`.
///
/// Only the default namespace is used. An explicit `/` prefix is
/// accepted, any other namespace is refused.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect(Option<Value>),
    Disconnect,
    Event {
        name: String,
        data: Value,
        ack: Option<u64>,
    },
    Ack {
        id: u64,
        args: Vec<Value>,
    },
    ConnectError(Value),
}

impl EnginePacket {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let mut chars = text.chars();
        let kind = chars.next().ok_or(ProtocolError::Empty)?;
        let rest = chars.as_str();
        match kind {
            '0' => Ok(Self::Open(serde_json::from_str(rest)?)),
            '1' => Ok(Self::Close),
            // Engine.IO only attaches data to pings during transport upgrades.
            '2' => Ok(Self::Ping),
            '3' => Ok(Self::Pong),
            '4' => Ok(Self::Message(SocketPacket::decode(rest)?)),
            '5' => Ok(Self::Upgrade),
            '6' => Ok(Self::Noop),
            other => Err(ProtocolError::UnknownEnginePacket(other)),
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(match self {
            Self::Open(handshake) => format!("0{}", serde_json::to_string(handshake)?),
            Self::Close => "1".to_string(),
            Self::Ping => "2".to_string(),
            Self::Pong => "3".to_string(),
            Self::Message(packet) => format!("4{}", packet.encode()?),
            Self::Upgrade => "5".to_string(),
            Self::Noop => "6".to_string(),
        })
    }
}

impl SocketPacket {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let mut chars = text.chars();
        let kind = chars.next().ok_or(ProtocolError::Empty)?;
        let body = default_namespace(chars.as_str())?;
        match kind {
            '0' => {
                if body.is_empty() {
                    Ok(Self::Connect(None))
                } else {
                    Ok(Self::Connect(Some(serde_json::from_str(body)?)))
                }
            }
            '1' => Ok(Self::Disconnect),
            '2' => {
                let (ack, json) = split_ack_id(body);
                let mut args: Vec<Value> = serde_json::from_str(json)?;
                if args.is_empty() {
                    return Err(ProtocolError::MalformedEvent("empty argument list".into()));
                }
                let name = match args.remove(0) {
                    Value::String(name) => name,
                    other => {
                        return Err(ProtocolError::MalformedEvent(format!(
                            "event name is not a string: {other}"
                        )));
                    }
                };
                let data = if args.is_empty() {
                    Value::Null
                } else {
                    args.remove(0)
                };
                Ok(Self::Event { name, data, ack })
            }
            '3' => {
                let (ack, json) = split_ack_id(body);
                let id = ack.ok_or_else(|| ProtocolError::MalformedEvent("ack without id".into()))?;
                Ok(Self::Ack {
                    id,
                    args: serde_json::from_str(json)?,
                })
            }
            '4' => Ok(Self::ConnectError(serde_json::from_str(body)?)),
            '5' | '6' => Err(ProtocolError::UnsupportedBinary),
            other => Err(ProtocolError::UnknownSocketPacket(other)),
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(match self {
            Self::Connect(None) => "0".to_string(),
            Self::Connect(Some(auth)) => format!("0{}", serde_json::to_string(auth)?),
            Self::Disconnect => "1".to_string(),
            Self::Event { name, data, ack } => {
                let mut args = vec![Value::String(name.clone())];
                if !data.is_null() {
                    args.push(data.clone());
                }
                let ack = ack.map(|id| id.to_string()).unwrap_or_default();
                format!("2{ack}{}", serde_json::to_string(&args)?)
            }
            Self::Ack { id, args } => format!("3{id}{}", serde_json::to_string(args)?),
            Self::ConnectError(err) => format!("4{}", serde_json::to_string(err)?),
        })
    }
}

fn default_namespace(body: &str) -> Result<&str, ProtocolError> {
    if !body.starts_with('/') {
        return Ok(body);
    }
    let (namespace, rest) = body.split_once(',').unwrap_or((body, ""));
    if namespace != "/" {
        return Err(ProtocolError::ForeignNamespace(namespace.to_string()));
    }
    Ok(rest)
}

fn split_ack_id(body: &str) -> (Option<u64>, &str) {
    let digits = body.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return (None, body);
    }
    (body[..digits].parse().ok(), &body[digits..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_open_handshake() {
        let packet = EnginePacket::decode(
            r#"0{"sid":"lv_VI97HAXpY6yYWAAAC","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#,
        )
        .unwrap();
        let EnginePacket::Open(handshake) = packet else {
            panic!("expected open packet");
        };
        assert_eq!(handshake.sid, "lv_VI97HAXpY6yYWAAAC");
        assert_eq!(handshake.ping_interval, 25000);
        assert_eq!(handshake.ping_timeout, 20000);
        assert_eq!(handshake.max_payload, Some(1_000_000));
    }

    #[test]
    fn test_decode_ping_and_reply() {
        assert_eq!(EnginePacket::decode("2").unwrap(), EnginePacket::Ping);
        assert_eq!(EnginePacket::Pong.encode().unwrap(), "3");
    }

    #[test]
    fn test_connect_packets() {
        assert_eq!(
            EnginePacket::Message(SocketPacket::Connect(None))
                .encode()
                .unwrap(),
            "40"
        );
        let ack = EnginePacket::decode(r#"40{"sid":"abc"}"#).unwrap();
        assert_eq!(
            ack,
            EnginePacket::Message(SocketPacket::Connect(Some(json!({"sid": "abc"}))))
        );
    }

    #[test]
    fn test_decode_event_with_data() {
        let packet =
            EnginePacket::decode(r#"42["incoming_call",{"from":"patient1","channel":"room-1"}]"#)
                .unwrap();
        assert_eq!(
            packet,
            EnginePacket::Message(SocketPacket::Event {
                name: "incoming_call".into(),
                data: json!({"from": "patient1", "channel": "room-1"}),
                ack: None,
            })
        );
    }

    #[test]
    fn test_decode_event_without_data() {
        let packet = SocketPacket::decode(r#"2["end_call"]"#).unwrap();
        assert_eq!(
            packet,
            SocketPacket::Event {
                name: "end_call".into(),
                data: serde_json::Value::Null,
                ack: None,
            }
        );
    }

    #[test]
    fn test_decode_event_with_ack_id() {
        let packet = SocketPacket::decode(r#"2/,13["call_rejected",{}]"#).unwrap();
        assert_eq!(
            packet,
            SocketPacket::Event {
                name: "call_rejected".into(),
                data: json!({}),
                ack: Some(13),
            }
        );
    }

    #[test]
    fn test_other_namespaces_are_refused() {
        assert!(matches!(
            EnginePacket::decode(r#"42/calls,["incoming_call",{"from":"p","channel":"c"}]"#),
            Err(ProtocolError::ForeignNamespace(ns)) if ns == "/calls"
        ));
        assert!(matches!(
            SocketPacket::decode("0/admin"),
            Err(ProtocolError::ForeignNamespace(ns)) if ns == "/admin"
        ));
    }

    #[test]
    fn test_encode_event() {
        let text = EnginePacket::Message(SocketPacket::Event {
            name: "register".into(),
            data: json!({"userId": "doctor"}),
            ack: None,
        })
        .encode()
        .unwrap();
        assert_eq!(text, r#"42["register",{"userId":"doctor"}]"#);
    }

    #[test]
    fn test_rejects_malformed_input() {
        assert!(matches!(EnginePacket::decode(""), Err(ProtocolError::Empty)));
        assert!(matches!(
            EnginePacket::decode("9"),
            Err(ProtocolError::UnknownEnginePacket('9'))
        ));
        assert!(matches!(
            EnginePacket::decode("42[]"),
            Err(ProtocolError::MalformedEvent(_))
        ));
        assert!(matches!(
            EnginePacket::decode("42[7,{}]"),
            Err(ProtocolError::MalformedEvent(_))
        ));
        assert!(matches!(
            EnginePacket::decode(r#"451-["x",{"_placeholder":true,"num":0}]"#),
            Err(ProtocolError::UnsupportedBinary)
        ));
        assert!(matches!(
            EnginePacket::decode("42not json"),
            Err(ProtocolError::Json(_))
        ));
    }
}
