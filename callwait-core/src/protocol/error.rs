use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("empty packet")]
    Empty,

    #[error("unknown engine.io packet type: {0:?}")]
    UnknownEnginePacket(char),

    #[error("unknown socket.io packet type: {0:?}")]
    UnknownSocketPacket(char),

    #[error("binary socket.io packets are not supported")]
    UnsupportedBinary,

    #[error("packet for unsupported namespace {0}")]
    ForeignNamespace(String),

    #[error("malformed event: {0}")]
    MalformedEvent(String),

    #[error("unknown event: {0}")]
    UnknownEvent(String),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
