use callwait_core::protocol::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("not connected to the signaling server")]
    NotConnected,

    #[error("already connected")]
    AlreadyConnected,

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("transport error: {0}")]
    Transport(#[from] anyhow::Error),
}
