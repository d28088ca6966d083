//! Signaling wire protocol.
//!
//! The rendezvous server speaks Socket.IO v4 on top of the Engine.IO v4
//! WebSocket transport. [`codec`] handles the two packet layers and
//! [`events`] maps Socket.IO events onto typed call-control messages.
//!
//! ```text
//! 0{"sid":"..","pingInterval":25000,..}   engine.io open
//! 40                                      socket.io connect (both ways)
//! 42["incoming_call",{"from":"patient1","channel":"room-42"}]
//! 2 / 3                                   ping / pong
//! ```

pub mod codec;
mod error;
pub mod events;

pub use codec::{EnginePacket, OpenHandshake, SocketPacket};
pub use error::ProtocolError;
pub use events::{
    AcceptCallPayload, InboundEvent, IncomingCallPayload, OutboundEvent, PeerPayload,
    RegisterPayload, RegisterPushPayload,
};
