pub mod call;

pub use call::{CallOffer, CallSession, ChannelId, ConnectionData, PeerId, RtcToken};
