//! Runtime-agnostic core of the call-waiting client.
//!
//! Everything in this crate is free of I/O: the domain types, the
//! Socket.IO wire codec, notification normalization and the call-session
//! transition function. The `callwait` crate drives these with tokio.

pub mod machine;
pub mod net;
pub mod notification;
pub mod protocol;
pub mod types;
