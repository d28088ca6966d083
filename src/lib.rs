//! Callee-side call handling: rendezvous signaling, the call-session
//! machine, ringtone control and push-notification recovery.

pub use callwait_core::{machine, protocol, types};

pub mod config;
pub mod notification;
pub mod ringtone;
pub mod session;
pub mod signaling;
pub mod token;

#[cfg(test)]
pub mod mock;

pub use config::CallConfig;
pub use notification::{NotificationBridge, NotificationSource};
pub use ringtone::{LoggingTonePlayer, RingtoneController, TonePlayer};
pub use session::{CallHandle, CallSessionMachine, SessionError};
pub use signaling::{SignalingClient, SignalingError, SignalingSink};
pub use token::{HttpTokenProvider, TokenError, TokenProvider};
