//! Call-session state machine.
//!
//! [`Machine::step`] is a pure transition function: it consumes one
//! [`MachineInput`], updates the state and returns the side effects the
//! runtime must perform, in order. The runtime is expected to execute all
//! returned effects before publishing the new state, which keeps the
//! ringtone stop ahead of any observer seeing a non-ringing state.
//!
//! While a token fetch is outstanding the machine sits in
//! [`MachineState::Connecting`]. Any input that leaves that state cancels
//! the fetch, and token results tagged with an attempt number other than
//! the current one are refused as stale.

use crate::protocol::OutboundEvent;
use crate::types::{CallOffer, CallSession, ChannelId, PeerId, RtcToken};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Authoritative call state. Exactly one is active.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "data", rename_all = "snake_case")]
pub enum MachineState {
    #[default]
    Idle,
    Ringing(CallOffer),
    Connecting(CallOffer),
    InCall(CallSession),
}

impl MachineState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Ringing(_) => "ringing",
            Self::Connecting(_) => "connecting",
            Self::InCall(_) => "in_call",
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Ringing and Connecting both keep the ringtone playing.
    pub fn is_ringing(&self) -> bool {
        matches!(self, Self::Ringing(_) | Self::Connecting(_))
    }

    pub fn is_in_call(&self) -> bool {
        matches!(self, Self::InCall(_))
    }

    pub fn can_accept(&self) -> bool {
        matches!(self, Self::Ringing(_))
    }

    pub fn offer(&self) -> Option<&CallOffer> {
        match self {
            Self::Ringing(offer) | Self::Connecting(offer) => Some(offer),
            _ => None,
        }
    }

    pub fn session(&self) -> Option<&CallSession> {
        match self {
            Self::InCall(session) => Some(session),
            _ => None,
        }
    }
}

/// Everything the machine reacts to, already serialized into one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineInput {
    /// A live socket event or an injected notification tap.
    IncomingCall(CallOffer),
    /// The caller cancelled before we answered.
    CallRejected,
    /// The peer hung up.
    RemoteEndCall,
    /// User intent. `local_uid` must be freshly generated per acceptance.
    Accept { local_uid: u32 },
    /// User intent.
    Reject,
    /// User intent.
    HangUp,
    TokenReady { attempt: u64, token: RtcToken },
    TokenFailed { attempt: u64, reason: String },
}

impl MachineInput {
    pub fn label(&self) -> &'static str {
        match self {
            Self::IncomingCall(_) => "incoming_call",
            Self::CallRejected => "call_rejected",
            Self::RemoteEndCall => "end_call",
            Self::Accept { .. } => "accept",
            Self::Reject => "reject",
            Self::HangUp => "hang_up",
            Self::TokenReady { .. } => "token_ready",
            Self::TokenFailed { .. } => "token_failed",
        }
    }
}

/// Who ended a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndedBy {
    Local,
    Remote,
}

/// Human-facing notices for the presentation layer's log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "notice", rename_all = "snake_case")]
pub enum CallNotice {
    Incoming { offer: CallOffer },
    Joined { channel: ChannelId, local_uid: u32 },
    Rejected { peer: PeerId },
    CallerCancelled,
    Ended { by: EndedBy },
    TokenFailed { channel: ChannelId, reason: String },
}

/// Side effects requested by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    StartRingtone,
    StopRingtone,
    FetchToken {
        attempt: u64,
        channel: ChannelId,
        local_uid: u32,
    },
    CancelTokenFetch {
        attempt: u64,
    },
    Send(OutboundEvent),
    Notify(CallNotice),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid call transition: {input} while {state}")]
pub struct InvalidTransition {
    pub state: &'static str,
    pub input: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingAccept {
    attempt: u64,
    local_uid: u32,
}

/// The transition function plus the little bookkeeping it needs.
#[derive(Debug, Clone)]
pub struct Machine {
    self_id: PeerId,
    state: MachineState,
    pending: Option<PendingAccept>,
    next_attempt: u64,
}

impl Machine {
    pub fn new(self_id: PeerId) -> Self {
        Self {
            self_id,
            state: MachineState::Idle,
            pending: None,
            next_attempt: 1,
        }
    }

    pub fn state(&self) -> &MachineState {
        &self.state
    }

    pub fn self_id(&self) -> &PeerId {
        &self.self_id
    }

    /// Attempt number of the token fetch currently in flight, if any.
    pub fn pending_attempt(&self) -> Option<u64> {
        self.pending.map(|p| p.attempt)
    }

    /// Applies one input. On error the state is left untouched.
    pub fn step(&mut self, input: MachineInput) -> Result<Vec<Effect>, InvalidTransition> {
        use MachineInput as In;
        use MachineState as St;

        let current = std::mem::take(&mut self.state);
        let (next, effects) = match (current, input) {
            (St::Idle | St::Ringing(_), In::IncomingCall(offer)) => {
                Self::ring(offer, Vec::new())
            }
            (St::Connecting(_), In::IncomingCall(offer)) => {
                let effects = self.cancel_pending().into_iter().collect();
                Self::ring(offer, effects)
            }

            (St::Ringing(offer), In::Accept { local_uid }) => {
                let attempt = self.next_attempt;
                self.next_attempt += 1;
                self.pending = Some(PendingAccept { attempt, local_uid });
                let fetch = Effect::FetchToken {
                    attempt,
                    channel: offer.channel.clone(),
                    local_uid,
                };
                (St::Connecting(offer), vec![fetch])
            }

            (St::Connecting(offer), In::TokenReady { attempt, token })
                if self.is_current(attempt) =>
            {
                let local_uid = self.pending.take().map(|p| p.local_uid).unwrap_or_default();
                let accept = OutboundEvent::accept_call(
                    offer.from.clone(),
                    self.self_id.clone(),
                    offer.channel.clone(),
                    local_uid,
                );
                let joined = CallNotice::Joined {
                    channel: offer.channel.clone(),
                    local_uid,
                };
                let session = CallSession {
                    peer: offer.from,
                    channel: offer.channel,
                    local_uid,
                    token,
                };
                (
                    St::InCall(session),
                    vec![
                        Effect::StopRingtone,
                        Effect::Send(accept),
                        Effect::Notify(joined),
                    ],
                )
            }
            (St::Connecting(offer), In::TokenFailed { attempt, reason })
                if self.is_current(attempt) =>
            {
                self.pending = None;
                let notice = CallNotice::TokenFailed {
                    channel: offer.channel,
                    reason,
                };
                (
                    St::Idle,
                    vec![Effect::StopRingtone, Effect::Notify(notice)],
                )
            }

            (St::Ringing(offer) | St::Connecting(offer), In::Reject) => {
                let mut effects: Vec<Effect> = self.cancel_pending().into_iter().collect();
                effects.push(Effect::Send(OutboundEvent::reject_call(
                    offer.from.clone(),
                    self.self_id.clone(),
                )));
                effects.push(Effect::StopRingtone);
                effects.push(Effect::Notify(CallNotice::Rejected { peer: offer.from }));
                (St::Idle, effects)
            }
            (St::Ringing(_) | St::Connecting(_), In::CallRejected) => {
                let mut effects: Vec<Effect> = self.cancel_pending().into_iter().collect();
                effects.push(Effect::StopRingtone);
                effects.push(Effect::Notify(CallNotice::CallerCancelled));
                (St::Idle, effects)
            }

            (St::InCall(session), In::HangUp) => (
                St::Idle,
                vec![
                    Effect::StopRingtone,
                    Effect::Send(OutboundEvent::end_call(
                        session.peer,
                        self.self_id.clone(),
                    )),
                    Effect::Notify(CallNotice::Ended { by: EndedBy::Local }),
                ],
            ),

            // A remote hang-up is honoured from every state, and the
            // ringtone stop is issued even when nothing is playing.
            (state, In::RemoteEndCall) => {
                let mut effects: Vec<Effect> = self.cancel_pending().into_iter().collect();
                effects.push(Effect::StopRingtone);
                if !state.is_idle() {
                    effects.push(Effect::Notify(CallNotice::Ended {
                        by: EndedBy::Remote,
                    }));
                }
                (St::Idle, effects)
            }

            (state, input) => {
                let err = InvalidTransition {
                    state: state.label(),
                    input: input.label(),
                };
                self.state = state;
                return Err(err);
            }
        };

        self.state = next;
        Ok(effects)
    }

    fn ring(offer: CallOffer, mut effects: Vec<Effect>) -> (MachineState, Vec<Effect>) {
        effects.push(Effect::StartRingtone);
        effects.push(Effect::Notify(CallNotice::Incoming {
            offer: offer.clone(),
        }));
        (MachineState::Ringing(offer), effects)
    }

    fn is_current(&self, attempt: u64) -> bool {
        self.pending.is_some_and(|p| p.attempt == attempt)
    }

    fn cancel_pending(&mut self) -> Option<Effect> {
        self.pending
            .take()
            .map(|p| Effect::CancelTokenFetch { attempt: p.attempt })
    }
}
