//! Call-session runtime.
//!
//! [`CallSessionMachine`] owns the call state, the ringtone and the
//! in-flight token fetch. Every input (socket events, notification taps,
//! user intents, token results) goes through one mpsc queue and is
//! applied by [`Machine::step`] one at a time. Effects run in the order
//! the transition returned them and the new state is published only
//! afterwards.

use crate::config::CallConfig;
use crate::ringtone::RingtoneController;
use crate::signaling::SignalingSink;
use crate::token::{TokenError, TokenProvider, generate_local_uid};
use callwait_core::machine::{CallNotice, Effect, Machine, MachineInput, MachineState};
use callwait_core::protocol::InboundEvent;
use callwait_core::types::CallOffer;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

const INPUT_CHANNEL_CAPACITY: usize = 100;
const NOTICE_CHANNEL_CAPACITY: usize = 100;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("call machine is not running")]
    Closed,
}

/// Cloneable front door to a running [`CallSessionMachine`].
#[derive(Clone)]
pub struct CallHandle {
    inputs: mpsc::Sender<MachineInput>,
    state: watch::Receiver<MachineState>,
    notices: broadcast::Sender<CallNotice>,
}

impl CallHandle {
    /// Snapshot of the current state.
    pub fn state(&self) -> MachineState {
        self.state.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<MachineState> {
        self.state.clone()
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<CallNotice> {
        self.notices.subscribe()
    }

    /// Waits until the published state satisfies `f`, checking the current
    /// state first.
    pub async fn wait_for(
        &self,
        f: impl FnMut(&MachineState) -> bool,
    ) -> Result<MachineState, SessionError> {
        let mut rx = self.state.clone();
        let state = rx.wait_for(f).await.map_err(|_| SessionError::Closed)?;
        Ok(state.clone())
    }

    pub async fn incoming_call(&self, offer: CallOffer) -> Result<(), SessionError> {
        self.send(MachineInput::IncomingCall(offer)).await
    }

    /// Accepts the ringing offer using a freshly drawn local uid.
    pub async fn accept(&self) -> Result<(), SessionError> {
        self.send(MachineInput::Accept {
            local_uid: generate_local_uid(),
        })
        .await
    }

    pub async fn reject(&self) -> Result<(), SessionError> {
        self.send(MachineInput::Reject).await
    }

    pub async fn hang_up(&self) -> Result<(), SessionError> {
        self.send(MachineInput::HangUp).await
    }

    /// Feeds one validated signaling event into the machine.
    pub async fn deliver(&self, event: InboundEvent) -> Result<(), SessionError> {
        let input = match event {
            InboundEvent::IncomingCall(offer) => MachineInput::IncomingCall(offer),
            InboundEvent::CallRejected => MachineInput::CallRejected,
            InboundEvent::EndCall => MachineInput::RemoteEndCall,
        };
        self.send(input).await
    }

    /// Spawns a task forwarding signaling events until either side closes.
    pub fn forward_inbound(&self, mut events: mpsc::Receiver<InboundEvent>) -> JoinHandle<()> {
        let handle = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if handle.deliver(event).await.is_err() {
                    break;
                }
            }
            debug!(target: "Call/Machine", "Inbound forwarding stopped");
        })
    }

    async fn send(&self, input: MachineInput) -> Result<(), SessionError> {
        self.inputs
            .send(input)
            .await
            .map_err(|_| SessionError::Closed)
    }
}

pub struct CallSessionMachine {
    machine: Machine,
    ringtone: RingtoneController,
    signaling: Arc<dyn SignalingSink>,
    tokens: Arc<dyn TokenProvider>,
    token_timeout: Duration,

    /// Weak so the queue closes once every [`CallHandle`] is gone.
    inputs_tx: mpsc::WeakSender<MachineInput>,
    inputs_rx: mpsc::Receiver<MachineInput>,
    state_tx: watch::Sender<MachineState>,
    notices_tx: broadcast::Sender<CallNotice>,
    in_flight: Option<(u64, JoinHandle<()>)>,
}

impl CallSessionMachine {
    pub fn new(
        config: &CallConfig,
        ringtone: RingtoneController,
        signaling: Arc<dyn SignalingSink>,
        tokens: Arc<dyn TokenProvider>,
    ) -> (Self, CallHandle) {
        let (inputs_tx, inputs_rx) = mpsc::channel(INPUT_CHANNEL_CAPACITY);
        let (state_tx, state_rx) = watch::channel(MachineState::Idle);
        let (notices_tx, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);

        let handle = CallHandle {
            inputs: inputs_tx.clone(),
            state: state_rx,
            notices: notices_tx.clone(),
        };
        let machine = Self {
            machine: Machine::new(config.user_id.clone()),
            ringtone,
            signaling,
            tokens,
            token_timeout: config.token_timeout,
            inputs_tx: inputs_tx.downgrade(),
            inputs_rx,
            state_tx,
            notices_tx,
            in_flight: None,
        };
        (machine, handle)
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Processes inputs until every [`CallHandle`] has been dropped.
    pub async fn run(mut self) {
        info!(target: "Call/Machine", "Call machine running");
        while let Some(input) = self.inputs_rx.recv().await {
            self.dispatch(input).await;
        }
        if let Some((_, task)) = self.in_flight.take() {
            task.abort();
        }
        self.ringtone.stop().await;
        info!(target: "Call/Machine", "Call machine stopped");
    }

    async fn dispatch(&mut self, input: MachineInput) {
        let is_token_result = matches!(
            input,
            MachineInput::TokenReady { .. } | MachineInput::TokenFailed { .. }
        );
        if let MachineInput::TokenReady { attempt, .. } | MachineInput::TokenFailed { attempt, .. } =
            &input
        {
            if self.in_flight.as_ref().is_some_and(|(a, _)| a == attempt) {
                self.in_flight = None;
            }
        }

        let effects = match self.machine.step(input) {
            Ok(effects) => effects,
            Err(e) if is_token_result => {
                debug!(target: "Call/Machine", "Ignoring late token result: {e}");
                return;
            }
            Err(e) => {
                debug!(target: "Call/Machine", "{e}");
                return;
            }
        };

        for effect in effects {
            self.execute(effect).await;
        }

        let state = self.machine.state().clone();
        debug!(target: "Call/Machine", "State -> {}", state.label());
        self.state_tx.send_replace(state);
    }

    async fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::StartRingtone => self.ringtone.start().await,
            Effect::StopRingtone => self.ringtone.stop().await,
            Effect::FetchToken {
                attempt,
                channel,
                local_uid,
            } => {
                info!(
                    target: "Call/Machine",
                    "Accepting call, requesting token for uid {local_uid}"
                );
                let tokens = self.tokens.clone();
                let inputs = self.inputs_tx.clone();
                let token_timeout = self.token_timeout;
                let task = tokio::spawn(async move {
                    let fetch = tokens.fetch_token(&channel, local_uid);
                    let result = match tokio::time::timeout(token_timeout, fetch).await {
                        Ok(result) => result,
                        Err(_) => Err(TokenError::Timeout(token_timeout)),
                    };
                    let input = match result {
                        Ok(token) => MachineInput::TokenReady { attempt, token },
                        Err(e) => MachineInput::TokenFailed {
                            attempt,
                            reason: e.to_string(),
                        },
                    };
                    if let Some(inputs) = inputs.upgrade() {
                        let _ = inputs.send(input).await;
                    }
                });
                if let Some((_, previous)) = self.in_flight.replace((attempt, task)) {
                    previous.abort();
                }
            }
            Effect::CancelTokenFetch { attempt } => match self.in_flight.take() {
                Some((current, task)) if current == attempt => {
                    task.abort();
                    debug!(target: "Call/Machine", "Cancelled token fetch #{attempt}");
                }
                other => self.in_flight = other,
            },
            Effect::Send(event) => {
                let name = event.name();
                if let Err(e) = self.signaling.emit(event).await {
                    warn!(target: "Call/Machine", "Failed to send {name}: {e}");
                }
            }
            Effect::Notify(notice) => {
                log_notice(&notice);
                let _ = self.notices_tx.send(notice);
            }
        }
    }
}

fn log_notice(notice: &CallNotice) {
    match notice {
        CallNotice::Incoming { offer } => info!(
            target: "Call/Machine",
            "Incoming call from {} on {}",
            offer.display_name(),
            offer.channel
        ),
        CallNotice::Joined { channel, local_uid } => {
            info!(target: "Call/Machine", "Joined call on {channel} as uid {local_uid}")
        }
        CallNotice::Rejected { peer } => info!(target: "Call/Machine", "Rejected call from {peer}"),
        CallNotice::CallerCancelled => {
            info!(target: "Call/Machine", "Caller rejected or canceled")
        }
        CallNotice::Ended { by } => info!(target: "Call/Machine", "Call ended ({by:?})"),
        CallNotice::TokenFailed { channel, reason } => {
            warn!(target: "Call/Machine", "Token error for {channel}: {reason}")
        }
    }
}
