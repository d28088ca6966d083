//! Signaling client for the rendezvous server.
//!
//! One long-lived Engine.IO WebSocket carries Socket.IO events both ways.
//! After the Socket.IO connect acknowledgement the client announces
//! itself with `register`, exactly once per connection. Inbound call
//! events are validated and forwarded on an mpsc channel; anything that
//! fails validation is logged and dropped.

mod backoff;
mod error;

pub use backoff::Backoff;
pub use error::SignalingError;

use crate::config::CallConfig;
use async_trait::async_trait;
use callwait_core::net::{Transport, TransportEvent, TransportFactory};
use callwait_core::protocol::{EnginePacket, InboundEvent, OutboundEvent, SocketPacket};
use callwait_core::types::{ChannelId, PeerId};
use log::{debug, error, info, trace, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify, mpsc};
use tokio::time::{Instant, sleep};

const INBOUND_CHANNEL_CAPACITY: usize = 100;

/// Per-connection bookkeeping of the read loop.
#[derive(Debug, Default)]
struct LinkState {
    registered: bool,
    /// Longest tolerated server silence, known once the handshake arrives.
    heartbeat: Option<Duration>,
}

/// Outbound half of the signaling channel, as seen by the call machine.
///
/// Sends are best-effort: there is no acknowledgement contract.
#[async_trait]
pub trait SignalingSink: Send + Sync {
    async fn emit(&self, event: OutboundEvent) -> Result<(), SignalingError>;
}

pub struct SignalingClient {
    config: CallConfig,
    transport_factory: Arc<dyn TransportFactory>,
    transport: Mutex<Option<Arc<dyn Transport>>>,
    inbound_tx: mpsc::Sender<InboundEvent>,

    is_connecting: AtomicBool,
    /// Set once the Socket.IO connect acknowledgement arrives.
    is_connected: AtomicBool,
    is_running: AtomicBool,
    shutdown_notifier: Notify,
}

impl SignalingClient {
    /// Creates the client and the receiver for validated inbound events.
    pub fn new(
        config: CallConfig,
        transport_factory: Arc<dyn TransportFactory>,
    ) -> (Arc<Self>, mpsc::Receiver<InboundEvent>) {
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
        let client = Arc::new(Self {
            config,
            transport_factory,
            transport: Mutex::new(None),
            inbound_tx,
            is_connecting: AtomicBool::new(false),
            is_connected: AtomicBool::new(false),
            is_running: AtomicBool::new(false),
            shutdown_notifier: Notify::new(),
        });
        (client, inbound_rx)
    }

    pub fn user_id(&self) -> &PeerId {
        &self.config.user_id
    }

    pub fn is_connected(&self) -> bool {
        self.is_connected.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }

    /// Connects and reconnects until [`Self::disconnect`] is called or a
    /// connection drops with reconnection disabled.
    pub async fn run(self: &Arc<Self>) {
        if self.is_running.swap(true, Ordering::SeqCst) {
            warn!(target: "Call/Signaling", "`run` called while already running.");
            return;
        }

        let mut backoff = Backoff::new(self.config.reconnect.clone());
        while self.is_running.load(Ordering::Relaxed) {
            match self.connect().await {
                Ok(events) => {
                    if self.read_loop(events).await {
                        backoff.reset();
                    }
                    self.cleanup_connection().await;
                }
                Err(e) => error!(target: "Call/Signaling", "Failed to connect: {e}"),
            }

            if !self.is_running.load(Ordering::Relaxed) {
                break;
            }
            if !self.config.reconnect.enabled {
                info!(target: "Call/Signaling", "Reconnect disabled, shutting down.");
                break;
            }

            let delay = backoff.next_delay();
            info!(
                target: "Call/Signaling",
                "Will attempt to reconnect in {:?} (attempt {})",
                delay,
                backoff.attempts()
            );
            tokio::select! {
                _ = sleep(delay) => {}
                _ = self.shutdown_notifier.notified() => break,
            }
        }

        self.is_running.store(false, Ordering::Relaxed);
        info!(target: "Call/Signaling", "Signaling run loop has shut down.");
    }

    /// Dials the server. The returned receiver must be driven by
    /// [`Self::run`]; callers normally use that instead.
    pub async fn connect(&self) -> Result<mpsc::Receiver<TransportEvent>, SignalingError> {
        if self.is_connecting.swap(true, Ordering::SeqCst) {
            return Err(SignalingError::AlreadyConnected);
        }
        let _guard = scopeguard::guard((), |_| {
            self.is_connecting.store(false, Ordering::Relaxed);
        });

        if self.transport.lock().await.is_some() {
            return Err(SignalingError::AlreadyConnected);
        }

        let url = self.config.socket_url();
        let (transport, events) = self.transport_factory.create_transport(&url).await?;
        *self.transport.lock().await = Some(transport);
        info!(target: "Call/Signaling", "Transport established to {url}");
        Ok(events)
    }

    /// Stops the run loop and closes the current connection.
    pub async fn disconnect(&self) {
        self.is_running.store(false, Ordering::Relaxed);
        self.shutdown_notifier.notify_one();
        self.cleanup_connection().await;
    }

    async fn cleanup_connection(&self) {
        self.is_connected.store(false, Ordering::Relaxed);
        if let Some(transport) = self.transport.lock().await.take() {
            transport.disconnect().await;
        }
    }

    /// Processes transport events until the connection ends. Returns
    /// whether the Socket.IO session was established at some point.
    ///
    /// Once the handshake is in, the server must send something (at
    /// least a ping) every `pingInterval + pingTimeout`, otherwise the
    /// connection is presumed dead.
    async fn read_loop(&self, mut events: mpsc::Receiver<TransportEvent>) -> bool {
        let mut link = LinkState::default();
        let silence = sleep(Duration::ZERO);
        tokio::pin!(silence);
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(TransportEvent::Connected) => {
                        debug!(target: "Call/Signaling", "Transport connected, awaiting open");
                    }
                    Some(TransportEvent::TextReceived(text)) => {
                        if !self.handle_frame(&text, &mut link).await {
                            return link.registered;
                        }
                        if let Some(limit) = link.heartbeat {
                            silence.as_mut().reset(Instant::now() + limit);
                        }
                    }
                    Some(TransportEvent::Disconnected) | None => {
                        info!(target: "Call/Signaling", "Connection lost");
                        return link.registered;
                    }
                },
                _ = &mut silence, if link.heartbeat.is_some() => {
                    warn!(
                        target: "Call/Signaling",
                        "Server silent for {:?}, dropping connection",
                        link.heartbeat.unwrap_or_default()
                    );
                    return link.registered;
                }
                _ = self.shutdown_notifier.notified() => {
                    debug!(target: "Call/Signaling", "Shutdown signaled, leaving read loop");
                    return link.registered;
                }
            }
        }
    }

    /// Returns `false` when the server ended the session.
    async fn handle_frame(&self, text: &str, link: &mut LinkState) -> bool {
        let packet = match EnginePacket::decode(text) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(target: "Call/Signaling", "Dropping undecodable frame: {e}");
                return true;
            }
        };

        match packet {
            EnginePacket::Open(handshake) => {
                debug!(
                    target: "Call/Signaling",
                    "Engine.IO open (sid {}, ping every {}ms)",
                    handshake.sid,
                    handshake.ping_interval
                );
                link.heartbeat = Some(Duration::from_millis(
                    handshake.ping_interval + handshake.ping_timeout,
                ));
                self.send_packet(&EnginePacket::Message(SocketPacket::Connect(None)))
                    .await;
            }
            EnginePacket::Ping => {
                trace!(target: "Call/Signaling", "Ping");
                self.send_packet(&EnginePacket::Pong).await;
            }
            EnginePacket::Close => {
                info!(target: "Call/Signaling", "Server closed the connection");
                return false;
            }
            EnginePacket::Message(SocketPacket::Connect(_)) => {
                self.is_connected.store(true, Ordering::Relaxed);
                if !link.registered {
                    link.registered = true;
                    let register = OutboundEvent::register(self.config.user_id.clone());
                    match self.emit(register).await {
                        Ok(()) => info!(target: "Call/Signaling", "Registered to signaling server"),
                        Err(e) => warn!(target: "Call/Signaling", "Failed to register: {e}"),
                    }
                }
            }
            EnginePacket::Message(SocketPacket::Disconnect) => {
                info!(target: "Call/Signaling", "Server disconnected the socket");
                return false;
            }
            EnginePacket::Message(SocketPacket::ConnectError(err)) => {
                warn!(target: "Call/Signaling", "Connect refused by server: {err}");
            }
            EnginePacket::Message(packet @ SocketPacket::Event { .. }) => {
                match InboundEvent::from_packet(&packet) {
                    Ok(Some(event)) => {
                        debug!(target: "Call/Signaling", "<-- {}", event.name());
                        if self.inbound_tx.send(event).await.is_err() {
                            warn!(target: "Call/Signaling", "Inbound receiver dropped");
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!(target: "Call/Signaling", "Dropping event: {e}"),
                }
            }
            EnginePacket::Message(SocketPacket::Ack { id, .. }) => {
                trace!(target: "Call/Signaling", "Ignoring ack {id}");
            }
            EnginePacket::Pong | EnginePacket::Upgrade | EnginePacket::Noop => {}
        }
        true
    }

    async fn send_packet(&self, packet: &EnginePacket) {
        let result = match packet.encode() {
            Ok(text) => self.send_text(&text).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            warn!(target: "Call/Signaling", "Failed to send packet: {e}");
        }
    }

    async fn send_text(&self, text: &str) -> Result<(), SignalingError> {
        let transport = self
            .transport
            .lock()
            .await
            .clone()
            .ok_or(SignalingError::NotConnected)?;
        transport.send_text(text).await?;
        Ok(())
    }

    pub async fn emit(&self, event: OutboundEvent) -> Result<(), SignalingError> {
        if !self.is_connected() {
            return Err(SignalingError::NotConnected);
        }
        let text = event.encode()?;
        self.send_text(&text).await?;
        debug!(target: "Call/Signaling", "--> {}", event.name());
        Ok(())
    }

    pub async fn accept_call(
        &self,
        to: &PeerId,
        channel: &ChannelId,
        local_uid: u32,
    ) -> Result<(), SignalingError> {
        self.emit(OutboundEvent::accept_call(
            to.clone(),
            self.config.user_id.clone(),
            channel.clone(),
            local_uid,
        ))
        .await
    }

    pub async fn reject_call(&self, to: &PeerId) -> Result<(), SignalingError> {
        self.emit(OutboundEvent::reject_call(
            to.clone(),
            self.config.user_id.clone(),
        ))
        .await
    }

    pub async fn end_call(&self, to: &PeerId) -> Result<(), SignalingError> {
        self.emit(OutboundEvent::end_call(to.clone(), self.config.user_id.clone()))
            .await
    }

    pub async fn register_push_token(
        &self,
        user_id: &PeerId,
        push_token: &str,
    ) -> Result<(), SignalingError> {
        self.emit(OutboundEvent::register_push(user_id.clone(), push_token))
            .await
    }
}

#[async_trait]
impl SignalingSink for SignalingClient {
    async fn emit(&self, event: OutboundEvent) -> Result<(), SignalingError> {
        SignalingClient::emit(self, event).await
    }
}
