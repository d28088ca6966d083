//! In-memory fakes for the runtime seams.

use crate::notification::NotificationSource;
use crate::ringtone::{ToneHandle, TonePlayer};
use crate::signaling::{SignalingError, SignalingSink};
use crate::token::{TokenError, TokenProvider};
use async_trait::async_trait;
use callwait_core::net::{
    HttpClient, HttpRequest, HttpResponse, Transport, TransportEvent, TransportFactory,
};
use callwait_core::notification::NotificationResponse;
use callwait_core::protocol::OutboundEvent;
use callwait_core::types::{ChannelId, RtcToken};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, mpsc};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Records every frame written to it. Writes fail once closed.
#[derive(Default)]
pub struct MockTransport {
    sent: Mutex<Vec<String>>,
    closed: AtomicBool,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_text(&self, text: &str) -> Result<(), anyhow::Error> {
        if self.closed.load(Ordering::Relaxed) {
            anyhow::bail!("mock transport closed");
        }
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn disconnect(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }
}

/// The server side of one dialed connection.
pub struct MockConnection {
    pub url: String,
    events: mpsc::Sender<TransportEvent>,
    transport: Arc<MockTransport>,
}

impl MockConnection {
    /// Delivers a text frame as if the server had sent it.
    pub async fn push_text(&self, text: &str) {
        let _ = self
            .events
            .send(TransportEvent::TextReceived(text.to_string()))
            .await;
    }

    /// Drops the connection from the server side.
    pub async fn close(&self) {
        self.transport.closed.store(true, Ordering::Relaxed);
        let _ = self.events.send(TransportEvent::Disconnected).await;
    }

    pub fn sent(&self) -> Vec<String> {
        self.transport.sent.lock().unwrap().clone()
    }
}

/// Hands every successful dial to the test through [`Self::next_connection`].
pub struct MockTransportFactory {
    connections_tx: mpsc::UnboundedSender<MockConnection>,
    connections_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<MockConnection>>,
    failures_left: AtomicUsize,
    dials: AtomicUsize,
}

impl MockTransportFactory {
    pub fn new() -> Self {
        let (connections_tx, connections_rx) = mpsc::unbounded_channel();
        Self {
            connections_tx,
            connections_rx: tokio::sync::Mutex::new(connections_rx),
            failures_left: AtomicUsize::new(0),
            dials: AtomicUsize::new(0),
        }
    }

    /// Makes the next `n` dials fail.
    pub fn fail_next_dials(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    pub fn dial_attempts(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    pub async fn next_connection(&self) -> MockConnection {
        let mut rx = self.connections_rx.lock().await;
        tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
            .await
            .expect("no connection dialed in time")
            .expect("factory dropped")
    }
}

impl Default for MockTransportFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransportFactory for MockTransportFactory {
    async fn create_transport(
        &self,
        url: &str,
    ) -> Result<(Arc<dyn Transport>, mpsc::Receiver<TransportEvent>), anyhow::Error> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            anyhow::bail!("mock dial refused");
        }

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let _ = events_tx.send(TransportEvent::Connected).await;
        let transport = Arc::new(MockTransport::default());
        let _ = self.connections_tx.send(MockConnection {
            url: url.to_string(),
            events: events_tx,
            transport: transport.clone(),
        });
        Ok((transport, events_rx))
    }
}

/// Answers every request with a fixed response and records the URLs.
pub struct MockHttpClient {
    status_code: u16,
    body: Vec<u8>,
    requests: Mutex<Vec<String>>,
}

impl MockHttpClient {
    pub fn with_body(status_code: u16, body: &str) -> Self {
        Self {
            status_code,
            body: body.as_bytes().to_vec(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requested_urls(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, anyhow::Error> {
        self.requests.lock().unwrap().push(request.url);
        Ok(HttpResponse {
            status_code: self.status_code,
            body: self.body.clone(),
        })
    }
}

#[derive(Default)]
struct ToneCounters {
    plays: AtomicUsize,
    stops: AtomicUsize,
}

/// Counts play and stop calls, optionally failing either.
#[derive(Default)]
pub struct MockTonePlayer {
    counters: Arc<ToneCounters>,
    fail_play: bool,
    fail_stop: bool,
}

impl MockTonePlayer {
    pub fn failing() -> Self {
        Self {
            fail_play: true,
            ..Default::default()
        }
    }

    pub fn failing_stop() -> Self {
        Self {
            fail_stop: true,
            ..Default::default()
        }
    }

    pub fn plays(&self) -> usize {
        self.counters.plays.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.counters.stops.load(Ordering::SeqCst)
    }
}

struct MockToneHandle {
    counters: Arc<ToneCounters>,
    fail_stop: bool,
}

#[async_trait]
impl TonePlayer for MockTonePlayer {
    async fn play_looping(&self) -> anyhow::Result<Box<dyn ToneHandle>> {
        self.counters.plays.fetch_add(1, Ordering::SeqCst);
        if self.fail_play {
            anyhow::bail!("no audio device");
        }
        Ok(Box::new(MockToneHandle {
            counters: self.counters.clone(),
            fail_stop: self.fail_stop,
        }))
    }
}

#[async_trait]
impl ToneHandle for MockToneHandle {
    async fn stop(&mut self) -> anyhow::Result<()> {
        self.counters.stops.fetch_add(1, Ordering::SeqCst);
        if self.fail_stop {
            anyhow::bail!("sound already unloaded");
        }
        Ok(())
    }
}

/// Records emitted events instead of sending them.
#[derive(Default)]
pub struct MockSignalingSink {
    sent: Mutex<Vec<OutboundEvent>>,
}

impl MockSignalingSink {
    pub fn sent(&self) -> Vec<OutboundEvent> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl SignalingSink for MockSignalingSink {
    async fn emit(&self, event: OutboundEvent) -> Result<(), SignalingError> {
        self.sent.lock().unwrap().push(event);
        Ok(())
    }
}

/// How [`MockTokenProvider`] answers one request.
#[derive(Debug, Clone)]
pub enum TokenBehavior {
    Succeed(String),
    Fail,
    /// Never answers.
    Hang,
    /// Answers with a token once [`MockTokenProvider::release`] is called.
    Gated,
}

/// Plays scripted behaviors in order, then succeeds with `token-<uid>`.
#[derive(Default)]
pub struct MockTokenProvider {
    script: Mutex<VecDeque<TokenBehavior>>,
    requests: Mutex<Vec<(ChannelId, u32)>>,
    gate: Notify,
}

impl MockTokenProvider {
    pub fn scripted(script: impl IntoIterator<Item = TokenBehavior>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            ..Default::default()
        }
    }

    pub fn requests(&self) -> Vec<(ChannelId, u32)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn release(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl TokenProvider for MockTokenProvider {
    async fn fetch_token(&self, channel: &ChannelId, uid: u32) -> Result<RtcToken, TokenError> {
        self.requests.lock().unwrap().push((channel.clone(), uid));
        let behavior = self.script.lock().unwrap().pop_front();
        match behavior {
            None => Ok(RtcToken::new(format!("token-{uid}"))),
            Some(TokenBehavior::Succeed(token)) => Ok(RtcToken::new(token)),
            Some(TokenBehavior::Fail) => Err(TokenError::Status(503)),
            Some(TokenBehavior::Hang) => std::future::pending().await,
            Some(TokenBehavior::Gated) => {
                self.gate.notified().await;
                Ok(RtcToken::new(format!("token-{uid}")))
            }
        }
    }
}

/// Returns a fixed launch notification and counts queries.
pub struct MockNotificationSource {
    response: Option<NotificationResponse>,
    fail: bool,
    queries: AtomicUsize,
}

impl MockNotificationSource {
    pub fn new(response: Option<NotificationResponse>) -> Self {
        Self {
            response,
            fail: false,
            queries: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(None)
        }
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationSource for MockNotificationSource {
    async fn last_response(&self) -> anyhow::Result<Option<NotificationResponse>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("notification store unavailable");
        }
        Ok(self.response.clone())
    }
}
