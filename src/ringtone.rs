//! Ringtone ownership.
//!
//! [`RingtoneController`] holds at most one playing tone. Start and stop
//! are idempotent and never fail: a broken speaker must not block call
//! handling, so player errors are logged and dropped here.

use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Platform audio backend.
#[async_trait]
pub trait TonePlayer: Send + Sync {
    /// Loads the ringtone and starts playing it in a loop.
    async fn play_looping(&self) -> anyhow::Result<Box<dyn ToneHandle>>;
}

/// A playing tone.
#[async_trait]
pub trait ToneHandle: Send {
    /// Halts playback and releases the underlying sound.
    async fn stop(&mut self) -> anyhow::Result<()>;
}

pub struct RingtoneController {
    player: Arc<dyn TonePlayer>,
    handle: Option<Box<dyn ToneHandle>>,
}

impl RingtoneController {
    pub fn new(player: Arc<dyn TonePlayer>) -> Self {
        Self {
            player,
            handle: None,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.handle.is_some()
    }

    pub async fn start(&mut self) {
        if self.handle.is_some() {
            debug!(target: "Call/Ringtone", "Ringtone already playing");
            return;
        }
        match self.player.play_looping().await {
            Ok(handle) => {
                debug!(target: "Call/Ringtone", "Ringtone started");
                self.handle = Some(handle);
            }
            Err(e) => warn!(target: "Call/Ringtone", "Failed to start ringtone: {e}"),
        }
    }

    pub async fn stop(&mut self) {
        let Some(mut handle) = self.handle.take() else {
            return;
        };
        match handle.stop().await {
            Ok(()) => debug!(target: "Call/Ringtone", "Ringtone stopped"),
            Err(e) => warn!(target: "Call/Ringtone", "Failed to stop ringtone: {e}"),
        }
    }
}

/// Stand-in player for hosts without audio: logs a ring line periodically.
#[derive(Debug, Clone)]
pub struct LoggingTonePlayer {
    interval: Duration,
}

impl LoggingTonePlayer {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Default for LoggingTonePlayer {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

struct LoggingToneHandle {
    task: JoinHandle<()>,
}

#[async_trait]
impl TonePlayer for LoggingTonePlayer {
    async fn play_looping(&self) -> anyhow::Result<Box<dyn ToneHandle>> {
        let interval = self.interval;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                info!(target: "Call/Ringtone", "*ring ring*");
            }
        });
        Ok(Box::new(LoggingToneHandle { task }))
    }
}

#[async_trait]
impl ToneHandle for LoggingToneHandle {
    async fn stop(&mut self) -> anyhow::Result<()> {
        self.task.abort();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTonePlayer;

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let player = Arc::new(MockTonePlayer::default());
        let mut ringtone = RingtoneController::new(player.clone());

        ringtone.start().await;
        ringtone.start().await;

        assert!(ringtone.is_playing());
        assert_eq!(player.plays(), 1);
    }

    #[tokio::test]
    async fn test_stop_without_handle_is_noop() {
        let player = Arc::new(MockTonePlayer::default());
        let mut ringtone = RingtoneController::new(player.clone());

        ringtone.stop().await;
        ringtone.start().await;
        ringtone.stop().await;
        ringtone.stop().await;

        assert!(!ringtone.is_playing());
        assert_eq!(player.stops(), 1);
    }

    #[tokio::test]
    async fn test_player_failures_are_swallowed() {
        let player = Arc::new(MockTonePlayer::failing());
        let mut ringtone = RingtoneController::new(player.clone());

        ringtone.start().await;
        assert!(!ringtone.is_playing());

        // A later start retries the player.
        ringtone.start().await;
        assert_eq!(player.plays(), 2);
    }

    #[tokio::test]
    async fn test_failing_stop_still_clears_handle() {
        let player = Arc::new(MockTonePlayer::failing_stop());
        let mut ringtone = RingtoneController::new(player.clone());

        ringtone.start().await;
        ringtone.stop().await;
        assert!(!ringtone.is_playing());

        ringtone.start().await;
        assert_eq!(player.plays(), 2);
    }

    #[tokio::test]
    async fn test_logging_player_stops_its_task() {
        let player = LoggingTonePlayer::new(Duration::from_millis(5));
        let mut handle = player.play_looping().await.unwrap();
        handle.stop().await.unwrap();
    }
}
