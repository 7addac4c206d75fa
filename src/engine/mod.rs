//! Engine module - The polling read state machine
//!
//! Owns the session with the writer: opens the realtime file, tails it at an
//! increasing offset, decodes strokes, and reconnects with backoff when the
//! link drops. Runs as a single background task per engine; consumers observe
//! it through an event channel.

mod reader;

pub use reader::*;

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

use crate::protocol::{SequenceCounter, MAX_READ, REALTIME_FILE};
use crate::transport::Transport;

/// Engine errors
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Engine already started")]
    AlreadyStarted,

    #[error("Engine not started")]
    NotStarted,
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// File to open on the writer
    pub file_name: String,
    /// Disk hosting the file; `None` lets the writer pick its default drive
    pub disk_id: Option<char>,
    /// Bytes requested per read, capped at MAX_READ
    pub read_size: u32,
    /// Delay between reconnect attempts
    pub reconnect_interval_ms: u64,
    /// Pacing between reads once caught up to the live tail
    pub realtime_poll_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            file_name: REALTIME_FILE.to_string(),
            disk_id: Some(crate::protocol::DEFAULT_DISK),
            read_size: MAX_READ,
            reconnect_interval_ms: 250,
            realtime_poll_ms: 100,
        }
    }
}

/// Events emitted by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Connecting to the writer
    Initializing,
    /// Connected and polling
    Ready,
    /// One decoded, non-empty stroke, keys in chart order
    Stroke { keys: Vec<&'static str> },
    /// Link to the writer was lost; emitted once per outage
    Disconnected { reason: String },
    /// Link recovered after an outage; emitted once
    Reconnected,
    /// Operational error the driver cannot resolve on its own
    Error { message: String },
    /// Engine has shut down
    Stopped,
}

/// Engine state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Disconnected,
    Connecting,
    /// Connected, realtime file not yet open
    FileClosed,
    /// Connected and reading the realtime file
    Streaming,
    Stopped,
}

/// Driver engine for one writer
pub struct Engine {
    /// Engine configuration
    config: EngineConfig,
    /// Current state
    state: Arc<RwLock<EngineState>>,
    /// Outbound sequence numbers, shared across sessions of this engine
    sequence: Arc<SequenceCounter>,
    /// Event sender
    event_tx: mpsc::Sender<EngineEvent>,
    /// Event receiver (for consumers)
    event_rx: Option<mpsc::Receiver<EngineEvent>>,
    /// Shutdown signal
    shutdown_tx: Option<mpsc::Sender<()>>,
    /// The running session task
    task: Option<JoinHandle<()>>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);

        Self {
            config,
            state: Arc::new(RwLock::new(EngineState::Disconnected)),
            sequence: Arc::new(SequenceCounter::new()),
            event_tx,
            event_rx: Some(event_rx),
            shutdown_tx: None,
            task: None,
        }
    }

    /// Take the event receiver (can only be called once)
    pub fn take_event_receiver(&mut self) -> Option<mpsc::Receiver<EngineEvent>> {
        self.event_rx.take()
    }

    /// Start polling the writer on a background task.
    ///
    /// The engine takes ownership of the transport and releases it when
    /// stopped. Connection failures after a successful start are absorbed by
    /// the reconnect loop; only the initial connect failing leaves the engine
    /// disconnected.
    pub fn start(&mut self, transport: Box<dyn Transport>) -> EngineResult<()> {
        if self.task.is_some() {
            return Err(EngineError::AlreadyStarted);
        }

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        self.shutdown_tx = Some(shutdown_tx);

        self.task = Some(tokio::spawn(run_session(
            transport,
            self.config.clone(),
            self.sequence.clone(),
            self.event_tx.clone(),
            shutdown_rx,
            self.state.clone(),
        )));

        Ok(())
    }

    /// Request a cooperative stop and wait for the session task to finish.
    ///
    /// The in-flight exchange is allowed to complete or time out; the
    /// transport's own timeout bounds stop latency.
    pub async fn stop(&mut self) -> EngineResult<()> {
        let task = self.task.take().ok_or(EngineError::NotStarted)?;

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        let _ = task.await;

        Ok(())
    }

    /// Get the current state
    pub async fn state(&self) -> EngineState {
        *self.state.read().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_engine_starts_disconnected() {
        let engine = Engine::new(EngineConfig::default());
        assert_eq!(engine.state().await, EngineState::Disconnected);
    }

    #[tokio::test]
    async fn test_stop_without_start() {
        let mut engine = Engine::new(EngineConfig::default());
        assert!(matches!(engine.stop().await, Err(EngineError::NotStarted)));
    }
}
