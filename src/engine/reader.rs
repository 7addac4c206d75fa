//! The polling read loop
//!
//! One session spans the life of a start/stop pair. Within it, the loop keeps
//! the realtime file open, reads at a monotonically increasing offset, and
//! turns every non-empty payload into stroke events. The writer has no
//! explicit end-of-stream signal: a zero-length read means "caught up to the
//! live tail", and the offset only ever rewinds through an explicit reset
//! when the session starts over on a new file.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};

use super::{EngineConfig, EngineEvent, EngineState};
use crate::protocol::{Packet, SequenceCounter};
use crate::transport::{Transport, TransportError, WriterError};

/// Per-session read position. Reset, not destroyed, whenever the file
/// boundary moves under us: reconnect, no realtime file yet, or a closed
/// file fully drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadState {
    /// True once a read has returned zero bytes, i.e. we are tailing the
    /// live write position
    pub is_realtime: bool,
    /// True once the realtime file has been opened this session
    pub file_is_open: bool,
    /// Next file offset to read from
    pub offset: u32,
}

impl ReadState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// One iteration of the read loop: open the file if needed, then read at the
/// current offset and emit the decoded strokes.
pub(crate) async fn step(
    transport: &mut dyn Transport,
    config: &EngineConfig,
    sequence: &SequenceCounter,
    state: &mut ReadState,
    events: &mpsc::Sender<EngineEvent>,
) -> Result<(), TransportError> {
    if !state.file_is_open {
        let open = Packet::open_request(sequence, &config.file_name, config.disk_id);
        transport.send_receive(&open).await?;
        state.file_is_open = true;
    }

    let read = Packet::read_request(sequence, state.offset, config.read_size);
    let response = transport.send_receive(&read).await?;

    if response.data_length > 0 {
        // The wire offset is a u32; a session that would run past it starts
        // over rather than rewinding onto already-consumed bytes.
        state.offset = match state.offset.checked_add(response.data_length) {
            Some(next) => next,
            None => {
                state.reset();
                return Ok(());
            }
        };
        for stroke in response.strokes()? {
            if !stroke.is_empty() {
                let _ = events.send(EngineEvent::Stroke { keys: stroke.keys }).await;
            }
        }
    } else if !state.is_realtime {
        // First empty read: caught up to the live write position.
        state.is_realtime = true;
    }

    Ok(())
}

/// Run one engine session to completion.
///
/// Never exits on its own once connected; only a stop signal ends it. The
/// stop is cooperative, checked at the top of every iteration and inside the
/// reconnect wait.
pub(crate) async fn run_session(
    mut transport: Box<dyn Transport>,
    config: EngineConfig,
    sequence: Arc<SequenceCounter>,
    events: mpsc::Sender<EngineEvent>,
    mut shutdown: mpsc::Receiver<()>,
    state_handle: Arc<RwLock<EngineState>>,
) {
    set_state(&state_handle, EngineState::Connecting).await;
    let _ = events.send(EngineEvent::Initializing).await;

    if let Err(e) = transport.connect().await {
        tracing::error!("Writer is not connected: {}", e);
        let _ = events
            .send(EngineEvent::Error {
                message: format!("Writer is not connected: {}", e),
            })
            .await;
        transport.disconnect().await;
        set_state(&state_handle, EngineState::Disconnected).await;
        // The session task ends here; the consumer still gets the terminal
        // lifecycle event rather than a channel that never closes.
        let _ = events.send(EngineEvent::Stopped).await;
        return;
    }

    set_state(&state_handle, EngineState::FileClosed).await;
    let _ = events.send(EngineEvent::Ready).await;

    let mut state = ReadState::new();
    // Tracks whether the writer *just* disconnected or has been gone for a
    // while, so the outage is reported once rather than every iteration.
    let mut disconnected = false;

    'session: while !stop_requested(&mut shutdown) {
        match step(transport.as_mut(), &config, &sequence, &mut state, &events).await {
            Ok(()) => {
                if disconnected {
                    tracing::warn!("Writer reconnected");
                    let _ = events.send(EngineEvent::Reconnected).await;
                    disconnected = false;
                }
                set_state(&state_handle, EngineState::Streaming).await;

                if state.is_realtime {
                    // Pace the tail instead of hot-polling it.
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_millis(config.realtime_poll_ms)) => {}
                        _ = shutdown.recv() => break 'session,
                    }
                }
            }
            Err(TransportError::Writer(WriterError::NoRealtimeFile)) => {
                // User hasn't started writing; keep opening the realtime file.
                state.reset();
                set_state(&state_handle, EngineState::FileClosed).await;
            }
            Err(TransportError::Writer(WriterError::FinishedReadingClosedFile)) => {
                // File closed and drained; next iteration reopens realtime.
                state.reset();
                set_state(&state_handle, EngineState::FileClosed).await;
            }
            Err(TransportError::Writer(e)) => {
                // No local reset resolves these without user action; surface
                // them instead of absorbing them silently.
                tracing::error!("Writer error: {}", e);
                let _ = events
                    .send(EngineEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
                state.reset();
                set_state(&state_handle, EngineState::FileClosed).await;
            }
            Err(e) => {
                if !disconnected {
                    tracing::warn!("Writer disconnected, attempting to reconnect");
                    let _ = events
                        .send(EngineEvent::Disconnected {
                            reason: e.to_string(),
                        })
                        .await;
                    disconnected = true;
                }
                tracing::debug!("Writer exception: {}", e);

                // The user could start a new file while disconnected, so the
                // next session begins from scratch.
                state.reset();
                set_state(&state_handle, EngineState::Connecting).await;

                loop {
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_millis(config.reconnect_interval_ms)) => {}
                        _ = shutdown.recv() => break 'session,
                    }
                    match transport.connect().await {
                        Ok(()) => {
                            set_state(&state_handle, EngineState::FileClosed).await;
                            break;
                        }
                        Err(e) => tracing::debug!("Reconnect failed: {}", e),
                    }
                }
            }
        }
    }

    transport.disconnect().await;
    set_state(&state_handle, EngineState::Stopped).await;
    let _ = events.send(EngineEvent::Stopped).await;
    tracing::info!("Engine stopped");
}

async fn set_state(handle: &Arc<RwLock<EngineState>>, state: EngineState) {
    *handle.write().await = state;
}

fn stop_requested(shutdown: &mut mpsc::Receiver<()>) -> bool {
    !matches!(
        shutdown.try_recv(),
        Err(mpsc::error::TryRecvError::Empty)
    )
}
