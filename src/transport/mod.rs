//! Transport module - Physical links to the writer
//!
//! Exposes the capability the read loop is written against: connect,
//! disconnect, and one blocking request/response exchange. Concrete links
//! (Wi-Fi today, USB variants behind the same seam) live in submodules.

mod wifi;

pub use wifi::*;

use async_trait::async_trait;
use thiserror::Error;

use crate::protocol::{CodecError, Packet, PacketType};

/// Semantic error codes carried in an ERROR packet's p1
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterError {
    #[error("Writer is unable to perform the request")]
    UnableToPerform,

    #[error("Writer cannot read from the current file")]
    FileNotAvailable,

    #[error("No realtime file; the user has not started writing")]
    NoRealtimeFile,

    #[error("Finished reading a file the writer has closed")]
    FinishedReadingClosedFile,

    #[error("Unknown writer error code: {0}")]
    Unknown(u32),
}

impl WriterError {
    pub fn from_code(code: u32) -> Self {
        match code {
            3 => WriterError::UnableToPerform,
            7 => WriterError::FileNotAvailable,
            8 => WriterError::NoRealtimeFile,
            9 => WriterError::FinishedReadingClosedFile,
            other => WriterError::Unknown(other),
        }
    }
}

/// Transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Framing error: {0}")]
    Codec(#[from] CodecError),

    #[error("Writer not found")]
    DeviceNotFound,

    #[error("Not connected")]
    NotConnected,

    #[error("Exchange timed out")]
    Timeout,

    #[error("No response from writer")]
    NoResponse,

    #[error("Protocol violation: response does not match request")]
    ProtocolViolation,

    #[error(transparent)]
    Writer(WriterError),
}

pub type TransportResult<T> = Result<T, TransportError>;

impl TransportError {
    /// Whether this outcome means the link itself is unusable, as opposed to
    /// a semantic reply from a healthy writer.
    pub fn is_link_failure(&self) -> bool {
        !matches!(self, TransportError::Writer(_))
    }
}

/// Capability surface for a physical link to the writer.
///
/// Not reentrant: exactly one exchange may be in flight at a time.
#[async_trait]
pub trait Transport: Send {
    /// Connect to the writer. May block for the discovery and handshake
    /// duration, bounded by a transport-chosen timeout.
    async fn connect(&mut self) -> TransportResult<()>;

    /// Release the link. Idempotent.
    async fn disconnect(&mut self);

    /// Write one request and block for its response.
    async fn send_receive(&mut self, request: &Packet) -> TransportResult<Packet>;
}

/// Validate a response against its request and surface writer error replies.
///
/// A usable response carries the request's sequence number and either the
/// request's packet type or the ERROR type. Stale or foreign responses are a
/// protocol violation, which callers treat like a dead exchange.
pub fn classify_response(request: &Packet, response: Packet) -> TransportResult<Packet> {
    if response.sequence_number != request.sequence_number {
        return Err(TransportError::ProtocolViolation);
    }
    if response.packet_type == PacketType::Error {
        return Err(TransportError::Writer(WriterError::from_code(response.p1)));
    }
    if response.packet_type != request.packet_type {
        return Err(TransportError::ProtocolViolation);
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{SequenceCounter, MAX_READ};

    fn error_response(sequence_number: u32, code: u32) -> Packet {
        Packet {
            sequence_number,
            packet_type: PacketType::Error,
            data_length: 0,
            p1: code,
            p2: 0,
            p3: 0,
            p4: 0,
            p5: 0,
            payload: Vec::new(),
        }
    }

    #[test]
    fn test_classify_accepts_matching_response() {
        let counter = SequenceCounter::new();
        let request = Packet::read_request(&counter, 0, MAX_READ);
        let mut response = request.clone();
        response.payload = vec![0u8; 8];
        response.data_length = 8;
        assert!(classify_response(&request, response).is_ok());
    }

    #[test]
    fn test_classify_rejects_stale_sequence() {
        let counter = SequenceCounter::new();
        let request = Packet::read_request(&counter, 0, MAX_READ);
        let mut response = request.clone();
        response.sequence_number = request.sequence_number.wrapping_add(7);
        assert!(matches!(
            classify_response(&request, response),
            Err(TransportError::ProtocolViolation)
        ));
    }

    #[test]
    fn test_classify_rejects_foreign_type() {
        let counter = SequenceCounter::new();
        let request = Packet::read_request(&counter, 0, MAX_READ);
        let mut response = Packet::open_realtime_request(&counter);
        response.sequence_number = request.sequence_number;
        assert!(matches!(
            classify_response(&request, response),
            Err(TransportError::ProtocolViolation)
        ));
    }

    #[test]
    fn test_classify_maps_writer_error_codes() {
        let counter = SequenceCounter::new();
        let request = Packet::read_request(&counter, 0, MAX_READ);

        for (code, expected) in [
            (3, WriterError::UnableToPerform),
            (7, WriterError::FileNotAvailable),
            (8, WriterError::NoRealtimeFile),
            (9, WriterError::FinishedReadingClosedFile),
            (42, WriterError::Unknown(42)),
        ] {
            let result =
                classify_response(&request, error_response(request.sequence_number, code));
            assert!(matches!(result, Err(TransportError::Writer(e)) if e == expected));
        }
    }

    #[test]
    fn test_writer_errors_are_not_link_failures() {
        assert!(!TransportError::Writer(WriterError::NoRealtimeFile).is_link_failure());
        assert!(TransportError::Timeout.is_link_failure());
        assert!(TransportError::ProtocolViolation.is_link_failure());
    }
}
