//! Packet definitions
//!
//! Defines the packet types exchanged with the writer and the request
//! constructors the read loop needs.

use super::codec::{CodecError, CodecResult, SequenceCounter};
use super::stroke::Stroke;
use super::{DEFAULT_DISK, MAX_READ, REALTIME_FILE};

/// Packet type identifiers used by the writer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum PacketType {
    /// Writer-side error reply; p1 carries the error code
    Error = 0x0006,
    /// Open a file on the writer; p1 is the disk id, payload is the file name
    OpenFile = 0x0011,
    /// Read from the open file; p1 is the offset, p2 the byte count
    ReadFile = 0x0013,
}

impl PacketType {
    pub fn from_wire(value: u16) -> CodecResult<Self> {
        match value {
            0x0006 => Ok(PacketType::Error),
            0x0011 => Ok(PacketType::OpenFile),
            0x0013 => Ok(PacketType::ReadFile),
            other => Err(CodecError::UnknownPacketType(other)),
        }
    }
}

/// A single request or response exchanged with the writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Correlates a response with its request; assigned from a
    /// [`SequenceCounter`] when the packet is constructed
    pub sequence_number: u32,
    pub packet_type: PacketType,
    /// Logical payload length. The wire pads the payload to a multiple of 8
    /// bytes but this field always reports the unpadded length.
    pub data_length: u32,
    pub p1: u32,
    pub p2: u32,
    pub p3: u32,
    pub p4: u32,
    pub p5: u32,
    /// Unpadded payload bytes
    pub payload: Vec<u8>,
}

impl Packet {
    /// Build an OPEN_FILE request, defaulting to the realtime file.
    ///
    /// Passing `None` for the disk id sends p1 = 0, which lets the writer
    /// pick its default drive.
    pub fn open_request(
        counter: &SequenceCounter,
        file_name: &str,
        disk_id: Option<char>,
    ) -> Self {
        let payload = file_name.as_bytes().to_vec();
        Self {
            sequence_number: counter.next(),
            packet_type: PacketType::OpenFile,
            data_length: payload.len() as u32,
            p1: disk_id.map(|d| d as u32).unwrap_or(0),
            p2: 0,
            p3: 0,
            p4: 0,
            p5: 0,
            payload,
        }
    }

    /// Build an OPEN_FILE request for `REALTIME.000` on disk `A`.
    pub fn open_realtime_request(counter: &SequenceCounter) -> Self {
        Self::open_request(counter, REALTIME_FILE, Some(DEFAULT_DISK))
    }

    /// Build a READ_FILE request at `offset`.
    ///
    /// `byte_count` is clamped to [`MAX_READ`]; the writer never honors more
    /// than that in one exchange.
    pub fn read_request(counter: &SequenceCounter, offset: u32, byte_count: u32) -> Self {
        Self {
            sequence_number: counter.next(),
            packet_type: PacketType::ReadFile,
            data_length: 0,
            p1: offset,
            p2: byte_count.min(MAX_READ),
            p3: 0,
            p4: 0,
            p5: 0,
            payload: Vec::new(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.packet_type == PacketType::Error
    }

    /// Decode the strokes carried in this packet's payload.
    ///
    /// Only valid for READ_FILE responses: the payload is a concatenation of
    /// 8-byte units, 4 chord bytes followed by 4 timestamp bytes (the
    /// timestamp is discarded). Recomputed from the payload on every call.
    pub fn strokes(&self) -> CodecResult<Vec<Stroke>> {
        if self.packet_type != PacketType::ReadFile {
            return Err(CodecError::NotAReadResponse(self.packet_type));
        }
        if self.data_length % 8 != 0 {
            return Err(CodecError::UnalignedPayload(self.data_length));
        }
        let data = self
            .payload
            .get(..self.data_length as usize)
            .ok_or(CodecError::TruncatedPayload {
                expected: self.data_length as usize,
                actual: self.payload.len(),
            })?;
        data.chunks_exact(8)
            .map(|unit| Stroke::decode(&unit[..4]))
            .collect()
    }
}
