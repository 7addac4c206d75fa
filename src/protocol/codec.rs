//! Packet codec for encoding/decoding writer packets
//!
//! Handles serialization and framing of the fixed-header packet format.

use bytes::{Buf, BufMut, BytesMut};
use std::sync::atomic::{AtomicU32, Ordering};
use thiserror::Error;

use super::packet::{Packet, PacketType};
use super::{padded_len, HEADER_SIZE, MAX_READ, SYNC_MARKER};

/// Largest on-wire payload a response can carry: MAX_READ is already a
/// multiple of 8, so padding never exceeds it.
const MAX_PAYLOAD: usize = MAX_READ as usize;

/// Codec errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Invalid sync marker")]
    InvalidSync,

    #[error("Truncated packet: {0} bytes (header needs {HEADER_SIZE})")]
    TruncatedHeader(usize),

    #[error("Truncated payload: expected {expected} bytes, got {actual}")]
    TruncatedPayload { expected: usize, actual: usize },

    #[error("Payload too large: {0} bytes (max: {MAX_PAYLOAD})")]
    PayloadTooLarge(usize),

    #[error("Unknown packet type: {0:#06x}")]
    UnknownPacketType(u16),

    #[error("Strokes requested from a {0:?} packet")]
    NotAReadResponse(PacketType),

    #[error("Payload length {0} is not a multiple of 8")]
    UnalignedPayload(u32),

    #[error("Chord byte {0:#04x} is missing its high bits")]
    BadChordByte(u8),
}

pub type CodecResult<T> = Result<T, CodecError>;

/// Sequence numbers wrap modulo 2^32 - 1, so 0xFFFF_FFFF is never issued.
const SEQUENCE_MODULUS: u32 = u32::MAX;

/// Monotonic counter assigning sequence numbers to outbound packets.
///
/// One engine is the only writer in practice, but the increment is atomic so
/// the counter can be shared if several engines ever run in one process.
#[derive(Debug, Default)]
pub struct SequenceCounter(AtomicU32);

impl SequenceCounter {
    pub fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    #[cfg(test)]
    pub fn starting_at(value: u32) -> Self {
        Self(AtomicU32::new(value))
    }

    /// Consume and return the next sequence number.
    pub fn next(&self) -> u32 {
        self.0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                Some((n + 1) % SEQUENCE_MODULUS)
            })
            .unwrap_or(0)
    }
}

/// Encode a packet into a buffer, padding the payload to 8-byte alignment.
pub fn pack(packet: &Packet, buf: &mut BytesMut) {
    buf.put_slice(&SYNC_MARKER);
    buf.put_u32_le(packet.sequence_number);
    buf.put_u16_le(packet.packet_type as u16);
    buf.put_u32_le(packet.data_length);
    buf.put_u32_le(packet.p1);
    buf.put_u32_le(packet.p2);
    buf.put_u32_le(packet.p3);
    buf.put_u32_le(packet.p4);
    buf.put_u32_le(packet.p5);
    buf.put_slice(&packet.payload);
    buf.put_bytes(0, padded_len(packet.payload.len()) - packet.payload.len());
}

/// Decode a packet from a complete buffer.
///
/// Requires the full header plus `data_length` payload bytes to be present;
/// trailing padding beyond the logical length is ignored.
pub fn unpack(mut data: &[u8]) -> CodecResult<Packet> {
    if data.len() < HEADER_SIZE {
        return Err(CodecError::TruncatedHeader(data.len()));
    }
    if data[..2] != SYNC_MARKER {
        return Err(CodecError::InvalidSync);
    }
    data.advance(2);

    let sequence_number = data.get_u32_le();
    let packet_type = PacketType::from_wire(data.get_u16_le())?;
    let data_length = data.get_u32_le();
    let p1 = data.get_u32_le();
    let p2 = data.get_u32_le();
    let p3 = data.get_u32_le();
    let p4 = data.get_u32_le();
    let p5 = data.get_u32_le();

    if data_length as usize > MAX_PAYLOAD {
        return Err(CodecError::PayloadTooLarge(data_length as usize));
    }
    if data.len() < data_length as usize {
        return Err(CodecError::TruncatedPayload {
            expected: data_length as usize,
            actual: data.len(),
        });
    }

    Ok(Packet {
        sequence_number,
        packet_type,
        data_length,
        p1,
        p2,
        p3,
        p4,
        p5,
        payload: data[..data_length as usize].to_vec(),
    })
}

/// Decodes packets from a byte stream
pub struct Decoder {
    state: DecodeState,
}

#[derive(Default)]
enum DecodeState {
    #[default]
    Header,
    Payload {
        header: [u8; HEADER_SIZE],
        padded: usize,
    },
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            state: DecodeState::Header,
        }
    }

    /// Attempt to decode a packet from the buffer.
    /// Returns Ok(None) if more data is needed.
    pub fn decode(&mut self, buf: &mut BytesMut) -> CodecResult<Option<Packet>> {
        loop {
            match &self.state {
                DecodeState::Header => {
                    if buf.len() < HEADER_SIZE {
                        return Ok(None);
                    }

                    if buf[..2] != SYNC_MARKER {
                        return Err(CodecError::InvalidSync);
                    }

                    let data_length =
                        u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]) as usize;
                    if data_length > MAX_PAYLOAD {
                        return Err(CodecError::PayloadTooLarge(data_length));
                    }

                    let mut header = [0u8; HEADER_SIZE];
                    header.copy_from_slice(&buf[..HEADER_SIZE]);
                    buf.advance(HEADER_SIZE);

                    // The stream carries the payload padded to 8 bytes.
                    self.state = DecodeState::Payload {
                        header,
                        padded: padded_len(data_length),
                    };
                }
                DecodeState::Payload { header, padded } => {
                    if buf.len() < *padded {
                        return Ok(None);
                    }

                    let mut frame = BytesMut::with_capacity(HEADER_SIZE + *padded);
                    frame.put_slice(header);
                    frame.put_slice(&buf.split_to(*padded));

                    self.state = DecodeState::Header;

                    return unpack(&frame).map(Some);
                }
            }
        }
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_response(sequence_number: u32, payload: Vec<u8>) -> Packet {
        Packet {
            sequence_number,
            packet_type: PacketType::ReadFile,
            data_length: payload.len() as u32,
            p1: 0,
            p2: 0,
            p3: 0,
            p4: 0,
            p5: 0,
            payload,
        }
    }

    #[test]
    fn test_pack_unpack_roundtrip() {
        let packet = Packet {
            sequence_number: 0xDEAD_BEE5,
            packet_type: PacketType::OpenFile,
            data_length: 12,
            p1: u32::from(b'A'),
            p2: 2,
            p3: 3,
            p4: 4,
            p5: 5,
            payload: b"REALTIME.000".to_vec(),
        };

        let mut buf = BytesMut::new();
        pack(&packet, &mut buf);
        let decoded = unpack(&buf).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_pack_pads_but_data_length_does_not() {
        let packet = read_response(7, vec![0xAA; 11]);
        let mut buf = BytesMut::new();
        pack(&packet, &mut buf);

        // 11 bytes of payload occupy 16 on the wire.
        assert_eq!(buf.len(), HEADER_SIZE + 16);
        let decoded = unpack(&buf).unwrap();
        assert_eq!(decoded.data_length, 11);
        assert_eq!(decoded.payload, vec![0xAA; 11]);
    }

    #[test]
    fn test_unpack_rejects_short_header() {
        assert!(matches!(
            unpack(&[b'S', b'G', 0, 0]),
            Err(CodecError::TruncatedHeader(4))
        ));
    }

    #[test]
    fn test_unpack_rejects_bad_sync() {
        let packet = read_response(1, Vec::new());
        let mut buf = BytesMut::new();
        pack(&packet, &mut buf);
        buf[0] = b'X';
        assert!(matches!(unpack(&buf), Err(CodecError::InvalidSync)));
    }

    #[test]
    fn test_sequence_counter_is_strictly_increasing() {
        let counter = SequenceCounter::new();
        let numbers: Vec<u32> = (0..5).map(|_| counter.next()).collect();
        assert_eq!(numbers, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_sequence_counter_wraps_before_u32_max() {
        let counter = SequenceCounter::starting_at(u32::MAX - 1);
        assert_eq!(counter.next(), u32::MAX - 1);
        assert_eq!(counter.next(), 0);
    }

    #[test]
    fn test_decoder_frames_a_split_stream() {
        let packet = read_response(3, vec![0xBB; 16]);
        let mut wire = BytesMut::new();
        pack(&packet, &mut wire);

        let mut decoder = Decoder::new();
        let mut buf = BytesMut::new();

        // Feed the stream one byte short of complete.
        buf.extend_from_slice(&wire[..wire.len() - 1]);
        assert!(decoder.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&wire[wire.len() - 1..]);
        let decoded = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, packet);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decoder_handles_back_to_back_packets() {
        let first = read_response(1, vec![0x01; 8]);
        let second = read_response(2, Vec::new());

        let mut buf = BytesMut::new();
        pack(&first, &mut buf);
        pack(&second, &mut buf);

        let mut decoder = Decoder::new();
        assert_eq!(decoder.decode(&mut buf).unwrap().unwrap(), first);
        assert_eq!(decoder.decode(&mut buf).unwrap().unwrap(), second);
        assert!(decoder.decode(&mut buf).unwrap().is_none());
    }
}
