//! Protocol module - Defines the wire protocol spoken by Stenograph writers
//!
//! Every exchange with the writer is a fixed-header binary packet:
//! - 2 byte sync marker `SG`
//! - 4 byte sequence number (little-endian)
//! - 2 byte packet type
//! - 4 byte payload length
//! - 5 x 4 byte parameters whose meaning depends on the packet type
//! - Variable length payload, zero-padded to a multiple of 8 on the wire

mod codec;
mod packet;
mod stroke;

pub use codec::*;
pub use packet::*;
pub use stroke::*;

/// Sync marker prefixing every packet header
pub const SYNC_MARKER: [u8; 2] = [b'S', b'G'];

/// Fixed header size: sync(2) + sequence(4) + type(2) + length(4) + p1..p5(20)
pub const HEADER_SIZE: usize = 32;

/// Largest payload the driver will ever request in one read
pub const MAX_READ: u32 = 0x200;

/// Name of the file the writer streams live strokes into
pub const REALTIME_FILE: &str = "REALTIME.000";

/// Default disk identifier hosting the realtime file
pub const DEFAULT_DISK: char = 'A';

/// Round a payload length up to the wire's 8-byte alignment
pub(crate) fn padded_len(len: usize) -> usize {
    (len + 7) & !7
}
