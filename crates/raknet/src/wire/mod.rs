//! Pure encode/decode functions for every wire structure the session core handles.
//!
//! Every type in this module follows the same shape: `encode(&self) -> Bytes` (or
//! writes into a caller-supplied `BinaryWriter`) and `decode(&mut BinaryReader) ->
//! Result<Self, WireError>`. Nothing here mutates a packet in place or aliases a
//! buffer across calls — a malformed packet can never be resurfaced half-decoded.

pub mod ack;
pub mod connected;
pub mod datagram;
pub mod frame;
pub mod offline;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WireError {
    #[error("short buffer: {0}")]
    ShortBuffer(#[from] amethyst_binary::BinaryError),
    #[error("bad flags byte: {0:#04x}")]
    BadFlags(u8),
    #[error("declared length {declared} does not match {actual} remaining bytes")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("unsupported address family")]
    UnsupportedAddressFamily,
}

pub type Result<T> = std::result::Result<T, WireError>;
