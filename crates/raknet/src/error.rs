use crate::wire::WireError;
use std::io;
use thiserror::Error;

/// Errors surfaced by the RakNet session core, from the wire codec up through
/// the session state machine and send scheduler.
#[derive(Error, Debug)]
pub enum RakNetError {
    #[error("network I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("wire codec error: {0}")]
    Wire(#[from] WireError),

    #[error("binary encoding error: {0}")]
    Binary(#[from] amethyst_binary::BinaryError),

    #[error("incompatible protocol version: client={client}, server={server}")]
    IncompatibleProtocolVersion { client: u8, server: u8 },

    #[error("invalid split packet: {0}")]
    InvalidSplitPacket(String),

    #[error("exceeded maximum concurrent split packets")]
    TooManySplitPackets,

    #[error("invalid server configuration: {0}")]
    InvalidConfig(String),
}

impl RakNetError {
    /// Protocol violations by the peer (§7) always end the session with a logged
    /// `"session {addr} closed: {reason}"` line. Everything else here is a malformed
    /// datagram: the datagram is dropped, the session lives.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            RakNetError::IncompatibleProtocolVersion { .. }
                | RakNetError::InvalidSplitPacket(_)
                | RakNetError::TooManySplitPackets
        )
    }
}

pub type Result<T> = std::result::Result<T, RakNetError>;
