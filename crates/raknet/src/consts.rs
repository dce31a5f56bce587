//! Wire and timing constants shared by the codec, reliability engine, and session host.

use std::time::Duration;

/// RakNet protocol byte exchanged during the offline handshake.
pub const RAKNET_PROTOCOL_VERSION: u8 = 7;

/// Fixed 16-byte magic that opens every offline (unconnected) message.
pub const OFFLINE_MESSAGE_MAGIC: [u8; 16] = [
    0x00, 0xFF, 0xFF, 0x00, 0xFE, 0xFE, 0xFE, 0xFE, 0xFD, 0xFD, 0xFD, 0xFD, 0x12, 0x34, 0x56, 0x78,
];

/// Largest MTU this server will ever negotiate or accept.
pub const MTU_CEILING: u16 = 1464;

/// Smallest MTU worth negotiating; below this a connection isn't viable.
pub const MTU_FLOOR: u16 = 400;

/// Default UDP port RakNet servers bind to.
pub const DEFAULT_BIND_PORT: u16 = 19132;

/// Width of the receive sliding window, in sequence numbers.
pub const RECEIVE_WINDOW_SIZE: u32 = 2048;

/// 24-bit sequence/message/order index space; values wrap modulo this.
pub const TRIAD_WRAP: u32 = 1 << 24;

/// Half the triad space, used to disambiguate wrapped modular comparisons.
pub const TRIAD_HALF: u32 = 1 << 23;

/// Number of independent ordering channels per session.
pub const ORDER_CHANNEL_COUNT: usize = 32;

/// An in-flight outbound datagram is retransmitted if unacknowledged this long.
pub const RECOVERY_TIMEOUT: Duration = Duration::from_secs(8);

/// Soft cap on the outbound recovery queue; oldest unacked entries are dropped past this.
pub const RECOVERY_QUEUE_SOFT_CAP: usize = 128;

/// Maximum number of split messages a session will reassemble concurrently.
pub const MAX_CONCURRENT_SPLITS: usize = 4;

/// Maximum number of fragments in a single split message.
pub const MAX_FRAGMENTS_PER_SPLIT: u32 = 128;

/// A session with no inbound traffic for this long is torn down as timed out.
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between ACK/NACK flushes, recovery sweeps, and window GC.
pub const TICK_INTERVAL: Duration = Duration::from_millis(50);

/// Interval between keep-alive pings sent to an established session.
pub const PING_INTERVAL: Duration = Duration::from_secs(7);

/// Per-datagram header byte range carrying a batch of encapsulated frames.
pub const FRAME_SET_ID_MIN: u8 = 0x80;
pub const FRAME_SET_ID_MAX: u8 = 0x8F;

pub const ID_CONNECTED_PING: u8 = 0x00;
pub const ID_UNCONNECTED_PING: u8 = 0x01;
pub const ID_CONNECTED_PONG: u8 = 0x03;
pub const ID_OPEN_CONNECTION_REQUEST_1: u8 = 0x05;
pub const ID_OPEN_CONNECTION_REPLY_1: u8 = 0x06;
pub const ID_OPEN_CONNECTION_REQUEST_2: u8 = 0x07;
pub const ID_OPEN_CONNECTION_REPLY_2: u8 = 0x08;
pub const ID_CONNECTION_REQUEST: u8 = 0x09;
pub const ID_CONNECTION_REQUEST_ACCEPTED: u8 = 0x10;
pub const ID_NEW_INCOMING_CONNECTION: u8 = 0x13;
pub const ID_DISCONNECT_NOTIFICATION: u8 = 0x15;
pub const ID_UNCONNECTED_PONG: u8 = 0x1C;
pub const ID_NACK: u8 = 0xA0;
pub const ID_ACK: u8 = 0xC0;

/// Bound on the total sequence numbers a single ACK/NACK packet can expand to.
pub const MAX_ACK_RECORDS_EXPANDED: usize = 4096;

/// Bound on the span of a single ACK/NACK range record.
pub const MAX_ACK_RANGE_SIZE: u32 = 512;
