//! The reliability engine: everything between the wire codec and session logic
//! that exists to turn unreliable UDP datagrams into RakNet's delivery
//! guarantees (§3, §4.3, §4.4).

pub mod order;
pub mod receive_window;
pub mod send_window;
pub mod split;

pub use order::OrderState;
pub use receive_window::ReceiveWindow;
pub use send_window::SendWindow;
pub use split::{fragment_payload, SplitTable};
