//! The RakNet session core: wire codec, reliability engine, ordered
//! reassembly, and the session state machine that sits between a raw UDP
//! socket and the MCPE game-packet handler.

pub mod consts;
pub mod error;
pub mod reliability;
pub mod seq;
pub mod server_config;
pub mod session;
pub mod wire;

pub use error::{RakNetError, Result};
pub use server_config::RakNetServerConfig;
pub use session::{Session, SessionOutput, SessionState};
pub use wire::frame::{EncapsulatedFrame, Reliability};
