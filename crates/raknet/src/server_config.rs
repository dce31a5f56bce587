use crate::consts::{MTU_CEILING, OFFLINE_MESSAGE_MAGIC, RAKNET_PROTOCOL_VERSION};
use crate::error::{RakNetError, Result};

/// Server-side RakNet configuration (§6). `protocol_version` and
/// `offline_message_magic` are fixed points of the wire format, not tunables,
/// but are kept here rather than hardcoded at call sites so the handshake code
/// reads the same value the wire tests assert against.
#[derive(Debug, Clone)]
pub struct RakNetServerConfig {
    /// Random identifier this server presents during the offline handshake.
    pub server_guid: u64,
    /// Maximum number of concurrently connected sessions.
    pub max_connections: usize,
    /// Ceiling this server will ever negotiate down to from a client's request.
    pub mtu_ceiling: u16,
    /// Fixed RakNet protocol byte (§2 Glossary: Protocol Version).
    pub protocol_version: u8,
    /// Fixed 16-byte magic opening every offline message.
    pub offline_message_magic: [u8; 16],
    /// Bytes returned verbatim in an `UnconnectedPong`'s advertisement field (the MOTD string).
    pub advertisement: Vec<u8>,
}

impl RakNetServerConfig {
    pub fn new(server_guid: u64, max_connections: usize, advertisement: Vec<u8>) -> Self {
        Self {
            server_guid,
            max_connections,
            mtu_ceiling: MTU_CEILING,
            protocol_version: RAKNET_PROTOCOL_VERSION,
            offline_message_magic: OFFLINE_MESSAGE_MAGIC,
            advertisement,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.mtu_ceiling > MTU_CEILING {
            return Err(RakNetError::InvalidConfig(format!(
                "mtu_ceiling {} exceeds the protocol ceiling of {}",
                self.mtu_ceiling, MTU_CEILING
            )));
        }
        if self.max_connections == 0 {
            return Err(RakNetError::InvalidConfig("max_connections must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_new_config_validates() {
        let config = RakNetServerConfig::new(1234, 32, b"MCPE;test;7".to_vec());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_max_connections_is_rejected() {
        let config = RakNetServerConfig::new(1234, 0, Vec::new());
        assert!(config.validate().is_err());
    }
}
