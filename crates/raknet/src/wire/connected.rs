use super::Result;
use amethyst_binary::{BinaryReader, BinaryWriter};
use std::net::SocketAddr;

/// `0x09`, sent once the client has an accepted MTU/GUID from the offline
/// handshake and is ready to open the connected session (§4.2).
#[derive(Debug, Clone)]
pub struct ConnectionRequest {
    pub client_guid: u64,
    pub request_time: i64,
}

impl ConnectionRequest {
    pub fn decode(reader: &mut BinaryReader) -> Result<Self> {
        let client_guid = reader.read_u64()?;
        let request_time = reader.read_i64()?;
        Ok(Self { client_guid, request_time })
    }
}

/// `0x10`, the server's reply to [`ConnectionRequest`] confirming the session
/// is (from the server's point of view) ready to receive game traffic.
#[derive(Debug, Clone)]
pub struct ConnectionRequestAccepted {
    pub client_address: SocketAddr,
    pub request_time: i64,
    pub accepted_time: i64,
}

impl ConnectionRequestAccepted {
    pub fn encode(&self, writer: &mut BinaryWriter) -> Result<()> {
        writer.write_socket_addr(&self.client_address)?;
        writer.write_u16(0)?; // system index
        writer.write_i64(self.request_time)?;
        writer.write_i64(self.accepted_time)?;
        Ok(())
    }
}

/// `0x13`, sent by the client once it has processed
/// [`ConnectionRequestAccepted`]; its arrival completes the handshake (§4.2).
#[derive(Debug, Clone)]
pub struct NewIncomingConnection {
    pub server_address: SocketAddr,
    pub request_time: i64,
}

impl NewIncomingConnection {
    pub fn decode(reader: &mut BinaryReader) -> Result<Self> {
        let server_address = reader.read_socket_addr()?;
        let request_time = reader.read_i64()?;
        Ok(Self { server_address, request_time })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_request_accepted_round_trip_prefix() {
        let accepted = ConnectionRequestAccepted {
            client_address: "127.0.0.1:12345".parse().unwrap(),
            request_time: 42,
            accepted_time: 43,
        };
        let mut writer = BinaryWriter::new();
        accepted.encode(&mut writer).unwrap();
        let mut reader = BinaryReader::new(writer.freeze());
        assert_eq!(reader.read_socket_addr().unwrap(), accepted.client_address);
        assert_eq!(reader.read_u16().unwrap(), 0);
        assert_eq!(reader.read_i64().unwrap(), 42);
        assert_eq!(reader.read_i64().unwrap(), 43);
    }
}
