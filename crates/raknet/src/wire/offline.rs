use super::{Result, WireError};
use crate::consts::OFFLINE_MESSAGE_MAGIC;
use amethyst_binary::{BinaryReader, BinaryWriter};

fn read_magic(reader: &mut BinaryReader) -> Result<()> {
    let bytes = reader.read_bytes(OFFLINE_MESSAGE_MAGIC.len())?;
    if bytes.as_ref() != OFFLINE_MESSAGE_MAGIC {
        return Err(WireError::BadFlags(0));
    }
    Ok(())
}

fn write_magic(writer: &mut BinaryWriter) -> Result<()> {
    writer.write_bytes(&OFFLINE_MESSAGE_MAGIC)?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct UnconnectedPing {
    pub time: u64,
    pub client_guid: u64,
}

impl UnconnectedPing {
    pub fn decode(reader: &mut BinaryReader) -> Result<Self> {
        let time = reader.read_u64()?;
        read_magic(reader)?;
        let client_guid = reader.read_u64()?;
        Ok(Self { time, client_guid })
    }
}

#[derive(Debug, Clone)]
pub struct UnconnectedPong {
    pub time: u64,
    pub server_guid: u64,
    pub motd: String,
}

impl UnconnectedPong {
    pub fn encode(&self, writer: &mut BinaryWriter) -> Result<()> {
        writer.write_u64(self.time)?;
        writer.write_u64(self.server_guid)?;
        write_magic(writer)?;
        writer.write_string(&self.motd)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct OpenConnectionRequest1 {
    pub protocol_version: u8,
}

impl OpenConnectionRequest1 {
    pub fn decode(reader: &mut BinaryReader) -> Result<Self> {
        read_magic(reader)?;
        let protocol_version = reader.read_u8()?;
        Ok(Self { protocol_version })
    }
}

#[derive(Debug, Clone)]
pub struct OpenConnectionReply1 {
    pub server_guid: u64,
    pub mtu: u16,
}

impl OpenConnectionReply1 {
    pub fn encode(&self, writer: &mut BinaryWriter) -> Result<()> {
        write_magic(writer)?;
        writer.write_u64(self.server_guid)?;
        writer.write_bool(false)?; // use_security
        writer.write_u16(self.mtu)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct OpenConnectionRequest2 {
    pub mtu: u16,
    pub client_guid: u64,
}

impl OpenConnectionRequest2 {
    pub fn decode(reader: &mut BinaryReader) -> Result<Self> {
        read_magic(reader)?;
        let _server_address = reader.read_socket_addr()?;
        let mtu = reader.read_u16()?;
        let client_guid = reader.read_u64()?;
        Ok(Self { mtu, client_guid })
    }
}

#[derive(Debug, Clone)]
pub struct OpenConnectionReply2 {
    pub server_guid: u64,
    pub client_address: std::net::SocketAddr,
    pub mtu: u16,
}

impl OpenConnectionReply2 {
    pub fn encode(&self, writer: &mut BinaryWriter) -> Result<()> {
        write_magic(writer)?;
        writer.write_u64(self.server_guid)?;
        writer.write_socket_addr(&self.client_address)?;
        writer.write_u16(self.mtu)?;
        writer.write_bool(false)?; // use_encryption
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_connection_reply_1_round_trip() {
        let reply = OpenConnectionReply1 {
            server_guid: 0xDEAD_BEEF,
            mtu: 1400,
        };
        let mut writer = BinaryWriter::new();
        reply.encode(&mut writer).unwrap();
        let bytes = writer.freeze();
        let mut reader = BinaryReader::new(bytes);
        read_magic(&mut reader).unwrap();
        assert_eq!(reader.read_u64().unwrap(), 0xDEAD_BEEF);
        assert!(!reader.read_bool().unwrap());
        assert_eq!(reader.read_u16().unwrap(), 1400);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut writer = BinaryWriter::new();
        writer.write_bytes(&[0u8; 16]).unwrap();
        writer.write_u8(7).unwrap();
        let mut reader = BinaryReader::new(writer.freeze());
        assert!(OpenConnectionRequest1::decode(&mut reader).is_err());
    }
}
