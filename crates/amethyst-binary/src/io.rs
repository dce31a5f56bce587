use crate::error::BinaryError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

/// Checks if the buffer has enough remaining bytes and returns an error if not.
macro_rules! check_remaining {
    ($buf:expr, $len:expr) => {
        let needed = $len;
        let remaining = $buf.remaining();
        if remaining < needed {
            return Err(BinaryError::UnexpectedEOF);
        }
    };
}

#[derive(Debug, Clone)]
pub struct BinaryReader {
    buffer: Bytes,
}

impl BinaryReader {
    pub fn new(buffer: Bytes) -> Self {
        Self { buffer }
    }

    pub fn remaining(&self) -> usize {
        self.buffer.remaining()
    }

    pub fn has_remaining(&self) -> bool {
        self.buffer.has_remaining()
    }

    /// Returns what is left of the buffer without consuming it, for callers that
    /// want to hand the untouched rest back (e.g. the next datagram in a batch).
    pub fn rest(&self) -> Bytes {
        self.buffer.clone()
    }

    pub fn read_u8(&mut self) -> Result<u8, BinaryError> {
        check_remaining!(self.buffer, 1);
        Ok(self.buffer.get_u8())
    }

    pub fn read_i8(&mut self) -> Result<i8, BinaryError> {
        check_remaining!(self.buffer, 1);
        Ok(self.buffer.get_i8())
    }

    pub fn read_bool(&mut self) -> Result<bool, BinaryError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16, BinaryError> {
        check_remaining!(self.buffer, 2);
        Ok(self.buffer.get_u16())
    }

    pub fn read_i16(&mut self) -> Result<i16, BinaryError> {
        check_remaining!(self.buffer, 2);
        Ok(self.buffer.get_i16())
    }

    pub fn read_u32(&mut self) -> Result<u32, BinaryError> {
        check_remaining!(self.buffer, 4);
        Ok(self.buffer.get_u32())
    }

    pub fn read_i32(&mut self) -> Result<i32, BinaryError> {
        check_remaining!(self.buffer, 4);
        Ok(self.buffer.get_i32())
    }

    pub fn read_u64(&mut self) -> Result<u64, BinaryError> {
        check_remaining!(self.buffer, 8);
        Ok(self.buffer.get_u64())
    }

    pub fn read_i64(&mut self) -> Result<i64, BinaryError> {
        check_remaining!(self.buffer, 8);
        Ok(self.buffer.get_i64())
    }

    pub fn read_u128(&mut self) -> Result<u128, BinaryError> {
        check_remaining!(self.buffer, 16);
        Ok(self.buffer.get_u128())
    }

    pub fn read_i128(&mut self) -> Result<i128, BinaryError> {
        check_remaining!(self.buffer, 16);
        Ok(self.buffer.get_i128())
    }

    pub fn read_f32(&mut self) -> Result<f32, BinaryError> {
        check_remaining!(self.buffer, 4);
        Ok(self.buffer.get_f32())
    }

    pub fn read_f64(&mut self) -> Result<f64, BinaryError> {
        check_remaining!(self.buffer, 8);
        Ok(self.buffer.get_f64())
    }

    /// Reads an unsigned 24-bit little-endian "triad" — the RakNet sequence,
    /// message, and order index encoding. Stored widened to `u32`.
    pub fn read_u24_le(&mut self) -> Result<u32, BinaryError> {
        check_remaining!(self.buffer, 3);
        Ok(self.buffer.get_uint_le(3) as u32)
    }

    pub fn read_var_u32(&mut self) -> Result<u32, BinaryError> {
        let mut value: u32 = 0;
        for i in 0..5 {
            let byte = self.read_u8()?;
            value |= ((byte & 0x7F) as u32) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(BinaryError::VarintTooLarge)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<Bytes, BinaryError> {
        check_remaining!(self.buffer, len);
        Ok(self.buffer.copy_to_bytes(len))
    }

    /// Big-endian 16-bit length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String, BinaryError> {
        let len = self.read_u16()? as usize;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| BinaryError::InvalidData(format!("invalid UTF-8 string: {e}")))
    }

    /// RakNet address record: one version byte, then either an IPv4 payload
    /// (4 bytes XORed with `0xFF`, then a big-endian port) or an IPv6 payload.
    /// IPv6 is rejected — it is out of scope for this server.
    pub fn read_socket_addr(&mut self) -> Result<SocketAddr, BinaryError> {
        let version = self.read_u8()?;
        match version {
            4 => {
                check_remaining!(self.buffer, 4 + 2);
                let mut octets = [0u8; 4];
                self.buffer.copy_to_slice(&mut octets);
                for b in &mut octets {
                    *b = !*b;
                }
                let port = self.read_u16()?;
                Ok(SocketAddr::V4(SocketAddrV4::new(
                    Ipv4Addr::from(octets),
                    port,
                )))
            }
            other => Err(BinaryError::InvalidData(format!(
                "unsupported address family: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BinaryWriter {
    buffer: BytesMut,
}

impl BinaryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn freeze(self) -> Bytes {
        self.buffer.freeze()
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), BinaryError> {
        self.buffer.put_u8(value);
        Ok(())
    }

    pub fn write_i8(&mut self, value: i8) -> Result<(), BinaryError> {
        self.buffer.put_i8(value);
        Ok(())
    }

    pub fn write_bool(&mut self, value: bool) -> Result<(), BinaryError> {
        self.write_u8(if value { 1 } else { 0 })
    }

    pub fn write_u16(&mut self, value: u16) -> Result<(), BinaryError> {
        self.buffer.put_u16(value);
        Ok(())
    }

    pub fn write_i16(&mut self, value: i16) -> Result<(), BinaryError> {
        self.buffer.put_i16(value);
        Ok(())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<(), BinaryError> {
        self.buffer.put_u32(value);
        Ok(())
    }

    pub fn write_i32(&mut self, value: i32) -> Result<(), BinaryError> {
        self.buffer.put_i32(value);
        Ok(())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<(), BinaryError> {
        self.buffer.put_u64(value);
        Ok(())
    }

    pub fn write_i64(&mut self, value: i64) -> Result<(), BinaryError> {
        self.buffer.put_i64(value);
        Ok(())
    }

    pub fn write_u128(&mut self, value: u128) -> Result<(), BinaryError> {
        self.buffer.put_u128(value);
        Ok(())
    }

    pub fn write_i128(&mut self, value: i128) -> Result<(), BinaryError> {
        self.buffer.put_i128(value);
        Ok(())
    }

    pub fn write_f32(&mut self, value: f32) -> Result<(), BinaryError> {
        self.buffer.put_f32(value);
        Ok(())
    }

    pub fn write_f64(&mut self, value: f64) -> Result<(), BinaryError> {
        self.buffer.put_f64(value);
        Ok(())
    }

    pub fn write_u24_le(&mut self, value: u32) -> Result<(), BinaryError> {
        self.buffer.put_uint_le(value as u64, 3);
        Ok(())
    }

    pub fn write_var_u32(&mut self, mut value: u32) -> Result<(), BinaryError> {
        loop {
            let byte = (value & 0x7F) as u8;
            value >>= 7;
            if value == 0 {
                self.write_u8(byte)?;
                break;
            }
            self.write_u8(byte | 0x80)?;
        }
        Ok(())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), BinaryError> {
        self.buffer.put_slice(bytes);
        Ok(())
    }

    pub fn write_string(&mut self, value: &str) -> Result<(), BinaryError> {
        if value.len() > u16::MAX as usize {
            return Err(BinaryError::InvalidData(
                "string exceeds 65535 bytes".into(),
            ));
        }
        self.write_u16(value.len() as u16)?;
        self.write_bytes(value.as_bytes())
    }

    pub fn write_socket_addr(&mut self, addr: &SocketAddr) -> Result<(), BinaryError> {
        match addr {
            SocketAddr::V4(v4) => {
                self.write_u8(4)?;
                for octet in v4.ip().octets() {
                    self.write_u8(!octet)?;
                }
                self.write_u16(v4.port())
            }
            SocketAddr::V6(_) => Err(BinaryError::InvalidData(
                "IPv6 address records are not supported".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triad_round_trip_bounds() {
        for n in [0u32, 1, 0x7F, 0xFF, 0xFFFF, 0xFF_FFFF] {
            let mut w = BinaryWriter::new();
            w.write_u24_le(n).unwrap();
            let bytes = w.freeze();
            assert_eq!(bytes.len(), 3);
            let mut r = BinaryReader::new(bytes);
            assert_eq!(r.read_u24_le().unwrap(), n);
        }
    }

    #[test]
    fn string_round_trip() {
        let mut w = BinaryWriter::new();
        w.write_string("hello raknet").unwrap();
        let mut r = BinaryReader::new(w.freeze());
        assert_eq!(r.read_string().unwrap(), "hello raknet");
    }

    #[test]
    fn ipv4_address_xor_round_trip() {
        let addr: SocketAddr = "127.0.0.1:19132".parse().unwrap();
        let mut w = BinaryWriter::new();
        w.write_socket_addr(&addr).unwrap();
        let bytes = w.freeze();
        // version byte + 4 xor'd octets + 2 port bytes
        assert_eq!(bytes.len(), 7);
        assert_eq!(bytes[0], 4);
        assert_eq!(bytes[1], !127u8);
        let mut r = BinaryReader::new(bytes);
        assert_eq!(r.read_socket_addr().unwrap(), addr);
    }

    #[test]
    fn ipv6_address_is_rejected() {
        let mut r = BinaryReader::new(Bytes::from_static(&[6, 0, 0, 0, 0]));
        assert!(r.read_socket_addr().is_err());
    }

    #[test]
    fn short_buffer_errors_rather_than_panics() {
        let mut r = BinaryReader::new(Bytes::from_static(&[0x01]));
        assert!(r.read_u32().is_err());
    }
}
