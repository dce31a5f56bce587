use super::{Result, WireError};
use amethyst_binary::{BinaryReader, BinaryWriter};
use bytes::Bytes;

/// Delivery guarantee requested for one encapsulated frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Reliability {
    Unreliable = 0,
    UnreliableSequenced = 1,
    Reliable = 2,
    ReliableOrdered = 3,
    ReliableSequenced = 4,
    UnreliableAckReceipt = 5,
    ReliableAckReceipt = 6,
    ReliableOrderedAckReceipt = 7,
}

impl Reliability {
    pub fn from_u8(value: u8) -> Result<Self> {
        Ok(match value {
            0 => Reliability::Unreliable,
            1 => Reliability::UnreliableSequenced,
            2 => Reliability::Reliable,
            3 => Reliability::ReliableOrdered,
            4 => Reliability::ReliableSequenced,
            5 => Reliability::UnreliableAckReceipt,
            6 => Reliability::ReliableAckReceipt,
            7 => Reliability::ReliableOrderedAckReceipt,
            other => return Err(WireError::BadFlags(other)),
        })
    }

    /// `message_index` is carried on the wire for these variants (§3 Encapsulated Frame).
    pub fn carries_message_index(self) -> bool {
        matches!(
            self,
            Reliability::Reliable
                | Reliability::ReliableOrdered
                | Reliability::ReliableSequenced
                | Reliability::ReliableAckReceipt
                | Reliability::ReliableOrderedAckReceipt
        )
    }

    /// `order_index`/`order_channel` are carried on the wire for these variants.
    pub fn carries_order_index(self) -> bool {
        matches!(
            self,
            Reliability::UnreliableSequenced
                | Reliability::ReliableOrdered
                | Reliability::ReliableSequenced
                | Reliability::ReliableOrderedAckReceipt
        )
    }

    /// At-most-once delivery applies to `message_index`-bearing reliabilities (§3 invariants).
    pub fn is_reliable(self) -> bool {
        self.carries_message_index()
    }

    /// Only `ReliableOrdered` (and its ack-receipt twin) gets strict in-order delivery (§4.4.3).
    pub fn is_strictly_ordered(self) -> bool {
        matches!(
            self,
            Reliability::ReliableOrdered | Reliability::ReliableOrderedAckReceipt
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitInfo {
    pub count: u32,
    pub id: u16,
    pub index: u32,
}

/// One application message framed with reliability, ordering, and split metadata (§3).
#[derive(Debug, Clone)]
pub struct EncapsulatedFrame {
    pub reliability: Reliability,
    pub message_index: Option<u32>,
    pub order_index: Option<u32>,
    pub order_channel: Option<u8>,
    pub split: Option<SplitInfo>,
    pub payload: Bytes,
}

const FLAG_SPLIT: u8 = 0x10;

impl EncapsulatedFrame {
    /// Size this frame would occupy once encoded, used by the send scheduler to
    /// decide when a pending batch must be flushed as a datagram.
    pub fn encoded_len(&self) -> usize {
        let mut len = 1 /* flags */ + 2 /* length-in-bits */;
        if self.message_index.is_some() {
            len += 3;
        }
        if self.order_index.is_some() {
            len += 3 + 1;
        }
        if self.split.is_some() {
            len += 4 + 2 + 4;
        }
        len + self.payload.len()
    }

    pub fn encode(&self, writer: &mut BinaryWriter) -> Result<()> {
        let flags = ((self.reliability as u8) << 5) | if self.split.is_some() { FLAG_SPLIT } else { 0 };
        writer.write_u8(flags)?;
        let length_in_bits = (self.payload.len() as u32)
            .checked_mul(8)
            .ok_or(WireError::LengthMismatch {
                declared: self.payload.len(),
                actual: self.payload.len(),
            })?;
        writer.write_u16(length_in_bits as u16)?;

        if let Some(message_index) = self.message_index {
            writer.write_u24_le(message_index)?;
        }
        if let Some(order_index) = self.order_index {
            writer.write_u24_le(order_index)?;
            writer.write_u8(self.order_channel.unwrap_or(0))?;
        }
        if let Some(split) = self.split {
            writer.write_u32(split.count)?;
            writer.write_u16(split.id)?;
            writer.write_u32(split.index)?;
        }
        writer.write_bytes(&self.payload)?;
        Ok(())
    }

    pub fn decode(reader: &mut BinaryReader) -> Result<Self> {
        let flags = reader.read_u8()?;
        let reliability = Reliability::from_u8(flags >> 5)?;
        let has_split = flags & FLAG_SPLIT != 0;

        let length_in_bits = reader.read_u16()? as usize;
        let payload_len = length_in_bits.div_ceil(8);
        if payload_len > reader.remaining() {
            return Err(WireError::LengthMismatch {
                declared: payload_len,
                actual: reader.remaining(),
            });
        }

        let message_index = if reliability.carries_message_index() {
            Some(reader.read_u24_le()?)
        } else {
            None
        };
        let (order_index, order_channel) = if reliability.carries_order_index() {
            let index = reader.read_u24_le()?;
            let channel = reader.read_u8()?;
            (Some(index), Some(channel))
        } else {
            (None, None)
        };
        let split = if has_split {
            let count = reader.read_u32()?;
            let id = reader.read_u16()?;
            let index = reader.read_u32()?;
            Some(SplitInfo { count, id, index })
        } else {
            None
        };

        let payload = reader.read_bytes(payload_len)?;

        Ok(EncapsulatedFrame {
            reliability,
            message_index,
            order_index,
            order_channel,
            split,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(reliability: Reliability, split: Option<SplitInfo>, payload: &[u8]) -> EncapsulatedFrame {
        EncapsulatedFrame {
            reliability,
            message_index: reliability.carries_message_index().then_some(42),
            order_index: reliability.carries_order_index().then_some(7),
            order_channel: reliability.carries_order_index().then_some(3),
            split,
            payload: Bytes::copy_from_slice(payload),
        }
    }

    #[test]
    fn round_trip_every_reliability_with_and_without_split() {
        let all = [
            Reliability::Unreliable,
            Reliability::UnreliableSequenced,
            Reliability::Reliable,
            Reliability::ReliableOrdered,
            Reliability::ReliableSequenced,
            Reliability::UnreliableAckReceipt,
            Reliability::ReliableAckReceipt,
            Reliability::ReliableOrderedAckReceipt,
        ];
        for reliability in all {
            for split in [None, Some(SplitInfo { count: 3, id: 99, index: 1 })] {
                let original = frame(reliability, split, b"hello world");
                let mut writer = BinaryWriter::new();
                original.encode(&mut writer).unwrap();
                let bytes = writer.freeze();
                let mut reader = BinaryReader::new(bytes);
                let decoded = EncapsulatedFrame::decode(&mut reader).unwrap();

                assert_eq!(decoded.reliability, original.reliability);
                assert_eq!(decoded.message_index, original.message_index);
                assert_eq!(decoded.order_index, original.order_index);
                assert_eq!(decoded.order_channel, original.order_channel);
                assert_eq!(decoded.split, original.split);
                assert_eq!(decoded.payload, original.payload);
            }
        }
    }

    #[test]
    fn length_in_bits_matches_payload() {
        let original = frame(Reliability::Unreliable, None, b"0123456789");
        let mut writer = BinaryWriter::new();
        original.encode(&mut writer).unwrap();
        let bytes = writer.freeze();
        let length_in_bits = u16::from_be_bytes([bytes[1], bytes[2]]);
        assert_eq!(length_in_bits as usize, original.payload.len() * 8);
    }

    #[test]
    fn truncated_buffer_is_an_error_not_a_panic() {
        let mut writer = BinaryWriter::new();
        frame(Reliability::Reliable, None, b"payload").encode(&mut writer).unwrap();
        let mut bytes = writer.freeze();
        bytes.truncate(bytes.len() - 2);
        let mut reader = BinaryReader::new(bytes);
        assert!(EncapsulatedFrame::decode(&mut reader).is_err());
    }
}
