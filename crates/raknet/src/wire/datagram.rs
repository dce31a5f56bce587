use super::frame::EncapsulatedFrame;
use super::{Result, WireError};
use crate::consts::{FRAME_SET_ID_MAX, FRAME_SET_ID_MIN};
use amethyst_binary::{BinaryReader, BinaryWriter};

/// Header byte this server stamps on every outbound data packet: "valid" plus the
/// needs-B-and-AS hint real RakNet peers expect to see set.
pub const DATAGRAM_HEADER: u8 = 0x84;

/// One UDP datagram carrying a sequence number and a batch of encapsulated frames (§3).
#[derive(Debug, Clone)]
pub struct DataPacket {
    pub sequence_number: u32,
    pub frames: Vec<EncapsulatedFrame>,
}

impl DataPacket {
    pub fn is_data_packet_header(head: u8) -> bool {
        (FRAME_SET_ID_MIN..=FRAME_SET_ID_MAX).contains(&head)
    }

    pub fn encode(&self, writer: &mut BinaryWriter) -> Result<()> {
        writer.write_u8(DATAGRAM_HEADER)?;
        writer.write_u24_le(self.sequence_number)?;
        for frame in &self.frames {
            frame.encode(writer)?;
        }
        Ok(())
    }

    /// Decodes a full datagram body, including the leading header byte, returning
    /// every encapsulated frame packed inside it.
    pub fn decode(reader: &mut BinaryReader) -> Result<Self> {
        let head = reader.read_u8()?;
        if !Self::is_data_packet_header(head) {
            return Err(WireError::BadFlags(head));
        }
        let sequence_number = reader.read_u24_le()?;
        let mut frames = Vec::new();
        while reader.has_remaining() {
            frames.push(EncapsulatedFrame::decode(reader)?);
        }
        Ok(DataPacket {
            sequence_number,
            frames,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::frame::Reliability;
    use bytes::Bytes;

    fn unreliable_frame(payload: &[u8]) -> EncapsulatedFrame {
        EncapsulatedFrame {
            reliability: Reliability::Unreliable,
            message_index: None,
            order_index: None,
            order_channel: None,
            split: None,
            payload: Bytes::copy_from_slice(payload),
        }
    }

    #[test]
    fn round_trips_a_batch_of_frames() {
        let packet = DataPacket {
            sequence_number: 12345,
            frames: vec![unreliable_frame(b"one"), unreliable_frame(b"two")],
        };
        let mut writer = BinaryWriter::new();
        packet.encode(&mut writer).unwrap();
        let mut reader = BinaryReader::new(writer.freeze());
        let decoded = DataPacket::decode(&mut reader).unwrap();
        assert_eq!(decoded.sequence_number, 12345);
        assert_eq!(decoded.frames.len(), 2);
        assert_eq!(decoded.frames[0].payload, Bytes::from_static(b"one"));
        assert_eq!(decoded.frames[1].payload, Bytes::from_static(b"two"));
    }

    #[test]
    fn rejects_header_outside_data_packet_range() {
        let mut reader = BinaryReader::new(Bytes::from_static(&[0x01, 0, 0, 0]));
        assert!(DataPacket::decode(&mut reader).is_err());
    }
}
