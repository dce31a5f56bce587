use super::{Result, WireError};
use crate::consts::{MAX_ACK_RANGE_SIZE, MAX_ACK_RECORDS_EXPANDED};
use amethyst_binary::{BinaryReader, BinaryWriter};

const RECORD_RANGE: u8 = 0;
const RECORD_SINGLE: u8 = 1;

/// A run-length-compressed list of sequence numbers, shared by ACK (`0xC0`) and
/// NACK (`0xA0`) packets (§4.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckNack {
    /// Inclusive `(start, end)` ranges; `start == end` for a singleton.
    pub records: Vec<(u32, u32)>,
}

impl AckNack {
    /// Builds the run-length-compressed record list from an arbitrary set of
    /// sequence numbers, e.g. `[1,2,3,4,5]` collapses to a single range record.
    pub fn from_sequence_numbers(mut seqs: Vec<u32>) -> Self {
        seqs.sort_unstable();
        seqs.dedup();

        let mut records = Vec::new();
        let mut iter = seqs.into_iter();
        if let Some(mut start) = iter.next() {
            let mut end = start;
            for seq in iter {
                if seq == end + 1 {
                    end = seq;
                } else {
                    records.push((start, end));
                    start = seq;
                    end = seq;
                }
            }
            records.push((start, end));
        }
        AckNack { records }
    }

    /// Expands the record list back into individual sequence numbers, bounded to
    /// guard against a hostile or corrupt record count.
    pub fn sequence_numbers(&self) -> Vec<u32> {
        let mut out = Vec::new();
        for &(start, end) in &self.records {
            for seq in start..=end {
                out.push(seq);
                if out.len() >= MAX_ACK_RECORDS_EXPANDED {
                    return out;
                }
            }
        }
        out
    }

    pub fn encode(&self, writer: &mut BinaryWriter) -> Result<()> {
        writer.write_u16(self.records.len() as u16)?;
        for &(start, end) in &self.records {
            if start == end {
                writer.write_u8(RECORD_SINGLE)?;
                writer.write_u24_le(start)?;
            } else {
                writer.write_u8(RECORD_RANGE)?;
                writer.write_u24_le(start)?;
                writer.write_u24_le(end)?;
            }
        }
        Ok(())
    }

    pub fn decode(reader: &mut BinaryReader) -> Result<Self> {
        let count = reader.read_u16()? as usize;
        let mut records = Vec::with_capacity(count.min(MAX_ACK_RECORDS_EXPANDED));
        let mut expanded = 0usize;
        for _ in 0..count {
            let flag = reader.read_u8()?;
            let (start, end) = match flag {
                RECORD_RANGE => {
                    let start = reader.read_u24_le()?;
                    let end = reader.read_u24_le()?;
                    if end < start || end - start + 1 > MAX_ACK_RANGE_SIZE {
                        return Err(WireError::BadFlags(flag));
                    }
                    (start, end)
                }
                RECORD_SINGLE => {
                    let seq = reader.read_u24_le()?;
                    (seq, seq)
                }
                other => return Err(WireError::BadFlags(other)),
            };
            expanded += (end - start + 1) as usize;
            if expanded > MAX_ACK_RECORDS_EXPANDED {
                return Err(WireError::LengthMismatch {
                    declared: expanded,
                    actual: MAX_ACK_RECORDS_EXPANDED,
                });
            }
            records.push((start, end));
        }
        Ok(AckNack { records })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consecutive_run_becomes_one_range_record() {
        let ack = AckNack::from_sequence_numbers(vec![1, 2, 3, 4, 5]);
        assert_eq!(ack.records, vec![(1, 5)]);
    }

    #[test]
    fn decode_of_encode_reproduces_original_sequence_list() {
        let original = vec![0u32, 1, 2, 5, 9, 10, 11, 100];
        let ack = AckNack::from_sequence_numbers(original.clone());
        let mut writer = BinaryWriter::new();
        ack.encode(&mut writer).unwrap();
        let mut reader = BinaryReader::new(writer.freeze());
        let decoded = AckNack::decode(&mut reader).unwrap();
        assert_eq!(decoded.sequence_numbers(), original);
    }

    #[test]
    fn non_consecutive_values_stay_as_singles() {
        let ack = AckNack::from_sequence_numbers(vec![3, 5, 7]);
        assert_eq!(ack.records, vec![(3, 3), (5, 5), (7, 7)]);
    }

    #[test]
    fn oversized_range_record_is_rejected() {
        let mut writer = BinaryWriter::new();
        writer.write_u16(1).unwrap();
        writer.write_u8(RECORD_RANGE).unwrap();
        writer.write_u24_le(0).unwrap();
        writer.write_u24_le(MAX_ACK_RANGE_SIZE + 10).unwrap();
        let mut reader = BinaryReader::new(writer.freeze());
        assert!(AckNack::decode(&mut reader).is_err());
    }
}
