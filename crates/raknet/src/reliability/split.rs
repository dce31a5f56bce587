use crate::consts::{MAX_CONCURRENT_SPLITS, MAX_FRAGMENTS_PER_SPLIT};
use crate::error::RakNetError;
use crate::wire::frame::{EncapsulatedFrame, Reliability, SplitInfo};
use bytes::{Bytes, BytesMut};
use std::collections::BTreeMap;
use tokio::time::Instant;

struct SplitAssembly {
    count: u32,
    parts: BTreeMap<u32, Bytes>,
    reliability: Reliability,
    message_index: Option<u32>,
    order_index: Option<u32>,
    order_channel: Option<u8>,
    created_at: Instant,
}

/// Per-split-ID fragment assembly table, bounded by `max_concurrent_splits` and
/// `max_fragments_per_split` (§3 Split assembly table, §4.4 step 1).
pub struct SplitTable {
    splits: BTreeMap<u16, SplitAssembly>,
}

impl SplitTable {
    pub fn new() -> Self {
        Self {
            splits: BTreeMap::new(),
        }
    }

    /// Feeds one fragment into the assembly table. Returns `Some(frame)` with the
    /// reassembled, non-split frame once every fragment has arrived.
    pub fn handle_fragment(
        &mut self,
        frame: EncapsulatedFrame,
        now: Instant,
    ) -> Result<Option<EncapsulatedFrame>, RakNetError> {
        let split = frame.split.expect("caller only routes has_split frames here");

        if split.count > MAX_FRAGMENTS_PER_SPLIT || split.index >= split.count {
            return Err(RakNetError::InvalidSplitPacket(format!(
                "split {} declares index {} of {}",
                split.id, split.index, split.count
            )));
        }
        if !self.splits.contains_key(&split.id) && self.splits.len() >= MAX_CONCURRENT_SPLITS {
            return Err(RakNetError::TooManySplitPackets);
        }

        let entry = self.splits.entry(split.id).or_insert_with(|| SplitAssembly {
            count: split.count,
            parts: BTreeMap::new(),
            reliability: frame.reliability,
            message_index: frame.message_index,
            order_index: frame.order_index,
            order_channel: frame.order_channel,
            created_at: now,
        });
        entry.parts.insert(split.index, frame.payload);

        if entry.parts.len() as u32 != entry.count {
            return Ok(None);
        }

        let assembly = self.splits.remove(&split.id).expect("just inserted above");
        let mut payload = BytesMut::new();
        for index in 0..assembly.count {
            payload.extend_from_slice(&assembly.parts[&index]);
        }

        Ok(Some(EncapsulatedFrame {
            reliability: assembly.reliability,
            message_index: assembly.message_index,
            order_index: assembly.order_index,
            order_channel: assembly.order_channel,
            split: None,
            payload: payload.freeze(),
        }))
    }

    /// Drops in-flight splits older than the recovery timeout (§3 invariants).
    pub fn cleanup_timeouts(&mut self, now: Instant, timeout: std::time::Duration) {
        self.splits.retain(|_, assembly| now.duration_since(assembly.created_at) < timeout);
    }
}

impl Default for SplitTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Splits an oversized payload into `mtu - 34`-byte chunks, each its own
/// encapsulated frame sharing one `split_id` (§4.5 send scheduler). Every
/// fragment carries the parent's reliability and, for `ReliableOrdered`, the
/// same `order_channel`/`order_index` — reassembly happens on the whole
/// message, not per fragment. Each fragment still gets its own `message_index`.
pub fn fragment_payload(
    payload: Bytes,
    reliability: Reliability,
    order_channel: Option<u8>,
    order_index: Option<u32>,
    split_id: u16,
    mtu: u16,
    mut next_message_index: impl FnMut() -> u32,
) -> Vec<EncapsulatedFrame> {
    let chunk_size = (mtu as usize).saturating_sub(34).max(1);
    let split_count = payload.len().div_ceil(chunk_size) as u32;

    payload
        .chunks(chunk_size)
        .enumerate()
        .map(|(index, chunk)| EncapsulatedFrame {
            reliability,
            message_index: Some(next_message_index()),
            order_index,
            order_channel,
            split: Some(SplitInfo {
                count: split_count,
                id: split_id,
                index: index as u32,
            }),
            payload: Bytes::copy_from_slice(chunk),
        })
        .collect()
}
