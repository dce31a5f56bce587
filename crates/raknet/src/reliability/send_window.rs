use crate::consts::{RECOVERY_QUEUE_SOFT_CAP, RECOVERY_TIMEOUT};
use crate::seq::wrapping_add_one;
use crate::wire::ack::AckNack;
use crate::wire::frame::EncapsulatedFrame;
use std::collections::BTreeMap;
use tokio::time::Instant;

struct RecoveryEntry {
    frames: Vec<EncapsulatedFrame>,
    sent_at: Instant,
}

/// Outbound sequence numbering and the recovery queue that backs retransmission
/// (§3 Recovery queue, §4.3 send-side algorithm).
///
/// Retransmission never resends a datagram under its original sequence number:
/// on NACK or recovery timeout the frames are handed back to the caller, which
/// re-submits them through [`Self::next_sequence`] and a fresh
/// [`Self::record_sent`] call. Only the `message_index`/`order_index` carried by
/// each frame survive the resend, exactly as required by §4.3.
pub struct SendWindow {
    next_send_seq: u32,
    recovery: BTreeMap<u32, RecoveryEntry>,
}

impl SendWindow {
    pub fn new() -> Self {
        Self {
            next_send_seq: 0,
            recovery: BTreeMap::new(),
        }
    }

    pub fn next_sequence(&mut self) -> u32 {
        let seq = self.next_send_seq;
        self.next_send_seq = wrapping_add_one(seq);
        seq
    }

    /// Records a just-sent datagram's frames in the recovery queue, evicting the
    /// oldest entry first if the soft cap is exceeded.
    pub fn record_sent(&mut self, seq: u32, frames: Vec<EncapsulatedFrame>, now: Instant) {
        if self.recovery.len() >= RECOVERY_QUEUE_SOFT_CAP {
            if let Some(&oldest_seq) = self
                .recovery
                .iter()
                .min_by_key(|(_, entry)| entry.sent_at)
                .map(|(seq, _)| seq)
            {
                self.recovery.remove(&oldest_seq);
            }
        }
        self.recovery.insert(seq, RecoveryEntry { frames, sent_at: now });
    }

    pub fn handle_ack(&mut self, ack: &AckNack) {
        for seq in ack.sequence_numbers() {
            self.recovery.remove(&seq);
        }
    }

    /// Pops every NACKed, still-outstanding datagram's frames for resend.
    pub fn handle_nack(&mut self, nack: &AckNack) -> Vec<Vec<EncapsulatedFrame>> {
        nack.sequence_numbers()
            .into_iter()
            .filter_map(|seq| self.recovery.remove(&seq).map(|entry| entry.frames))
            .collect()
    }

    /// Pops every recovery entry that has aged past the retransmit timeout.
    pub fn sweep_timeouts(&mut self, now: Instant) -> Vec<Vec<EncapsulatedFrame>> {
        let expired: Vec<u32> = self
            .recovery
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.sent_at) >= RECOVERY_TIMEOUT)
            .map(|(&seq, _)| seq)
            .collect();
        expired
            .into_iter()
            .filter_map(|seq| self.recovery.remove(&seq).map(|entry| entry.frames))
            .collect()
    }

    pub fn recovery_len(&self) -> usize {
        self.recovery.len()
    }
}

impl Default for SendWindow {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::frame::Reliability;
    use bytes::Bytes;
    use std::time::Duration;

    fn frame() -> EncapsulatedFrame {
        EncapsulatedFrame {
            reliability: Reliability::Reliable,
            message_index: Some(7),
            order_index: None,
            order_channel: None,
            split: None,
            payload: Bytes::from_static(b"hi"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ack_clears_recovery_entry() {
        let mut window = SendWindow::new();
        let seq = window.next_sequence();
        window.record_sent(seq, vec![frame()], Instant::now());
        assert_eq!(window.recovery_len(), 1);
        window.handle_ack(&AckNack::from_sequence_numbers(vec![seq]));
        assert_eq!(window.recovery_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn nack_returns_frames_with_message_index_preserved() {
        let mut window = SendWindow::new();
        let seq = window.next_sequence();
        window.record_sent(seq, vec![frame()], Instant::now());
        let resend = window.handle_nack(&AckNack::from_sequence_numbers(vec![seq]));
        assert_eq!(resend.len(), 1);
        assert_eq!(resend[0][0].message_index, Some(7));
        assert_eq!(window.recovery_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_sweep_retransmits_under_a_fresh_sequence_number() {
        let mut window = SendWindow::new();
        let seq = window.next_sequence();
        window.record_sent(seq, vec![frame()], Instant::now());

        tokio::time::advance(Duration::from_secs(9)).await;
        let resent = window.sweep_timeouts(Instant::now());
        assert_eq!(resent.len(), 1);

        let fresh_seq = window.next_sequence();
        assert_ne!(fresh_seq, seq);
        assert_eq!(resent[0][0].message_index, Some(7));
    }
}
