use crate::consts::RECEIVE_WINDOW_SIZE;
use crate::seq::{in_window, wrapping_add, wrapping_diff};
use crate::wire::ack::AckNack;
use std::collections::BTreeSet;

/// Sliding window of expected sequence numbers plus duplicate suppression for
/// inbound data packets (§3 Receive window, §4.3 receive-side algorithm).
pub struct ReceiveWindow {
    window_start: u32,
    last_seq: Option<u32>,
    seen: BTreeSet<u32>,
    pending_acks: Vec<u32>,
    pending_nacks: BTreeSet<u32>,
}

impl ReceiveWindow {
    pub fn new() -> Self {
        Self {
            window_start: 0,
            last_seq: None,
            seen: BTreeSet::new(),
            pending_acks: Vec::new(),
            pending_nacks: BTreeSet::new(),
        }
    }

    /// Runs the five-step receive algorithm for one arriving sequence number.
    /// Returns `true` if the datagram should be processed further (not a
    /// duplicate or out-of-window drop).
    pub fn handle_sequence(&mut self, seq: u32) -> bool {
        if !in_window(seq, self.window_start, RECEIVE_WINDOW_SIZE) || self.seen.contains(&seq) {
            return false;
        }

        self.pending_acks.push(seq);
        self.pending_nacks.remove(&seq);

        match self.last_seq {
            Some(last) => {
                let diff = wrapping_diff(seq, last);
                if diff > 1 {
                    let mut gap = wrapping_add(last, 1);
                    for _ in 0..(diff - 1) {
                        if !self.seen.contains(&gap) {
                            self.pending_nacks.insert(gap);
                        }
                        gap = wrapping_add(gap, 1);
                    }
                }
                if diff >= 1 {
                    self.window_start = wrapping_add(self.window_start, diff as u32);
                    self.last_seq = Some(seq);
                }
            }
            None => self.last_seq = Some(seq),
        }

        self.seen.insert(seq);
        self.gc_seen();
        true
    }

    fn gc_seen(&mut self) {
        let start = self.window_start;
        self.seen
            .retain(|&s| in_window(s, start, RECEIVE_WINDOW_SIZE));
    }

    /// Drains the pending-ACK set into an ACK packet, if any accumulated since the last flush.
    pub fn take_ack(&mut self) -> Option<AckNack> {
        if self.pending_acks.is_empty() {
            return None;
        }
        let seqs = std::mem::take(&mut self.pending_acks);
        Some(AckNack::from_sequence_numbers(seqs))
    }

    /// Drains the pending-NACK set into a NACK packet, if any gaps are outstanding.
    pub fn take_nack(&mut self) -> Option<AckNack> {
        if self.pending_nacks.is_empty() {
            return None;
        }
        let seqs = std::mem::take(&mut self.pending_nacks).into_iter().collect();
        Some(AckNack::from_sequence_numbers(seqs))
    }
}

impl Default for ReceiveWindow {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_order_sequence_produces_no_nacks() {
        let mut window = ReceiveWindow::new();
        for seq in 0..5 {
            assert!(window.handle_sequence(seq));
        }
        assert!(window.take_nack().is_none());
        assert_eq!(window.take_ack().unwrap().sequence_numbers(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn gap_produces_nack_for_missing_sequence_numbers() {
        let mut window = ReceiveWindow::new();
        for seq in [0u32, 1, 2, 5] {
            window.handle_sequence(seq);
        }
        let nack = window.take_nack().unwrap();
        assert_eq!(nack.sequence_numbers(), vec![3, 4]);

        window.handle_sequence(3);
        window.handle_sequence(4);
        assert!(window.take_nack().is_none());
    }

    #[test]
    fn duplicate_sequence_number_is_dropped() {
        let mut window = ReceiveWindow::new();
        assert!(window.handle_sequence(0));
        assert!(!window.handle_sequence(0));
    }

    #[test]
    fn sequence_number_outside_window_is_dropped() {
        let mut window = ReceiveWindow::new();
        assert!(!window.handle_sequence(RECEIVE_WINDOW_SIZE + 10));
    }
}
