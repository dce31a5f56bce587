use crate::consts::{ORDER_CHANNEL_COUNT, RECEIVE_WINDOW_SIZE};
use crate::seq::{in_window, wrapping_add_one};
use crate::wire::frame::EncapsulatedFrame;
use std::collections::{BTreeMap, BTreeSet};

/// Tracks already-delivered `message_index` values for at-most-once delivery
/// (§3 invariants, §4.4 step 2-3). Bounded the same way the receive window is:
/// a sliding low-water mark plus a seen-set, so a long-lived session never grows
/// this set unboundedly.
struct MessageWindow {
    window_start: u32,
    seen: BTreeSet<u32>,
}

impl MessageWindow {
    fn new() -> Self {
        Self {
            window_start: 0,
            seen: BTreeSet::new(),
        }
    }

    /// Returns `true` if `index` is new and should be delivered, recording it.
    /// Returns `false` if it's a duplicate or has fallen outside the window.
    fn check_and_record(&mut self, index: u32) -> bool {
        if !in_window(index, self.window_start, RECEIVE_WINDOW_SIZE) {
            return false;
        }
        if !self.seen.insert(index) {
            return false;
        }
        while self.seen.contains(&self.window_start) {
            self.seen.remove(&self.window_start);
            self.window_start = wrapping_add_one(self.window_start);
        }
        self.seen
            .retain(|&s| in_window(s, self.window_start, RECEIVE_WINDOW_SIZE));
        true
    }
}

struct OrderChannel {
    expected_next_index: u32,
    buffer: BTreeMap<u32, EncapsulatedFrame>,
}

impl OrderChannel {
    fn new() -> Self {
        Self {
            expected_next_index: 0,
            buffer: BTreeMap::new(),
        }
    }
}

/// Per-session message-index dedup plus the 32 per-channel ordered delivery
/// buffers used for `ReliableOrdered` frames (§3 Per-channel order buffer, §4.4).
pub struct OrderState {
    messages: MessageWindow,
    channels: Vec<OrderChannel>,
}

impl OrderState {
    pub fn new() -> Self {
        Self {
            messages: MessageWindow::new(),
            channels: (0..ORDER_CHANNEL_COUNT).map(|_| OrderChannel::new()).collect(),
        }
    }

    /// §4.4 step 2/3: message-index dedup and reliable-window bound check.
    /// Applies to every reliability that carries a `message_index`.
    pub fn admit_message_index(&mut self, message_index: u32) -> bool {
        self.messages.check_and_record(message_index)
    }

    /// §4.4 step 3: strict in-order delivery for `ReliableOrdered` frames.
    /// Returns every frame now ready for the application, in order, including
    /// any frames this delivery unblocks from the buffer.
    pub fn deliver_ordered(
        &mut self,
        channel: u8,
        order_index: u32,
        frame: EncapsulatedFrame,
    ) -> Vec<EncapsulatedFrame> {
        let ch = &mut self.channels[channel as usize % ORDER_CHANNEL_COUNT];
        let mut ready = Vec::new();

        if order_index != ch.expected_next_index {
            ch.buffer.insert(order_index, frame);
            return ready;
        }

        ready.push(frame);
        ch.expected_next_index = wrapping_add_one(ch.expected_next_index);
        while let Some(next) = ch.buffer.remove(&ch.expected_next_index) {
            ready.push(next);
            ch.expected_next_index = wrapping_add_one(ch.expected_next_index);
        }
        ready
    }
}

impl Default for OrderState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::frame::Reliability;
    use bytes::Bytes;

    fn ordered_frame(order_index: u32, tag: u8) -> EncapsulatedFrame {
        EncapsulatedFrame {
            reliability: Reliability::ReliableOrdered,
            message_index: Some(order_index),
            order_index: Some(order_index),
            order_channel: Some(0),
            split: None,
            payload: Bytes::copy_from_slice(&[tag]),
        }
    }

    #[test]
    fn duplicate_message_index_is_dropped() {
        let mut state = OrderState::new();
        assert!(state.admit_message_index(5));
        assert!(!state.admit_message_index(5));
    }

    #[test]
    fn out_of_order_permutation_delivers_strictly_in_order() {
        let mut state = OrderState::new();
        let permutation = [2u32, 0, 1, 4, 3];
        let mut delivered = Vec::new();
        for &idx in &permutation {
            let ready = state.deliver_ordered(0, idx, ordered_frame(idx, idx as u8));
            delivered.extend(ready.into_iter().map(|f| f.payload[0]));
        }
        assert_eq!(delivered, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn channels_are_independent() {
        let mut state = OrderState::new();
        let ready0 = state.deliver_ordered(0, 0, ordered_frame(0, 0));
        let ready1 = state.deliver_ordered(1, 5, ordered_frame(5, 9));
        assert_eq!(ready0.len(), 1);
        assert!(ready1.is_empty(), "channel 1 still waiting on index 0");
    }
}
