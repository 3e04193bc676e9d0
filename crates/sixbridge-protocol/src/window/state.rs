//! Send and receive window state for one serial link.
//!
//! The sender numbers frames with `++last_frame` and keeps a copy of each until
//! it is acknowledged. The receiver accepts frames in `[next_exp, next_exp +
//! RWS - 1]`, buffers them by `seq % RWS`, and releases the contiguous run
//! starting at `next_exp`, answering with one cumulative ACK.
//!
//! All window comparisons use serial-number arithmetic so the 8-bit counters
//! wrap without confusing old frames for new ones.

use std::net::Ipv6Addr;

use sixbridge_core::packet::set_seq_num;
use sixbridge_core::serial::{SerialOrdering, in_window, serial_compare};
use sixbridge_core::SynPacket;

use super::constants::{INITIAL_LAST_FRAME, is_valid_window};
use crate::error::WindowError;

/// An outstanding frame and the generation that owns its retransmissions.
#[derive(Debug, Clone, Default)]
struct SendSlot {
    frame: Option<Vec<u8>>,
    /// Bumped whenever the slot is filled or freed. A retransmission scheduled
    /// for an older generation is stale.
    generation: u64,
}

/// A frame that has just been given a sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assigned {
    pub seq: u8,
    pub slot: usize,
    pub generation: u64,
    /// The frame with its sequence number stamped, ready to transmit.
    pub frame: Vec<u8>,
}

/// Outcome of handing a data frame to the receive window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Accepted {
    /// Frames released for delivery, in sequence order.
    pub delivered: Vec<Vec<u8>>,
    /// Cumulative acknowledgement to send, if any.
    pub ack: Option<u8>,
}

/// Sliding-window state.
///
/// This struct is decoupled from I/O and from synchronization: the caller wraps
/// it in a lock and acts on the decisions it returns.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    send_window: u8,
    recv_window: u8,

    // ---- Sender ----
    /// Highest sequence number assigned.
    last_frame: u8,
    /// Highest sequence number acknowledged.
    last_ack: u8,
    send_slots: Vec<SendSlot>,

    // ---- Receiver ----
    /// Next sequence number expected for in-order delivery.
    next_exp: u8,
    recv_slots: Vec<Option<Vec<u8>>>,
}

impl SlidingWindow {
    pub fn new(send_window: u8, recv_window: u8) -> Result<Self, WindowError> {
        for size in [send_window, recv_window] {
            if !is_valid_window(size) {
                return Err(WindowError::InvalidSize(size));
            }
        }
        tracing::debug!(send_window, recv_window, "window: init");
        Ok(Self {
            send_window,
            recv_window,
            last_frame: INITIAL_LAST_FRAME,
            last_ack: INITIAL_LAST_FRAME,
            send_slots: vec![SendSlot::default(); send_window as usize],
            next_exp: 0,
            recv_slots: vec![None; recv_window as usize],
        })
    }

    /// Forget every outstanding and buffered frame and restart numbering.
    ///
    /// Slot generations keep counting so retransmissions scheduled before the
    /// reset stay stale.
    pub fn reset(&mut self) {
        self.last_frame = INITIAL_LAST_FRAME;
        self.last_ack = INITIAL_LAST_FRAME;
        self.next_exp = 0;
        for slot in &mut self.send_slots {
            slot.frame = None;
            slot.generation += 1;
        }
        for slot in &mut self.recv_slots {
            *slot = None;
        }
        tracing::debug!("window: reset");
    }

    pub fn send_window(&self) -> u8 {
        self.send_window
    }

    pub fn recv_window(&self) -> u8 {
        self.recv_window
    }

    pub fn last_frame(&self) -> u8 {
        self.last_frame
    }

    pub fn last_ack(&self) -> u8 {
        self.last_ack
    }

    pub fn next_exp(&self) -> u8 {
        self.next_exp
    }

    /// Number of frames sent but not yet acknowledged.
    pub fn outstanding(&self) -> u8 {
        self.last_frame.wrapping_sub(self.last_ack)
    }

    /// The connection request announcing where both directions start.
    pub fn syn(&self, addr: Ipv6Addr) -> SynPacket {
        SynPacket {
            next_seq_num: self.last_frame.wrapping_add(1),
            next_exp: self.next_exp,
            addr,
        }
    }

    // ------------------------------------------------------------------ //
    // Sender
    // ------------------------------------------------------------------ //

    /// Give `frame` the next sequence number and keep a copy in its slot.
    pub fn assign(&mut self, mut frame: Vec<u8>) -> Result<Assigned, WindowError> {
        let outstanding = self.outstanding();
        if outstanding >= self.send_window {
            return Err(WindowError::Full { outstanding });
        }

        let seq = self.last_frame.wrapping_add(1);
        let index = self.send_index(seq);
        set_seq_num(&mut frame, seq);

        let slot = &mut self.send_slots[index];
        slot.generation += 1;
        slot.frame = Some(frame.clone());
        self.last_frame = seq;

        tracing::trace!(seq, slot = index, generation = slot.generation, "window: assigned");

        Ok(Assigned {
            seq,
            slot: index,
            generation: slot.generation,
            frame,
        })
    }

    /// The bytes to retransmit for `slot`, if `generation` still owns it.
    pub fn retransmission(&self, slot: usize, generation: u64) -> Option<Vec<u8>> {
        let slot = self.send_slots.get(slot)?;
        if slot.generation != generation {
            return None;
        }
        slot.frame.clone()
    }

    /// Process an acknowledgement for `seq`.
    ///
    /// Acknowledges every frame up to and including `seq` when it falls within
    /// `(last_ack, last_frame]`, and returns how many slots were freed. Anything
    /// else is stale or bogus and frees nothing.
    pub fn acknowledge(&mut self, seq: u8) -> usize {
        let lo = self.last_ack.wrapping_add(1);
        if !in_window(seq, lo, self.last_frame) {
            tracing::trace!(
                seq,
                last_ack = self.last_ack,
                last_frame = self.last_frame,
                "window: ACK outside send window"
            );
            return 0;
        }

        let mut freed = 0;
        while self.last_ack != seq {
            self.last_ack = self.last_ack.wrapping_add(1);
            let index = self.send_index(self.last_ack);
            let slot = &mut self.send_slots[index];
            slot.frame = None;
            slot.generation += 1;
            freed += 1;
        }
        tracing::trace!(seq, freed, "window: acknowledged");
        freed
    }

    // ------------------------------------------------------------------ //
    // Receiver
    // ------------------------------------------------------------------ //

    /// Hand a received data frame with sequence number `seq` to the window.
    pub fn accept(&mut self, seq: u8, frame: Vec<u8>) -> Accepted {
        let hi = self.next_exp.wrapping_add(self.recv_window - 1);
        if !in_window(seq, self.next_exp, hi) {
            if serial_compare(seq, self.next_exp) == SerialOrdering::Less {
                // Already delivered: our ACK was lost, repeat it.
                tracing::debug!(seq, next_exp = self.next_exp, "window: duplicate frame");
                return Accepted {
                    delivered: Vec::new(),
                    ack: Some(self.next_exp.wrapping_sub(1)),
                };
            }
            tracing::debug!(seq, next_exp = self.next_exp, "window: frame beyond window");
            return Accepted::default();
        }

        let index = self.recv_index(seq);
        self.recv_slots[index] = Some(frame);

        let mut delivered = Vec::new();
        loop {
            let index = self.recv_index(self.next_exp);
            let Some(frame) = self.recv_slots[index].take() else {
                break;
            };
            delivered.push(frame);
            self.next_exp = self.next_exp.wrapping_add(1);
        }

        tracing::trace!(
            seq,
            delivered = delivered.len(),
            next_exp = self.next_exp,
            "window: accepted"
        );

        Accepted {
            delivered,
            ack: Some(self.next_exp.wrapping_sub(1)),
        }
    }

    fn send_index(&self, seq: u8) -> usize {
        (seq % self.send_window) as usize
    }

    fn recv_index(&self, seq: u8) -> usize {
        (seq % self.recv_window) as usize
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn frame(tag: u8) -> Vec<u8> {
        vec![0x00, 0x03, tag, 0x86, 0xDD]
    }

    fn window_size() -> impl Strategy<Value = u8> {
        (0u32..=6).prop_map(|exp| 1u8 << exp)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(128))]

        #[test]
        fn shuffled_window_delivered_in_order(
            (rws, order) in (0u32..=4).prop_flat_map(|exp| {
                let rws = 1u8 << exp;
                (Just(rws), Just((0..rws).collect::<Vec<u8>>()).prop_shuffle())
            }),
            start in any::<u8>(),
        ) {
            let mut w = SlidingWindow::new(1, rws).unwrap();
            let mut seq = 0u8;
            while seq != start {
                w.accept(seq, frame(seq));
                seq = seq.wrapping_add(1);
            }

            let mut delivered = Vec::new();
            for offset in order {
                let seq = start.wrapping_add(offset);
                delivered.extend(w.accept(seq, frame(seq)).delivered);
            }

            let expected: Vec<Vec<u8>> = (0..rws).map(|o| frame(start.wrapping_add(o))).collect();
            prop_assert_eq!(delivered, expected);
            prop_assert_eq!(w.next_exp(), start.wrapping_add(rws));
        }

        #[test]
        fn acknowledge_never_frees_more_than_outstanding(
            sws in window_size(),
            sent in any::<u8>(),
            ack in any::<u8>(),
            warmup in 0u16..300,
        ) {
            let mut w = SlidingWindow::new(sws, 1).unwrap();
            for _ in 0..warmup {
                let a = w.assign(frame(0)).unwrap();
                w.acknowledge(a.seq);
            }
            for _ in 0..sent % (sws + 1) {
                w.assign(frame(0)).unwrap();
            }

            let before = usize::from(w.outstanding());
            let freed = w.acknowledge(ack);
            prop_assert!(freed <= before);
            prop_assert_eq!(usize::from(w.outstanding()), before - freed);
        }
    }
}
