//! Router relay engine: two chained half-duplex windows around one slot.
//!
//! ```text
//!   upstream                      router                       downstream
//!   ────DATA────▶ [left window: frameexpected] ─▶ slot ─▶ [right window: ackexpected] ────DATA────▶
//!   ◀────ACK─────                                                                     ◀────ACK─────
//!     link 1                                                                              link 2
//! ```
//!
//! The left window accepts a DATA frame only while the slot is empty.  It
//! acknowledges upstream immediately, then the right window forwards the
//! frame downstream and owns it (with its own retransmit timer) until the
//! downstream ACK frees the slot.  End-to-end delivery is therefore a chain of
//! independent single-hop stop-and-wait links.

use crate::event::{Action, LinkId};
use crate::frame::{Frame, FrameKind, SeqBit};
use crate::metrics::NodeStats;
use crate::state::ReceivePolicy;
use crate::timer::{LinkParams, RetransmitTimer, TimerToken};

/// The frame occupying the router's single slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedFrame {
    pub seq: SeqBit,
    pub payload: Vec<u8>,
    /// Encoded downstream DATA frame, re-sent verbatim on timeout.
    pub bytes: Vec<u8>,
    pub tx_count: u32,
}

#[derive(Debug)]
pub struct RouterEngine {
    /// Bit the next DATA frame from upstream must carry.
    pub frameexpected: SeqBit,
    /// Bit awaited in the downstream ACK for the buffered frame.
    pub ackexpected: SeqBit,
    /// Slot shared by both windows; `Some` means buffer full.
    pub slot: Option<BufferedFrame>,
    pub stats: NodeStats,
    policy: ReceivePolicy,
    timer: RetransmitTimer,
}

impl RouterEngine {
    /// A router whose downstream link has timing `downstream`.
    pub fn new(downstream: LinkParams, policy: ReceivePolicy) -> Self {
        Self {
            frameexpected: SeqBit::ZERO,
            ackexpected: SeqBit::ZERO,
            slot: None,
            stats: NodeStats::default(),
            policy,
            timer: RetransmitTimer::new(downstream),
        }
    }

    pub fn buffer_full(&self) -> bool {
        self.slot.is_some()
    }

    pub fn on_frame(&mut self, frame: Frame) -> Vec<Action> {
        match frame.kind {
            FrameKind::Data => self.on_data(frame),
            FrameKind::Ack => self.on_ack(frame.seq),
        }
    }

    // Left window.
    fn on_data(&mut self, frame: Frame) -> Vec<Action> {
        let seq = frame.seq;
        if self.buffer_full() {
            log::debug!("[router] ← DATA seq={seq} dropped, buffer full");
            self.stats.buffer_full_dropped += 1;
            return Vec::new();
        }

        if seq != self.frameexpected {
            self.stats.out_of_sequence += 1;
            return match self.policy {
                ReceivePolicy::SilentDrop => {
                    log::debug!(
                        "[router] ← DATA seq={seq} ignored (frameexpected={})",
                        self.frameexpected
                    );
                    Vec::new()
                }
                ReceivePolicy::AckDuplicates => {
                    log::debug!("[router] ← DATA seq={seq} duplicate; → ACK seq={seq}");
                    self.stats.acks_sent += 1;
                    vec![Action::Transmit {
                        link: LinkId::UPSTREAM,
                        bytes: Frame::encode_ack(seq),
                    }]
                }
            };
        }

        let bytes = match frame.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("[router] cannot forward DATA seq={seq}: {e}");
                self.stats.corrupt_dropped += 1;
                return Vec::new();
            }
        };

        self.frameexpected = self.frameexpected.flip();
        let (token, after) = self.timer.arm(bytes.len());
        log::debug!(
            "[router] ← DATA seq={seq} len={}; → ACK upstream, → DATA downstream",
            frame.payload.len()
        );

        let actions = vec![
            Action::Transmit {
                link: LinkId::UPSTREAM,
                bytes: Frame::encode_ack(seq),
            },
            Action::Transmit {
                link: LinkId::DOWNSTREAM,
                bytes: bytes.clone(),
            },
            Action::StartTimer { token, after },
        ];

        self.slot = Some(BufferedFrame {
            seq,
            payload: frame.payload,
            bytes,
            tx_count: 1,
        });
        self.stats.acks_sent += 1;
        self.stats.data_sent += 1;
        actions
    }

    // Right window.
    fn on_ack(&mut self, seq: SeqBit) -> Vec<Action> {
        if !self.buffer_full() || seq != self.ackexpected {
            log::debug!(
                "[router] ← ACK seq={seq} ignored (ackexpected={} buffer_full={})",
                self.ackexpected,
                self.buffer_full()
            );
            self.stats.acks_ignored += 1;
            return Vec::new();
        }

        log::debug!("[router] ← ACK seq={seq}, buffer cleared");
        self.ackexpected = self.ackexpected.flip();
        self.slot = None;
        self.stats.acks_accepted += 1;
        self.timer
            .disarm()
            .map(Action::CancelTimer)
            .into_iter()
            .collect()
    }

    pub fn on_timeout(&mut self, token: TimerToken) -> Vec<Action> {
        if !self.timer.expire(token) {
            log::trace!("[router] stale timer {token} ignored");
            self.stats.stale_timeouts += 1;
            return Vec::new();
        }
        let Some(slot) = self.slot.as_mut() else {
            return Vec::new();
        };

        slot.tx_count += 1;
        log::debug!(
            "[router] timeout, → DATA seq={} downstream (transmission #{})",
            slot.seq,
            slot.tx_count
        );
        let bytes = slot.bytes.clone();
        let (token, after) = self.timer.arm(bytes.len());
        self.stats.retransmissions += 1;
        vec![
            Action::Transmit {
                link: LinkId::DOWNSTREAM,
                bytes,
            },
            Action::StartTimer { token, after },
        ]
    }

    pub fn show_state(&self) -> String {
        format!(
            "ackexpected={} frameexpected={} buffer={}",
            self.ackexpected,
            self.frameexpected,
            if self.buffer_full() { "full" } else { "empty" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> RouterEngine {
        RouterEngine::new(LinkParams::default(), ReceivePolicy::default())
    }

    fn frames_on(actions: &[Action], want: LinkId) -> Vec<Frame> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Transmit { link, bytes } if *link == want => {
                    Some(Frame::decode(bytes).unwrap())
                }
                _ => None,
            })
            .collect()
    }

    fn timer_token(actions: &[Action]) -> TimerToken {
        actions
            .iter()
            .find_map(|a| match a {
                Action::StartTimer { token, .. } => Some(*token),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn expected_data_is_acked_and_forwarded() {
        let mut r = router();
        let actions = r.on_frame(Frame::data(SeqBit::ZERO, b"relay me".to_vec()));

        let up = frames_on(&actions, LinkId::UPSTREAM);
        assert_eq!(up, vec![Frame::ack(SeqBit::ZERO)]);
        let down = frames_on(&actions, LinkId::DOWNSTREAM);
        assert_eq!(down, vec![Frame::data(SeqBit::ZERO, b"relay me".to_vec())]);
        assert!(matches!(actions.last(), Some(Action::StartTimer { .. })));

        assert!(r.buffer_full());
        assert_eq!(r.frameexpected, SeqBit::ONE);
        assert_eq!(r.ackexpected, SeqBit::ZERO);
    }

    #[test]
    fn data_while_buffer_full_changes_nothing() {
        let mut r = router();
        r.on_frame(Frame::data(SeqBit::ZERO, b"first".to_vec()));
        let slot_before = r.slot.clone();
        let frameexpected_before = r.frameexpected;

        for seq in [SeqBit::ZERO, SeqBit::ONE] {
            let actions = r.on_frame(Frame::data(seq, b"second".to_vec()));
            assert!(actions.is_empty());
        }
        assert_eq!(r.frameexpected, frameexpected_before);
        assert_eq!(r.slot, slot_before);
        assert_eq!(r.stats.buffer_full_dropped, 2);
    }

    #[test]
    fn matching_downstream_ack_frees_the_slot() {
        let mut r = router();
        let actions = r.on_frame(Frame::data(SeqBit::ZERO, b"x".to_vec()));
        let token = timer_token(&actions);

        let actions = r.on_frame(Frame::ack(SeqBit::ZERO));
        assert_eq!(actions, vec![Action::CancelTimer(token)]);
        assert!(!r.buffer_full());
        assert_eq!(r.ackexpected, SeqBit::ONE);

        // The slot is free again: the next upstream frame goes through.
        let actions = r.on_frame(Frame::data(SeqBit::ONE, b"y".to_vec()));
        assert_eq!(frames_on(&actions, LinkId::DOWNSTREAM).len(), 1);
    }

    #[test]
    fn wrong_downstream_ack_keeps_buffer_full() {
        let mut r = router();
        r.on_frame(Frame::data(SeqBit::ZERO, b"x".to_vec()));
        assert!(r.on_frame(Frame::ack(SeqBit::ONE)).is_empty());
        assert!(r.buffer_full());
        assert_eq!(r.ackexpected, SeqBit::ZERO);
    }

    #[test]
    fn ack_with_empty_buffer_is_ignored() {
        let mut r = router();
        assert!(r.on_frame(Frame::ack(SeqBit::ZERO)).is_empty());
        assert_eq!(r.ackexpected, SeqBit::ZERO);
    }

    #[test]
    fn timeout_resends_buffered_frame_downstream() {
        let mut r = router();
        let first = r.on_frame(Frame::data(SeqBit::ZERO, b"again".to_vec()));
        let original = frames_on(&first, LinkId::DOWNSTREAM);

        let actions = r.on_timeout(timer_token(&first));
        assert_eq!(frames_on(&actions, LinkId::DOWNSTREAM), original);
        assert!(frames_on(&actions, LinkId::UPSTREAM).is_empty());
        assert_eq!(r.slot.as_ref().unwrap().tx_count, 2);

        // The superseded token is stale now.
        assert!(r.on_timeout(timer_token(&first)).is_empty());
        assert_eq!(r.stats.stale_timeouts, 1);
    }

    #[test]
    fn out_of_sequence_policy() {
        let mut r = router();
        let actions = r.on_frame(Frame::data(SeqBit::ONE, b"old".to_vec()));
        assert_eq!(frames_on(&actions, LinkId::UPSTREAM), vec![Frame::ack(SeqBit::ONE)]);
        assert!(frames_on(&actions, LinkId::DOWNSTREAM).is_empty());
        assert!(!r.buffer_full());

        let mut silent = RouterEngine::new(LinkParams::default(), ReceivePolicy::SilentDrop);
        assert!(silent.on_frame(Frame::data(SeqBit::ONE, b"old".to_vec())).is_empty());
        assert_eq!(silent.frameexpected, SeqBit::ZERO);
    }

    #[test]
    fn show_state_reports_buffer() {
        let mut r = router();
        assert_eq!(r.show_state(), "ackexpected=0 frameexpected=0 buffer=empty");
        r.on_frame(Frame::data(SeqBit::ZERO, b"x".to_vec()));
        assert_eq!(r.show_state(), "ackexpected=0 frameexpected=1 buffer=full");
    }
}
