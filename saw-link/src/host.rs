//! Host engine: an endpoint node's two independent windows.
//!
//! ```text
//!   application ──payload──▶ Sender ──DATA──▶ link 1
//!   application ◀─deliver─── Receiver ◀─DATA── link 1
//!                            Sender ◀──ACK─── link 1
//!                            Receiver ──ACK──▶ link 1
//! ```
//!
//! Inbound frames are routed by kind: ACKs belong to the send window, DATA to
//! the receive window.  The two never share state.

use crate::event::{Action, LinkId};
use crate::frame::{Frame, FrameKind};
use crate::metrics::NodeStats;
use crate::node::NodeError;
use crate::receiver::Receiver;
use crate::sender::Sender;
use crate::state::{HostMode, ReceivePolicy};
use crate::timer::{LinkParams, TimerToken};

/// Every host talks to the chain through its only link.
pub const HOST_LINK: LinkId = LinkId(1);

#[derive(Debug)]
pub struct HostEngine {
    pub mode: HostMode,
    pub sender: Sender,
    pub receiver: Receiver,
    pub stats: NodeStats,
}

impl HostEngine {
    pub fn new(mode: HostMode, link: LinkParams, policy: ReceivePolicy) -> Self {
        Self {
            mode,
            sender: Sender::new(HOST_LINK, link),
            receiver: Receiver::new(HOST_LINK, policy),
            stats: NodeStats::default(),
        }
    }

    /// Actions to perform once at boot.
    pub fn boot(&self) -> Vec<Action> {
        match self.mode {
            HostMode::Originator => vec![Action::EnableApplication],
            HostMode::Receiver => Vec::new(),
        }
    }

    pub fn on_frame(&mut self, frame: Frame) -> Vec<Action> {
        match frame.kind {
            FrameKind::Ack => self.sender.on_ack(frame.seq, &mut self.stats),
            FrameKind::Data => self.receiver.on_data(frame, &mut self.stats),
        }
    }

    pub fn on_payload(&mut self, payload: Vec<u8>) -> Result<Vec<Action>, NodeError> {
        self.sender.on_payload(payload, &mut self.stats)
    }

    pub fn on_timeout(&mut self, token: TimerToken) -> Vec<Action> {
        self.sender.on_timeout(token, &mut self.stats)
    }

    pub fn show_state(&self) -> String {
        format!(
            "ackexpected={} nextframetosend={} frameexpected={}",
            self.sender.ackexpected, self.sender.nextframetosend, self.receiver.frameexpected
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::SeqBit;
    use crate::state::SenderState;

    /// Pull the encoded frames out of a batch of actions.
    fn transmitted(actions: &[Action]) -> Vec<Frame> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Transmit { bytes, .. } => Some(Frame::decode(bytes).unwrap()),
                _ => None,
            })
            .collect()
    }

    fn delivered(actions: &[Action]) -> Vec<Vec<u8>> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Deliver(p) => Some(p.clone()),
                _ => None,
            })
            .collect()
    }

    fn pair() -> (HostEngine, HostEngine) {
        let link = LinkParams::default();
        (
            HostEngine::new(HostMode::Originator, link, ReceivePolicy::default()),
            HostEngine::new(HostMode::Receiver, link, ReceivePolicy::default()),
        )
    }

    #[test]
    fn boot_enables_only_the_originator() {
        let (a, b) = pair();
        assert_eq!(a.boot(), vec![Action::EnableApplication]);
        assert!(b.boot().is_empty());
    }

    #[test]
    fn in_order_delivery_with_one_ack_per_frame() {
        let (mut a, mut b) = pair();
        let payloads: [&[u8]; 3] = [b"P1", b"P2", b"P3"];
        let mut received = Vec::new();

        for p in payloads {
            let sent = transmitted(&a.on_payload(p.to_vec()).unwrap());
            assert_eq!(sent.len(), 1);

            let mut replies = Vec::new();
            for frame in sent {
                let actions = b.on_frame(frame);
                received.extend(delivered(&actions));
                replies.extend(transmitted(&actions));
            }
            assert_eq!(replies.len(), 1, "exactly one ACK per DATA frame");
            for ack in replies {
                assert_eq!(ack.kind, FrameKind::Ack);
                a.on_frame(ack);
            }
            assert_eq!(a.sender.state, SenderState::Idle);
        }

        assert_eq!(received, vec![b"P1".to_vec(), b"P2".to_vec(), b"P3".to_vec()]);
    }

    #[test]
    fn lost_ack_costs_one_retransmission_and_no_duplicate() {
        let (mut a, mut b) = pair();
        let first = a.on_payload(b"P1".to_vec()).unwrap();
        let token = first
            .iter()
            .find_map(|x| match x {
                Action::StartTimer { token, .. } => Some(*token),
                _ => None,
            })
            .unwrap();
        let data = transmitted(&first).remove(0);

        // B delivers and ACKs; the ACK is lost on the way back.
        let actions = b.on_frame(data);
        assert_eq!(delivered(&actions), vec![b"P1".to_vec()]);

        // A times out and resends exactly the same frame.
        let retx = transmitted(&a.on_timeout(token));
        assert_eq!(retx.len(), 1);
        assert_eq!(retx[0].seq, SeqBit::ZERO);
        assert_eq!(retx[0].payload, b"P1");

        // B sees a duplicate: re-ACK, no second delivery.
        let actions = b.on_frame(retx[0].clone());
        assert!(delivered(&actions).is_empty());
        let acks = transmitted(&actions);
        assert_eq!(acks.len(), 1);
        a.on_frame(acks[0].clone());

        assert_eq!(a.stats.retransmissions, 1);
        assert_eq!(b.stats.delivered, 1);
        assert_eq!(a.sender.state, SenderState::Idle);
    }

    #[test]
    fn sequence_bits_track_parity() {
        let (mut a, mut b) = pair();
        for n in 1..=5u64 {
            let data = transmitted(&a.on_payload(vec![n as u8]).unwrap());
            let acks = transmitted(&b.on_frame(data[0].clone()));
            a.on_frame(acks[0].clone());

            assert_eq!(a.sender.ackexpected, SeqBit::after(n));
            assert_eq!(a.sender.nextframetosend, SeqBit::after(n));
            assert_eq!(b.receiver.frameexpected, SeqBit::after(n));
        }
    }

    #[test]
    fn show_state_lists_the_three_bits() {
        let (mut a, _) = pair();
        assert_eq!(
            a.show_state(),
            "ackexpected=0 nextframetosend=0 frameexpected=0"
        );
        a.on_payload(b"x".to_vec()).unwrap();
        a.on_frame(Frame::ack(SeqBit::ZERO));
        assert_eq!(
            a.show_state(),
            "ackexpected=1 nextframetosend=1 frameexpected=0"
        );
    }
}
