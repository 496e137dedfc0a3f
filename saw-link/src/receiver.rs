//! Receive-side window of a host.
//!
//! The receiver keeps nothing but `frameexpected`.  A DATA frame carrying
//! that bit is delivered upward, acknowledged with the same bit, and the bit
//! flips.  Any other DATA frame is a duplicate or stale retransmission; what
//! happens to it depends on the configured [`ReceivePolicy`].

use crate::event::{Action, LinkId};
use crate::frame::{Frame, SeqBit};
use crate::metrics::NodeStats;
use crate::state::ReceivePolicy;

/// Stop-and-wait receive-side state of one host.
#[derive(Debug)]
pub struct Receiver {
    /// Bit the next new DATA frame must carry.
    pub frameexpected: SeqBit,
    policy: ReceivePolicy,
    link: LinkId,
}

impl Receiver {
    /// A receiver that acknowledges on `link`.
    pub fn new(link: LinkId, policy: ReceivePolicy) -> Self {
        Self {
            frameexpected: SeqBit::ZERO,
            policy,
            link,
        }
    }

    /// Process an inbound, already validated DATA frame.
    pub fn on_data(&mut self, frame: Frame, stats: &mut NodeStats) -> Vec<Action> {
        let seq = frame.seq;
        if seq != self.frameexpected {
            stats.out_of_sequence += 1;
            return match self.policy {
                ReceivePolicy::SilentDrop => {
                    log::debug!(
                        "[host] ← DATA seq={seq} ignored (frameexpected={})",
                        self.frameexpected
                    );
                    Vec::new()
                }
                ReceivePolicy::AckDuplicates => {
                    log::debug!("[host] ← DATA seq={seq} duplicate; → ACK seq={seq}");
                    stats.acks_sent += 1;
                    vec![Action::Transmit {
                        link: self.link,
                        bytes: Frame::encode_ack(seq),
                    }]
                }
            };
        }

        log::info!(
            "[host] ← DATA seq={seq} len={}, up to application",
            frame.payload.len()
        );
        self.frameexpected = self.frameexpected.flip();
        stats.delivered += 1;
        stats.acks_sent += 1;
        vec![
            Action::Deliver(frame.payload),
            Action::Transmit {
                link: self.link,
                bytes: Frame::encode_ack(seq),
            },
        ]
    }
}
