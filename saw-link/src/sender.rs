//! Send-side window of a host.
//!
//! [`Sender`] tracks the alternating bits and the single in-flight DATA frame.
//! It does **not** touch any link or clock; it returns [`Action`]s that
//! [`crate::host::HostEngine`] hands back to whoever drives the node.
//!
//! # Stop-and-wait contract
//! - At most **one** DATA frame is in flight (`unacked`).
//! - A new payload is only accepted while [`SenderState::Idle`].
//! - On the ACK carrying `ackexpected`: cancel the timer, flip
//!   `ackexpected` and `nextframetosend`, clear `unacked`, re-enable intake.
//! - On timeout: resend the same bytes unchanged and re-arm the timer.

use crate::event::{Action, LinkId};
use crate::frame::{Frame, SeqBit, MAX_MESSAGE_SIZE};
use crate::metrics::NodeStats;
use crate::node::NodeError;
use crate::state::SenderState;
use crate::timer::{LinkParams, RetransmitTimer, TimerToken};

/// A DATA frame that has been sent but not yet acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetransmitEntry {
    /// The frame as handed to the codec.
    pub frame: Frame,
    /// Its encoded bytes, re-sent verbatim on every retransmission.
    pub bytes: Vec<u8>,
    /// How many times this frame has been transmitted (1 = first send).
    pub tx_count: u32,
}

/// Stop-and-wait send-side state of one host.
#[derive(Debug)]
pub struct Sender {
    pub state: SenderState,

    /// Bit awaited in the ACK for the outstanding frame.
    pub ackexpected: SeqBit,

    /// Bit the next new DATA frame will carry.
    pub nextframetosend: SeqBit,

    /// The in-flight frame, or `None` when idle.
    pub unacked: Option<RetransmitEntry>,

    link: LinkId,
    timer: RetransmitTimer,
}

impl Sender {
    /// A sender that transmits on `link`, whose timing is `params`.
    pub fn new(link: LinkId, params: LinkParams) -> Self {
        Self {
            state: SenderState::Idle,
            ackexpected: SeqBit::ZERO,
            nextframetosend: SeqBit::ZERO,
            unacked: None,
            link,
            timer: RetransmitTimer::new(params),
        }
    }

    /// Accept a payload from the application and put it on the link.
    pub fn on_payload(
        &mut self,
        payload: Vec<u8>,
        stats: &mut NodeStats,
    ) -> Result<Vec<Action>, NodeError> {
        if self.state == SenderState::WaitAck {
            return Err(NodeError::IntakeSuspended);
        }
        if payload.len() > MAX_MESSAGE_SIZE {
            return Err(NodeError::PayloadTooLarge {
                len: payload.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }

        let frame = Frame::data(self.nextframetosend, payload);
        let bytes = frame.encode()?;
        let (token, after) = self.timer.arm(bytes.len());

        log::debug!(
            "[host] → DATA seq={} len={} on {}",
            frame.seq,
            frame.payload.len(),
            self.link
        );

        let actions = vec![
            Action::DisableApplication,
            Action::Transmit {
                link: self.link,
                bytes: bytes.clone(),
            },
            Action::StartTimer { token, after },
        ];

        self.unacked = Some(RetransmitEntry {
            frame,
            bytes,
            tx_count: 1,
        });
        self.state = SenderState::WaitAck;
        stats.data_sent += 1;
        Ok(actions)
    }

    /// Process an inbound ACK carrying `seq`.
    pub fn on_ack(&mut self, seq: SeqBit, stats: &mut NodeStats) -> Vec<Action> {
        if self.state != SenderState::WaitAck || seq != self.ackexpected {
            log::debug!(
                "[host] ← ACK seq={seq} ignored (state={} ackexpected={})",
                self.state,
                self.ackexpected
            );
            stats.acks_ignored += 1;
            return Vec::new();
        }

        log::debug!("[host] ← ACK seq={seq}");
        let mut actions = Vec::with_capacity(2);
        if let Some(token) = self.timer.disarm() {
            actions.push(Action::CancelTimer(token));
        }
        self.ackexpected = self.ackexpected.flip();
        self.nextframetosend = self.nextframetosend.flip();
        self.unacked = None;
        self.state = SenderState::Idle;
        actions.push(Action::EnableApplication);

        stats.acks_accepted += 1;
        actions
    }

    /// Handle a timer expiry; stale tokens are ignored.
    pub fn on_timeout(&mut self, token: TimerToken, stats: &mut NodeStats) -> Vec<Action> {
        if !self.timer.expire(token) {
            log::trace!("[host] stale timer {token} ignored");
            stats.stale_timeouts += 1;
            return Vec::new();
        }
        let Some(entry) = self.unacked.as_mut() else {
            return Vec::new();
        };

        entry.tx_count += 1;
        log::debug!(
            "[host] timeout, → DATA seq={} (transmission #{})",
            entry.frame.seq,
            entry.tx_count
        );
        let bytes = entry.bytes.clone();
        let (token, after) = self.timer.arm(bytes.len());

        stats.retransmissions += 1;
        vec![
            Action::Transmit {
                link: self.link,
                bytes,
            },
            Action::StartTimer { token, after },
        ]
    }
}
