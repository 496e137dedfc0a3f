//! Retransmission timer policy.
//!
//! Reliable delivery requires that an unacknowledged DATA frame is re-sent if
//! no ACK arrives in time.  The engines never own a clock; they ask the
//! external timer facility to start and cancel timers through
//! [`crate::event::Action`]s.  This module provides:
//! - [`LinkParams`]: bandwidth and propagation delay of the outbound link.
//! - [`RetransmitTimer`]: the single timer slot of one window, sized by the
//!   frame being sent and tagged with a [`TimerToken`].
//!
//! Timeout = `3 × (transmission time of the frame + propagation delay)`.
//! There is no back-off and no retry ceiling: the same timeout is re-armed on
//! every expiry until the ACK arrives.
//!
//! # Generations
//!
//! Every [`RetransmitTimer::arm`] issues a fresh [`TimerToken`].  An expiry
//! whose token is not the current one belongs to a superseded or cancelled
//! timer and must be ignored, even if the external facility delivers it late.

use std::time::Duration;

/// Multiplier applied to the one-way frame delay.
pub const TIMEOUT_MULTIPLIER: u32 = 3;

/// Timing properties of one point-to-point link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkParams {
    /// Link bandwidth in bits per second.  Must be non-zero.
    pub bandwidth_bps: u64,
    /// One-way propagation delay.
    pub propagation_delay: Duration,
}

impl Default for LinkParams {
    fn default() -> Self {
        Self {
            bandwidth_bps: 56_000,
            propagation_delay: Duration::from_micros(2_500),
        }
    }
}

impl LinkParams {
    /// Time needed to clock `frame_len` bytes onto the link.
    pub fn transmission_time(&self, frame_len: usize) -> Duration {
        let micros = (frame_len as u64).saturating_mul(8_000_000) / self.bandwidth_bps.max(1);
        Duration::from_micros(micros)
    }

    /// Transmission time plus propagation delay: when the last bit lands.
    pub fn frame_delay(&self, frame_len: usize) -> Duration {
        self.transmission_time(frame_len)
            .saturating_add(self.propagation_delay)
    }

    /// Retransmission timeout for a DATA frame of `frame_len` bytes.
    pub fn retransmit_timeout(&self, frame_len: usize) -> Duration {
        self.frame_delay(frame_len).saturating_mul(TIMEOUT_MULTIPLIER)
    }
}

/// Identity of one started timer.
///
/// Tokens are unique per [`RetransmitTimer`] and increase monotonically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerToken(u64);

impl std::fmt::Display for TimerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// The single retransmit timer slot of one window.
#[derive(Debug)]
pub struct RetransmitTimer {
    link: LinkParams,
    next_generation: u64,
    active: Option<TimerToken>,
}

impl RetransmitTimer {
    pub fn new(link: LinkParams) -> Self {
        Self {
            link,
            next_generation: 0,
            active: None,
        }
    }

    /// Start (or restart) the timer for a DATA frame of `frame_len` bytes.
    ///
    /// Returns the new token and the duration the external facility should
    /// wait.  Any previously issued token stops being current.
    pub fn arm(&mut self, frame_len: usize) -> (TimerToken, Duration) {
        self.next_generation += 1;
        let token = TimerToken(self.next_generation);
        self.active = Some(token);
        (token, self.link.retransmit_timeout(frame_len))
    }

    /// Cancel the running timer, returning its token if one was running.
    pub fn disarm(&mut self) -> Option<TimerToken> {
        self.active.take()
    }

    /// `true` when `token` belongs to the running timer.
    pub fn is_current(&self, token: TimerToken) -> bool {
        self.active == Some(token)
    }

    /// Consume an expiry.
    ///
    /// Returns `true` when `token` is the running timer (which is now no
    /// longer running), `false` for a stale expiry that must be ignored.
    pub fn expire(&mut self, token: TimerToken) -> bool {
        if self.is_current(token) {
            self.active = None;
            true
        } else {
            false
        }
    }

    pub fn is_armed(&self) -> bool {
        self.active.is_some()
    }
}
