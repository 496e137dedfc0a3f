//! Inbound triggers and outbound effects of a node.
//!
//! Engines are driven by [`Event`]s and answer with a list of [`Action`]s.
//! They never perform I/O themselves: whoever hosts the node (the
//! [`crate::simulator`] or the [`crate::runtime`] UDP driver) carries the
//! actions out in order.

use std::time::Duration;

use crate::timer::TimerToken;

/// A physical link attached to a node.
///
/// Hosts have a single link, `1`.  Routers receive DATA on link `1`
/// (upstream) and forward it on link `2` (downstream).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(pub u8);

impl LinkId {
    pub const UPSTREAM: LinkId = LinkId(1);
    pub const DOWNSTREAM: LinkId = LinkId(2);
}

impl std::fmt::Display for LinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "link{}", self.0)
    }
}

/// Something that happened to the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Raw bytes arrived on `link`; not yet validated.
    FrameArrived { link: LinkId, bytes: Vec<u8> },
    /// A timer started earlier has gone off.
    TimerExpired(TimerToken),
    /// The application has a new payload to send.
    ApplicationReady(Vec<u8>),
}

/// Something the node asks its environment to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Put an encoded frame on `link`.
    Transmit { link: LinkId, bytes: Vec<u8> },
    /// Deliver [`Event::TimerExpired`] with `token` after `after`.
    StartTimer { token: TimerToken, after: Duration },
    /// The timer identified by `token` must not fire.
    CancelTimer(TimerToken),
    /// Hand a payload up to the application.
    Deliver(Vec<u8>),
    /// The application may offer the next payload.
    EnableApplication,
    /// The application must hold further payloads.
    DisableApplication,
}
