//! Per-node protocol counters.
//!
//! Each engine keeps a [`NodeStats`] it updates as transitions run.  The
//! struct is plain data owned by the node; it is not thread-safe and does not
//! need to be, since a node is only ever driven by one thread of control.

/// Counters for one node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeStats {
    // === Sending ===
    /// New DATA frames put on a link (first transmissions only).
    pub data_sent: u64,
    /// DATA frames re-sent after a timeout.
    pub retransmissions: u64,
    /// ACK frames put on a link.
    pub acks_sent: u64,

    // === Receiving ===
    /// Payloads handed up to the application.
    pub delivered: u64,
    /// ACKs that advanced a window.
    pub acks_accepted: u64,
    /// ACKs with the wrong sequence bit, or arriving with nothing outstanding.
    pub acks_ignored: u64,

    // === Drops ===
    /// Frames that failed validation (checksum, length, tags).
    pub corrupt_dropped: u64,
    /// DATA frames with an unexpected sequence bit.
    pub out_of_sequence: u64,
    /// DATA frames refused because a router's slot was occupied.
    pub buffer_full_dropped: u64,
    /// Timer expiries whose token had been superseded or cancelled.
    pub stale_timeouts: u64,
    /// Frames that arrived on a link their kind never travels on.
    pub wrong_link_dropped: u64,
}

impl NodeStats {
    /// One-line summary for logs and the CLI.
    pub fn summary(&self) -> String {
        format!(
            "data={} retx={} acks_sent={} delivered={} acks_ok={} acks_ignored={} \
             corrupt={} out_of_seq={} buffer_full={} stale_timeouts={} wrong_link={}",
            self.data_sent,
            self.retransmissions,
            self.acks_sent,
            self.delivered,
            self.acks_accepted,
            self.acks_ignored,
            self.corrupt_dropped,
            self.out_of_sequence,
            self.buffer_full_dropped,
            self.stale_timeouts,
            self.wrong_link_dropped,
        )
    }
}
