//! Finite-state-machine types shared by the engines.
//!
//! This module only names states and roles; transitions live in
//! [`crate::sender`], [`crate::receiver`] and [`crate::router`].

/// Send-side state of a host.
///
/// ```text
///           payload from application
///   IDLE ─────────────────────────────▶ WAIT_ACK ──┐
///    ▲                                     │  ▲    │ timeout:
///    │        ACK seq == ackexpected       │  └────┘ retransmit
///    └─────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SenderState {
    /// Nothing outstanding; application intake is enabled.
    #[default]
    Idle,
    /// One DATA frame is outstanding; intake is suspended.
    WaitAck,
}

impl std::fmt::Display for SenderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SenderState::Idle => write!(f, "IDLE"),
            SenderState::WaitAck => write!(f, "WAIT_ACK"),
        }
    }
}

/// Whether a host's application starts out producing traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostMode {
    /// Intake enabled at boot.
    Originator,
    /// Intake disabled at boot; only receives.
    Receiver,
}

/// Role of a node in the chain, fixed at boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Host(HostMode),
    Router,
}

impl Role {
    pub fn is_host(self) -> bool {
        matches!(self, Role::Host(_))
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Host(HostMode::Originator) => write!(f, "originator"),
            Role::Host(HostMode::Receiver) => write!(f, "receiver"),
            Role::Router => write!(f, "router"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "originator" => Ok(Role::Host(HostMode::Originator)),
            "receiver" | "host" => Ok(Role::Host(HostMode::Receiver)),
            "router" => Ok(Role::Router),
            _ => Err(format!("unknown role: {s}")),
        }
    }
}

/// How a receiving window answers a DATA frame whose sequence bit it is not
/// expecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReceivePolicy {
    /// Re-acknowledge the frame with its own sequence bit without delivering
    /// it, so a sender whose ACK was lost can move on.
    #[default]
    AckDuplicates,
    /// Drop it without any reply.  Once the ACK for a delivered frame is
    /// lost the hop stalls: the sender retransmits forever and every copy is
    /// dropped here.
    SilentDrop,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("Originator".parse(), Ok(Role::Host(HostMode::Originator)));
        assert_eq!("ROUTER".parse(), Ok(Role::Router));
        assert!("switch".parse::<Role>().is_err());
    }

    #[test]
    fn defaults() {
        assert_eq!(SenderState::default(), SenderState::Idle);
        assert_eq!(ReceivePolicy::default(), ReceivePolicy::AckDuplicates);
    }
}
