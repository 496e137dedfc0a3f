//! Deployment-time configuration of nodes.
//!
//! Everything here is fixed at boot.  [`NodeConfig::validate`] is called by
//! [`crate::node::Node::new`]; the simulator validates its own settings and
//! the chain layout on top of that.

use std::time::Duration;

use thiserror::Error;

use crate::state::{HostMode, ReceivePolicy, Role};
use crate::timer::LinkParams;

/// Configuration of a single node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    pub role: Role,
    /// Timing of the link this node sends DATA on: link 1 for a host,
    /// link 2 (downstream) for a router.  Sizes the retransmit timeout.
    pub data_link: LinkParams,
    pub receive_policy: ReceivePolicy,
}

impl NodeConfig {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            data_link: LinkParams::default(),
            receive_policy: ReceivePolicy::default(),
        }
    }

    pub fn originator() -> Self {
        Self::new(Role::Host(HostMode::Originator))
    }

    pub fn receiver() -> Self {
        Self::new(Role::Host(HostMode::Receiver))
    }

    pub fn router() -> Self {
        Self::new(Role::Router)
    }

    pub fn with_link(mut self, link: LinkParams) -> Self {
        self.data_link = link;
        self
    }

    pub fn with_policy(mut self, policy: ReceivePolicy) -> Self {
        self.receive_policy = policy;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_link(&self.data_link)
    }
}

/// Longest one-way propagation delay a link may be configured with.
pub const MAX_PROPAGATION_DELAY: Duration = Duration::from_secs(60);

/// Checks shared by every place that accepts link timing.
pub fn validate_link(link: &LinkParams) -> Result<(), ConfigError> {
    if link.bandwidth_bps == 0 {
        return Err(ConfigError::ZeroBandwidth);
    }
    if link.propagation_delay > MAX_PROPAGATION_DELAY {
        return Err(ConfigError::PropagationDelayTooLong {
            delay: link.propagation_delay,
            max: MAX_PROPAGATION_DELAY,
        });
    }
    Ok(())
}

/// Configuration errors for nodes, chains and the simulator.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("link bandwidth must be greater than zero")]
    ZeroBandwidth,

    #[error("propagation delay {delay:?} exceeds the {max:?} limit")]
    PropagationDelayTooLong { delay: Duration, max: Duration },

    #[error("{name} must be within [0.0, 1.0], got {value}")]
    ProbabilityOutOfRange { name: &'static str, value: f64 },

    #[error("a chain needs at least two hosts")]
    ChainTooShort,

    #[error("node {index} is a {role}; chain ends must be hosts and interior nodes routers")]
    MisplacedRole { index: usize, role: Role },

    #[error("at most one host may be the originator, found {0}")]
    TooManyOriginators(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_node_config_is_valid() {
        assert_eq!(NodeConfig::originator().validate(), Ok(()));
        assert_eq!(NodeConfig::router().validate(), Ok(()));
    }

    #[test]
    fn zero_bandwidth_is_rejected() {
        let cfg = NodeConfig::receiver().with_link(LinkParams {
            bandwidth_bps: 0,
            propagation_delay: Duration::ZERO,
        });
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroBandwidth));
    }

    #[test]
    fn propagation_delay_is_bounded() {
        let delay = Duration::from_micros(u64::MAX);
        let cfg = NodeConfig::router().with_link(LinkParams {
            bandwidth_bps: 56_000,
            propagation_delay: delay,
        });
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::PropagationDelayTooLong {
                delay,
                max: MAX_PROPAGATION_DELAY
            })
        );

        let at_limit = NodeConfig::router().with_link(LinkParams {
            bandwidth_bps: 56_000,
            propagation_delay: MAX_PROPAGATION_DELAY,
        });
        assert_eq!(at_limit.validate(), Ok(()));
    }
}
