//! Deterministic discrete-event simulator for a linear chain of nodes.
//!
//! The protocol engines only describe *what* should happen; this module plays
//! every external collaborator so whole chains can be exercised in-process:
//!
//! | Collaborator      | Simulated as                                          |
//! |-------------------|-------------------------------------------------------|
//! | Physical medium   | Per-frame delay = transmission time + propagation.    |
//! | Loss              | Drop a frame with probability `loss_rate`.            |
//! | Corruption        | Flip one random bit with probability `corrupt_rate`.  |
//! | Timer facility    | Expiry events on the queue; cancelled tokens removed. |
//! | Application       | Per-host payload queue gated by intake enable/disable.|
//! | Scheduler         | One event at a time, in (time, insertion) order.      |
//!
//! All randomness comes from a seeded ChaCha8 RNG, so a run is reproducible
//! from its [`SimulatorConfig`].  Tests can additionally script exact drops
//! with [`Simulator::drop_next`].
//!
//! # Wiring
//!
//! ```text
//!   host 0 ──link1──── link1 router 1 link2 ──── link1 router 2 link2 ──── link1 host 3
//! ```

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use thiserror::Error;

use crate::config::{validate_link, ConfigError, NodeConfig};
use crate::event::{Action, Event, LinkId};
use crate::frame::{Frame, FrameKind, SeqBit};
use crate::node::{Node, NodeError};
use crate::state::{HostMode, ReceivePolicy, Role};
use crate::timer::{LinkParams, TimerToken};

/// Configuration for the simulated medium and run.
///
/// All probabilities are in the range `[0.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Timing shared by every link of the chain.
    pub link: LinkParams,
    /// Probability that any given frame is silently dropped.
    pub loss_rate: f64,
    /// Probability that a surviving frame has one bit flipped.
    pub corrupt_rate: f64,
    /// Seed for the fault RNG.
    pub seed: u64,
    /// Events [`Simulator::run`] may process before giving up.
    pub max_events: usize,
    /// Receive policy installed in every node.
    pub receive_policy: ReceivePolicy,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        // No faults by default: the medium is a transparent pass-through.
        Self {
            link: LinkParams::default(),
            loss_rate: 0.0,
            corrupt_rate: 0.0,
            seed: 0,
            max_events: 1_000_000,
            receive_policy: ReceivePolicy::default(),
        }
    }
}

impl SimulatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_link(&self.link)?;
        for (name, value) in [("loss_rate", self.loss_rate), ("corrupt_rate", self.corrupt_rate)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ProbabilityOutOfRange { name, value });
            }
        }
        Ok(())
    }
}

/// Errors raised while driving a simulation.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("event budget exhausted after {processed} events at t={now:?}")]
    EventBudgetExhausted { processed: usize, now: Duration },

    #[error("node {index}: {source}")]
    Node {
        index: usize,
        #[source]
        source: NodeError,
    },

    #[error("no node with index {0}")]
    NoSuchNode(usize),

    #[error("simulation went idle with {pending} payload(s) still queued at node {index}")]
    Undrained { index: usize, pending: usize },
}

/// What happened to one transmitted frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fate {
    Delivered,
    Lost,
    Corrupted,
}

/// One frame put on a link, as observed by the medium.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEntry {
    pub at: Duration,
    pub from: usize,
    pub to: usize,
    pub kind: FrameKind,
    pub seq: SeqBit,
    pub payload_len: usize,
    pub fate: Fate,
}

#[derive(Debug)]
enum SimEvent {
    Arrival {
        node: usize,
        link: LinkId,
        bytes: Vec<u8>,
    },
    Timer {
        node: usize,
        token: TimerToken,
    },
    AppReady {
        node: usize,
    },
}

#[derive(Debug)]
struct Scheduled {
    at: Duration,
    id: u64,
    event: SimEvent,
}

// Min-heap on (time, insertion order) via reversed comparison.
impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        (other.at, other.id).cmp(&(self.at, self.id))
    }
}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.id == other.id
    }
}

impl Eq for Scheduled {}

#[derive(Debug)]
struct DropRule {
    from: usize,
    kind: FrameKind,
    remaining: u32,
}

/// Per-node application endpoint.
#[derive(Debug, Default)]
struct AppPort {
    pending: VecDeque<Vec<u8>>,
    delivered: Vec<Vec<u8>>,
    intake_enabled: bool,
    ready_scheduled: bool,
}

/// A linear chain of nodes plus the simulated world around them.
pub struct Simulator {
    config: SimulatorConfig,
    nodes: Vec<Node>,
    apps: Vec<AppPort>,
    wiring: HashMap<(usize, LinkId), (usize, LinkId)>,
    queue: BinaryHeap<Scheduled>,
    live_timers: HashSet<(usize, TimerToken)>,
    drop_rules: Vec<DropRule>,
    trace: Vec<TraceEntry>,
    rng: ChaCha8Rng,
    now: Duration,
    next_id: u64,
}

impl Simulator {
    /// Build and boot a chain with the given roles, left to right.
    ///
    /// Both ends must be hosts, every interior node a router, and at most one
    /// host may be the originator.
    pub fn new(config: SimulatorConfig, roles: &[Role]) -> Result<Self, ConfigError> {
        config.validate()?;
        validate_chain(roles)?;

        let nodes = roles
            .iter()
            .map(|&role| {
                Node::new(
                    NodeConfig::new(role)
                        .with_link(config.link)
                        .with_policy(config.receive_policy),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut wiring = HashMap::new();
        for left in 0..roles.len() - 1 {
            let left_link = if left == 0 {
                LinkId(1)
            } else {
                LinkId::DOWNSTREAM
            };
            wiring.insert((left, left_link), (left + 1, LinkId::UPSTREAM));
            wiring.insert((left + 1, LinkId::UPSTREAM), (left, left_link));
        }

        let mut sim = Self {
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            config,
            apps: roles.iter().map(|_| AppPort::default()).collect(),
            nodes,
            wiring,
            queue: BinaryHeap::new(),
            live_timers: HashSet::new(),
            drop_rules: Vec::new(),
            trace: Vec::new(),
            now: Duration::ZERO,
            next_id: 0,
        };

        for index in 0..sim.nodes.len() {
            let actions = sim.nodes[index].boot();
            sim.apply(index, actions);
        }
        Ok(sim)
    }

    /// Originator host, `routers` routers, receiver host.
    pub fn linear(config: SimulatorConfig, routers: usize) -> Result<Self, ConfigError> {
        let mut roles = vec![Role::Host(HostMode::Originator)];
        roles.extend(std::iter::repeat(Role::Router).take(routers));
        roles.push(Role::Host(HostMode::Receiver));
        Self::new(config, &roles)
    }

    /// Queue payloads for the application of host `index`.
    pub fn offer<I>(&mut self, index: usize, payloads: I) -> Result<(), SimError>
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        let node = self.nodes.get(index).ok_or(SimError::NoSuchNode(index))?;
        if !node.role().is_host() {
            return Err(SimError::Node {
                index,
                source: NodeError::NotAHost,
            });
        }
        self.apps[index].pending.extend(payloads);
        self.schedule_app_ready(index);
        Ok(())
    }

    /// Drop the next `count` frames of `kind` transmitted by node `from`.
    pub fn drop_next(&mut self, from: usize, kind: FrameKind, count: u32) {
        self.drop_rules.push(DropRule {
            from,
            kind,
            remaining: count,
        });
    }

    /// Run until nothing is left to do.
    ///
    /// Going idle while some application still holds payloads is an error:
    /// those payloads were never offered to the node.
    pub fn run(&mut self) -> Result<(), SimError> {
        let mut processed = 0;
        while self.step() {
            processed += 1;
            if processed >= self.config.max_events {
                return Err(SimError::EventBudgetExhausted {
                    processed,
                    now: self.now,
                });
            }
        }
        match self
            .apps
            .iter()
            .position(|app| !app.pending.is_empty())
        {
            Some(index) => Err(SimError::Undrained {
                index,
                pending: self.apps[index].pending.len(),
            }),
            None => Ok(()),
        }
    }

    /// Process every event due within the next `span` of simulated time.
    pub fn run_for(&mut self, span: Duration) {
        let deadline = self.now.saturating_add(span);
        while self.queue.peek().is_some_and(|next| next.at <= deadline) {
            self.step();
        }
        self.now = deadline;
    }

    /// Process one event; `false` when the queue is empty.
    pub fn step(&mut self) -> bool {
        let Some(Scheduled { at, event, .. }) = self.queue.pop() else {
            return false;
        };
        self.now = at;

        match event {
            SimEvent::Arrival { node, link, bytes } => {
                self.dispatch(node, Event::FrameArrived { link, bytes });
            }
            SimEvent::Timer { node, token } => {
                // Cancelled timers never fire; superseded ones still do and
                // must be filtered by the engine itself.
                if self.live_timers.remove(&(node, token)) {
                    self.dispatch(node, Event::TimerExpired(token));
                }
            }
            SimEvent::AppReady { node } => {
                let app = &mut self.apps[node];
                app.ready_scheduled = false;
                if app.intake_enabled {
                    if let Some(payload) = app.pending.pop_front() {
                        self.dispatch(node, Event::ApplicationReady(payload));
                    }
                }
            }
        }
        true
    }

    fn dispatch(&mut self, index: usize, event: Event) {
        let retained = match &event {
            Event::ApplicationReady(payload) => Some(payload.clone()),
            _ => None,
        };
        match self.nodes[index].handle(event) {
            Ok(actions) => self.apply(index, actions),
            Err(NodeError::IntakeSuspended) => {
                // The payload was not consumed; hand it back to the app.
                if let Some(payload) = retained {
                    self.apps[index].pending.push_front(payload);
                }
            }
            Err(e) => {
                log::warn!("[sim] node {index} discarded a payload: {e}");
                // The node's state is unchanged, so offer the next one.
                self.schedule_app_ready(index);
            }
        }
    }

    fn apply(&mut self, index: usize, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Transmit { link, bytes } => self.transmit(index, link, bytes),
                Action::StartTimer { token, after } => {
                    self.live_timers.insert((index, token));
                    self.schedule(after, SimEvent::Timer { node: index, token });
                }
                Action::CancelTimer(token) => {
                    self.live_timers.remove(&(index, token));
                }
                Action::Deliver(payload) => self.apps[index].delivered.push(payload),
                Action::EnableApplication => {
                    self.apps[index].intake_enabled = true;
                    self.schedule_app_ready(index);
                }
                Action::DisableApplication => self.apps[index].intake_enabled = false,
            }
        }
    }

    fn transmit(&mut self, from: usize, link: LinkId, mut bytes: Vec<u8>) {
        let Some(&(to, to_link)) = self.wiring.get(&(from, link)) else {
            log::warn!("[sim] node {from} sent on unconnected {link}");
            return;
        };
        // Engines only ever emit well-formed frames.
        let Ok(frame) = Frame::decode(&bytes) else {
            log::warn!("[sim] node {from} emitted an undecodable frame");
            return;
        };

        // Draw both samples every time so the RNG stream does not depend on
        // earlier outcomes.
        let lose = self.rng.gen::<f64>() < self.config.loss_rate;
        let corrupt = self.rng.gen::<f64>() < self.config.corrupt_rate;
        let bit = self.rng.gen_range(0..bytes.len() * 8);

        let fate = if self.take_scripted_drop(from, frame.kind) || lose {
            Fate::Lost
        } else if corrupt {
            bytes[bit / 8] ^= 1 << (bit % 8);
            Fate::Corrupted
        } else {
            Fate::Delivered
        };

        log::debug!(
            "[sim] t={:?} {from}→{to} {} seq={} len={} {:?}",
            self.now,
            frame.kind,
            frame.seq,
            frame.payload.len(),
            fate
        );
        self.trace.push(TraceEntry {
            at: self.now,
            from,
            to,
            kind: frame.kind,
            seq: frame.seq,
            payload_len: frame.payload.len(),
            fate,
        });

        if fate != Fate::Lost {
            let delay = self.config.link.frame_delay(bytes.len());
            self.schedule(
                delay,
                SimEvent::Arrival {
                    node: to,
                    link: to_link,
                    bytes,
                },
            );
        }
    }

    fn take_scripted_drop(&mut self, from: usize, kind: FrameKind) -> bool {
        let Some(rule) = self
            .drop_rules
            .iter_mut()
            .find(|r| r.from == from && r.kind == kind && r.remaining > 0)
        else {
            return false;
        };
        rule.remaining -= 1;
        true
    }

    fn schedule_app_ready(&mut self, index: usize) {
        let app = &mut self.apps[index];
        if app.intake_enabled && !app.ready_scheduled && !app.pending.is_empty() {
            app.ready_scheduled = true;
            self.schedule(Duration::ZERO, SimEvent::AppReady { node: index });
        }
    }

    fn schedule(&mut self, after: Duration, event: SimEvent) {
        self.next_id += 1;
        self.queue.push(Scheduled {
            at: self.now.saturating_add(after),
            id: self.next_id,
            event,
        });
    }

    // ---------------------------------------------------------------------
    // Inspection
    // ---------------------------------------------------------------------

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, index: usize) -> &Node {
        &self.nodes[index]
    }

    pub fn delivered(&self, index: usize) -> &[Vec<u8>] {
        &self.apps[index].delivered
    }

    /// Payloads still waiting in host `index`'s application queue.
    pub fn pending(&self, index: usize) -> usize {
        self.apps[index].pending.len()
    }

    pub fn trace(&self) -> &[TraceEntry] {
        &self.trace
    }

    pub fn now(&self) -> Duration {
        self.now
    }
}

fn validate_chain(roles: &[Role]) -> Result<(), ConfigError> {
    if roles.len() < 2 {
        return Err(ConfigError::ChainTooShort);
    }
    let last = roles.len() - 1;
    for (index, &role) in roles.iter().enumerate() {
        let at_end = index == 0 || index == last;
        if at_end != role.is_host() {
            return Err(ConfigError::MisplacedRole { index, role });
        }
    }
    let originators = roles
        .iter()
        .filter(|r| matches!(r, Role::Host(HostMode::Originator)))
        .count();
    if originators > 1 {
        return Err(ConfigError::TooManyOriginators(originators));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_pass_through() {
        let cfg = SimulatorConfig::default();
        assert_eq!(cfg.loss_rate, 0.0);
        assert_eq!(cfg.corrupt_rate, 0.0);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn probabilities_are_range_checked() {
        let cfg = SimulatorConfig {
            loss_rate: 1.5,
            ..SimulatorConfig::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::ProbabilityOutOfRange {
                name: "loss_rate",
                value: 1.5
            })
        );
    }

    #[test]
    fn propagation_delay_is_bounded() {
        let cfg = SimulatorConfig {
            link: LinkParams {
                bandwidth_bps: 56_000,
                propagation_delay: Duration::from_secs(3600),
            },
            ..SimulatorConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::PropagationDelayTooLong { .. })
        ));
    }

    #[test]
    fn payloads_left_at_a_silent_host_are_reported() {
        // The receiving host never enables intake, so its queue never drains.
        let mut sim = Simulator::linear(SimulatorConfig::default(), 0).unwrap();
        sim.offer(1, vec![b"stuck".to_vec()]).unwrap();
        assert!(matches!(
            sim.run(),
            Err(SimError::Undrained {
                index: 1,
                pending: 1
            })
        ));
    }

    #[test]
    fn chain_layout_is_validated() {
        let host = Role::Host(HostMode::Receiver);
        let origin = Role::Host(HostMode::Originator);
        assert_eq!(validate_chain(&[host]), Err(ConfigError::ChainTooShort));
        assert_eq!(
            validate_chain(&[host, host, host]),
            Err(ConfigError::MisplacedRole {
                index: 1,
                role: host
            })
        );
        assert_eq!(
            validate_chain(&[Role::Router, host]),
            Err(ConfigError::MisplacedRole {
                index: 0,
                role: Role::Router
            })
        );
        assert_eq!(
            validate_chain(&[origin, origin]),
            Err(ConfigError::TooManyOriginators(2))
        );
        assert!(validate_chain(&[origin, Role::Router, Role::Router, host]).is_ok());
    }

    #[test]
    fn events_pop_in_time_then_insertion_order() {
        let mut heap = BinaryHeap::new();
        for (at, id) in [(5, 1), (1, 2), (5, 0), (3, 3)] {
            heap.push(Scheduled {
                at: Duration::from_millis(at),
                id,
                event: SimEvent::AppReady { node: 0 },
            });
        }
        let order: Vec<_> = std::iter::from_fn(|| heap.pop().map(|s| (s.at.as_millis(), s.id)))
            .collect();
        assert_eq!(order, vec![(1, 2), (3, 3), (5, 0), (5, 1)]);
    }

    #[test]
    fn offering_to_a_router_is_rejected() {
        let mut sim = Simulator::linear(SimulatorConfig::default(), 1).unwrap();
        assert!(matches!(
            sim.offer(1, vec![b"x".to_vec()]),
            Err(SimError::Node {
                index: 1,
                source: NodeError::NotAHost
            })
        ));
        assert!(matches!(
            sim.offer(9, vec![b"x".to_vec()]),
            Err(SimError::NoSuchNode(9))
        ));
    }
}
