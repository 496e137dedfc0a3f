//! Node role dispatcher.
//!
//! A [`Node`] owns the complete protocol state of one station in the chain.
//! Its responsibilities are:
//! - Choosing the Host or Router engine from the configured [`Role`].
//! - Validating raw frames before any engine sees them.
//! - Routing each inbound [`Event`] to the engine and returning its
//!   [`Action`]s.
//! - Answering the diagnostic query.
//!
//! Each node is an independent value; any number of them can live in one
//! process without sharing anything.

use thiserror::Error;

use crate::config::{ConfigError, NodeConfig};
use crate::event::{Action, Event, LinkId};
use crate::frame::{Frame, FrameError, FrameKind};
use crate::host::{HostEngine, HOST_LINK};
use crate::metrics::NodeStats;
use crate::router::RouterEngine;
use crate::state::Role;

/// Errors returned to whoever feeds the node application payloads.
///
/// None of them is fatal; the node's state is unchanged when one is returned.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NodeError {
    #[error("application intake is suspended until the outstanding frame is acknowledged")]
    IntakeSuspended,

    #[error("routers do not accept application payloads")]
    NotAHost,

    #[error("payload of {len} bytes exceeds the {max}-byte message limit")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
}

#[derive(Debug)]
enum Engine {
    Host(HostEngine),
    Router(RouterEngine),
}

/// One station of the chain.
#[derive(Debug)]
pub struct Node {
    role: Role,
    engine: Engine,
}

impl Node {
    pub fn new(config: NodeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let engine = match config.role {
            Role::Host(mode) => Engine::Host(HostEngine::new(
                mode,
                config.data_link,
                config.receive_policy,
            )),
            Role::Router => Engine::Router(RouterEngine::new(
                config.data_link,
                config.receive_policy,
            )),
        };
        Ok(Self {
            role: config.role,
            engine,
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Actions to perform once, before any event is delivered.
    pub fn boot(&self) -> Vec<Action> {
        log::info!("booting {}", self.role);
        match &self.engine {
            Engine::Host(host) => host.boot(),
            Engine::Router(_) => Vec::new(),
        }
    }

    /// Run one transition to completion.
    pub fn handle(&mut self, event: Event) -> Result<Vec<Action>, NodeError> {
        match event {
            Event::FrameArrived { link, bytes } => Ok(self.on_frame(link, &bytes)),
            Event::TimerExpired(token) => Ok(match &mut self.engine {
                Engine::Host(host) => host.on_timeout(token),
                Engine::Router(router) => router.on_timeout(token),
            }),
            Event::ApplicationReady(payload) => match &mut self.engine {
                Engine::Host(host) => host.on_payload(payload).inspect_err(|e| {
                    log::warn!("[host] payload rejected: {e}");
                }),
                Engine::Router(_) => Err(NodeError::NotAHost),
            },
        }
    }

    fn on_frame(&mut self, link: LinkId, bytes: &[u8]) -> Vec<Action> {
        let frame = match Frame::decode(bytes) {
            Ok(frame) => frame,
            Err(e) => {
                log::debug!("[{}] ← frame on {link} dropped: {e}", self.role);
                self.stats_mut().corrupt_dropped += 1;
                return Vec::new();
            }
        };
        if link != self.expected_link(frame.kind) {
            log::debug!(
                "[{}] ← {} seq={} on {link} dropped, wrong link",
                self.role,
                frame.kind,
                frame.seq
            );
            self.stats_mut().wrong_link_dropped += 1;
            return Vec::new();
        }
        match &mut self.engine {
            Engine::Host(host) => host.on_frame(frame),
            Engine::Router(router) => router.on_frame(frame),
        }
    }

    /// Link a frame of `kind` must arrive on.  DATA only flows downstream, so
    /// a router takes it from link 1 and the matching ACKs from link 2.
    fn expected_link(&self, kind: FrameKind) -> LinkId {
        match (&self.engine, kind) {
            (Engine::Host(_), _) => HOST_LINK,
            (Engine::Router(_), FrameKind::Data) => LinkId::UPSTREAM,
            (Engine::Router(_), FrameKind::Ack) => LinkId::DOWNSTREAM,
        }
    }

    /// Diagnostic dump of the window bits.
    pub fn show_state(&self) -> String {
        match &self.engine {
            Engine::Host(host) => host.show_state(),
            Engine::Router(router) => router.show_state(),
        }
    }

    pub fn stats(&self) -> &NodeStats {
        match &self.engine {
            Engine::Host(host) => &host.stats,
            Engine::Router(router) => &router.stats,
        }
    }

    fn stats_mut(&mut self) -> &mut NodeStats {
        match &mut self.engine {
            Engine::Host(host) => &mut host.stats,
            Engine::Router(router) => &mut router.stats,
        }
    }

    pub fn as_host(&self) -> Option<&HostEngine> {
        match &self.engine {
            Engine::Host(host) => Some(host),
            Engine::Router(_) => None,
        }
    }

    pub fn as_router(&self) -> Option<&RouterEngine> {
        match &self.engine {
            Engine::Router(router) => Some(router),
            Engine::Host(_) => None,
        }
    }
}
