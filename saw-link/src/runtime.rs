//! Tokio driver that runs one [`Node`] over real UDP links.
//!
//! # Architecture
//!
//! ```text
//!  Application
//!      │  send(payload) / recv()        NodeHandle
//!      │                               ┌──────────────────────┐
//!      └─────────────────────────────▶ │ app_tx  (channel)    │
//!                                      │ delivered_rx (chan.) │
//!                                      └──────────┬───────────┘
//!                                                 │ event_loop task
//!   link1 ◀──▶ LinkSocket ──┐                     │
//!                           ├── select! ──▶ Node::handle ──▶ actions
//!   link2 ◀──▶ LinkSocket ──┘      ▲
//!                                  └── retransmit deadline
//! ```
//!
//! The task's `select!` loop is the only thread of control for its node, so
//! every event runs to completion before the next one is looked at.  The
//! driver plays the timer facility: it remembers the one armed
//! [`TimerToken`] and its deadline, and hands the token back to the node when
//! the deadline passes.  Intake from the application channel is only polled
//! while the node has enabled it.

use std::future;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;

use crate::event::{Action, Event, LinkId};
use crate::node::Node;
use crate::socket::{LinkSocket, SocketError};
use crate::state::Role;
use crate::timer::TimerToken;

/// Capacity of the application-facing channels.
const CHANNEL_CAPACITY: usize = 64;

/// A "disarmed" timer fires this far in the future; the select! guard keeps
/// it from ever being acted on.
const FAR_FUTURE: Duration = Duration::from_secs(365 * 24 * 3600);

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("a {role} needs a socket for {link}")]
    MissingLink { role: Role, link: LinkId },

    #[error("the node task has stopped")]
    Stopped,

    #[error("the node task panicked: {0}")]
    Panicked(#[from] JoinError),
}

// ---------------------------------------------------------------------------
// Links
// ---------------------------------------------------------------------------

/// The sockets a node is attached to.  Hosts use link 1 only; routers use
/// link 1 upstream and link 2 downstream.
#[derive(Debug)]
pub struct Links {
    pub link1: LinkSocket,
    pub link2: Option<LinkSocket>,
}

impl Links {
    pub fn host(link1: LinkSocket) -> Self {
        Self { link1, link2: None }
    }

    pub fn router(upstream: LinkSocket, downstream: LinkSocket) -> Self {
        Self {
            link1: upstream,
            link2: Some(downstream),
        }
    }

    fn get(&self, link: LinkId) -> Option<&LinkSocket> {
        match link {
            LinkId(1) => Some(&self.link1),
            LinkId(2) => self.link2.as_ref(),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// NodeHandle
// ---------------------------------------------------------------------------

/// Handle returned by [`spawn`] for talking to a running node.
pub struct NodeHandle {
    app_tx: mpsc::Sender<Vec<u8>>,
    delivered_rx: mpsc::Receiver<Vec<u8>>,
    shutdown_tx: oneshot::Sender<()>,
    handle: JoinHandle<Node>,
}

impl NodeHandle {
    /// Queue a payload for the node's application intake.
    ///
    /// The node picks it up the next time intake is enabled.
    pub async fn send(&self, payload: Vec<u8>) -> Result<(), RuntimeError> {
        self.app_tx
            .send(payload)
            .await
            .map_err(|_| RuntimeError::Stopped)
    }

    /// Next payload the node delivered upward; `None` once the task is gone.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.delivered_rx.recv().await
    }

    /// Stop the event loop and hand back the node for inspection.
    pub async fn shutdown(self) -> Result<Node, RuntimeError> {
        // The task may already be gone; the join below reports how it ended.
        let _ = self.shutdown_tx.send(());
        Ok(self.handle.await?)
    }
}

/// Boot `node` and run it on its own task until shut down.
pub fn spawn(node: Node, links: Links) -> Result<NodeHandle, RuntimeError> {
    if node.role() == Role::Router && links.link2.is_none() {
        return Err(RuntimeError::MissingLink {
            role: node.role(),
            link: LinkId::DOWNSTREAM,
        });
    }

    let (app_tx, app_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (delivered_tx, delivered_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let handle = tokio::spawn(event_loop(node, links, app_rx, delivered_tx, shutdown_rx));
    Ok(NodeHandle {
        app_tx,
        delivered_rx,
        shutdown_tx,
        handle,
    })
}

// ---------------------------------------------------------------------------
// Background event loop
// ---------------------------------------------------------------------------

/// Everything the actions of one transition may touch.
struct Effects {
    delivered_tx: mpsc::Sender<Vec<u8>>,
    timer: Option<(TimerToken, Instant)>,
    intake_enabled: bool,
}

impl Effects {
    async fn apply(&mut self, links: &Links, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Transmit { link, bytes } => {
                    let Some(socket) = links.get(link) else {
                        log::warn!("[udp] no socket for {link}, frame dropped");
                        continue;
                    };
                    log::trace!("[udp] → {link} {} bytes to {}", bytes.len(), socket.peer);
                    // A failed send is just a lost frame; the timer recovers it.
                    if let Err(e) = socket.send(&bytes).await {
                        log::warn!("[udp] send on {link} failed: {e}");
                    }
                }
                Action::StartTimer { token, after } => {
                    let now = Instant::now();
                    let at = now.checked_add(after).unwrap_or(now + FAR_FUTURE);
                    self.timer = Some((token, at));
                }
                Action::CancelTimer(token) => {
                    if matches!(self.timer, Some((armed, _)) if armed == token) {
                        self.timer = None;
                    }
                }
                Action::Deliver(payload) => {
                    if self.delivered_tx.send(payload).await.is_err() {
                        log::debug!("[udp] application gone, delivery discarded");
                    }
                }
                Action::EnableApplication => self.intake_enabled = true,
                Action::DisableApplication => self.intake_enabled = false,
            }
        }
    }

    fn deadline(&self) -> Instant {
        self.timer
            .map(|(_, at)| at)
            .unwrap_or_else(|| Instant::now() + FAR_FUTURE)
    }
}

async fn recv_on(socket: Option<&LinkSocket>) -> Result<Vec<u8>, SocketError> {
    match socket {
        Some(socket) => socket.recv().await,
        None => future::pending().await,
    }
}

async fn event_loop(
    mut node: Node,
    links: Links,
    mut app_rx: mpsc::Receiver<Vec<u8>>,
    delivered_tx: mpsc::Sender<Vec<u8>>,
    mut shutdown_rx: oneshot::Receiver<()>,
) -> Node {
    let mut fx = Effects {
        delivered_tx,
        timer: None,
        intake_enabled: false,
    };
    let mut app_open = true;

    log::info!(
        "[udp] {} up on {} (peer {})",
        node.role(),
        links.link1.local_addr,
        links.link1.peer
    );
    let boot = node.boot();
    fx.apply(&links, boot).await;

    loop {
        let deadline = fx.deadline();
        let event = tokio::select! {
            // ── Branch 1: frames from either link ─────────────────────────
            result = links.link1.recv() => match result {
                Ok(bytes) => Event::FrameArrived { link: LinkId(1), bytes },
                Err(e) => {
                    // E.g. ICMP port unreachable while the peer is not up yet.
                    log::debug!("[udp] recv on link1 failed: {e}");
                    continue;
                }
            },
            result = recv_on(links.link2.as_ref()) => match result {
                Ok(bytes) => Event::FrameArrived { link: LinkId(2), bytes },
                Err(e) => {
                    log::debug!("[udp] recv on link2 failed: {e}");
                    continue;
                }
            },

            // ── Branch 2: retransmit deadline ────────────────────────────
            _ = tokio::time::sleep_until(deadline), if fx.timer.is_some() => {
                match fx.timer.take() {
                    Some((token, _)) => Event::TimerExpired(token),
                    None => continue,
                }
            }

            // ── Branch 3: application intake, only while enabled ─────────
            maybe_payload = app_rx.recv(), if fx.intake_enabled && app_open => {
                match maybe_payload {
                    Some(payload) => Event::ApplicationReady(payload),
                    None => {
                        log::debug!("[udp] application closed its send channel");
                        app_open = false;
                        continue;
                    }
                }
            }

            // ── Branch 4: shutdown (or handle dropped) ───────────────────
            _ = &mut shutdown_rx => break,
        };

        // Rejected payloads are already logged by the node.
        if let Ok(actions) = node.handle(event) {
            fx.apply(&links, actions).await;
        }
    }

    log::info!("[udp] {} stopping: {}", node.role(), node.show_state());
    node
}
