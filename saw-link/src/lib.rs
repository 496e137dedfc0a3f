//! `saw-link`: a stop-and-wait (alternating-bit) data link layer for a
//! linear chain of hosts and routers.
//!
//! # Architecture
//!
//! ```text
//!   Host A ────link──── Router ────link──── Router ────link──── Host B
//!   (originator)        relay               relay               (receiver)
//!
//!  ┌──────────────┐  Event   ┌────────────────────────────┐
//!  │  simulator   │─────────▶│           Node             │
//!  │  or runtime  │          │  HostEngine | RouterEngine │
//!  │ (medium,     │◀─────────│  (pure state transitions)  │
//!  │  timers, app)│  Actions └────────────────────────────┘
//!  └──────────────┘
//! ```
//!
//! Each hop runs its own single-frame window with a one-bit sequence number,
//! so reliable end-to-end delivery is the composition of reliable hops.
//! Engines never perform I/O; they return [`event::Action`]s that whoever
//! drives them carries out.
//!
//! Each module has a single responsibility:
//! - [`frame`]: wire format and CRC-16 checksum
//! - [`event`]: inbound events and outbound actions
//! - [`state`]: roles, sender states, receive policy
//! - [`timer`]: link timing and the tokened retransmit timer
//! - [`sender`]: outbound stop-and-wait window
//! - [`receiver`]: inbound alternating-bit window
//! - [`host`]: end-station engine (sender + receiver)
//! - [`router`]: two chained windows around a one-frame slot
//! - [`node`]: role dispatch and frame validation
//! - [`config`]: node configuration and validation
//! - [`metrics`]: per-node counters
//! - [`simulator`]: deterministic lossy chain simulator
//! - [`socket`]: async UDP link abstraction
//! - [`runtime`]: tokio driver running a node over UDP links

pub mod config;
pub mod event;
pub mod frame;
pub mod host;
pub mod metrics;
pub mod node;
pub mod receiver;
pub mod router;
pub mod runtime;
pub mod sender;
pub mod simulator;
pub mod socket;
pub mod state;
pub mod timer;
