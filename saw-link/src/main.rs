//! Entry point for `saw-link`.
//!
//! Parses CLI arguments and dispatches into either **simulate** or **node**
//! mode.  All actual protocol work is delegated to library modules; `main.rs`
//! owns only process setup (logging, signal handling, argument parsing).

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use saw_link::config::NodeConfig;
use saw_link::node::Node;
use saw_link::runtime::{self, Links};
use saw_link::simulator::{Simulator, SimulatorConfig};
use saw_link::socket::LinkSocket;
use saw_link::state::{HostMode, ReceivePolicy, Role};
use saw_link::timer::LinkParams;

/// Stop-and-wait data link over a chain of hosts and routers.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Run a whole chain in the deterministic simulator.
    Simulate {
        /// Routers between the two hosts.
        #[arg(long, default_value_t = 1)]
        routers: usize,
        /// Messages the originator sends.
        #[arg(long, default_value_t = 10)]
        messages: usize,
        /// Probability of losing a frame.
        #[arg(long, default_value_t = 0.0)]
        loss: f64,
        /// Probability of corrupting a frame.
        #[arg(long, default_value_t = 0.0)]
        corrupt: f64,
        #[arg(long, default_value_t = 0)]
        seed: u64,
        #[command(flatten)]
        link: LinkArgs,
    },
    /// Run one node over UDP.
    Node {
        /// originator, receiver or router.
        #[arg(long)]
        role: Role,
        /// Upstream (or only) link as LOCAL=PEER, e.g. 127.0.0.1:9001=127.0.0.1:9002.
        #[arg(long, value_parser = parse_link)]
        link1: (SocketAddr, SocketAddr),
        /// Downstream link of a router, as LOCAL=PEER.
        #[arg(long, value_parser = parse_link)]
        link2: Option<(SocketAddr, SocketAddr)>,
        #[command(flatten)]
        link: LinkArgs,
    },
}

#[derive(clap::Args)]
struct LinkArgs {
    /// Link bandwidth in bits per second.
    #[arg(long, default_value_t = 56_000)]
    bandwidth: u64,
    /// One-way propagation delay in microseconds.
    #[arg(long, default_value_t = 2_500)]
    propagation_us: u64,
    /// Ignore out-of-sequence DATA instead of re-acknowledging it.
    #[arg(long)]
    silent_drop: bool,
}

impl LinkArgs {
    fn params(&self) -> LinkParams {
        LinkParams {
            bandwidth_bps: self.bandwidth,
            propagation_delay: Duration::from_micros(self.propagation_us),
        }
    }

    fn policy(&self) -> ReceivePolicy {
        if self.silent_drop {
            ReceivePolicy::SilentDrop
        } else {
            ReceivePolicy::AckDuplicates
        }
    }
}

fn parse_link(s: &str) -> Result<(SocketAddr, SocketAddr), String> {
    let (local, peer) = s
        .split_once('=')
        .ok_or_else(|| format!("expected LOCAL=PEER, got {s:?}"))?;
    let local = local.parse().map_err(|e| format!("bad local address: {e}"))?;
    let peer = peer.parse().map_err(|e| format!("bad peer address: {e}"))?;
    Ok((local, peer))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Simulate {
            routers,
            messages,
            loss,
            corrupt,
            seed,
            link,
        } => simulate(routers, messages, loss, corrupt, seed, &link),
        Mode::Node {
            role,
            link1,
            link2,
            link,
        } => run_node(role, link1, link2, &link).await,
    }
}

fn simulate(
    routers: usize,
    messages: usize,
    loss: f64,
    corrupt: f64,
    seed: u64,
    link: &LinkArgs,
) -> anyhow::Result<()> {
    let config = SimulatorConfig {
        link: link.params(),
        loss_rate: loss,
        corrupt_rate: corrupt,
        seed,
        receive_policy: link.policy(),
        ..SimulatorConfig::default()
    };
    let mut sim = Simulator::linear(config, routers).context("invalid simulation settings")?;
    sim.offer(0, (0..messages).map(|i| format!("message {i}").into_bytes()))?;
    sim.run()?;

    let last = sim.len() - 1;
    println!(
        "delivered {}/{} messages in {:?} of simulated time",
        sim.delivered(last).len(),
        messages,
        sim.now()
    );
    for index in 0..sim.len() {
        let node = sim.node(index);
        println!("node {index} ({}): {}", node.role(), node.show_state());
        println!("    {}", node.stats().summary());
    }
    Ok(())
}

async fn run_node(
    role: Role,
    link1: (SocketAddr, SocketAddr),
    link2: Option<(SocketAddr, SocketAddr)>,
    link: &LinkArgs,
) -> anyhow::Result<()> {
    let config = NodeConfig::new(role)
        .with_link(link.params())
        .with_policy(link.policy());
    let node = Node::new(config)?;

    let upstream = LinkSocket::bind(link1.0, link1.1).await?;
    let links = match link2 {
        Some((local, peer)) => Links::router(upstream, LinkSocket::bind(local, peer).await?),
        None => Links::host(upstream),
    };
    let mut handle = runtime::spawn(node, links)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = role == Role::Host(HostMode::Originator);

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) => handle.send(line.into_bytes()).await?,
                None => stdin_open = false,
            },
            Some(payload) = handle.recv() => {
                println!("{}", String::from_utf8_lossy(&payload));
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    let node = handle.shutdown().await?;
    log::info!("final state: {}", node.show_state());
    log::info!("{}", node.stats().summary());
    Ok(())
}
