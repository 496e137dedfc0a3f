//! Async UDP link abstraction.
//!
//! [`LinkSocket`] is a thin wrapper around `tokio::net::UdpSocket` that models
//! one point-to-point link: it is bound locally and connected to exactly one
//! peer, so datagrams from anyone else are filtered by the OS.  It moves raw
//! frame bytes only; validating them is the node's job.

use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::UdpSocket;

use crate::frame::{HEADER_LEN, MAX_MESSAGE_SIZE};

/// Receive buffer size; one byte of slack so oversized frames reach the
/// decoder and are rejected there instead of being silently truncated.
const MAX_DATAGRAM: usize = HEADER_LEN + MAX_MESSAGE_SIZE + 1;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can arise from socket operations.
#[derive(Debug, Error)]
pub enum SocketError {
    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// UnconnectedLink
// ---------------------------------------------------------------------------

/// A bound link end that does not know its peer yet.
///
/// Useful when both ends pick ephemeral ports and must learn each other's
/// address before connecting.
#[derive(Debug)]
pub struct UnconnectedLink {
    pub local_addr: SocketAddr,
    inner: UdpSocket,
}

impl UnconnectedLink {
    pub async fn bind(local_addr: SocketAddr) -> Result<Self, SocketError> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self { local_addr, inner })
    }

    /// Attach the link to `peer`.
    pub async fn connect(self, peer: SocketAddr) -> Result<LinkSocket, SocketError> {
        self.inner.connect(peer).await?;
        Ok(LinkSocket {
            local_addr: self.local_addr,
            peer,
            inner: self.inner,
        })
    }
}

// ---------------------------------------------------------------------------
// LinkSocket
// ---------------------------------------------------------------------------

/// One end of a point-to-point UDP link.
///
/// All methods are `&self` so the socket can be shared across tasks if needed.
#[derive(Debug)]
pub struct LinkSocket {
    /// Address this socket is bound to (filled in after OS assigns ephemeral port).
    pub local_addr: SocketAddr,
    /// The single peer on the other end of the link.
    pub peer: SocketAddr,
    inner: UdpSocket,
}

impl LinkSocket {
    /// Bind to `local_addr` and connect to `peer`.
    ///
    /// Passing port 0 lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr, peer: SocketAddr) -> Result<Self, SocketError> {
        let inner = UdpSocket::bind(local_addr).await?;
        inner.connect(peer).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self {
            local_addr,
            peer,
            inner,
        })
    }

    /// Send `bytes` as a single datagram to the peer.
    pub async fn send(&self, bytes: &[u8]) -> Result<(), SocketError> {
        self.inner.send(bytes).await?;
        Ok(())
    }

    /// Receive the next datagram from the peer.
    pub async fn recv(&self) -> Result<Vec<u8>, SocketError> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let n = self.inner.recv(&mut buf).await?;
        buf.truncate(n);
        Ok(buf)
    }
}
