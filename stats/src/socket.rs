//! Fire-and-forget UDP sink for diagnostic packets.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};

use tracing::{debug, warn};

use crate::accumulator::TickStats;
use crate::packet::encode_stats_packet;

/// Sends [`TickStats`] to a local diagnostics listener.
///
/// Failures are logged and counted, never returned: observing the protocol
/// must not be able to disturb it.
#[derive(Debug)]
pub struct StatsSocket {
    socket: UdpSocket,
    target: SocketAddr,
    sent: u64,
    failed: u64,
}

impl StatsSocket {
    /// Binds an ephemeral local port for sending to `target`.
    pub fn bind(target: SocketAddr) -> io::Result<Self> {
        let local: SocketAddr = if target.is_ipv4() {
            (Ipv4Addr::LOCALHOST, 0).into()
        } else {
            (Ipv6Addr::LOCALHOST, 0).into()
        };
        let socket = UdpSocket::bind(local)?;
        socket.set_nonblocking(true)?;
        Ok(Self {
            socket,
            target,
            sent: 0,
            failed: 0,
        })
    }

    #[must_use]
    pub const fn target(&self) -> SocketAddr {
        self.target
    }

    #[must_use]
    pub const fn sent(&self) -> u64 {
        self.sent
    }

    #[must_use]
    pub const fn failed(&self) -> u64 {
        self.failed
    }

    pub fn send(&mut self, stats: &TickStats) {
        let bytes = match encode_stats_packet(stats) {
            Ok(bytes) => bytes,
            Err(err) => {
                self.failed += 1;
                warn!(%err, tick = stats.tick.index(), "stats packet not encoded");
                return;
            }
        };
        match self.socket.send_to(&bytes, self.target) {
            Ok(_) => self.sent += 1,
            Err(err) => {
                self.failed += 1;
                if self.failed == 1 {
                    warn!(%err, target = %self.target, "stats packet not sent");
                } else {
                    debug!(%err, failed = self.failed, "stats packet not sent");
                }
            }
        }
    }
}
