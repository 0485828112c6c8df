//! Broadcast-based session discovery, kept on its own socket and port so
//! discovery traffic never competes with the MP data channel.

use std::collections::HashMap;
use std::net::{SocketAddr, SocketAddrV4, UdpSocket};
use std::time::Instant;

use nifi_proto::discovery::{BeaconRecord, SessionStatus, BEACON_RECORD_LEN};
use nifi_shared::log::Target;

use crate::error::LanError;

/// UDP port dedicated to discovery beacons.
pub const DISCOVERY_PORT: u16 = 7063;

/// Listens for and/or emits discovery beacons on the local broadcast
/// domain.
pub struct Discovery {
    socket: UdpSocket,
    last_tick: u32,
    started_at: Instant,
    seen: HashMap<SocketAddr, BeaconRecord>,
}

impl Discovery {
    /// Binds the discovery socket and enables broadcast sends.
    pub fn start() -> Result<Self, LanError> {
        let socket = UdpSocket::bind(SocketAddrV4::new(std::net::Ipv4Addr::UNSPECIFIED, DISCOVERY_PORT))
            .map_err(LanError::DiscoveryBind)?;
        socket.set_broadcast(true).map_err(LanError::DiscoveryBind)?;
        socket.set_nonblocking(true).map_err(LanError::DiscoveryBind)?;

        tracing::info!(target: Target::Discovery.as_str(), "discovery socket bound on port {DISCOVERY_PORT}");

        Ok(Self {
            socket,
            last_tick: 0,
            started_at: Instant::now(),
            seen: HashMap::new(),
        })
    }

    fn tick(&mut self) -> u32 {
        self.last_tick = self.started_at.elapsed().as_millis() as u32;
        self.last_tick
    }

    /// Broadcasts a beacon advertising the given session.
    pub fn announce(
        &mut self,
        session_name: &str,
        num_players: u8,
        max_players: u8,
        status: SessionStatus,
    ) -> Result<(), LanError> {
        let tick = self.tick();
        let beacon = BeaconRecord {
            tick,
            session_name: session_name.to_owned(),
            num_players,
            max_players,
            status,
        };
        let encoded = beacon.encode()?;
        let dest = SocketAddrV4::new(std::net::Ipv4Addr::BROADCAST, DISCOVERY_PORT);
        let _ = self.socket.send_to(&encoded, dest);
        Ok(())
    }

    /// Drains any beacons that have arrived since the last call, updating
    /// the known-session table.
    pub fn poll(&mut self) {
        let mut buf = [0u8; BEACON_RECORD_LEN];
        loop {
            match self.socket.recv_from(&mut buf) {
                Ok((n, addr)) if n >= BEACON_RECORD_LEN => match BeaconRecord::decode(&buf) {
                    Ok(beacon) => {
                        self.seen.insert(addr, beacon);
                    }
                    Err(err) => {
                        tracing::debug!(target: Target::Discovery.as_str(), %err, "dropped malformed beacon");
                    }
                },
                Ok(_) => continue,
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    tracing::warn!(target: Target::Discovery.as_str(), %err, "discovery socket read failed");
                    break;
                }
            }
        }

        let now = self.tick();
        self.seen.retain(|_, beacon| now.wrapping_sub(beacon.tick) < STALE_AFTER_MS);
    }

    /// Returns every currently known, non-stale session.
    pub fn sessions(&self) -> Vec<(SocketAddr, BeaconRecord)> {
        self.seen.iter().map(|(addr, beacon)| (*addr, beacon.clone())).collect()
    }
}

const STALE_AFTER_MS: u32 = 5000;
