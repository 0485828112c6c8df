//! Reliable-UDP multiplayer transport connecting DS instances across a LAN.
//!
//! Every peer runs its own [`rusty_enet::Host`]. The host relays the player
//! roster over a control channel; once a client learns a peer's address it
//! connects to that peer directly, so the MP data channel ends up as a full
//! mesh rather than a host-relayed star — this matches how the reference
//! implementation avoids adding host-relay latency to gameplay frames.
//!
//! Session discovery is handled separately by [`discovery::Discovery`], on
//! its own broadcast socket.

pub mod discovery;
pub mod error;

use std::collections::VecDeque;
use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use rusty_enet::{Event, Host, HostSettings, Packet, PacketKind as EnetPacketKind, Peer};

use nifi_proto::{
    ControlMessage, MpPacketHeader, MpTransport, Player, PlayerList, PlayerStatus, RecvHostOutcome,
    RecvOutcome, RepliesResult, PacketKind,
};
use nifi_shared::log::Target;

use error::LanError;

/// Port the MP data/control enet host listens on.
pub const LAN_PORT: u16 = 7064;

const CHAN_CMD: u8 = 0;
const CHAN_MP: u8 = 1;

/// How long a blocking MP receive waits for a frame before giving up.
const MP_RECV_TIMEOUT: Duration = Duration::from_millis(25);

/// A frame is considered stale, and dropped rather than delivered, once it
/// has sat in the receive queue this long — long enough that the core
/// almost certainly moved past the point it was useful for.
const STALE_AFTER_MS: u64 = 16;

struct QueuedFrame {
    header: MpPacketHeader,
    payload: Vec<u8>,
    received_at: Instant,
}

/// The reliable-UDP LAN transport. One instance per local DS core that
/// participates in the session (in practice, just one per process — LAN
/// play doesn't support multiple local instances the way LocalMP does).
pub struct LanTransport {
    host: Host<UdpSocket>,
    is_host: bool,
    my_aid: u16,
    connected_mask: u16,
    last_host_id: i32,
    host_peer: Option<Peer>,
    remote_peers: [Option<Peer>; 16],
    players: PlayerList,
    rx_queue: VecDeque<QueuedFrame>,
}

impl LanTransport {
    /// Starts a new session as the host, accepting up to `max_players`
    /// participants (including itself).
    pub fn host(name: &str, max_players: u8, bind_addr: SocketAddr) -> Result<Self, LanError> {
        let socket = UdpSocket::bind(bind_addr).map_err(LanError::HostCreate)?;
        let host = Host::new(
            socket,
            HostSettings {
                peer_limit: max_players.max(1) as usize,
                channel_limit: 2,
                incoming_bandwidth_limit: None,
                outgoing_bandwidth_limit: None,
                ..Default::default()
            },
        )
        .map_err(LanError::HostCreate)?;

        tracing::info!(target: Target::Lan.as_str(), %name, max_players, "hosting LAN session");

        let mut players = PlayerList::new();
        players.players.push(Player {
            aid: 0,
            name: name.to_owned(),
            status: PlayerStatus::Host,
            address: 0,
        });

        Ok(Self {
            host,
            is_host: true,
            my_aid: 0,
            connected_mask: 1,
            last_host_id: -1,
            host_peer: None,
            remote_peers: std::array::from_fn(|_| None),
            players,
            rx_queue: VecDeque::new(),
        })
    }

    /// Joins an existing session hosted at `host_addr`.
    pub fn join(name: &str, bind_addr: SocketAddr, host_addr: SocketAddr) -> Result<Self, LanError> {
        let socket = UdpSocket::bind(bind_addr).map_err(LanError::HostCreate)?;
        let mut host = Host::new(
            socket,
            HostSettings {
                peer_limit: 16,
                channel_limit: 2,
                incoming_bandwidth_limit: None,
                outgoing_bandwidth_limit: None,
                ..Default::default()
            },
        )
        .map_err(LanError::HostCreate)?;

        let host_peer = host
            .connect(host_addr, 2, 0)
            .map_err(|err| LanError::Connect(host_addr, std::io::Error::new(std::io::ErrorKind::Other, err.to_string())))?;

        tracing::info!(target: Target::Lan.as_str(), %name, %host_addr, "joining LAN session");

        Ok(Self {
            host,
            is_host: false,
            my_aid: 0,
            connected_mask: 0,
            last_host_id: -1,
            host_peer: Some(host_peer),
            remote_peers: std::array::from_fn(|_| None),
            players: PlayerList::new(),
            rx_queue: VecDeque::new(),
        })
    }

    /// Services connection, disconnection and control-channel traffic
    /// without touching the MP queue. Callers should invoke this roughly
    /// once per local frame regardless of whether they also poll MP frames
    /// that frame.
    pub fn poll_control(&mut self) -> Result<(), LanError> {
        loop {
            match self.host.service().map_err(LanError::HostRead)? {
                None => return Ok(()),
                Some(Event::Connect { peer, .. }) => self.handle_connect(peer),
                Some(Event::Disconnect { peer, .. }) => self.handle_disconnect(peer),
                Some(Event::Receive { peer, channel_id, packet }) => {
                    if channel_id == CHAN_MP {
                        self.enqueue_mp_frame(packet.data());
                    } else {
                        self.handle_control_message(peer, packet.data());
                    }
                }
            }
        }
    }

    fn handle_connect(&mut self, peer: Peer) {
        if self.is_host {
            let aid = (1..16).find(|aid| self.remote_peers[*aid as usize].is_none()).unwrap_or(0);
            self.remote_peers[aid as usize] = Some(peer);
            self.players.players.push(Player {
                aid,
                name: String::new(),
                status: PlayerStatus::Connecting,
                address: 0,
            });
            if let Ok(msg) = (ControlMessage::ClientInit { aid }).encode() {
                let _ = peer.send(CHAN_CMD, &Packet::new(&msg, EnetPacketKind::Reliable));
            }
            self.broadcast_player_list();
        } else {
            self.host_peer = Some(peer);
        }
    }

    fn handle_disconnect(&mut self, peer: Peer) {
        if let Some(aid) = self.aid_of(peer) {
            self.connected_mask &= !(1 << aid);
            if let Some(player) = self.players.players.iter_mut().find(|p| p.aid == aid) {
                player.status = PlayerStatus::Disconnected;
            }
            self.remote_peers[aid as usize] = None;
            if self.is_host {
                self.broadcast_player_list();
            }
        }
    }

    fn aid_of(&self, peer: Peer) -> Option<u16> {
        self.remote_peers
            .iter()
            .enumerate()
            .find(|(_, p)| matches!(p, Some(candidate) if *candidate == peer))
            .map(|(aid, _)| aid as u16)
    }

    fn broadcast_player_list(&mut self) {
        let Ok(msg) = (ControlMessage::PlayerList(self.players.clone())).encode() else {
            return;
        };
        let packet = Packet::new(&msg, EnetPacketKind::Reliable);
        self.host.broadcast(CHAN_CMD, &packet);
    }

    fn handle_control_message(&mut self, peer: Peer, data: &[u8]) {
        let Ok(msg) = ControlMessage::decode(data) else {
            tracing::debug!(target: Target::Lan.as_str(), "dropped malformed control message");
            return;
        };

        match msg {
            ControlMessage::ClientInit { aid } => {
                self.my_aid = aid;
                self.connected_mask |= 1 << aid;
                if let Ok(reply) = (ControlMessage::PlayerInfo { name: String::new() }).encode() {
                    let _ = peer.send(CHAN_CMD, &Packet::new(&reply, EnetPacketKind::Reliable));
                }
            }
            ControlMessage::PlayerInfo { name } => {
                if let Some(aid) = self.aid_of(peer) {
                    if let Some(player) = self.players.players.iter_mut().find(|p| p.aid == aid) {
                        player.name = name;
                        player.status = PlayerStatus::Client;
                    }
                    self.broadcast_player_list();
                }
            }
            ControlMessage::PlayerList(list) => {
                self.players = list;
                self.connect_to_new_peers();
            }
            ControlMessage::PlayerConnect => {
                if let Some(aid) = self.aid_of(peer) {
                    self.connected_mask |= 1 << aid;
                }
            }
            ControlMessage::PlayerDisconnect => {
                if let Some(aid) = self.aid_of(peer) {
                    self.connected_mask &= !(1 << aid);
                }
            }
        }
    }

    /// Connects directly to any newly-announced peer we aren't already
    /// talking to, forming the full mesh the MP data channel relies on.
    fn connect_to_new_peers(&mut self) {
        let my_aid = self.my_aid;
        for player in self.players.players.clone() {
            if player.aid == my_aid || player.status != PlayerStatus::Client {
                continue;
            }
            if self.remote_peers[player.aid as usize].is_some() {
                continue;
            }
            let addr = SocketAddr::from((std::net::Ipv4Addr::from(player.address), LAN_PORT));
            if let Ok(peer) = self.host.connect(addr, 2, 0) {
                self.remote_peers[player.aid as usize] = Some(peer);
            }
        }
    }

    fn enqueue_mp_frame(&mut self, data: &[u8]) {
        let header = match MpPacketHeader::decode(data) {
            Ok(h) => h,
            Err(_) => return,
        };
        if header.sender == self.my_aid as u32 {
            return;
        }

        let payload = data[nifi_proto::HEADER_LEN..].to_vec();
        self.rx_queue.push_back(QueuedFrame {
            header,
            payload,
            received_at: Instant::now(),
        });
    }

    /// Drops any queued frame that has aged past [`STALE_AFTER_MS`],
    /// oldest-first.
    fn drop_stale_frames(&mut self) {
        while let Some(front) = self.rx_queue.front() {
            if front.received_at.elapsed().as_millis() as u64 > STALE_AFTER_MS {
                self.rx_queue.pop_front();
            } else {
                break;
            }
        }
    }

    /// The current player roster, as last broadcast by the host. Callers
    /// feed this to [`nifi_netplay`](https://docs.rs/nifi-netplay)'s
    /// synchronizer so it knows who to expect input from, without the
    /// synchronizer needing to know anything about ENet or control channels.
    pub fn players(&self) -> &PlayerList {
        &self.players
    }

    /// The association ID this session assigned to us.
    pub fn my_aid(&self) -> u16 {
        self.my_aid
    }

    fn send_generic(&mut self, kind: PacketKind, aid: u16, data: &[u8], timestamp: u64) -> usize {
        let header = MpPacketHeader::new(self.my_aid as u32, kind, data.len() as u32, timestamp).with_aid(aid);
        let mut buf = header.encode().to_vec();
        buf.extend_from_slice(data);

        let packet = Packet::new(&buf, EnetPacketKind::Unsequenced);
        if matches!(kind, PacketKind::Reply) {
            if let Some(host_peer) = self.host_peer {
                let _ = host_peer.send(CHAN_MP, &packet);
            }
        } else {
            self.host.broadcast(CHAN_MP, &packet);
        }
        data.len()
    }
}

impl MpTransport for LanTransport {
    type Error = LanError;

    fn begin(&mut self, inst: u32) -> Result<(), Self::Error> {
        self.my_aid = inst as u16;
        self.connected_mask |= 1 << inst;
        if !self.is_host {
            if let Ok(msg) = (ControlMessage::PlayerConnect).encode() {
                if let Some(host_peer) = self.host_peer {
                    let _ = host_peer.send(CHAN_CMD, &Packet::new(&msg, EnetPacketKind::Reliable));
                }
            }
        }
        Ok(())
    }

    fn end(&mut self, inst: u32) {
        self.connected_mask &= !(1 << inst);
        if let Ok(msg) = (ControlMessage::PlayerDisconnect).encode() {
            self.host.broadcast(CHAN_CMD, &Packet::new(&msg, EnetPacketKind::Reliable));
        }
    }

    fn send_packet(&mut self, _inst: u32, data: &[u8], timestamp: u64) -> Result<usize, Self::Error> {
        Ok(self.send_generic(PacketKind::Data, 0, data, timestamp))
    }

    fn send_cmd(&mut self, _inst: u32, data: &[u8], timestamp: u64) -> Result<usize, Self::Error> {
        Ok(self.send_generic(PacketKind::Cmd, 0, data, timestamp))
    }

    fn send_reply(&mut self, _inst: u32, data: &[u8], timestamp: u64, aid: u16) -> Result<usize, Self::Error> {
        Ok(self.send_generic(PacketKind::Reply, aid, data, timestamp))
    }

    fn send_ack(&mut self, _inst: u32, data: &[u8], timestamp: u64) -> Result<usize, Self::Error> {
        Ok(self.send_generic(PacketKind::Ack, 0, data, timestamp))
    }

    fn recv_packet(&mut self, _inst: u32) -> Option<RecvOutcome> {
        let _ = self.poll_control();
        self.drop_stale_frames();
        let frame = self.rx_queue.pop_front()?;
        if frame.header.kind == PacketKind::Cmd {
            self.last_host_id = frame.header.sender as i32;
        }
        Some(RecvOutcome {
            sender: frame.header.sender,
            kind: frame.header.kind,
            timestamp: frame.header.timestamp,
            payload: frame.payload,
        })
    }

    fn recv_host_packet(&mut self, inst: u32) -> RecvHostOutcome {
        if self.last_host_id != -1 && self.connected_mask & (1 << self.last_host_id) == 0 {
            return RecvHostOutcome::HostGone;
        }

        let deadline = Instant::now() + MP_RECV_TIMEOUT;
        loop {
            if let Some(outcome) = self.recv_packet(inst) {
                return RecvHostOutcome::Data(outcome);
            }
            if Instant::now() >= deadline {
                return RecvHostOutcome::None;
            }
        }
    }

    fn recv_replies(&mut self, inst: u32, timestamp: u64, aid_mask: u16) -> RepliesResult {
        let mut my_inst_mask: u16 = 1 << inst;
        if (my_inst_mask & self.connected_mask) == self.connected_mask {
            return RepliesResult::default();
        }

        let mut ret_mask = 0u16;
        let mut replies = Vec::new();
        let deadline = Instant::now() + MP_RECV_TIMEOUT;

        loop {
            let _ = self.poll_control();
            self.drop_stale_frames();

            let Some(frame) = self.rx_queue.pop_front() else {
                if Instant::now() >= deadline {
                    return RepliesResult { aid_mask: ret_mask, replies };
                }
                continue;
            };

            let stale = frame.header.timestamp < timestamp.wrapping_sub(32);
            if frame.header.kind != PacketKind::Reply || stale {
                continue;
            }

            if !frame.payload.is_empty() {
                replies.push((frame.header.aid, frame.payload));
                ret_mask |= 1 << frame.header.aid;
            }

            my_inst_mask |= 1 << frame.header.sender;
            if (my_inst_mask & self.connected_mask) == self.connected_mask || (ret_mask & aid_mask) == aid_mask {
                return RepliesResult { aid_mask: ret_mask, replies };
            }
        }
    }
}
