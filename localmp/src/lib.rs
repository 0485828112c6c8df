//! Shared-memory multiplayer transport for DS instances running inside the
//! same process (melonDS's "local multiplayer" mode, used for split-screen
//! and local co-op testing without a network in the loop).
//!
//! Two flat byte queues — one for `DATA`/`CMD`/`ACK` frames, one for
//! `REPLY` frames — are shared by every registered instance. Each instance
//! keeps its own read cursor into both queues; a shared write cursor per
//! queue lets [`LocalMp`] behave like 16 independent broadcast channels
//! without 16 copies of every frame. A per-instance semaphore pair signals
//! a reader when its cursor has new data to catch up to.

mod semaphore;

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use nifi_proto::{MpPacketHeader, MpTransport, PacketKind, RecvHostOutcome, RecvOutcome, RepliesResult, HEADER_LEN, MAX_FRAME_PAYLOAD};
use nifi_shared::log::Target;

use semaphore::Semaphore;

/// Capacity, in bytes, of the `DATA`/`CMD`/`ACK` queue and of the `REPLY`
/// queue.
const QUEUE_SIZE: u32 = 0x10000;

/// How long a blocking receive waits for a semaphore post before giving up;
/// matches the LAN transport's own receive poll interval.
const RECV_TIMEOUT: Duration = Duration::from_millis(25);

fn advance_offset(offset: &mut u32, len: u32, capacity: u32) {
    *offset += len;
    if *offset >= capacity {
        *offset -= capacity;
    }
}

/// Copies `len` bytes starting at `*offset` in `buf` into `out`, wrapping
/// around the end of `buf` as needed, and advances `*offset` past them.
fn fifo_read(buf: &[u8], offset: &mut u32, out: &mut [u8]) {
    let datalen = buf.len() as u32;
    let len = out.len() as u32;
    let start = *offset;

    if start + len >= datalen {
        let part1 = (datalen - start) as usize;
        out[..part1].copy_from_slice(&buf[start as usize..]);
        out[part1..].copy_from_slice(&buf[..out.len() - part1]);
        *offset = len - part1 as u32;
    } else {
        out.copy_from_slice(&buf[start as usize..start as usize + out.len()]);
        *offset = start + len;
    }
}

/// Writes `data` into `buf` starting at `*offset`, wrapping around the end
/// of `buf` as needed, and advances `*offset` past it.
fn fifo_write(buf: &mut [u8], offset: &mut u32, data: &[u8]) {
    let datalen = buf.len() as u32;
    let len = data.len() as u32;
    let start = *offset;

    if start + len >= datalen {
        let part1 = (datalen - start) as usize;
        buf[start as usize..].copy_from_slice(&data[..part1]);
        buf[..data.len() - part1].copy_from_slice(&data[part1..]);
        *offset = len - part1 as u32;
    } else {
        buf[start as usize..start as usize + data.len()].copy_from_slice(data);
        *offset = start + len;
    }
}

struct Queues {
    packet_buf: Vec<u8>,
    packet_write_offset: u32,
    packet_read_offset: [u32; 16],

    reply_buf: Vec<u8>,
    reply_write_offset: u32,
    reply_read_offset: [u32; 16],

    connected_mask: u16,
    mp_host_inst: u16,
    #[allow(dead_code)] // mirrors MPStatusData::MPReplyBitmask; kept for parity, not yet read back
    mp_reply_mask: u16,
}

impl Queues {
    fn new() -> Self {
        Self {
            packet_buf: vec![0u8; QUEUE_SIZE as usize],
            packet_write_offset: 0,
            packet_read_offset: [0; 16],
            reply_buf: vec![0u8; QUEUE_SIZE as usize],
            reply_write_offset: 0,
            reply_read_offset: [0; 16],
            connected_mask: 0,
            mp_host_inst: 0,
            mp_reply_mask: 0,
        }
    }
}

struct RawRecv {
    sender: u32,
    kind: PacketKind,
    timestamp: u64,
    payload: Vec<u8>,
}

/// The in-process, shared-memory multiplayer transport. Cheap to construct;
/// one instance is shared (typically behind an `Arc`) by every DS core
/// running in the same process.
pub struct LocalMp {
    queues: Mutex<Queues>,
    packet_sems: [Semaphore; 16],
    reply_sems: [Semaphore; 16],
    last_host_id: AtomicI32,
}

impl Default for LocalMp {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalMp {
    pub fn new() -> Self {
        tracing::info!(target: Target::LocalMp.as_str(), "local multiplayer transport initialized");
        Self {
            queues: Mutex::new(Queues::new()),
            packet_sems: std::array::from_fn(|_| Semaphore::new()),
            reply_sems: std::array::from_fn(|_| Semaphore::new()),
            last_host_id: AtomicI32::new(-1),
        }
    }

    fn send_generic(&self, inst: u32, kind: PacketKind, aid: u16, data: &[u8], timestamp: u64) -> usize {
        if data.len() > MAX_FRAME_PAYLOAD {
            tracing::warn!(
                target: Target::LocalMp.as_str(),
                len = data.len(),
                max = MAX_FRAME_PAYLOAD,
                "attempted to send frame too big"
            );
            return 0;
        }

        let header = MpPacketHeader::new(inst, kind, data.len() as u32, timestamp).with_aid(aid);
        let encoded = header.encode();
        let is_reply = matches!(kind, PacketKind::Reply);

        let mask;
        let host_inst;
        {
            let mut state = self.queues.lock().unwrap();
            mask = state.connected_mask;

            if is_reply {
                fifo_write(&mut state.reply_buf, &mut state.reply_write_offset, &encoded);
                if !data.is_empty() {
                    fifo_write(&mut state.reply_buf, &mut state.reply_write_offset, data);
                }
            } else {
                fifo_write(&mut state.packet_buf, &mut state.packet_write_offset, &encoded);
                if !data.is_empty() {
                    fifo_write(&mut state.packet_buf, &mut state.packet_write_offset, data);
                }
            }

            match kind {
                PacketKind::Cmd => {
                    state.mp_host_inst = inst as u16;
                    state.mp_reply_mask = 0;
                    state.reply_read_offset[inst as usize] = state.reply_write_offset;
                    self.reply_sems[inst as usize].reset();
                }
                PacketKind::Reply => {
                    state.mp_reply_mask |= 1 << inst;
                }
                PacketKind::Data | PacketKind::Ack => {}
            }

            host_inst = state.mp_host_inst;
        }

        if is_reply {
            self.reply_sems[host_inst as usize].post();
        } else {
            for i in 0..16u32 {
                if mask & (1 << i) != 0 {
                    self.packet_sems[i as usize].post();
                }
            }
        }

        data.len()
    }

    fn recv_generic(&self, inst: u32, block: bool) -> Option<RawRecv> {
        loop {
            let timeout = if block { RECV_TIMEOUT } else { Duration::ZERO };
            if !self.packet_sems[inst as usize].try_wait(timeout) {
                return None;
            }

            let mut state = self.queues.lock().unwrap();

            let mut hdr_buf = [0u8; HEADER_LEN];
            fifo_read(&state.packet_buf, &mut state.packet_read_offset[inst as usize], &mut hdr_buf);

            let header = match MpPacketHeader::decode(&hdr_buf) {
                Ok(h) => h,
                Err(_) => {
                    tracing::warn!(target: Target::LocalMp.as_str(), instance = inst, "packet fifo overflow");
                    let write_offset = state.packet_write_offset;
                    state.packet_read_offset[inst as usize] = write_offset;
                    self.packet_sems[inst as usize].reset();
                    return None;
                }
            };

            if header.sender == inst {
                advance_offset(&mut state.packet_read_offset[inst as usize], header.length, QUEUE_SIZE);
                continue;
            }

            let mut payload = vec![0u8; header.length as usize];
            if header.length > 0 {
                fifo_read(&state.packet_buf, &mut state.packet_read_offset[inst as usize], &mut payload);
                if header.kind == PacketKind::Cmd {
                    self.last_host_id.store(header.sender as i32, Ordering::SeqCst);
                }
            }

            return Some(RawRecv {
                sender: header.sender,
                kind: header.kind,
                timestamp: header.timestamp,
                payload,
            });
        }
    }
}

impl MpTransport for LocalMp {
    type Error = std::convert::Infallible;

    fn begin(&mut self, inst: u32) -> Result<(), Self::Error> {
        let mut state = self.queues.lock().unwrap();
        state.packet_read_offset[inst as usize] = state.packet_write_offset;
        state.reply_read_offset[inst as usize] = state.reply_write_offset;
        self.packet_sems[inst as usize].reset();
        self.reply_sems[inst as usize].reset();
        state.connected_mask |= 1 << inst;
        Ok(())
    }

    fn end(&mut self, inst: u32) {
        self.queues.lock().unwrap().connected_mask &= !(1 << inst);
    }

    fn send_packet(&mut self, inst: u32, data: &[u8], timestamp: u64) -> Result<usize, Self::Error> {
        Ok(self.send_generic(inst, PacketKind::Data, 0, data, timestamp))
    }

    fn send_cmd(&mut self, inst: u32, data: &[u8], timestamp: u64) -> Result<usize, Self::Error> {
        Ok(self.send_generic(inst, PacketKind::Cmd, 0, data, timestamp))
    }

    fn send_reply(&mut self, inst: u32, data: &[u8], timestamp: u64, aid: u16) -> Result<usize, Self::Error> {
        Ok(self.send_generic(inst, PacketKind::Reply, aid, data, timestamp))
    }

    fn send_ack(&mut self, inst: u32, data: &[u8], timestamp: u64) -> Result<usize, Self::Error> {
        Ok(self.send_generic(inst, PacketKind::Ack, 0, data, timestamp))
    }

    fn recv_packet(&mut self, inst: u32) -> Option<RecvOutcome> {
        self.recv_generic(inst, false).map(|r| RecvOutcome {
            sender: r.sender,
            kind: r.kind,
            timestamp: r.timestamp,
            payload: r.payload,
        })
    }

    fn recv_host_packet(&mut self, inst: u32) -> RecvHostOutcome {
        let last_host = self.last_host_id.load(Ordering::SeqCst);
        if last_host != -1 {
            let still_connected = self.queues.lock().unwrap().connected_mask & (1 << last_host) != 0;
            if !still_connected {
                return RecvHostOutcome::HostGone;
            }
        }

        match self.recv_generic(inst, true) {
            Some(r) => RecvHostOutcome::Data(RecvOutcome {
                sender: r.sender,
                kind: r.kind,
                timestamp: r.timestamp,
                payload: r.payload,
            }),
            None => RecvHostOutcome::None,
        }
    }

    fn recv_replies(&mut self, inst: u32, timestamp: u64, aid_mask: u16) -> RepliesResult {
        let mut my_inst_mask: u16 = 1 << inst;
        let cur_inst_mask = self.queues.lock().unwrap().connected_mask;
        if (my_inst_mask & cur_inst_mask) == cur_inst_mask {
            return RepliesResult::default();
        }

        let mut ret_mask = 0u16;
        let mut replies = Vec::new();

        loop {
            if !self.reply_sems[inst as usize].try_wait(RECV_TIMEOUT) {
                return RepliesResult { aid_mask: ret_mask, replies };
            }

            let mut state = self.queues.lock().unwrap();

            let mut hdr_buf = [0u8; HEADER_LEN];
            fifo_read(&state.reply_buf, &mut state.reply_read_offset[inst as usize], &mut hdr_buf);

            let header = match MpPacketHeader::decode(&hdr_buf) {
                Ok(h) => h,
                Err(_) => {
                    tracing::warn!(target: Target::LocalMp.as_str(), instance = inst, "reply fifo overflow");
                    let write_offset = state.reply_write_offset;
                    state.reply_read_offset[inst as usize] = write_offset;
                    self.reply_sems[inst as usize].reset();
                    return RepliesResult::default();
                }
            };

            let stale = header.timestamp < timestamp.wrapping_sub(32);
            if header.sender == inst || stale {
                advance_offset(&mut state.reply_read_offset[inst as usize], header.length, QUEUE_SIZE);
                continue;
            }

            if header.length > 0 {
                let mut payload = vec![0u8; header.length as usize];
                fifo_read(&state.reply_buf, &mut state.reply_read_offset[inst as usize], &mut payload);
                replies.push((header.aid, payload));
                ret_mask |= 1 << header.aid;
            }

            my_inst_mask |= 1 << header.sender;
            let cur = state.connected_mask;
            if (my_inst_mask & cur) == cur || (ret_mask & aid_mask) == aid_mask {
                return RepliesResult { aid_mask: ret_mask, replies };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_cmd_reaches_client_as_host_packet() {
        let mut mp = LocalMp::new();
        mp.begin(0).unwrap();
        mp.begin(1).unwrap();

        mp.send_cmd(0, b"sync", 100).unwrap();

        match mp.recv_host_packet(1) {
            RecvHostOutcome::Data(outcome) => {
                assert_eq!(outcome.sender, 0);
                assert_eq!(outcome.payload, b"sync");
                assert_eq!(outcome.timestamp, 100);
            }
            other => panic!("expected Data, got {other:?}"),
        }
    }

    #[test]
    fn sender_never_receives_its_own_data_packet() {
        let mut mp = LocalMp::new();
        mp.begin(0).unwrap();
        mp.send_packet(0, b"hello", 1).unwrap();
        assert!(mp.recv_packet(0).is_none());
    }

    #[test]
    fn reply_routes_back_to_host_instance() {
        let mut mp = LocalMp::new();
        mp.begin(0).unwrap();
        mp.begin(1).unwrap();

        mp.send_cmd(0, b"go", 50).unwrap();
        mp.recv_host_packet(1);
        mp.send_reply(1, b"ack-payload", 50, 1).unwrap();

        let result = mp.recv_replies(0, 50, 0b10);
        assert_eq!(result.aid_mask, 0b10);
        assert_eq!(result.replies, vec![(1, b"ack-payload".to_vec())]);
    }

    #[test]
    fn recv_replies_returns_early_when_all_clients_gone() {
        let mut mp = LocalMp::new();
        mp.begin(0).unwrap();
        let result = mp.recv_replies(0, 0, 0xFFFF);
        assert_eq!(result, RepliesResult::default());
    }

    #[test]
    fn end_stops_further_broadcast_delivery() {
        let mut mp = LocalMp::new();
        mp.begin(0).unwrap();
        mp.begin(1).unwrap();
        mp.end(1);

        mp.send_packet(0, b"ping", 1).unwrap();
        // instance 1 disconnected, but its semaphore may still have been
        // posted before End() ran in a real session; here nothing was
        // posted after End, so there is nothing to receive.
        assert!(mp.recv_packet(1).is_none());
    }
}
