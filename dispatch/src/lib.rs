//! Fans a sender's packet out to a set of per-instance mailboxes.
//!
//! [`PacketDispatcher`] is the piece [`nifi-localmp`](../nifi_localmp) uses
//! to move `DATA`/`CMD`/`REPLY`/`ACK` frames between instances sharing one
//! process: each registered instance gets its own bounded [`RingBuffer`],
//! and a packet that doesn't fit evicts the oldest queued packet rather
//! than blocking the sender.

use std::sync::Mutex;

use nifi_ringbuf::RingBuffer;
use nifi_shared::log::Target;

/// Capacity of each per-instance mailbox, in bytes.
const QUEUE_CAPACITY: usize = 0x8000;

/// Magic tagging every framed entry in a mailbox; lets [`PacketDispatcher::recv_packet`]
/// notice a queue has gone out of sync with its write side instead of
/// silently returning garbage.
const DISPATCH_MAGIC: u32 = 0x4B50_4C4D;

const DISPATCH_HEADER_LEN: usize = 16;

struct DispatchHeader {
    sender: u32,
    header_len: u32,
    data_len: u32,
}

impl DispatchHeader {
    fn encode(&self) -> [u8; DISPATCH_HEADER_LEN] {
        let mut out = [0u8; DISPATCH_HEADER_LEN];
        out[0..4].copy_from_slice(&DISPATCH_MAGIC.to_le_bytes());
        out[4..8].copy_from_slice(&self.sender.to_le_bytes());
        out[8..12].copy_from_slice(&self.header_len.to_le_bytes());
        out[12..16].copy_from_slice(&self.data_len.to_le_bytes());
        out
    }

    fn decode(buf: &[u8; DISPATCH_HEADER_LEN]) -> Option<Self> {
        let magic = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        if magic != DISPATCH_MAGIC {
            return None;
        }
        Some(Self {
            sender: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            header_len: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            data_len: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
        })
    }
}

/// A packet pulled out of an instance's mailbox by [`PacketDispatcher::recv_packet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchedPacket {
    pub sender: u32,
    pub header: Vec<u8>,
    pub data: Vec<u8>,
}

#[derive(Default)]
struct DispatcherState {
    instance_mask: u16,
    queues: [Option<RingBuffer>; 16],
}

/// Routes packets between up to 16 registered instances sharing one
/// process, each with its own bounded mailbox.
pub struct PacketDispatcher {
    state: Mutex<DispatcherState>,
}

impl Default for PacketDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketDispatcher {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DispatcherState::default()),
        }
    }

    /// Allocates a mailbox for `inst` (0..=15) and marks it active.
    pub fn register_instance(&self, inst: u32) {
        let mut state = self.state.lock().unwrap();
        state.instance_mask |= 1 << inst;
        state.queues[inst as usize] = Some(RingBuffer::new(QUEUE_CAPACITY));
    }

    /// Drops `inst`'s mailbox and marks it inactive.
    pub fn unregister_instance(&self, inst: u32) {
        let mut state = self.state.lock().unwrap();
        state.instance_mask &= !(1 << inst);
        state.queues[inst as usize] = None;
    }

    /// Empties every registered instance's mailbox without unregistering it.
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        for i in 0..16 {
            if let Some(queue) = state.queues[i].as_mut() {
                queue.clear();
            }
        }
    }

    /// Queues `header`/`data` for delivery to every instance set in
    /// `recv_mask`, minus any instance not currently registered and minus
    /// the sender itself.
    ///
    /// A packet too large to ever fit a mailbox (header + payload >=
    /// [`QUEUE_CAPACITY`]) is dropped outright. Otherwise, a full mailbox
    /// makes room by discarding its oldest queued packet(s) rather than
    /// refusing the new one — a slow or stalled reader loses old data
    /// before a sender is ever blocked.
    pub fn send_packet(&self, header: &[u8], data: &[u8], sender: u32, recv_mask: u16) {
        if header.is_empty() && data.is_empty() {
            return;
        }
        if sender > 16 {
            return;
        }

        let total_len = DISPATCH_HEADER_LEN + header.len() + data.len();
        if total_len >= QUEUE_CAPACITY {
            return;
        }

        let mut state = self.state.lock().unwrap();
        let mut mask = recv_mask & state.instance_mask;
        if sender < 16 {
            mask &= !(1 << sender);
        }
        if mask == 0 {
            return;
        }

        let phdr = DispatchHeader {
            sender,
            header_len: header.len() as u32,
            data_len: data.len() as u32,
        }
        .encode();

        for i in 0..16u32 {
            if mask & (1 << i) == 0 {
                continue;
            }
            let queue = state.queues[i as usize].as_mut().expect("instance_mask implies queue present");

            while !queue.can_fit(total_len) {
                let mut old = [0u8; DISPATCH_HEADER_LEN];
                if !queue.read(&mut old) {
                    // mailbox is empty but still can't fit: the packet is
                    // simply too big for an empty queue, which send_packet
                    // already ruled out above.
                    break;
                }
                if let Some(old) = DispatchHeader::decode(&old) {
                    queue.skip(old.header_len as usize + old.data_len as usize);
                } else {
                    tracing::warn!(target: Target::Dispatch.as_str(), instance = i, "mailbox desynced, clearing");
                    queue.clear();
                }
            }

            queue.write(&phdr);
            if !header.is_empty() {
                queue.write(header);
            }
            if !data.is_empty() {
                queue.write(data);
            }
        }
    }

    /// Pops the oldest packet queued for `receiver` (0..=15), if any.
    pub fn recv_packet(&self, receiver: u32) -> Option<DispatchedPacket> {
        if receiver > 15 {
            return None;
        }

        let mut state = self.state.lock().unwrap();
        let queue = state.queues[receiver as usize].as_mut()?;

        let mut raw = [0u8; DISPATCH_HEADER_LEN];
        if !queue.read(&mut raw) {
            return None;
        }
        let phdr = DispatchHeader::decode(&raw)?;

        let mut header = vec![0u8; phdr.header_len as usize];
        if !header.is_empty() {
            queue.read(&mut header);
        }

        let mut data = vec![0u8; phdr.data_len as usize];
        if !data.is_empty() {
            queue.read(&mut data);
        }

        Some(DispatchedPacket {
            sender: phdr.sender,
            header,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_then_recv_roundtrip() {
        let dispatcher = PacketDispatcher::new();
        dispatcher.register_instance(0);
        dispatcher.register_instance(1);

        dispatcher.send_packet(b"hdr", b"hello", 0, 0xFFFF);

        let packet = dispatcher.recv_packet(1).unwrap();
        assert_eq!(packet.sender, 0);
        assert_eq!(packet.header, b"hdr");
        assert_eq!(packet.data, b"hello");

        // the sender itself never receives its own packet.
        assert!(dispatcher.recv_packet(0).is_none());
    }

    #[test]
    fn unregistered_instance_never_receives() {
        let dispatcher = PacketDispatcher::new();
        dispatcher.register_instance(0);
        // instance 1 is never registered.
        dispatcher.send_packet(b"h", b"d", 0, 0xFFFF);
        assert!(dispatcher.recv_packet(1).is_none());
    }

    #[test]
    fn overflow_evicts_oldest_packet() {
        let dispatcher = PacketDispatcher::new();
        dispatcher.register_instance(0);
        dispatcher.register_instance(1);

        let chunk = vec![0xAAu8; 4096];
        let chunks_to_fill = QUEUE_CAPACITY / (chunk.len() + DISPATCH_HEADER_LEN) + 2;
        for i in 0..chunks_to_fill {
            let mut payload = chunk.clone();
            payload[0] = i as u8;
            dispatcher.send_packet(&[], &payload, 0, 0xFFFF);
        }

        // the earliest packets must have been evicted, so the first one we
        // can still read is not tagged 0.
        let first = dispatcher.recv_packet(1).unwrap();
        assert_ne!(first.data[0], 0);
    }

    #[test]
    fn clear_empties_all_registered_mailboxes() {
        let dispatcher = PacketDispatcher::new();
        dispatcher.register_instance(0);
        dispatcher.register_instance(1);
        dispatcher.send_packet(b"h", b"d", 0, 0xFFFF);
        dispatcher.clear();
        assert!(dispatcher.recv_packet(1).is_none());
    }
}
