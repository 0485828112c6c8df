use crate::envelope::PacketKind;

/// Outcome of a successful data-packet receive: the sender instance id, the
/// frame's originating timestamp, its kind (so callers can tell an ordinary
/// `DATA` broadcast from a `CMD` control/blob message pulled off the same
/// queue), and the raw payload bytes (header already stripped).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecvOutcome {
    pub sender: u32,
    pub kind: PacketKind,
    pub timestamp: u64,
    pub payload: Vec<u8>,
}

/// Outcome of polling for the host's periodic `CMD` broadcast.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecvHostOutcome {
    /// A `CMD` frame was waiting and has been consumed.
    Data(RecvOutcome),
    /// Nothing new from the host yet.
    None,
    /// The host instance disappeared; callers should treat the session as
    /// over rather than keep polling.
    HostGone,
}

/// Result of draining every `REPLY` frame whose timestamp falls within the
/// host's acceptance window.
///
/// `aid_mask` has a bit set for each association id that replied in time;
/// `replies` holds one entry per reply actually collected. This replaces the
/// reference implementation's fixed 15-slot, 1024-byte-per-slot output array
/// with a plain `Vec` — callers never see uninitialised slots or a hardcoded
/// per-client size ceiling.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RepliesResult {
    pub aid_mask: u16,
    pub replies: Vec<(u16, Vec<u8>)>,
}

/// Abstraction over the two concrete multiplayer transports, LocalMP and
/// LAN. Netplay is built on top of either one without knowing which.
///
/// Instance ids (`inst`) range 0..=15, mirroring the association id the DS
/// wifi hardware would assign; aid 0 is always the host.
pub trait MpTransport {
    type Error: std::error::Error;

    /// Registers `inst` as an active participant, allocating whatever
    /// per-instance queues or handles the transport needs.
    fn begin(&mut self, inst: u32) -> Result<(), Self::Error>;

    /// Releases everything `begin` allocated for `inst`.
    fn end(&mut self, inst: u32);

    /// Sends a `DATA` frame from `inst` to every other participant.
    fn send_packet(&mut self, inst: u32, data: &[u8], timestamp: u64) -> Result<usize, Self::Error>;

    /// Sends a `CMD` frame; only ever called by the host (aid 0).
    fn send_cmd(&mut self, inst: u32, data: &[u8], timestamp: u64) -> Result<usize, Self::Error>;

    /// Sends a `REPLY` frame tagged with the sender's own aid; only ever
    /// called by non-host clients.
    fn send_reply(&mut self, inst: u32, data: &[u8], timestamp: u64, aid: u16) -> Result<usize, Self::Error>;

    /// Sends an `ACK` frame; only ever called by the host.
    fn send_ack(&mut self, inst: u32, data: &[u8], timestamp: u64) -> Result<usize, Self::Error>;

    /// Polls `inst`'s inbox for the next queued `DATA` frame not sent by
    /// itself.
    fn recv_packet(&mut self, inst: u32) -> Option<RecvOutcome>;

    /// Polls for the host's `CMD` broadcast.
    fn recv_host_packet(&mut self, inst: u32) -> RecvHostOutcome;

    /// Drains every `REPLY` frame addressed to `inst` whose timestamp lies
    /// within the acceptance window around `timestamp`, for every aid set in
    /// `aid_mask`.
    fn recv_replies(&mut self, inst: u32, timestamp: u64, aid_mask: u16) -> RepliesResult;
}
