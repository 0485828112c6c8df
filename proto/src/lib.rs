//! Wire-format types shared by every transport and by the netplay
//! synchronizer: packet envelopes, input reports, discovery beacons, the LAN
//! join handshake, and the blob-transfer protocol.
//!
//! Nothing in this crate owns a socket or a thread; it only encodes and
//! decodes byte buffers, so it can be exercised with plain unit tests and
//! reused identically by `nifi-localmp`, `nifi-lan` and `nifi-netplay`.

pub mod blob;
pub mod control;
pub mod discovery;
pub mod envelope;
pub mod error;
pub mod input_report;
pub mod transport;

pub use blob::{BlobKind, BlobMessage, BLOB_CHUNK_SIZE};
pub use control::{ControlMessage, Player, PlayerList, PlayerStatus, PLAYER_NAME_LEN};
pub use discovery::{BeaconRecord, SessionStatus, DISCOVERY_MAGIC, DISCOVERY_VERSION};
pub use envelope::{MpPacketHeader, PacketKind, HEADER_LEN, MAX_FRAME_PAYLOAD, MP_PACKET_MAGIC};
pub use error::ProtoError;
pub use input_report::{
    InputFrame, InputReport, InputReportHeader, INPUT_FRAME_LEN, INPUT_REPORT_HEADER_LEN,
};
pub use transport::{MpTransport, RecvHostOutcome, RecvOutcome, RepliesResult};
