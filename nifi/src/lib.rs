//! Facade over the multiplayer networking stack: wraps a concrete
//! `MpTransport` (`nifi-localmp::LocalMp` or `nifi-lan::LanTransport`)
//! together with `nifi-netplay`'s rollback synchronizer behind the handful
//! of calls an embedder's frame loop actually needs.
//!
//! Nothing below touches sockets or threads directly; `nifi-lan` and
//! `nifi-localmp` own those. This crate only composes them with
//! `nifi-netplay::Synchronizer` and adds the session-level configuration
//! surface (`config::NetplaySettings`).

pub mod config;
pub mod session;

pub use config::NetplaySettings;
pub use session::{NetplaySession, SessionError};

pub use nifi_netplay::roster::{NetworkSettings, Player};
pub use nifi_netplay::{CommandOutcome, EmulatorCore, NullEmulatorCore};
pub use nifi_proto::ProtoError;
pub use nifi_shared::log::Target as LogTarget;

#[cfg(feature = "init-tracing")]
pub use nifi_shared::log::init_tracing;
