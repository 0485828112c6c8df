//! Deterministic lock-step synchronization: input delay, rollback-via-
//! savestate-replay, and initial-state/ROM/SRAM distribution, built
//! generically over any [`nifi_proto::MpTransport`].
//!
//! The reference implementation hand-rolls its own second ENet session
//! layer for internet play rather than reusing its LAN transport. This
//! crate doesn't: [`Synchronizer`] only ever talks to the `MpTransport`
//! trait, so the same rollback logic runs unmodified whether the
//! underlying transport is `nifi-localmp` or `nifi-lan`.

pub mod blob;
pub mod command;
pub mod core;
pub mod pending;
pub mod roster;
pub mod synchronizer;

pub use blob::{BlobAssembly, BlobError, BlobStaging};
pub use command::Command;
pub use core::{EmulatorCore, NullEmulatorCore};
pub use pending::PendingRollback;
pub use roster::{NetworkSettings, Player};
pub use synchronizer::{CommandOutcome, Synchronizer};
