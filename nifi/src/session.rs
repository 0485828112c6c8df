//! The embedder-facing session surface: owns a transport and a
//! [`Synchronizer`], and turns the pair into the handful of calls a frame
//! loop actually needs (feed local input, apply remote input, drain
//! commands).

use thiserror::Error;

use nifi_proto::{MpTransport, PacketKind, ProtoError, RecvHostOutcome};

use nifi_netplay::roster::{NetworkSettings, Player};
use nifi_netplay::{CommandOutcome, EmulatorCore, Synchronizer};

use crate::config::NetplaySettings;

/// Errors a [`NetplaySession`] can surface, layering transport and protocol
/// failures with the session-level "the host disappeared" condition the
/// reference implementation treats as fatal rather than retryable.
#[derive(Debug, Error)]
pub enum SessionError<E: std::error::Error + 'static> {
    #[error(transparent)]
    Transport(E),
    #[error(transparent)]
    Proto(#[from] ProtoError),
    #[error("the host instance disappeared")]
    HostDisconnected,
}

/// Drives one multiplayer session over a concrete [`MpTransport`] (either
/// `nifi-localmp::LocalMp` or `nifi-lan::LanTransport`).
pub struct NetplaySession<T: MpTransport> {
    transport: T,
    sync: Synchronizer,
    my_aid: u16,
}

impl<T: MpTransport> NetplaySession<T> {
    /// Registers `my_aid` with `transport` and builds a session around it.
    /// `is_host` controls whether [`NetplaySession::host_sync_and_start`]
    /// is meaningful to call.
    pub fn new(mut transport: T, my_aid: u16, is_host: bool, settings: NetplaySettings) -> Result<Self, T::Error> {
        transport.begin(my_aid as u32)?;
        let mut sync = Synchronizer::new(my_aid, is_host);
        sync.set_settings(NetworkSettings {
            delay: settings.input_delay,
        });
        Ok(Self { transport, sync, my_aid })
    }

    pub fn is_host(&self) -> bool {
        self.sync.is_host()
    }

    pub fn players(&self) -> &[Player] {
        self.sync.players()
    }

    pub fn set_roster(&mut self, players: Vec<Player>) {
        self.sync.set_roster(players);
    }

    pub fn rollback_pending(&self) -> bool {
        self.sync.rollback_pending()
    }

    /// Debug-only diagnostic: clamps every remote-instance lookup to a
    /// fixed index, regardless of the real player roster. Never call this
    /// from a production code path — see [`Synchronizer::force_mirror_index`].
    pub fn force_mirror_index(&mut self, index: Option<u8>) {
        self.sync.force_mirror_index = index;
    }

    /// Broadcasts this frame's (and the delayed) local input, taking a
    /// rollback savestate from `core` if the frame we need from a remote
    /// peer hasn't arrived yet.
    pub fn send_input<C: EmulatorCore>(
        &mut self,
        core: &mut C,
        key_mask: u32,
        touching: bool,
        touch_x: u16,
        touch_y: u16,
    ) -> Result<(), T::Error> {
        self.sync
            .process_input(&mut self.transport, core, key_mask, touching, touch_x, touch_y)
    }

    /// Applies the currently-known input for `instance` (a locally-assigned
    /// instance index, not an association id) to `core`'s current frame.
    pub fn apply_input<C: EmulatorCore>(&mut self, core: &mut C, instance: u8) {
        self.sync.apply_input(core, instance);
    }

    /// Drains every frame queued for this instance, folding `DATA` frames
    /// into input history (replaying past a rollback if one completes) and
    /// returning the outcome of any `CMD` frames seen along the way.
    pub fn poll<C: EmulatorCore>(&mut self, core: &mut C) -> Result<Vec<CommandOutcome>, ProtoError> {
        let mut outcomes = Vec::new();
        while let Some(outcome) = self.transport.recv_packet(self.my_aid as u32) {
            match outcome.kind {
                PacketKind::Data => {
                    self.sync.receive_inputs(core, outcome.sender, &outcome.payload)?;
                }
                PacketKind::Cmd => {
                    if let Some(result) = self.sync.handle_command(&outcome.payload)? {
                        outcomes.push(result);
                    }
                }
                PacketKind::Reply | PacketKind::Ack => {}
            }
        }
        Ok(outcomes)
    }

    /// Blocks briefly for the host's next `CMD` broadcast; used during the
    /// pre-game handshake before a client has any input to `poll` for yet.
    pub fn wait_for_command(&mut self) -> Result<Option<CommandOutcome>, SessionError<T::Error>> {
        match self.transport.recv_host_packet(self.my_aid as u32) {
            RecvHostOutcome::Data(outcome) => Ok(self.sync.handle_command(&outcome.payload)?),
            RecvHostOutcome::None => Ok(None),
            RecvHostOutcome::HostGone => Err(SessionError::HostDisconnected),
        }
    }

    pub fn take_init_state(&mut self) -> Option<Vec<u8>> {
        self.sync.take_init_state()
    }

    pub fn take_cart_rom(&mut self) -> Option<Vec<u8>> {
        self.sync.take_cart_rom()
    }

    pub fn take_cart_sram(&mut self) -> Option<Vec<u8>> {
        self.sync.take_cart_sram()
    }

    /// Host-only: distributes the cart ROM/SRAM and initial savestate, then
    /// tells every client to start. `timestamp` is the sender's current
    /// monotonic clock reading, reused as the reply acceptance window
    /// anchor the way every other `MpTransport` send already requires.
    pub fn host_sync_and_start(
        &mut self,
        cart_rom: Option<&[u8]>,
        cart_sram: Option<&[u8]>,
        init_state: &[u8],
        console_type: u8,
        timestamp: u64,
    ) -> Result<(), T::Error> {
        self.sync
            .sync_and_start(&mut self.transport, cart_rom, cart_sram, init_state, console_type, timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nifi_localmp::LocalMp;
    use nifi_netplay::NullEmulatorCore;
    use nifi_proto::PlayerStatus;

    #[test]
    fn send_input_then_poll_applies_remote_frame() {
        let mut host = NetplaySession::new(LocalMp::new(), 0, true, NetplaySettings::default()).unwrap();
        host.set_roster(vec![
            Player { aid: 0, name: "host".into(), status: PlayerStatus::Host, is_local: true, last_completed_frame: 0 },
            Player { aid: 1, name: "client".into(), status: PlayerStatus::Client, is_local: false, last_completed_frame: 0 },
        ]);

        let mut core = NullEmulatorCore::default();
        host.send_input(&mut core, 0x0AB, false, 0, 0).unwrap();

        // a LocalMp transport never delivers a sender's own broadcast back
        // to itself, so polling immediately after should surface nothing.
        let outcomes = host.poll(&mut core).unwrap();
        assert!(outcomes.is_empty());
    }
}
