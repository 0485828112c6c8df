use std::collections::BTreeMap;

use nifi_proto::blob::{BlobKind, BlobMessage};
use nifi_proto::{InputFrame, InputReport, InputReportHeader, MpTransport, PlayerStatus, ProtoError};
use nifi_shared::log::Target;

use crate::blob::{chunk_for_send, BlobAssembly, BlobStaging};
use crate::command::Command;
use crate::core::EmulatorCore;
use crate::pending::PendingRollback;
use crate::roster::{NetworkSettings, Player};

/// Local history slot reserved for "my own input", regardless of which
/// association id I was assigned. Every other slot is a remote player's
/// input history, keyed by a locally-assigned instance index rather than
/// directly by aid (see [`Synchronizer::rebuild_instance_map`]).
const OWN_INSTANCE: usize = 0;

/// Drives deterministic lock-step play over any [`MpTransport`]: delayed
/// local input broadcast, remote input history tracking, rollback-via-
/// savestate-replay when a remote frame is late, and distribution of the
/// initial savestate/ROM/SRAM blobs before a session starts.
pub struct Synchronizer {
    my_aid: u16,
    is_host: bool,
    /// Debug-only diagnostic clamp: when set, every instance lookup that
    /// would otherwise use a player's real assigned instance index resolves
    /// to this one instead. The reference implementation ships the
    /// equivalent clamp permanently engaged (a leftover from prototyping
    /// two-player mode); here it defaults off and is never engaged by any
    /// production code path (see `nifi::NetplaySession::force_mirror_index`,
    /// the only place that sets it).
    pub force_mirror_index: Option<u8>,
    settings: NetworkSettings,
    players: Vec<Player>,
    player_to_instance: [u8; 16],
    history: [BTreeMap<u32, InputFrame>; 16],
    pending: PendingRollback,
    seq: u32,
    blob_assembly: BlobAssembly,
    staging: BlobStaging,
}

impl Synchronizer {
    pub fn new(my_aid: u16, is_host: bool) -> Self {
        Self {
            my_aid,
            is_host,
            force_mirror_index: None,
            settings: NetworkSettings::default(),
            players: Vec::new(),
            player_to_instance: [0; 16],
            history: std::array::from_fn(|_| BTreeMap::new()),
            pending: PendingRollback::new(),
            seq: 1,
            blob_assembly: BlobAssembly::new(),
            staging: BlobStaging::default(),
        }
    }

    pub fn is_host(&self) -> bool {
        self.is_host
    }

    pub fn settings(&self) -> NetworkSettings {
        self.settings
    }

    pub fn set_settings(&mut self, settings: NetworkSettings) {
        self.settings = settings;
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn rollback_pending(&self) -> bool {
        self.pending.active
    }

    /// Replaces the known player roster (fed from the transport's own
    /// control channel) and recomputes the aid-to-local-instance mapping.
    pub fn set_roster(&mut self, players: Vec<Player>) {
        self.players = players;
        self.rebuild_instance_map();
    }

    /// Reassigns local instance indices: our own aid always maps to
    /// instance 0 (see [`OWN_INSTANCE`]); every other connected aid gets
    /// the next free index, in ascending aid order.
    fn rebuild_instance_map(&mut self) {
        self.player_to_instance = [0; 16];
        self.player_to_instance[self.my_aid as usize] = OWN_INSTANCE as u8;

        let mut next = 1u8;
        for player in &self.players {
            if player.aid == self.my_aid {
                continue;
            }
            self.player_to_instance[player.aid as usize] = next;
            next += 1;
        }
    }

    fn instance_for_aid(&self, aid: u16) -> usize {
        if let Some(forced) = self.force_mirror_index {
            return forced as usize;
        }
        self.player_to_instance[aid as usize] as usize
    }

    /// Records this frame's (and the input-delayed frame's) local input,
    /// and broadcasts the player's full input history to every other
    /// player. `core` is only used to take a rollback savestate if this
    /// frame's remote input isn't in yet.
    pub fn process_input<T: MpTransport, C: EmulatorCore>(
        &mut self,
        transport: &mut T,
        core: &mut C,
        key_mask: u32,
        touching: bool,
        touch_x: u16,
        touch_y: u16,
    ) -> Result<(), T::Error> {
        let frame_num = core.num_frames();

        let immediate = InputFrame {
            frame_num,
            key_mask,
            touching: touching as u32,
            touch_x: touch_x as u32,
            touch_y: touch_y as u32,
        };
        let delayed = InputFrame {
            frame_num: frame_num + self.settings.delay,
            ..immediate
        };

        self.history[OWN_INSTANCE].insert(immediate.frame_num, immediate);
        self.history[OWN_INSTANCE].insert(delayed.frame_num, delayed);

        let header = InputReportHeader {
            stall_frame: 0,
            seq: self.seq,
            frame_index: frame_num,
            last_complete_frame: self.pending.frame_num.saturating_sub(1),
            state_hash: 0,
        };
        self.seq += 1;

        let frames: Vec<InputFrame> = self.history[OWN_INSTANCE].values().copied().collect();
        tracing::trace!(
            target: Target::Rollback.as_str(),
            frame = frame_num,
            count = frames.len(),
            "broadcasting input history"
        );
        let payload = InputReport { header, frames }.encode();
        transport.send_packet(self.my_aid as u32, &payload, frame_num as u64)?;

        self.trim_completed_history();
        self.maybe_arm_rollback(core, frame_num);

        Ok(())
    }

    /// Drops history entries every connected remote player has already
    /// acknowledged, keeping broadcast packets and memory use bounded.
    fn trim_completed_history(&mut self) {
        let mut last_completed: Option<u32> = None;
        for player in &self.players {
            if player.aid == self.my_aid {
                continue;
            }
            if !matches!(player.status, PlayerStatus::Client | PlayerStatus::Host) {
                continue;
            }
            last_completed = Some(match last_completed {
                None => player.last_completed_frame,
                Some(min_so_far) => min_so_far.min(player.last_completed_frame),
            });
        }

        if let Some(cutoff) = last_completed {
            self.history[OWN_INSTANCE] = self.history[OWN_INSTANCE].split_off(&(cutoff + 1));
        }
    }

    /// If we don't yet have this frame's input from the player we're
    /// watching (instance 1, the reference implementation's hardcoded
    /// stall-check slot), save a state now so a later rollback can replay
    /// forward once that input arrives.
    fn maybe_arm_rollback<C: EmulatorCore>(&mut self, core: &mut C, frame_num: u32) {
        let have_input = self.history[1].contains_key(&frame_num);
        if !have_input && frame_num > self.settings.delay && !self.pending.active {
            tracing::debug!(target: Target::Rollback.as_str(), frame = frame_num, "missing remote input, saving rollback state");
            let state = core.save_state();
            self.pending.arm(frame_num, state);
        }
    }

    /// Applies the remote input history for `instance` (a locally-assigned
    /// instance index, see [`Synchronizer::rebuild_instance_map`]) to the
    /// core's current frame, falling back to our own input if the remote
    /// frame is missing or reports the neutral "didn't press anything" mask
    /// (the reference implementation's way of tolerating input that hasn't
    /// been replaced by the real value yet).
    pub fn apply_input<C: EmulatorCore>(&mut self, core: &mut C, instance: u8) {
        let instance = self.force_mirror_index.unwrap_or(instance);

        core.set_key_mask(0xFFF);
        core.release_screen();

        let frame_num = core.num_frames();

        let Some(mut frame) = self.history[instance as usize].get(&frame_num).copied() else {
            if let Some(own) = self.history[OWN_INSTANCE].get(&frame_num).copied() {
                apply_frame(core, &own);
            }
            return;
        };

        if frame.frame_num != frame_num {
            return;
        }

        if let Some(own) = self.history[OWN_INSTANCE].get(&frame_num) {
            if frame.key_mask == 0xFFF && frame.touching == 0 {
                frame.key_mask = own.key_mask;
                frame.touching = own.touching;
                frame.touch_x = own.touch_x;
                frame.touch_y = own.touch_y;
            }
        }

        self.pending.frame_num = frame_num;
        apply_frame(core, &frame);
    }

    /// Folds a freshly-received input history broadcast from `sender_aid`
    /// into our tracking, replaying forward from a pending rollback if this
    /// update supplies the frame we were stalled on.
    pub fn receive_inputs<C: EmulatorCore>(
        &mut self,
        core: &mut C,
        sender_aid: u32,
        payload: &[u8],
    ) -> Result<(), ProtoError> {
        let instance = self.instance_for_aid(sender_aid as u16);
        let report = InputReport::decode(payload)?;

        if let Some(player) = self.players.iter_mut().find(|p| p.aid == sender_aid as u16) {
            player.last_completed_frame = report.header.last_complete_frame;
        }

        let history = &mut self.history[instance];
        history.clear();
        for frame in report.frames {
            history.insert(frame.frame_num, frame);
        }

        if self.pending.active && self.history[instance].contains_key(&self.pending.frame_num) {
            self.replay(core, instance);
        }

        Ok(())
    }

    /// Rewinds to the saved rollback state and replays forward, frame by
    /// frame, using whatever input is now known for `instance`. If another
    /// gap shows up partway through, re-arms the rollback at that frame
    /// rather than giving up.
    fn replay<C: EmulatorCore>(&mut self, core: &mut C, instance: usize) {
        let start_frame = self.pending.frame_num;
        let target_frame = core.num_frames();

        self.pending.active = false;
        core.load_state(start_frame, &self.pending.savestate);

        tracing::debug!(
            target: Target::Rollback.as_str(),
            from = start_frame,
            to = target_frame,
            pc0 = core.get_pc(0),
            pc1 = core.get_pc(1),
            "replaying after rollback"
        );

        let mut frame_num = core.num_frames();
        while frame_num < target_frame {
            match self.history[instance].get(&frame_num).copied() {
                Some(frame) => {
                    self.pending.frame_num = frame_num;
                    apply_frame(core, &frame);
                }
                None if !self.pending.active => {
                    self.pending.active = true;
                    self.pending.frame_num = frame_num;
                    self.pending.savestate = core.save_state();
                }
                None => {
                    core.set_key_mask(0xFFF);
                    core.release_screen();
                }
            }
            core.run_frame();
            frame_num = core.num_frames();
        }

        if self.pending.active {
            tracing::debug!(target: Target::Rollback.as_str(), frame = self.pending.frame_num, "rollback remains pending after replay");
        }
    }

    /// Broadcasts every blob an embedder needs the other side to have
    /// before the game starts (cart ROM, cart SRAM, and the initial
    /// savestate), followed by the command that tells clients to start.
    /// Only meaningful for the host.
    pub fn sync_and_start<T: MpTransport>(
        &mut self,
        transport: &mut T,
        cart_rom: Option<&[u8]>,
        cart_sram: Option<&[u8]>,
        init_state: &[u8],
        console_type: u8,
        timestamp: u64,
    ) -> Result<(), T::Error> {
        if let Some(rom) = cart_rom {
            self.send_blob(transport, BlobKind::CartRom, rom, timestamp)?;
        }
        if let Some(sram) = cart_sram {
            self.send_blob(transport, BlobKind::CartSram, sram, timestamp)?;
        }
        self.send_blob(transport, BlobKind::InitState, init_state, timestamp)?;

        let apply = Command::Blob(BlobMessage::Apply { console_type });
        transport.send_cmd(self.my_aid as u32, &apply.encode(), timestamp)?;

        transport.send_cmd(self.my_aid as u32, &Command::StartGame.encode(), timestamp)?;
        Ok(())
    }

    fn send_blob<T: MpTransport>(
        &mut self,
        transport: &mut T,
        kind: BlobKind,
        data: &[u8],
        timestamp: u64,
    ) -> Result<(), T::Error> {
        for msg in chunk_for_send(kind, data) {
            let payload = Command::Blob(msg).encode();
            transport.send_cmd(self.my_aid as u32, &payload, timestamp)?;
        }
        Ok(())
    }

    /// Feeds one `CMD`-kind frame (see [`Command`]) into the synchronizer.
    /// Returns the console type once the initial state has been fully
    /// received, verified, and an `Apply` instructs us to load it — the
    /// caller is expected to call `core.load_state` with the returned
    /// blob's bytes (via [`Synchronizer::take_init_state`]) and set the
    /// console type before starting its local frame loop.
    pub fn handle_command(&mut self, payload: &[u8]) -> Result<Option<CommandOutcome>, ProtoError> {
        let command = Command::decode(payload)?;
        match command {
            Command::Blob(msg) => {
                if let BlobMessage::Apply { console_type } = &msg {
                    return Ok(Some(CommandOutcome::ApplyBlob {
                        console_type: *console_type,
                    }));
                }
                match self.blob_assembly.feed(&msg) {
                    Ok(Some((kind, data))) => self.staging.store(kind, data),
                    Ok(None) => {}
                    Err(err) => {
                        tracing::warn!(target: Target::Rollback.as_str(), %err, "dropped bad blob message");
                    }
                }
                Ok(None)
            }
            Command::StartGame => Ok(Some(CommandOutcome::StartGame)),
            Command::UpdateSettings { delay } => {
                self.settings.delay = delay;
                Ok(None)
            }
        }
    }

    /// Takes the fully-received initial-state blob staged by
    /// `handle_command`, if one is ready.
    pub fn take_init_state(&mut self) -> Option<Vec<u8>> {
        self.staging.init_state.take()
    }

    pub fn take_cart_rom(&mut self) -> Option<Vec<u8>> {
        self.staging.cart_rom.take()
    }

    pub fn take_cart_sram(&mut self) -> Option<Vec<u8>> {
        self.staging.cart_sram.take()
    }
}

/// What the embedder should do in response to a decoded [`Command`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandOutcome {
    /// All staged blobs are ready; load `init_state` and adopt `console_type`.
    ApplyBlob { console_type: u8 },
    /// Begin running the local frame loop.
    StartGame,
}

fn apply_frame<C: EmulatorCore>(core: &mut C, frame: &InputFrame) {
    core.set_key_mask(frame.key_mask);
    if frame.touching != 0 {
        core.touch_screen(frame.touch_x as u16, frame.touch_y as u16);
    } else {
        core.release_screen();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::NullEmulatorCore;
    use nifi_localmp::LocalMp;

    fn connected_pair(my_aid: u16, other_aid: u16) -> Vec<Player> {
        vec![
            Player {
                aid: my_aid,
                name: "me".into(),
                status: PlayerStatus::Host,
                is_local: true,
                last_completed_frame: 0,
            },
            Player {
                aid: other_aid,
                name: "them".into(),
                status: PlayerStatus::Client,
                is_local: false,
                last_completed_frame: 0,
            },
        ]
    }

    #[test]
    fn process_input_broadcasts_delayed_and_immediate_frames() {
        let mp = LocalMp::new();
        let mut sync = Synchronizer::new(0, true);
        sync.set_roster(connected_pair(0, 1));

        let mut transport = mp;
        transport.begin(0).unwrap();
        transport.begin(1).unwrap();

        let mut core = NullEmulatorCore::default();
        sync.process_input(&mut transport, &mut core, 0x0FF, false, 0, 0).unwrap();

        let recv = transport.recv_packet(1).expect("player 1 should see the broadcast");
        let report = InputReport::decode(&recv.payload).unwrap();
        assert_eq!(report.frames.len(), 2);
        assert_eq!(report.frames[0].frame_num, 0);
        assert_eq!(report.frames[1].frame_num, sync.settings().delay);
    }

    #[test]
    fn missing_remote_input_arms_rollback() {
        let mut sync = Synchronizer::new(0, true);
        sync.set_roster(connected_pair(0, 1));
        let mut core = NullEmulatorCore { frame: 10, ..Default::default() };
        let mut mp = LocalMp::new();
        mp.begin(0).unwrap();

        sync.process_input(&mut mp, &mut core, 0, false, 0, 0).unwrap();
        assert!(sync.rollback_pending());
    }

    #[test]
    fn receive_inputs_replays_after_rollback() {
        let mut sync = Synchronizer::new(0, true);
        sync.set_roster(connected_pair(0, 1));

        let mut core = NullEmulatorCore { frame: 5, ..Default::default() };
        let mut mp = LocalMp::new();
        mp.begin(0).unwrap();

        // arm a rollback at frame 5 (no input yet from instance 1)
        sync.process_input(&mut mp, &mut core, 0, false, 0, 0).unwrap();
        assert!(sync.rollback_pending());
        let armed_at = core.frame;

        core.frame = 8; // core kept running ahead while we waited

        // instance 1's input for every frame from the rollback point up to
        // where the core had gotten to, so the replay has no further gaps.
        let frames = (armed_at..core.frame)
            .map(|frame_num| InputFrame {
                frame_num,
                key_mask: 0x0AA,
                touching: 0,
                touch_x: 0,
                touch_y: 0,
            })
            .collect();
        let report = InputReport {
            header: InputReportHeader {
                stall_frame: 0,
                seq: 1,
                frame_index: 5,
                last_complete_frame: 0,
                state_hash: 0,
            },
            frames,
        };

        sync.receive_inputs(&mut core, 1, &report.encode()).unwrap();
        assert!(!sync.rollback_pending());
        // replay should have run the core back up to where it was
        assert_eq!(core.frame, 8);
    }

    #[test]
    fn apply_input_falls_back_to_own_input_on_neutral_remote_frame() {
        let mut sync = Synchronizer::new(0, true);
        sync.set_roster(connected_pair(0, 1));

        let mut core = NullEmulatorCore::default();
        sync.history_for_test(0).insert(0, InputFrame { frame_num: 0, key_mask: 0x123, touching: 0, touch_x: 0, touch_y: 0 });
        sync.history_for_test(1).insert(0, InputFrame { frame_num: 0, key_mask: 0xFFF, touching: 0, touch_x: 0, touch_y: 0 });

        sync.apply_input(&mut core, 1);
        assert_eq!(core.key_mask, 0x123);
    }

    #[test]
    fn force_mirror_index_overrides_the_real_instance_lookup() {
        let mut sync = Synchronizer::new(0, true);
        sync.set_roster(connected_pair(0, 2));
        sync.force_mirror_index = Some(1);

        let mut core = NullEmulatorCore::default();
        sync.history_for_test(1).insert(0, InputFrame { frame_num: 0, key_mask: 0x456, touching: 0, touch_x: 0, touch_y: 0 });

        // aid 2 really maps to instance 1 here too, but passing a bogus
        // instance should still resolve to the forced one.
        sync.apply_input(&mut core, 15);
        assert_eq!(core.key_mask, 0x456);
    }

    impl Synchronizer {
        fn history_for_test(&mut self, instance: usize) -> &mut BTreeMap<u32, InputFrame> {
            &mut self.history[instance]
        }
    }
}
