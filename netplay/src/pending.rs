/// A rollback currently in flight: we've run ahead of the last frame we have
/// every player's input for, and are holding a savestate from that point so
/// we can rewind and replay once the missing input arrives.
///
/// This mirrors the reference implementation's single `PendingFrame`
/// (its header declares a 16-entry array for one-per-instance bookkeeping,
/// but only index 0 is ever touched — there is only ever one rollback in
/// flight for the whole session, not one per local instance).
#[derive(Default)]
pub struct PendingRollback {
    pub active: bool,
    pub frame_num: u32,
    pub savestate: Vec<u8>,
}

impl PendingRollback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&mut self, frame_num: u32, savestate: Vec<u8>) {
        self.active = true;
        self.frame_num = frame_num;
        self.savestate = savestate;
    }

    pub fn clear(&mut self) {
        self.active = false;
    }
}
