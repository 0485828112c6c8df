use nifi_proto::PlayerStatus;

/// A participant in the current session, from the synchronizer's point of
/// view. The transport (LAN's control channel, or the embedder directly for
/// LocalMP) is the source of truth for this roster; the synchronizer only
/// tracks [`Player::last_completed_frame`] itself, since that field is
/// derived purely from the input stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Player {
    pub aid: u16,
    pub name: String,
    pub status: PlayerStatus,
    pub is_local: bool,
    pub last_completed_frame: u32,
}

/// Input-delay configuration, broadcast by the host whenever it changes
/// (see the reference implementation's `Cmd_UpdateSettings`).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct NetworkSettings {
    pub delay: u32,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self { delay: 4 }
    }
}
