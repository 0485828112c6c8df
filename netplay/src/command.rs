//! Host-to-client session commands, carried as `CMD`-kind frames over
//! [`nifi_proto::MpTransport`].
//!
//! The reference implementation gives blob transfer and these commands
//! their own ENet channel (`Chan_Blob` vs `Chan_Cmd`); `MpTransport`
//! exposes only one `CMD` channel, so both are tagged-union'd onto it here
//! with a leading discriminant byte. Player roster bookkeeping
//! (`Cmd_ClientInit`/`PlayerInfo`/`PlayerList`) is handled a layer down, by
//! the transport itself (see `nifi_lan`'s own control channel) — it never
//! reaches the synchronizer.

use nifi_proto::blob::BlobMessage;
use nifi_proto::ProtoError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// One message in a blob (ROM/SRAM/initial-state) transfer.
    Blob(BlobMessage),
    /// Tells every client the game is starting now.
    StartGame,
    /// The host changed the input delay.
    UpdateSettings { delay: u32 },
}

impl Command {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Command::Blob(msg) => {
                out.push(0);
                out.extend_from_slice(&msg.encode());
            }
            Command::StartGame => out.push(1),
            Command::UpdateSettings { delay } => {
                out.push(2);
                out.extend_from_slice(&delay.to_le_bytes());
            }
        }
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtoError> {
        if buf.is_empty() {
            return Err(ProtoError::Truncated { need: 1, got: 0 });
        }
        match buf[0] {
            0 => Ok(Command::Blob(BlobMessage::decode(&buf[1..])?)),
            1 => Ok(Command::StartGame),
            2 => {
                if buf.len() < 5 {
                    return Err(ProtoError::Truncated { need: 5, got: buf.len() });
                }
                Ok(Command::UpdateSettings {
                    delay: u32::from_le_bytes(buf[1..5].try_into().unwrap()),
                })
            }
            other => Err(ProtoError::UnknownKind(other as u32)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nifi_proto::blob::BlobKind;

    #[test]
    fn start_game_roundtrips() {
        assert_eq!(Command::decode(&Command::StartGame.encode()).unwrap(), Command::StartGame);
    }

    #[test]
    fn update_settings_roundtrips() {
        let cmd = Command::UpdateSettings { delay: 7 };
        assert_eq!(Command::decode(&cmd.encode()).unwrap(), cmd);
    }

    #[test]
    fn blob_command_roundtrips() {
        let cmd = Command::Blob(BlobMessage::Start {
            kind: BlobKind::CartRom,
            total_len: 128,
            crc32: 0xDEAD_BEEF,
        });
        assert_eq!(Command::decode(&cmd.encode()).unwrap(), cmd);
    }
}
