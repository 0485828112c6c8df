use crate::error::ProtoError;

/// Maximum length of a player name, mirroring the reference implementation's
/// 32-byte name field (31 usable bytes plus a NUL terminator).
pub const PLAYER_NAME_LEN: usize = 32;

/// Where a player stands relative to session start.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PlayerStatus {
    Connecting,
    Client,
    Host,
    Disconnected,
}

impl PlayerStatus {
    fn to_u8(self) -> u8 {
        match self {
            PlayerStatus::Connecting => 0,
            PlayerStatus::Client => 1,
            PlayerStatus::Host => 2,
            PlayerStatus::Disconnected => 3,
        }
    }

    fn from_u8(value: u8) -> Result<Self, ProtoError> {
        match value {
            0 => Ok(PlayerStatus::Connecting),
            1 => Ok(PlayerStatus::Client),
            2 => Ok(PlayerStatus::Host),
            3 => Ok(PlayerStatus::Disconnected),
            other => Err(ProtoError::UnknownKind(other as u32)),
        }
    }
}

/// A player as announced over the LAN join handshake and reflected back in
/// every [`PlayerList`] broadcast.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Player {
    pub aid: u16,
    pub name: String,
    pub status: PlayerStatus,
    pub address: u32,
}

const PLAYER_RECORD_LEN: usize = 2 + PLAYER_NAME_LEN + 1 + 4;

fn encode_name(name: &str, out: &mut [u8]) -> Result<(), ProtoError> {
    let bytes = name.as_bytes();
    if bytes.len() >= PLAYER_NAME_LEN {
        return Err(ProtoError::InvalidName);
    }
    out[..bytes.len()].copy_from_slice(bytes);
    Ok(())
}

fn decode_name(buf: &[u8]) -> Result<String, ProtoError> {
    let nul_at = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    std::str::from_utf8(&buf[..nul_at])
        .map(str::to_owned)
        .map_err(|_| ProtoError::InvalidName)
}

impl Player {
    fn encode(&self, out: &mut Vec<u8>) -> Result<(), ProtoError> {
        out.extend_from_slice(&self.aid.to_le_bytes());
        let mut name_field = [0u8; PLAYER_NAME_LEN];
        encode_name(&self.name, &mut name_field)?;
        out.extend_from_slice(&name_field);
        out.push(self.status.to_u8());
        out.extend_from_slice(&self.address.to_le_bytes());
        Ok(())
    }

    fn decode(buf: &[u8]) -> Result<Self, ProtoError> {
        if buf.len() < PLAYER_RECORD_LEN {
            return Err(ProtoError::Truncated {
                need: PLAYER_RECORD_LEN,
                got: buf.len(),
            });
        }
        let aid = u16::from_le_bytes(buf[0..2].try_into().unwrap());
        let name = decode_name(&buf[2..2 + PLAYER_NAME_LEN])?;
        let status = PlayerStatus::from_u8(buf[2 + PLAYER_NAME_LEN])?;
        let address = u32::from_le_bytes(
            buf[3 + PLAYER_NAME_LEN..7 + PLAYER_NAME_LEN]
                .try_into()
                .unwrap(),
        );
        Ok(Self {
            aid,
            name,
            status,
            address,
        })
    }
}

/// The current player roster, broadcast by the host whenever it changes.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct PlayerList {
    pub players: Vec<Player>,
}

impl PlayerList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_aid(&self, aid: u16) -> Option<&Player> {
        self.players.iter().find(|p| p.aid == aid)
    }

    pub fn connected_count(&self) -> usize {
        self.players
            .iter()
            .filter(|p| p.status != PlayerStatus::Disconnected)
            .count()
    }
}

/// A message exchanged on the LAN control channel (channel 0), separate
/// from the MP data channel carried by [`crate::envelope::MpPacketHeader`]
/// frames.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlMessage {
    /// Host assigns a freshly connected client its association id.
    ClientInit { aid: u16 },
    /// Client reports its display name back to the host.
    PlayerInfo { name: String },
    /// Host broadcasts the full, current roster.
    PlayerList(PlayerList),
    /// Either side announces it is ready to exchange MP frames.
    PlayerConnect,
    /// Either side announces it has stopped exchanging MP frames.
    PlayerDisconnect,
}

impl ControlMessage {
    fn tag(&self) -> u8 {
        match self {
            ControlMessage::ClientInit { .. } => 1,
            ControlMessage::PlayerInfo { .. } => 2,
            ControlMessage::PlayerList(_) => 3,
            ControlMessage::PlayerConnect => 4,
            ControlMessage::PlayerDisconnect => 5,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtoError> {
        let mut out = vec![self.tag()];
        match self {
            ControlMessage::ClientInit { aid } => out.extend_from_slice(&aid.to_le_bytes()),
            ControlMessage::PlayerInfo { name } => {
                let mut field = [0u8; PLAYER_NAME_LEN];
                encode_name(name, &mut field)?;
                out.extend_from_slice(&field);
            }
            ControlMessage::PlayerList(list) => {
                out.push(list.players.len() as u8);
                for player in &list.players {
                    player.encode(&mut out)?;
                }
            }
            ControlMessage::PlayerConnect | ControlMessage::PlayerDisconnect => {}
        }
        Ok(out)
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtoError> {
        if buf.is_empty() {
            return Err(ProtoError::Truncated { need: 1, got: 0 });
        }

        match buf[0] {
            1 => {
                if buf.len() < 3 {
                    return Err(ProtoError::Truncated { need: 3, got: buf.len() });
                }
                Ok(ControlMessage::ClientInit {
                    aid: u16::from_le_bytes(buf[1..3].try_into().unwrap()),
                })
            }
            2 => Ok(ControlMessage::PlayerInfo {
                name: decode_name(&buf[1..])?,
            }),
            3 => {
                if buf.len() < 2 {
                    return Err(ProtoError::Truncated { need: 2, got: buf.len() });
                }
                let count = buf[1] as usize;
                let mut players = Vec::with_capacity(count);
                let mut offset = 2usize;
                for _ in 0..count {
                    let player = Player::decode(&buf[offset..])?;
                    offset += PLAYER_RECORD_LEN;
                    players.push(player);
                }
                Ok(ControlMessage::PlayerList(PlayerList { players }))
            }
            4 => Ok(ControlMessage::PlayerConnect),
            5 => Ok(ControlMessage::PlayerDisconnect),
            other => Err(ProtoError::UnknownKind(other as u32)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_list_lookup_and_count() {
        let mut list = PlayerList::new();
        list.players.push(Player {
            aid: 0,
            name: "host".to_owned(),
            status: PlayerStatus::Host,
            address: 0x0100007F,
        });
        list.players.push(Player {
            aid: 1,
            name: "guest".to_owned(),
            status: PlayerStatus::Disconnected,
            address: 0,
        });

        assert_eq!(list.by_aid(0).unwrap().name, "host");
        assert_eq!(list.connected_count(), 1);
    }

    #[test]
    fn client_init_roundtrip() {
        let msg = ControlMessage::ClientInit { aid: 5 };
        assert_eq!(ControlMessage::decode(&msg.encode().unwrap()).unwrap(), msg);
    }

    #[test]
    fn player_list_message_roundtrip() {
        let msg = ControlMessage::PlayerList(PlayerList {
            players: vec![
                Player {
                    aid: 0,
                    name: "host".to_owned(),
                    status: PlayerStatus::Host,
                    address: 0x0100007F,
                },
                Player {
                    aid: 1,
                    name: "guest".to_owned(),
                    status: PlayerStatus::Client,
                    address: 0x0200007F,
                },
            ],
        });

        let encoded = msg.encode().unwrap();
        assert_eq!(ControlMessage::decode(&encoded).unwrap(), msg);
    }

    #[test]
    fn overlong_name_is_rejected() {
        let msg = ControlMessage::PlayerInfo {
            name: "x".repeat(PLAYER_NAME_LEN),
        };
        assert!(matches!(msg.encode(), Err(ProtoError::InvalidName)));
    }
}
