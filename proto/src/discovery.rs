use crate::error::ProtoError;

/// `"NIDS"` — distinguishes discovery beacons from stray broadcast traffic
/// on the same LAN segment.
pub const DISCOVERY_MAGIC: u32 = 0x5349_444E;

/// Current discovery wire format version.
pub const DISCOVERY_VERSION: u32 = 1;

const SESSION_NAME_LEN: usize = 64;

pub const BEACON_RECORD_LEN: usize = 4 + 4 + 4 + SESSION_NAME_LEN + 1 + 1 + 1;

/// Whether a session is still accepting joins.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    Open,
    Full,
    InProgress,
}

impl SessionStatus {
    fn to_u8(self) -> u8 {
        match self {
            SessionStatus::Open => 0,
            SessionStatus::Full => 1,
            SessionStatus::InProgress => 2,
        }
    }

    fn from_u8(value: u8) -> Result<Self, ProtoError> {
        match value {
            0 => Ok(SessionStatus::Open),
            1 => Ok(SessionStatus::Full),
            2 => Ok(SessionStatus::InProgress),
            other => Err(ProtoError::UnknownKind(other as u32)),
        }
    }
}

/// One broadcast beacon: advertises a joinable session on the local segment.
///
/// Sent on its own UDP broadcast socket, separate from the reliable session
/// transport, so discovery traffic never competes with in-game packets for
/// a peer's attention.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BeaconRecord {
    pub tick: u32,
    pub session_name: String,
    pub num_players: u8,
    pub max_players: u8,
    pub status: SessionStatus,
}

impl BeaconRecord {
    pub fn encode(&self) -> Result<[u8; BEACON_RECORD_LEN], ProtoError> {
        if self.session_name.len() >= SESSION_NAME_LEN {
            return Err(ProtoError::InvalidName);
        }

        let mut out = [0u8; BEACON_RECORD_LEN];
        out[0..4].copy_from_slice(&DISCOVERY_MAGIC.to_le_bytes());
        out[4..8].copy_from_slice(&DISCOVERY_VERSION.to_le_bytes());
        out[8..12].copy_from_slice(&self.tick.to_le_bytes());

        let name_bytes = self.session_name.as_bytes();
        out[12..12 + name_bytes.len()].copy_from_slice(name_bytes);
        // remaining session-name bytes stay zeroed, serving as the NUL terminator.

        out[12 + SESSION_NAME_LEN] = self.num_players;
        out[12 + SESSION_NAME_LEN + 1] = self.max_players;
        out[12 + SESSION_NAME_LEN + 2] = self.status.to_u8();
        Ok(out)
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtoError> {
        if buf.len() < BEACON_RECORD_LEN {
            return Err(ProtoError::Truncated {
                need: BEACON_RECORD_LEN,
                got: buf.len(),
            });
        }

        let magic = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        if magic != DISCOVERY_MAGIC {
            return Err(ProtoError::BadMagic {
                expected: DISCOVERY_MAGIC,
                actual: magic,
            });
        }

        let tick = u32::from_le_bytes(buf[8..12].try_into().unwrap());

        let name_region = &buf[12..12 + SESSION_NAME_LEN];
        let nul_at = name_region.iter().position(|&b| b == 0).unwrap_or(SESSION_NAME_LEN);
        let session_name = std::str::from_utf8(&name_region[..nul_at])
            .map_err(|_| ProtoError::InvalidName)?
            .to_owned();

        let num_players = buf[12 + SESSION_NAME_LEN];
        let max_players = buf[12 + SESSION_NAME_LEN + 1];
        let status = SessionStatus::from_u8(buf[12 + SESSION_NAME_LEN + 2])?;

        Ok(Self {
            tick,
            session_name,
            num_players,
            max_players,
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn beacon_roundtrip() {
        let beacon = BeaconRecord {
            tick: 12345,
            session_name: "living room".to_owned(),
            num_players: 2,
            max_players: 4,
            status: SessionStatus::Open,
        };

        let encoded = beacon.encode().unwrap();
        let decoded = BeaconRecord::decode(&encoded).unwrap();
        assert_eq!(decoded, beacon);
    }

    #[test]
    fn name_too_long_is_rejected() {
        let beacon = BeaconRecord {
            tick: 0,
            session_name: "x".repeat(SESSION_NAME_LEN),
            num_players: 1,
            max_players: 1,
            status: SessionStatus::Open,
        };
        assert!(matches!(beacon.encode(), Err(ProtoError::InvalidName)));
    }
}
