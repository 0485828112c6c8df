use crate::error::ProtoError;

/// Chunk size used when splitting a blob for transfer; matches the
/// reference implementation's transfer granularity.
pub const BLOB_CHUNK_SIZE: usize = 64 * 1024;

/// Which savestate-adjacent blob is being transferred. The reference
/// implementation also carries a `MAX` sentinel purely to size a C array;
/// Rust's enum needs no equivalent.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BlobKind {
    CartRom,
    CartSram,
    InitState,
}

impl BlobKind {
    fn to_u8(self) -> u8 {
        match self {
            BlobKind::CartRom => 0,
            BlobKind::CartSram => 1,
            BlobKind::InitState => 2,
        }
    }

    fn from_u8(value: u8) -> Result<Self, ProtoError> {
        match value {
            0 => Ok(BlobKind::CartRom),
            1 => Ok(BlobKind::CartSram),
            2 => Ok(BlobKind::InitState),
            other => Err(ProtoError::UnknownBlobKind(other)),
        }
    }
}

/// A message in the host-to-client blob distribution protocol. Clients
/// drive their receive state machine (see `nifi-netplay::blob::BlobState`)
/// purely from the sequence of messages they observe, rather than the
/// reference implementation's nested blocking-receive loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlobMessage {
    /// Announces an incoming blob: its kind, total length, and the CRC32 the
    /// receiver should verify against once fully reassembled.
    Start {
        kind: BlobKind,
        total_len: u32,
        crc32: u32,
    },
    /// One `BLOB_CHUNK_SIZE`-or-smaller slice at `offset`.
    Chunk { offset: u32, data: Vec<u8> },
    /// Marks the end of the current blob's chunk stream.
    End,
    /// Tells the receiver to load the fully-received, CRC-verified initial
    /// savestate and adopt the given console type. Sent once, after every
    /// blob (ROM, SRAM, initial state) has finished transferring.
    Apply { console_type: u8 },
}

impl BlobMessage {
    fn tag(&self) -> u8 {
        match self {
            BlobMessage::Start { .. } => 0,
            BlobMessage::Chunk { .. } => 1,
            BlobMessage::End => 2,
            BlobMessage::Apply { .. } => 3,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![self.tag()];
        match self {
            BlobMessage::Start {
                kind,
                total_len,
                crc32,
            } => {
                out.push(kind.to_u8());
                out.extend_from_slice(&total_len.to_le_bytes());
                out.extend_from_slice(&crc32.to_le_bytes());
            }
            BlobMessage::Chunk { offset, data } => {
                out.extend_from_slice(&offset.to_le_bytes());
                out.extend_from_slice(data);
            }
            BlobMessage::End => {}
            BlobMessage::Apply { console_type } => out.push(*console_type),
        }
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtoError> {
        if buf.is_empty() {
            return Err(ProtoError::Truncated { need: 1, got: 0 });
        }

        match buf[0] {
            0 => {
                if buf.len() < 1 + 1 + 4 + 4 {
                    return Err(ProtoError::Truncated {
                        need: 10,
                        got: buf.len(),
                    });
                }
                let kind = BlobKind::from_u8(buf[1])?;
                let total_len = u32::from_le_bytes(buf[2..6].try_into().unwrap());
                let crc32 = u32::from_le_bytes(buf[6..10].try_into().unwrap());
                Ok(BlobMessage::Start {
                    kind,
                    total_len,
                    crc32,
                })
            }
            1 => {
                if buf.len() < 1 + 4 {
                    return Err(ProtoError::Truncated {
                        need: 5,
                        got: buf.len(),
                    });
                }
                let offset = u32::from_le_bytes(buf[1..5].try_into().unwrap());
                Ok(BlobMessage::Chunk {
                    offset,
                    data: buf[5..].to_vec(),
                })
            }
            2 => Ok(BlobMessage::End),
            3 => {
                if buf.len() < 2 {
                    return Err(ProtoError::Truncated { need: 2, got: buf.len() });
                }
                Ok(BlobMessage::Apply {
                    console_type: buf[1],
                })
            }
            other => Err(ProtoError::UnknownBlobKind(other)),
        }
    }
}

/// Computes the CRC32 of `data`, for comparison against a [`BlobMessage::Start`]'s
/// advertised checksum once every chunk has arrived.
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_roundtrip() {
        let msg = BlobMessage::Start {
            kind: BlobKind::InitState,
            total_len: 4096,
            crc32: 0x1234_5678,
        };
        assert_eq!(BlobMessage::decode(&msg.encode()).unwrap(), msg);
    }

    #[test]
    fn chunk_roundtrip_preserves_data() {
        let msg = BlobMessage::Chunk {
            offset: 8192,
            data: vec![1, 2, 3, 4, 5],
        };
        assert_eq!(BlobMessage::decode(&msg.encode()).unwrap(), msg);
    }

    #[test]
    fn apply_roundtrip() {
        let msg = BlobMessage::Apply { console_type: 1 };
        assert_eq!(BlobMessage::decode(&msg.encode()).unwrap(), msg);
    }

    #[test]
    fn crc32_matches_known_vector() {
        // "123456789" is the standard CRC-32/ISO-HDLC check string.
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }
}
