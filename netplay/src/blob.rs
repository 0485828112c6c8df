//! Savestate/ROM/SRAM distribution, replacing the reference implementation's
//! nested blocking-receive loop (`RecvBlob` calling back into
//! `enet_host_service` from inside its own packet handler) with a state
//! machine the synchronizer drives one [`BlobMessage`] at a time as they
//! arrive off the transport.

use thiserror::Error;

use nifi_proto::blob::{crc32, BlobKind, BlobMessage, BLOB_CHUNK_SIZE};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BlobError {
    #[error("received a blob message while no transfer was in progress")]
    NotStarted,
    #[error("tried to start a blob transfer while one was already in progress")]
    AlreadyInProgress,
    #[error("blob chunk at offset {offset} (len {len}) falls outside the advertised length {total}")]
    OutOfRange { offset: u32, len: u32, total: u32 },
    #[error("blob ended early: received {got} of {expected} bytes")]
    Incomplete { got: u32, expected: u32 },
    #[error("blob CRC mismatch: expected {expected:#010x}, computed {computed:#010x}")]
    CrcMismatch { expected: u32, computed: u32 },
}

/// Assembles one in-flight blob transfer from a sequence of [`BlobMessage`]s.
#[derive(Default)]
pub struct BlobAssembly {
    in_progress: Option<InProgress>,
}

struct InProgress {
    kind: BlobKind,
    total_len: u32,
    expected_crc: u32,
    data: Vec<u8>,
}

impl BlobAssembly {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_idle(&self) -> bool {
        self.in_progress.is_none()
    }

    /// Feeds one message into the assembly. Returns `Some((kind, data))`
    /// once an `End` message arrives whose CRC matches the reassembled
    /// bytes; callers store that payload until the matching
    /// [`BlobMessage::Apply`] tells them to hand it to the core.
    pub fn feed(&mut self, msg: &BlobMessage) -> Result<Option<(BlobKind, Vec<u8>)>, BlobError> {
        match msg {
            BlobMessage::Start {
                kind,
                total_len,
                crc32: expected_crc,
            } => {
                if self.in_progress.is_some() {
                    return Err(BlobError::AlreadyInProgress);
                }
                self.in_progress = Some(InProgress {
                    kind: *kind,
                    total_len: *total_len,
                    expected_crc: *expected_crc,
                    data: Vec::with_capacity(*total_len as usize),
                });
                Ok(None)
            }
            BlobMessage::Chunk { offset, data } => {
                let state = self.in_progress.as_mut().ok_or(BlobError::NotStarted)?;
                let end = *offset + data.len() as u32;
                if end > state.total_len {
                    return Err(BlobError::OutOfRange {
                        offset: *offset,
                        len: data.len() as u32,
                        total: state.total_len,
                    });
                }
                if state.data.len() < end as usize {
                    state.data.resize(end as usize, 0);
                }
                state.data[*offset as usize..end as usize].copy_from_slice(data);
                Ok(None)
            }
            BlobMessage::End => {
                let state = self.in_progress.take().ok_or(BlobError::NotStarted)?;
                if state.data.len() != state.total_len as usize {
                    // put it back; the sender may still be catching us up
                    let got = state.data.len() as u32;
                    let expected = state.total_len;
                    self.in_progress = Some(state);
                    return Err(BlobError::Incomplete { got, expected });
                }
                let computed = crc32(&state.data);
                if computed != state.expected_crc {
                    return Err(BlobError::CrcMismatch {
                        expected: state.expected_crc,
                        computed,
                    });
                }
                Ok(Some((state.kind, state.data)))
            }
            BlobMessage::Apply { .. } => Ok(None),
        }
    }
}

/// Splits `data` into the `Start`/`Chunk`*/`End` sequence a sender
/// broadcasts for one blob, chunked to [`BLOB_CHUNK_SIZE`].
pub fn chunk_for_send(kind: BlobKind, data: &[u8]) -> Vec<BlobMessage> {
    let crc = crc32(data);
    let mut out = vec![BlobMessage::Start {
        kind,
        total_len: data.len() as u32,
        crc32: crc,
    }];
    for (i, chunk) in data.chunks(BLOB_CHUNK_SIZE).enumerate() {
        out.push(BlobMessage::Chunk {
            offset: (i * BLOB_CHUNK_SIZE) as u32,
            data: chunk.to_vec(),
        });
    }
    out.push(BlobMessage::End);
    out
}

/// Everything received so far, staged until an [`BlobMessage::Apply`]
/// tells the synchronizer it's safe to load the initial state.
#[derive(Default)]
pub struct BlobStaging {
    pub cart_rom: Option<Vec<u8>>,
    pub cart_sram: Option<Vec<u8>>,
    pub init_state: Option<Vec<u8>>,
}

impl BlobStaging {
    pub fn store(&mut self, kind: BlobKind, data: Vec<u8>) {
        match kind {
            BlobKind::CartRom => self.cart_rom = Some(data),
            BlobKind::CartSram => self.cart_sram = Some(data),
            BlobKind::InitState => self.init_state = Some(data),
        }
    }

    pub fn clear(&mut self) {
        self.cart_rom = None;
        self.cart_sram = None;
        self.init_state = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_transfer_roundtrips() {
        let data = vec![0xABu8; BLOB_CHUNK_SIZE + 10];
        let messages = chunk_for_send(BlobKind::InitState, &data);
        assert_eq!(messages.len(), 4); // start + 2 chunks + end

        let mut assembly = BlobAssembly::new();
        let mut result = None;
        for msg in &messages {
            if let Some(done) = assembly.feed(msg).unwrap() {
                result = Some(done);
            }
        }

        let (kind, got) = result.expect("assembly should complete on End");
        assert_eq!(kind, BlobKind::InitState);
        assert_eq!(got, data);
        assert!(assembly.is_idle());
    }

    #[test]
    fn end_before_all_chunks_is_incomplete() {
        let mut assembly = BlobAssembly::new();
        assembly
            .feed(&BlobMessage::Start {
                kind: BlobKind::CartSram,
                total_len: 100,
                crc32: 0,
            })
            .unwrap();
        let err = assembly.feed(&BlobMessage::End).unwrap_err();
        assert_eq!(err, BlobError::Incomplete { got: 0, expected: 100 });
    }

    #[test]
    fn corrupted_chunk_fails_crc_check() {
        let data = vec![1, 2, 3, 4];
        let mut messages = chunk_for_send(BlobKind::CartRom, &data);
        // flip a byte in the one chunk message
        if let BlobMessage::Chunk { data, .. } = &mut messages[1] {
            data[0] ^= 0xFF;
        }

        let mut assembly = BlobAssembly::new();
        let mut last_err = None;
        for msg in &messages {
            match assembly.feed(msg) {
                Ok(_) => {}
                Err(err) => last_err = Some(err),
            }
        }
        assert!(matches!(last_err, Some(BlobError::CrcMismatch { .. })));
    }

    #[test]
    fn starting_twice_without_finishing_is_rejected() {
        let mut assembly = BlobAssembly::new();
        assembly
            .feed(&BlobMessage::Start {
                kind: BlobKind::CartRom,
                total_len: 10,
                crc32: 0,
            })
            .unwrap();
        let err = assembly
            .feed(&BlobMessage::Start {
                kind: BlobKind::CartSram,
                total_len: 10,
                crc32: 0,
            })
            .unwrap_err();
        assert_eq!(err, BlobError::AlreadyInProgress);
    }
}
