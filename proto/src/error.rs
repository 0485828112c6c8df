use thiserror::Error;

/// Errors that can occur while encoding or decoding wire structures.
///
/// None of these terminate a thread when they surface from a receive path —
/// callers drop the offending packet and continue (see spec §7, `InvalidFrame`).
#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("buffer too short: need at least {need} bytes, got {got}")]
    Truncated { need: usize, got: usize },

    #[error("bad magic: expected {expected:#010x}, got {actual:#010x}")]
    BadMagic { expected: u32, actual: u32 },

    #[error("payload length {0} exceeds maximum of {1}")]
    PayloadTooLarge(usize, usize),

    #[error("unknown packet kind {0}")]
    UnknownKind(u32),

    #[error("unknown blob message type {0}")]
    UnknownBlobKind(u8),

    #[error("name field is not valid UTF-8 / not NUL-terminated")]
    InvalidName,
}
