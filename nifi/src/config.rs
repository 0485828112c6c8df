use serde::{Deserialize, Serialize};

/// Tunable session parameters, matching the reference implementation's
/// `Netplay::NetworkSettings` plus the constants it otherwise hardcodes
/// (chunk size, receive timeout, discovery/session ports).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetplaySettings {
    /// Frames of input delay applied before a local input becomes visible
    /// to a remote peer.
    pub input_delay: u32,
    /// How long a blocking transport receive waits before giving up.
    pub recv_timeout_ms: u64,
    /// Chunk size used when splitting the cart ROM/SRAM/initial-state
    /// blobs for transfer.
    pub blob_chunk_size: usize,
    /// UDP port the discovery beacon broadcasts on.
    pub discovery_port: u16,
    /// Port the reliable-UDP session transport listens on.
    pub session_port: u16,
}

impl Default for NetplaySettings {
    fn default() -> Self {
        Self {
            input_delay: 4,
            recv_timeout_ms: 25,
            blob_chunk_size: 64 * 1024,
            discovery_port: 7063,
            session_port: 7064,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_constants() {
        let settings = NetplaySettings::default();
        assert_eq!(settings.input_delay, 4);
        assert_eq!(settings.blob_chunk_size, 64 * 1024);
        assert_eq!(settings.discovery_port, 7063);
        assert_eq!(settings.session_port, 7064);
    }

    #[test]
    fn roundtrips_through_json() {
        let settings = NetplaySettings {
            input_delay: 6,
            ..NetplaySettings::default()
        };
        let json = serde_json::to_string(&settings).unwrap();
        let back: NetplaySettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, settings);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let partial: NetplaySettings = serde_json::from_str(r#"{"input_delay": 8}"#).unwrap();
        assert_eq!(partial.input_delay, 8);
        assert_eq!(partial.session_port, 7064);
    }
}
