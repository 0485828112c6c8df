use crate::error::ProtoError;

/// One player's input sample for a single simulated frame.
///
/// `key_mask`, `touching`, `touch_x` and `touch_y` are encoded
/// little-endian while the enclosing [`InputReportHeader`] is big-endian:
/// the original struct was serialized by a raw memcpy of a little-endian
/// machine's bytes, and we preserve that asymmetry rather than "fixing" it,
/// since every peer on the wire must agree on it regardless of which side
/// is native little-endian.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct InputFrame {
    pub frame_num: u32,
    pub key_mask: u32,
    pub touching: u32,
    pub touch_x: u32,
    pub touch_y: u32,
}

/// Encoded size of [`InputFrame`].
pub const INPUT_FRAME_LEN: usize = 20;

impl InputFrame {
    pub fn encode(&self) -> [u8; INPUT_FRAME_LEN] {
        let mut out = [0u8; INPUT_FRAME_LEN];
        out[0..4].copy_from_slice(&self.frame_num.to_be_bytes());
        out[4..8].copy_from_slice(&self.key_mask.to_le_bytes());
        out[8..12].copy_from_slice(&self.touching.to_le_bytes());
        out[12..16].copy_from_slice(&self.touch_x.to_le_bytes());
        out[16..20].copy_from_slice(&self.touch_y.to_le_bytes());
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtoError> {
        if buf.len() < INPUT_FRAME_LEN {
            return Err(ProtoError::Truncated {
                need: INPUT_FRAME_LEN,
                got: buf.len(),
            });
        }
        Ok(Self {
            // FrameNum rides the wire big-endian, like the report header,
            // since (unlike the other fields) it's read back by every peer
            // to reassemble its own InputHistory map.
            frame_num: u32::from_be_bytes(buf[0..4].try_into().unwrap()),
            key_mask: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            touching: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            touch_x: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
            touch_y: u32::from_le_bytes(buf[16..20].try_into().unwrap()),
        })
    }
}

/// Encoded size of [`InputReportHeader`].
pub const INPUT_REPORT_HEADER_LEN: usize = 17;

/// Fixed header in front of every input-history broadcast: which packet
/// this is, what frame it was sent from, and up to where the sender
/// believes every player's input is known.
///
/// All fields are big-endian: this is a genuine network header read by
/// every peer regardless of native endianness, unlike the [`InputFrame`]
/// entries that follow it (see that type's docs).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputReportHeader {
    pub stall_frame: u8,
    pub seq: u32,
    pub frame_index: u32,
    pub last_complete_frame: u32,
    pub state_hash: u32,
}

impl InputReportHeader {
    pub fn encode(&self) -> [u8; INPUT_REPORT_HEADER_LEN] {
        let mut out = [0u8; INPUT_REPORT_HEADER_LEN];
        out[0] = self.stall_frame;
        out[1..5].copy_from_slice(&self.seq.to_be_bytes());
        out[5..9].copy_from_slice(&self.frame_index.to_be_bytes());
        out[9..13].copy_from_slice(&self.last_complete_frame.to_be_bytes());
        out[13..17].copy_from_slice(&self.state_hash.to_be_bytes());
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtoError> {
        if buf.len() < INPUT_REPORT_HEADER_LEN {
            return Err(ProtoError::Truncated {
                need: INPUT_REPORT_HEADER_LEN,
                got: buf.len(),
            });
        }
        Ok(Self {
            stall_frame: buf[0],
            seq: u32::from_be_bytes(buf[1..5].try_into().unwrap()),
            frame_index: u32::from_be_bytes(buf[5..9].try_into().unwrap()),
            last_complete_frame: u32::from_be_bytes(buf[9..13].try_into().unwrap()),
            state_hash: u32::from_be_bytes(buf[13..17].try_into().unwrap()),
        })
    }
}

/// A full input-history broadcast: the header plus every [`InputFrame`]
/// the sender currently has buffered for itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputReport {
    pub header: InputReportHeader,
    pub frames: Vec<InputFrame>,
}

impl InputReport {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(INPUT_REPORT_HEADER_LEN + self.frames.len() * INPUT_FRAME_LEN);
        out.extend_from_slice(&self.header.encode());
        for frame in &self.frames {
            out.extend_from_slice(&frame.encode());
        }
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtoError> {
        let header = InputReportHeader::decode(buf)?;
        let body = &buf[INPUT_REPORT_HEADER_LEN..];
        if body.len() % INPUT_FRAME_LEN != 0 {
            return Err(ProtoError::Truncated {
                need: body.len() + (INPUT_FRAME_LEN - body.len() % INPUT_FRAME_LEN),
                got: body.len(),
            });
        }

        let frames = body
            .chunks_exact(INPUT_FRAME_LEN)
            .map(InputFrame::decode)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { header, frames })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_report_roundtrip_with_multiple_frames() {
        let report = InputReport {
            header: InputReportHeader {
                stall_frame: 0,
                seq: 7,
                frame_index: 5000,
                last_complete_frame: 4990,
                state_hash: 0xCAFEBABE,
            },
            frames: vec![
                InputFrame {
                    frame_num: 4998,
                    key_mask: 0x0000_0FFF,
                    touching: 0,
                    touch_x: 0,
                    touch_y: 0,
                },
                InputFrame {
                    frame_num: 5002,
                    key_mask: 0x0000_F00F,
                    touching: 1,
                    touch_x: 120,
                    touch_y: 80,
                },
            ],
        };

        let encoded = report.encode();
        // header rides big-endian...
        assert_eq!(&encoded[1..5], &7u32.to_be_bytes());
        // ...but each input frame's key mask stays little-endian.
        assert_eq!(
            &encoded[INPUT_REPORT_HEADER_LEN + 4..INPUT_REPORT_HEADER_LEN + 8],
            &0x0000_0FFFu32.to_le_bytes()
        );

        let decoded = InputReport::decode(&encoded).unwrap();
        assert_eq!(decoded, report);
    }

    #[test]
    fn empty_frame_list_roundtrips() {
        let report = InputReport {
            header: InputReportHeader {
                stall_frame: 1,
                seq: 0,
                frame_index: 0,
                last_complete_frame: 0,
                state_hash: 0,
            },
            frames: vec![],
        };
        assert_eq!(InputReport::decode(&report.encode()).unwrap(), report);
    }

    #[test]
    fn truncated_header_is_rejected() {
        let buf = [0u8; 10];
        assert!(matches!(
            InputReport::decode(&buf),
            Err(ProtoError::Truncated { .. })
        ));
    }
}
