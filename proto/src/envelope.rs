use crate::error::ProtoError;

/// `"NIFI"` as a little-endian u32 — the magic every [`MpPacketHeader`] must
/// carry.
pub const MP_PACKET_MAGIC: u32 = 0x4946494E;

/// Maximum payload bytes following an [`MpPacketHeader`] (`kMaxFrameSize` in
/// the reference implementation).
pub const MAX_FRAME_PAYLOAD: usize = 2376;

/// Encoded size of [`MpPacketHeader`] on the wire.
pub const HEADER_LEN: usize = 24;

/// Sender id meaning "synthetic/virtual", used for packets not attributable
/// to a real instance.
pub const SYNTHETIC_SENDER: u32 = 16;

/// The four frame kinds the DS wifi hardware presents to software.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PacketKind {
    Data,
    Cmd,
    Reply,
    Ack,
}

impl PacketKind {
    fn to_lo16(self) -> u16 {
        match self {
            PacketKind::Data => 0,
            PacketKind::Cmd => 1,
            PacketKind::Reply => 2,
            PacketKind::Ack => 3,
        }
    }

    fn from_lo16(value: u16) -> Result<Self, ProtoError> {
        match value {
            0 => Ok(PacketKind::Data),
            1 => Ok(PacketKind::Cmd),
            2 => Ok(PacketKind::Reply),
            3 => Ok(PacketKind::Ack),
            other => Err(ProtoError::UnknownKind(other as u32)),
        }
    }
}

/// The 24-byte header that wraps every MP frame on the wire.
///
/// `type` is packed as `lo16 = kind, hi16 = aid` (aid only meaningful for
/// `Reply` frames); this matches the bit layout melonDS uses so that a
/// [`PacketKind::Reply`] frame's association id rides along in the same
/// field rather than needing a second one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MpPacketHeader {
    pub sender: u32,
    pub kind: PacketKind,
    pub aid: u16,
    pub length: u32,
    pub timestamp: u64,
}

impl MpPacketHeader {
    pub fn new(sender: u32, kind: PacketKind, length: u32, timestamp: u64) -> Self {
        Self {
            sender,
            kind,
            aid: 0,
            length,
            timestamp,
        }
    }

    pub fn with_aid(mut self, aid: u16) -> Self {
        self.aid = aid;
        self
    }

    /// Encodes this header to its 24-byte little-endian wire form.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&MP_PACKET_MAGIC.to_le_bytes());
        out[4..8].copy_from_slice(&self.sender.to_le_bytes());
        let ty = (self.kind.to_lo16() as u32) | ((self.aid as u32) << 16);
        out[8..12].copy_from_slice(&ty.to_le_bytes());
        out[12..16].copy_from_slice(&self.length.to_le_bytes());
        out[16..24].copy_from_slice(&self.timestamp.to_le_bytes());
        out
    }

    /// Decodes a header from its 24-byte little-endian wire form.
    ///
    /// Packets failing the magic or length checks are rejected here so every
    /// caller gets the spec's "drop silently" behaviour for free by treating
    /// `Err` as "discard this packet".
    pub fn decode(buf: &[u8]) -> Result<Self, ProtoError> {
        if buf.len() < HEADER_LEN {
            return Err(ProtoError::Truncated {
                need: HEADER_LEN,
                got: buf.len(),
            });
        }

        let magic = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        if magic != MP_PACKET_MAGIC {
            return Err(ProtoError::BadMagic {
                expected: MP_PACKET_MAGIC,
                actual: magic,
            });
        }

        let sender = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        let ty = u32::from_le_bytes(buf[8..12].try_into().unwrap());
        let kind = PacketKind::from_lo16((ty & 0xFFFF) as u16)?;
        let aid = (ty >> 16) as u16;
        let length = u32::from_le_bytes(buf[12..16].try_into().unwrap());
        let timestamp = u64::from_le_bytes(buf[16..24].try_into().unwrap());

        if length as usize > MAX_FRAME_PAYLOAD {
            return Err(ProtoError::PayloadTooLarge(
                length as usize,
                MAX_FRAME_PAYLOAD,
            ));
        }

        Ok(Self {
            sender,
            kind,
            aid,
            length,
            timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_preserves_fields() {
        let header = MpPacketHeader::new(3, PacketKind::Reply, 42, 0xDEAD_BEEF_0000_1234).with_aid(7);
        let encoded = header.encode();
        let decoded = MpPacketHeader::decode(&encoded).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut buf = MpPacketHeader::new(0, PacketKind::Data, 0, 0).encode();
        buf[0] ^= 0xFF;
        assert!(matches!(
            MpPacketHeader::decode(&buf),
            Err(ProtoError::BadMagic { .. })
        ));
    }

    #[test]
    fn max_frame_size_boundary() {
        let ok = MpPacketHeader::new(0, PacketKind::Data, MAX_FRAME_PAYLOAD as u32, 0);
        assert!(MpPacketHeader::decode(&ok.encode()).is_ok());

        let too_big = MpPacketHeader::new(0, PacketKind::Data, MAX_FRAME_PAYLOAD as u32 + 1, 0);
        assert!(matches!(
            MpPacketHeader::decode(&too_big.encode()),
            Err(ProtoError::PayloadTooLarge(_, _))
        ));
    }
}
