use {super::*, byteorder::{BigEndian, ByteOrder, LittleEndian}};

/// The previous-block-hash field as Stratum delivers it: 32 bytes, with every
/// 4-byte group byte-reversed relative to the bitcoin block header's field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, DeserializeFromStr, SerializeDisplay)]
pub struct PrevHash([u8; 32]);

impl PrevHash {
    pub fn from_wire_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_wire_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Reverses each 4-byte group, producing the bytes as they belong in an
    /// 80-byte block header. Reading each group big-endian and writing it
    /// back little-endian swaps its byte order without touching group
    /// ordering, which is exactly the transform Stratum's prevhash field
    /// applies to the header's.
    pub fn reversed(&self) -> [u8; 32] {
        swap_endian_groups(&self.0)
    }

    pub fn from_block_hash(hash: bitcoin::BlockHash) -> Self {
        Self(swap_endian_groups(&hash.to_byte_array()))
    }

    pub fn to_block_hash(self) -> bitcoin::BlockHash {
        bitcoin::BlockHash::from_byte_array(self.reversed())
    }
}

fn swap_endian_groups(bytes: &[u8; 32]) -> [u8; 32] {
    let mut out = [0u8; 32];
    for (src, dst) in bytes.chunks_exact(4).zip(out.chunks_exact_mut(4)) {
        LittleEndian::write_u32(dst, BigEndian::read_u32(src));
    }
    out
}

impl From<bitcoin::BlockHash> for PrevHash {
    fn from(hash: bitcoin::BlockHash) -> Self {
        Self::from_block_hash(hash)
    }
}

impl FromStr for PrevHash {
    type Err = InternalError;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() != 64 {
            return Err(InternalError::Parse {
                message: format!("prevhash hex must be 64 characters, got '{s}'"),
            });
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes).map_err(|e| InternalError::Parse {
            message: format!("invalid prevhash hex '{s}': {e}"),
        })?;
        Ok(PrevHash(bytes))
    }
}

impl fmt::Display for PrevHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}
