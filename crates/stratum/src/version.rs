use super::*;

/// The block header version field as exchanged over the wire, 8 hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, DeserializeFromStr, SerializeDisplay)]
pub struct Version(pub block::Version);

impl Version {
    pub fn to_consensus(self) -> i32 {
        self.0.to_consensus()
    }
}

impl From<block::Version> for Version {
    fn from(v: block::Version) -> Self {
        Version(v)
    }
}

impl From<Version> for block::Version {
    fn from(v: Version) -> Self {
        v.0
    }
}

impl FromStr for Version {
    type Err = InternalError;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() != 8 {
            return Err(InternalError::Parse {
                message: format!("version hex must be 8 characters, got '{s}'"),
            });
        }
        let bits = u32::from_str_radix(s, 16).map_err(|_| InternalError::Parse {
            message: format!("invalid version hex string '{s}'"),
        })?;
        Ok(Version(block::Version::from_consensus(bits as i32)))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0.to_consensus() as u32)
    }
}
