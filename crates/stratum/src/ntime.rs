use super::*;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, DeserializeFromStr, SerializeDisplay,
)]
pub struct Ntime(pub u32);

impl FromStr for Ntime {
    type Err = InternalError;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() != 8 {
            return Err(InternalError::Parse {
                message: format!("ntime hex must be 8 characters, got '{s}'"),
            });
        }
        let time = u32::from_str_radix(s, 16).map_err(|_| InternalError::Parse {
            message: format!("invalid ntime hex string '{s}'"),
        })?;
        Ok(Ntime(time))
    }
}

impl fmt::Display for Ntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

impl From<Ntime> for u32 {
    fn from(n: Ntime) -> u32 {
        n.0
    }
}

impl From<u32> for Ntime {
    fn from(n: u32) -> Ntime {
        Ntime(n)
    }
}

impl TryFrom<u64> for Ntime {
    type Error = <u32 as TryFrom<u64>>::Error;

    fn try_from(value: u64) -> std::result::Result<Self, Self::Error> {
        Ok(Ntime(u32::try_from(value)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_value() {
        assert_eq!(Ntime::from_str("504e86ed").unwrap().0, 1_347_323_629);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(Ntime::from_str("ff").is_err());
    }
}
