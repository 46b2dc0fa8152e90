use {super::*, core::cmp::Ordering, primitive_types::U256};

pub static DIFFICULTY_1_TARGET: LazyLock<U256> =
    LazyLock::new(|| U256::from_big_endian(&Target::MAX.to_be_bytes()));

fn format_si(mut value: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    const UNITS: [&str; 7] = ["", "K", "M", "G", "T", "P", "E"];
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    write!(f, "{} {}", value.floor() as u64, UNITS[unit])
}

/// Difficulty is a fraught metric. It is derived from the network target, where the
/// difficulty equals the current network target divided by the network target defined in the genesis block.
/// The target principally represents a 256-bit number but the block header
/// contains a compact representation called nbits (or CompactTarget). This is inherently lossy.
/// Furthermore difficulty, which used to be only for human consumption has made itself into the
/// stratum protocol to define the target (inverse of difficulty) a miner's share has to meet. It
/// is used to tune the frequency of a miner's share submission and for accounting how much work
/// has been completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Difficulty(CompactTarget);

impl Difficulty {
    pub fn to_target(self) -> Target {
        self.0.into()
    }

    pub fn as_f64(self) -> f64 {
        Target::from_compact(self.0).difficulty_float()
    }
}

impl From<BlockHash> for Difficulty {
    fn from(hash: BlockHash) -> Self {
        let target = Target::from_le_bytes(hash.to_byte_array());
        Difficulty(target.to_compact_lossy())
    }
}

impl Ord for Difficulty {
    fn cmp(&self, other: &Self) -> Ordering {
        let target_self = self.to_target();
        let target_other = other.to_target();

        // Reverse the target order: lower target = higher difficulty
        target_other.cmp(&target_self)
    }
}

impl PartialOrd for Difficulty {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Default for Difficulty {
    fn default() -> Self {
        Difficulty::from(1)
    }
}

impl From<Nbits> for Difficulty {
    fn from(nbits: Nbits) -> Self {
        Difficulty(nbits.into())
    }
}

impl From<CompactTarget> for Difficulty {
    fn from(compact_target: CompactTarget) -> Self {
        Difficulty(compact_target)
    }
}

impl From<Difficulty> for CompactTarget {
    fn from(difficulty: Difficulty) -> Self {
        difficulty.0
    }
}

impl From<Target> for Difficulty {
    fn from(target: Target) -> Self {
        Difficulty(target.to_compact_lossy())
    }
}

impl From<u64> for Difficulty {
    fn from(difficulty: u64) -> Self {
        assert!(difficulty > 0, "difficulty must be > 0");

        let target = *DIFFICULTY_1_TARGET / U256::from(difficulty);

        Self::from(Target::from_be_bytes(target.to_big_endian()))
    }
}

impl From<f64> for Difficulty {
    fn from(difficulty: f64) -> Self {
        assert!(
            difficulty.is_finite() && difficulty > 0.0,
            "difficulty must be finite and > 0"
        );

        // 2^32 - 1 is safe: DIFFICULTY_1_TARGET (2^224) * scale fits in 256 bits.
        const MAX_SCALE_NUM: u64 = 0xFFFF_FFFF;

        let max_by_den = (u64::MAX as f64 / difficulty).floor();
        let scale = max_by_den.min(MAX_SCALE_NUM as f64).max(1.0) as u64;

        let numerator = (*DIFFICULTY_1_TARGET).saturating_mul(U256::from(scale));
        let denominator = (difficulty * scale as f64).round() as u64;

        let target = if denominator == 0 {
            U256::MAX
        } else {
            numerator / U256::from(denominator)
        };

        Difficulty(Target::from_be_bytes(target.to_big_endian()).to_compact_lossy())
    }
}

impl Serialize for Difficulty {
    fn serialize<S: Serializer>(&self, ser: S) -> std::result::Result<S::Ok, S::Error> {
        let d = self.as_f64();
        if d < 1.0 {
            ser.serialize_f64(d)
        } else {
            ser.serialize_u64(d.floor() as u64)
        }
    }
}

impl<'de> Deserialize<'de> for Difficulty {
    fn deserialize<D: Deserializer<'de>>(de: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Int(u64),
            Float(f64),
        }

        match Wire::deserialize(de)? {
            Wire::Int(u) => {
                if u == 0 {
                    return Err(de::Error::custom("difficulty must be > 0"));
                }
                Ok(Difficulty::from(u))
            }
            Wire::Float(x) => {
                if !x.is_finite() || x <= 0.0 {
                    return Err(de::Error::custom("difficulty must be finite and > 0"));
                }
                Ok(Difficulty::from(x))
            }
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = self.as_f64();

        if d >= 1.0 {
            format_si(d.floor(), f)
        } else if let Some(p) = f.precision() {
            write!(f, "{:.*}", p, d)
        } else {
            let s = format!("{:.8}", d);
            let s = s.trim_end_matches('0').trim_end_matches('.');
            f.write_str(s)
        }
    }
}

impl FromStr for Difficulty {
    type Err = InternalError;

    fn from_str(difficulty: &str) -> Result<Self> {
        let difficulty = difficulty.trim();

        if difficulty.is_empty() {
            return Err(InternalError::InvalidValue {
                reason: "difficulty string is empty".to_string(),
            });
        }

        if let Ok(u) = difficulty.parse::<u64>() {
            if u == 0 {
                return Err(InternalError::InvalidValue {
                    reason: "difficulty must be > 0".to_string(),
                });
            }
            return Ok(Difficulty::from(u));
        }

        if let Ok(x) = difficulty.parse::<f64>() {
            if !x.is_finite() || x <= 0.0 {
                return Err(InternalError::InvalidValue {
                    reason: "difficulty must be > 0".to_string(),
                });
            }
            return Ok(Difficulty::from(x));
        }

        Err(InternalError::Parse {
            message: "difficulty must be an integer or float".to_string(),
        })
    }
}
