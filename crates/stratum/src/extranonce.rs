use super::*;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Extranonce(Vec<u8>);

impl Extranonce {
    pub fn random(size: usize) -> Self {
        let mut v = vec![0u8; size];
        rand::rng().fill_bytes(&mut v);
        Self(v)
    }

    pub fn zeroed(size: usize) -> Self {
        Self(vec![0u8; size])
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| InternalError::Parse {
            message: format!("invalid extranonce hex '{s}': {e}"),
        })?;
        Ok(Self(bytes))
    }

    /// Concatenates `self` with `other`, byte for byte.
    pub fn concat(&self, other: &Extranonce) -> Extranonce {
        let mut bytes = self.0.clone();
        bytes.extend_from_slice(&other.0);
        Extranonce(bytes)
    }

    /// Splits off the last `tail_len` bytes, returning `(head, tail)`.
    pub fn split_tail(&self, tail_len: usize) -> Option<(Extranonce, Extranonce)> {
        if tail_len > self.0.len() {
            return None;
        }
        let at = self.0.len() - tail_len;
        Some((
            Extranonce(self.0[..at].to_vec()),
            Extranonce(self.0[at..].to_vec()),
        ))
    }

    /// Strips the given prefix, returning the remaining suffix bytes.
    pub fn strip_prefix(&self, prefix: &Extranonce) -> Option<Extranonce> {
        self.0
            .strip_prefix(prefix.0.as_slice())
            .map(|rest| Extranonce(rest.to_vec()))
    }
}

impl Serialize for Extranonce {
    fn serialize<S: Serializer>(&self, ser: S) -> std::result::Result<S::Ok, S::Error> {
        ser.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Extranonce {
    fn deserialize<D: Deserializer<'de>>(de: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(de)?;
        Self::from_hex(&s).map_err(de::Error::custom)
    }
}

impl fmt::Display for Extranonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Extranonce {
    type Err = InternalError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_rejects_odd_length_hex() {
        assert!("abc".parse::<Extranonce>().is_err());
    }

    #[test]
    fn deserialize_rejects_non_hex() {
        assert!("zz".parse::<Extranonce>().is_err());
    }

    #[test]
    fn valid_hex_roundtrip() {
        let extranonce: Extranonce = serde_json::from_str(r#""abcd""#).unwrap();
        assert_eq!(extranonce.len(), 2);
        assert_eq!(extranonce.to_hex(), "abcd");
        let ser = serde_json::to_string(&extranonce).unwrap();
        assert_eq!(ser, r#""abcd""#);
    }

    #[test]
    fn random_has_correct_length() {
        let extranonce2 = Extranonce::random(8);
        assert_eq!(extranonce2.len(), 8);
    }

    #[test]
    fn concat_and_split_tail_are_inverse() {
        let head = "08000001".parse::<Extranonce>().unwrap();
        let tail = "0002".parse::<Extranonce>().unwrap();
        let whole = head.concat(&tail);
        assert_eq!(whole.to_hex(), "080000010002");

        let (h, t) = whole.split_tail(2).unwrap();
        assert_eq!(h, head);
        assert_eq!(t, tail);
    }

    #[test]
    fn strip_prefix() {
        let whole = "080000010002".parse::<Extranonce>().unwrap();
        let prefix = "08000001".parse::<Extranonce>().unwrap();
        assert_eq!(
            whole.strip_prefix(&prefix).unwrap().to_hex(),
            "0002"
        );
    }
}
