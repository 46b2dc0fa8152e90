use super::*;

pub type Result<T, E = InternalError> = std::result::Result<T, E>;

/// Parse/conversion failures inside the protocol types. Distinct from
/// [`StratumError`], which is the numbered error the wire protocol carries.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum InternalError {
    #[snafu(display("invalid {kind} hex string '{input}'"))]
    ParseHex { kind: &'static str, input: String },
    #[snafu(display("invalid value: {reason}"))]
    InvalidValue { reason: String },
    #[snafu(display("{message}"))]
    Parse { message: String },
    #[snafu(display("username has no address component"))]
    EmptyUsername,
    #[snafu(display("invalid address: {source}"))]
    InvalidAddress {
        source: bitcoin::address::ParseError,
    },
    #[snafu(display("address is not valid for network {expected:?}: {address}"))]
    NetworkMismatch { expected: Network, address: String },
    #[snafu(display("could not infer a network for this address"))]
    UnknownNetwork,
}

/// The numbered protocol error carried on the wire as `[code, message, data?]`.
///
/// Codes 20-25 are preserved from the reference Stratum implementations;
/// they are load-bearing for interop and must not be renumbered.
#[derive(Debug, Clone, PartialEq, Snafu)]
pub enum StratumError {
    #[snafu(display("unknown error"))]
    Unknown,
    #[snafu(display("malformed request: {reason}"))]
    Malformed { reason: String },
    #[snafu(display("job not found"))]
    JobNotFound,
    #[snafu(display("duplicate share"))]
    DuplicateShare,
    #[snafu(display("low difficulty share"))]
    LowDifficultyShare,
    #[snafu(display("unauthorized worker"))]
    UnauthorizedWorker,
    #[snafu(display("unsubscribed worker"))]
    UnsubscribedWorker,
}

impl StratumError {
    /// The numeric code this error is reported with on the wire.
    pub fn code(&self) -> i32 {
        match self {
            StratumError::Unknown | StratumError::Malformed { .. } => 20,
            StratumError::JobNotFound => 21,
            StratumError::DuplicateShare => 22,
            StratumError::LowDifficultyShare => 23,
            StratumError::UnauthorizedWorker => 24,
            StratumError::UnsubscribedWorker => 25,
        }
    }

    /// Whether this error should cause the endpoint to close the connection
    /// after the response is flushed (see `WaitClose` in the RPC endpoint).
    pub fn closes_connection(&self) -> bool {
        matches!(
            self,
            StratumError::UnauthorizedWorker | StratumError::UnsubscribedWorker
        )
    }
}

/// Array-shaped JSON-RPC error as Stratum miners expect it on the wire:
/// `[code, message, data?]` rather than the standard `{code, message, data?}`.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    pub data: Option<Value>,
}

impl From<&StratumError> for JsonRpcError {
    fn from(err: &StratumError) -> Self {
        JsonRpcError {
            code: err.code(),
            message: err.to_string(),
            data: None,
        }
    }
}

impl Serialize for JsonRpcError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let len = if self.data.is_some() { 3 } else { 2 };
        let mut seq = serializer.serialize_seq(Some(len))?;
        seq.serialize_element(&self.code)?;
        seq.serialize_element(&self.message)?;
        if let Some(data) = &self.data {
            seq.serialize_element(data)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for JsonRpcError {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Array2((i32, String)),
            Array3((i32, String, Value)),
            Object { code: i32, message: String },
        }

        match Raw::deserialize(deserializer)? {
            Raw::Array2((code, message)) => Ok(JsonRpcError {
                code,
                message,
                data: None,
            }),
            Raw::Array3((code, message, data)) => Ok(JsonRpcError {
                code,
                message,
                data: Some(data),
            }),
            Raw::Object { code, message } => Ok(JsonRpcError {
                code,
                message,
                data: None,
            }),
        }
    }
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stratum error {}: {}", self.code, self.message)
    }
}
