use super::*;

/// A request/response correlation id. `0` is reserved: it never appears on a
/// request or response, and marks a message as a notification on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
pub struct Id(u64);

impl Id {
    pub const NOTIFICATION: Id = Id(0);

    pub fn new(id: u64) -> Self {
        Id(id)
    }

    pub fn is_notification(self) -> bool {
        self.0 == 0
    }
}

impl From<u64> for Id {
    fn from(id: u64) -> Self {
        Id(id)
    }
}

impl From<Id> for u64 {
    fn from(id: Id) -> Self {
        id.0
    }
}

impl Serialize for Id {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Null,
            Number(u64),
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Null => Id(0),
            Raw::Number(n) => Id(n),
        })
    }
}

#[derive(Debug, PartialEq)]
pub enum Message {
    Request {
        id: Id,
        method: String,
        params: Value,
    },
    Response {
        id: Id,
        result: Option<Value>,
        error: Option<JsonRpcError>,
    },
    Notification {
        method: String,
        params: Value,
    },
}

impl Message {
    pub fn request(id: Id, method: impl Into<String>, params: Value) -> Self {
        Message::Request {
            id,
            method: method.into(),
            params,
        }
    }

    pub fn notification(method: impl Into<String>, params: Value) -> Self {
        Message::Notification {
            method: method.into(),
            params,
        }
    }

    pub fn response(id: Id, result: Value) -> Self {
        Message::Response {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Id, error: JsonRpcError) -> Self {
        Message::Response {
            id,
            result: None,
            error: Some(error),
        }
    }
}

impl Serialize for Message {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeMap;

        match self {
            Message::Request { id, method, params } => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("id", id)?;
                map.serialize_entry("method", method)?;
                map.serialize_entry("params", params)?;
                map.end()
            }
            Message::Response { id, result, error } => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("id", id)?;
                map.serialize_entry("result", result)?;
                map.serialize_entry("error", error)?;
                map.end()
            }
            Message::Notification { method, params } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("method", method)?;
                map.serialize_entry("params", params)?;
                map.end()
            }
        }
    }
}

/// `id` is the discriminant: absent, `null`, or `0` means a notification;
/// anything else with a `method` field is a request; anything with a
/// `result`/`error` field is a response.
impl<'de> Deserialize<'de> for Message {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;

        let id = match value.get("id") {
            None | Some(Value::Null) => Id::NOTIFICATION,
            Some(v) => v
                .as_u64()
                .map(Id::new)
                .ok_or_else(|| de::Error::custom("id must be an unsigned integer"))?,
        };

        let is_response = value.get("result").is_some() || value.get("error").is_some();

        if is_response {
            let result = value.get("result").cloned().filter(|v| !v.is_null());
            let error = match value.get("error") {
                None | Some(Value::Null) => None,
                Some(v) => Some(
                    serde_json::from_value::<JsonRpcError>(v.clone()).map_err(de::Error::custom)?,
                ),
            };
            return Ok(Message::Response { id, result, error });
        }

        let method = value
            .get("method")
            .and_then(Value::as_str)
            .ok_or_else(|| de::Error::missing_field("method"))?
            .to_string();

        let params = value.get("params").cloned().unwrap_or(Value::Null);

        if id.is_notification() {
            Ok(Message::Notification { method, params })
        } else {
            Ok(Message::Request { id, method, params })
        }
    }
}
