use super::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscribe {
    pub user_agent: Option<String>,
    pub extranonce1: Option<Extranonce>,
}

impl Serialize for Subscribe {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let len = match (&self.user_agent, &self.extranonce1) {
            (None, None) => 0,
            (Some(_), None) => 1,
            (_, Some(_)) => 2,
        };
        let mut seq = serializer.serialize_seq(Some(len))?;
        if len >= 1 {
            seq.serialize_element(self.user_agent.as_deref().unwrap_or_default())?;
        }
        if len >= 2 {
            seq.serialize_element(&self.extranonce1)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Subscribe {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let fields = Vec::<Value>::deserialize(deserializer)?;
        let mut fields = fields.into_iter();

        let user_agent = fields.next().and_then(|v| match v {
            Value::String(s) if !s.is_empty() => Some(s),
            _ => None,
        });

        let extranonce1 = fields
            .next()
            .and_then(|v| v.as_str().map(str::to_owned))
            .and_then(|s| Extranonce::from_hex(&s).ok());

        Ok(Subscribe {
            user_agent,
            extranonce1,
        })
    }
}

/// A `mining.subscribe` response result, tolerant of upstream pools that put
/// the subscribed-to-notifications list at either position 0 or 1 of the
/// outer array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeResult {
    pub subscriptions: Vec<(String, String)>,
    pub extranonce1: Extranonce,
    pub extranonce2_size: usize,
}

impl Serialize for SubscribeResult {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(3))?;
        seq.serialize_element(&self.subscriptions)?;
        seq.serialize_element(&self.extranonce1)?;
        seq.serialize_element(&self.extranonce2_size)?;
        seq.end()
    }
}

impl<'de> Deserialize<'de> for SubscribeResult {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let fields = Vec::<Value>::deserialize(deserializer)?;

        if fields.len() < 2 {
            return Err(de::Error::custom(
                "mining.subscribe result requires at least [extranonce1, extranonce2_size]",
            ));
        }

        // Some pools omit the subscriptions list entirely, putting
        // extranonce1 at index 0 rather than index 1. Detect by type: the
        // subscriptions element is always an array, extranonce1 is a string.
        let (subscriptions, rest_offset) = match fields.first() {
            Some(Value::Array(_)) => {
                let subscriptions = serde_json::from_value::<Vec<(String, String)>>(
                    fields[0].clone(),
                )
                .map_err(de::Error::custom)?;
                (subscriptions, 1)
            }
            _ => (Vec::new(), 0),
        };

        let extranonce1_str = fields
            .get(rest_offset)
            .and_then(Value::as_str)
            .ok_or_else(|| de::Error::custom("missing extranonce1 in mining.subscribe result"))?;
        let extranonce1 = Extranonce::from_hex(extranonce1_str).map_err(de::Error::custom)?;

        let extranonce2_size = fields
            .get(rest_offset + 1)
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                de::Error::custom("missing extranonce2_size in mining.subscribe result")
            })? as usize;

        Ok(SubscribeResult {
            subscriptions,
            extranonce1,
            extranonce2_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_roundtrip() {
        let subscribe: Subscribe = serde_json::from_str(r#"["cgminer/4.10.0","01020304"]"#).unwrap();
        assert_eq!(subscribe.user_agent.as_deref(), Some("cgminer/4.10.0"));
        assert_eq!(subscribe.extranonce1.unwrap().to_hex(), "01020304");
    }

    #[test]
    fn subscribe_empty_params() {
        let subscribe: Subscribe = serde_json::from_str("[]").unwrap();
        assert_eq!(subscribe.user_agent, None);
        assert_eq!(subscribe.extranonce1, None);
    }

    #[test]
    fn subscribe_result_standard_shape() {
        let value = serde_json::json!([
            [["mining.set_difficulty", "01"], ["mining.notify", "01"]],
            "01020304",
            4
        ]);
        let result: SubscribeResult = serde_json::from_value(value).unwrap();
        assert_eq!(result.subscriptions.len(), 2);
        assert_eq!(result.extranonce1.to_hex(), "01020304");
        assert_eq!(result.extranonce2_size, 4);
    }

    #[test]
    fn subscribe_result_without_subscriptions_list() {
        let value = serde_json::json!(["01020304", 4]);
        let result: SubscribeResult = serde_json::from_value(value).unwrap();
        assert!(result.subscriptions.is_empty());
        assert_eq!(result.extranonce1.to_hex(), "01020304");
        assert_eq!(result.extranonce2_size, 4);
    }
}
