use super::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorize {
    pub username: String,
    pub password: Option<String>,
}

impl Serialize for Authorize {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match &self.password {
            Some(password) => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element(&self.username)?;
                seq.serialize_element(password)?;
                seq.end()
            }
            None => {
                let mut seq = serializer.serialize_seq(Some(1))?;
                seq.serialize_element(&self.username)?;
                seq.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Authorize {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let fields = Vec::<Option<String>>::deserialize(deserializer)?;

        let mut fields = fields.into_iter();

        let username = fields
            .next()
            .flatten()
            .ok_or_else(|| de::Error::custom("mining.authorize requires a username"))?;

        let password = fields.next().flatten();

        Ok(Authorize { username, password })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorize_with_password() {
        let authorize: Authorize = serde_json::from_str(r#"["user.worker1","x"]"#).unwrap();
        assert_eq!(authorize.username, "user.worker1");
        assert_eq!(authorize.password.as_deref(), Some("x"));
    }

    #[test]
    fn authorize_without_password() {
        let authorize: Authorize = serde_json::from_str(r#"["user.worker1"]"#).unwrap();
        assert_eq!(authorize.username, "user.worker1");
        assert_eq!(authorize.password, None);
    }

    #[test]
    fn authorize_rejects_empty() {
        assert!(serde_json::from_str::<Authorize>("[]").is_err());
    }

    #[test]
    fn authorize_serializes_with_password() {
        let authorize = Authorize {
            username: "user.worker1".into(),
            password: Some("x".into()),
        };
        let value: serde_json::Value = serde_json::to_value(&authorize).unwrap();
        assert_eq!(value, serde_json::json!(["user.worker1", "x"]));
    }
}
