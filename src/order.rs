use super::*;

/// Declarative configuration for a single upstream pool connection.
///
/// An `Order` is the static description the operator supplies on the command
/// line; a [`Pool`](crate::pool::Pool) is the live session that results from
/// activating one. `algorithm` is recorded for bookkeeping only -- per the
/// open question this proxy resolves, share acceptance always hashes with
/// double-SHA256 regardless of what's recorded here.
#[derive(Debug, Clone)]
pub struct Order {
    pub id: u64,
    pub address: String,
    pub username: Username,
    pub password: Option<String>,
    pub algorithm: String,
}

impl Order {
    pub fn parse(id: u64, s: &str) -> Result<Self, String> {
        let mut parts = s.splitn(5, ':');

        let host = parts.next().filter(|s| !s.is_empty());
        let port = parts.next().filter(|s| !s.is_empty());
        let username = parts.next().filter(|s| !s.is_empty());

        let (host, port, username) = match (host, port, username) {
            (Some(host), Some(port), Some(username)) => (host, port, username),
            _ => {
                return Err(format!(
                    "order '{s}' must have the shape host:port:user[:pass[:algorithm]]"
                ));
            }
        };

        port.parse::<u16>()
            .map_err(|_| format!("order '{s}' has an invalid port '{port}'"))?;

        let password = parts.next().filter(|s| !s.is_empty()).map(str::to_owned);
        let algorithm = parts
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("sha256d")
            .to_owned();

        Ok(Order {
            id,
            address: format!("{host}:{port}"),
            username: Username::new(username),
            password,
            algorithm,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_order() {
        let order = Order::parse(0, "pool.example.com:3333:user").unwrap();
        assert_eq!(order.address, "pool.example.com:3333");
        assert_eq!(order.username.as_str(), "user");
        assert_eq!(order.password, None);
        assert_eq!(order.algorithm, "sha256d");
    }

    #[test]
    fn parses_password_and_algorithm() {
        let order = Order::parse(1, "pool.example.com:3333:user:hunter2:x11").unwrap();
        assert_eq!(order.password.as_deref(), Some("hunter2"));
        assert_eq!(order.algorithm, "x11");
    }

    #[test]
    fn rejects_missing_fields() {
        assert!(Order::parse(0, "pool.example.com:3333").is_err());
        assert!(Order::parse(0, "pool.example.com").is_err());
    }

    #[test]
    fn rejects_bad_port() {
        assert!(Order::parse(0, "pool.example.com:notaport:user").is_err());
    }
}
