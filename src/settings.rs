use super::*;

/// Resolved, validated configuration the rest of the crate runs on. Built
/// once from [`Arguments`](crate::arguments::Arguments) and handed to
/// [`Server::new`](crate::server::Server::new); nothing downstream touches
/// `clap` or raw CLI strings again.
#[derive(Debug, Clone)]
pub struct Settings {
    pub listen: SocketAddr,
    pub orders: Vec<Order>,
    pub subscribe_timeout: Duration,
    pub pool_idle_timeout: Duration,
    pub reconnect_min: Duration,
    pub reconnect_max: Duration,
    pub extra2_size: usize,
    pub vardiff: VardiffConfig,
    pub share_log: Option<PathBuf>,
}

impl Settings {
    pub fn load(args: Arguments) -> Result<Self> {
        if args.order.is_empty() {
            bail!("at least one --order must be configured");
        }

        let orders = args
            .order
            .iter()
            .enumerate()
            .map(|(i, order)| Order::parse(i as u64, order).map_err(|err| anyhow!(err)))
            .collect::<Result<Vec<_>>>()?;

        if args.reconnect_min > args.reconnect_max {
            bail!(
                "--reconnect-min ({}) must not exceed --reconnect-max ({})",
                args.reconnect_min,
                args.reconnect_max
            );
        }

        if args.vardiff_min > args.vardiff_max {
            bail!(
                "--vardiff-min ({}) must not exceed --vardiff-max ({})",
                args.vardiff_min,
                args.vardiff_max
            );
        }

        Ok(Self {
            listen: args.listen,
            orders,
            subscribe_timeout: Duration::from_secs(args.subscribe_timeout),
            pool_idle_timeout: Duration::from_secs(args.pool_idle_timeout),
            reconnect_min: Duration::from_secs(args.reconnect_min),
            reconnect_max: Duration::from_secs(args.reconnect_max),
            extra2_size: args.extra2_size,
            vardiff: VardiffConfig {
                min: args.vardiff_min,
                max: args.vardiff_max,
                target_seconds: args.vardiff_target as f64,
                retarget_seconds: args.vardiff_retarget as f64,
                variance_percent: args.vardiff_variance,
            },
            share_log: args.share_log,
        })
    }
}
