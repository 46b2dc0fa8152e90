use super::*;

/// CLI surface for the proxy binary. `clap`'s `env` feature lets every flag
/// double as an environment variable (`STRATUM_PROXY_<FLAG>`). `Arguments` is
/// the raw, unvalidated surface; [`Settings::load`](crate::settings::Settings::load)
/// is where cross-field validation happens.
#[derive(Debug, Parser)]
#[command(version, about = "Stratum v1 multiplexing proxy")]
pub struct Arguments {
    #[arg(long, env = "STRATUM_PROXY_LISTEN", default_value = "0.0.0.0:3333", help = "Address to accept downstream miner connections on.")]
    pub listen: SocketAddr,

    #[arg(long = "order", env = "STRATUM_PROXY_ORDER", help = "Upstream pool as host:port:user[:pass[:algorithm]]. May be repeated.")]
    pub order: Vec<String>,

    #[arg(long, env = "STRATUM_PROXY_SUBSCRIBE_TIMEOUT", default_value_t = 10, help = "Seconds to wait for mining.subscribe before closing an unresponsive miner.")]
    pub subscribe_timeout: u64,

    #[arg(long, env = "STRATUM_PROXY_POOL_IDLE_TIMEOUT", default_value_t = 600, help = "Seconds without a job from a pool before it is considered idle and reconnected.")]
    pub pool_idle_timeout: u64,

    #[arg(long, env = "STRATUM_PROXY_RECONNECT_MIN", default_value_t = 1, help = "Minimum reconnect backoff, in seconds.")]
    pub reconnect_min: u64,

    #[arg(long, env = "STRATUM_PROXY_RECONNECT_MAX", default_value_t = 60, help = "Maximum reconnect backoff, in seconds.")]
    pub reconnect_max: u64,

    #[arg(long, env = "STRATUM_PROXY_EXTRA2_SIZE", default_value_t = 4, help = "Bytes of ExtraNonce2 the proxy keeps for itself; the remainder is exposed to miners.")]
    pub extra2_size: usize,

    #[arg(long, env = "STRATUM_PROXY_VARDIFF_MIN", default_value = "1", help = "Minimum difficulty vardiff may assign.")]
    pub vardiff_min: Difficulty,

    #[arg(long, env = "STRATUM_PROXY_VARDIFF_MAX", default_value = "65536", help = "Maximum difficulty vardiff may assign.")]
    pub vardiff_max: Difficulty,

    #[arg(long, env = "STRATUM_PROXY_VARDIFF_TARGET", default_value_t = 10, help = "Target seconds between a worker's shares.")]
    pub vardiff_target: u64,

    #[arg(long, env = "STRATUM_PROXY_VARDIFF_RETARGET", default_value_t = 100, help = "Seconds between vardiff retarget windows.")]
    pub vardiff_retarget: u64,

    #[arg(long, env = "STRATUM_PROXY_VARDIFF_VARIANCE", default_value_t = 10.0, help = "Percent tolerance around the target interval before retargeting.")]
    pub vardiff_variance: f64,

    #[arg(long, env = "STRATUM_PROXY_LOG_JSON", help = "Emit logs as JSON instead of human-readable text.")]
    pub log_json: bool,

    #[arg(long, env = "STRATUM_PROXY_SHARE_LOG", help = "Append accepted/rejected shares as JSON lines to this file.")]
    pub share_log: Option<PathBuf>,
}

impl Arguments {
    pub async fn run(self) -> Result<()> {
        let settings = Settings::load(self)?;

        let share_sink: Arc<dyn ShareSink> = match &settings.share_log {
            Some(path) => Arc::new(share_sink::FileSink::open(path).await?),
            None => Arc::new(share_sink::NullSink),
        };

        let cancel = signal::setup_signal_handler();

        let server = Server::new(settings, share_sink, cancel.clone());
        server.run().await
    }
}
