use {
    super::*,
    backon::{ExponentialBuilder, Retryable},
};

/// Lifecycle of a single upstream connection, mirrored by `Pool::state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum PoolState {
    #[display("init")]
    Init,
    #[display("connected")]
    Connected,
    #[display("authorized")]
    Authorized,
    #[display("active")]
    Active,
    #[display("reconnecting")]
    Reconnecting,
    #[display("dead")]
    Dead,
    #[display("closing")]
    Closing,
}

/// Broadcast to every worker bound to this pool when a new job or difficulty
/// arrives upstream, or when the upstream connection drops. Workers must
/// close on `Disconnected` rather than keep running against a pool whose
/// nonce counter has just been torn down; they resubscribe once the pool is
/// active again.
#[derive(Debug, Clone)]
pub enum PoolEvent {
    Job(Arc<Job>),
    SetDifficulty(Difficulty),
    Disconnected,
}

/// Reconnect attempts per disconnect before the pool gives up and transitions
/// to `Closing` for good.
const MAX_RECONNECT_ATTEMPTS: usize = 10;

/// Why `Pool::read_loop` returned, distinguishing a reconnect-eligible
/// disconnect from an idle timeout, which shuts the pool down instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadLoopExit {
    Disconnected,
    IdleTimeout,
}

/// A live session against one upstream Stratum pool: owns the connection,
/// the current job set, and the nonce-space partition handed out to
/// downstream workers.
pub struct Pool {
    pub order: Order,
    state: RwLock<PoolState>,
    writer: tokio::sync::Mutex<Option<rpc::MessageWriter<OwnedWriteHalf>>>,
    pending: rpc::PendingRequests,
    jobs: DashMap<JobId, Arc<Job>>,
    current_job: RwLock<Option<JobId>>,
    nonce_counter: RwLock<Option<Arc<NonceCounter>>>,
    events: broadcast::Sender<PoolEvent>,
    pool_difficulty: RwLock<Difficulty>,
    extra2_size: usize,
    idle_timeout: Duration,
    reconnect_min: Duration,
    reconnect_max: Duration,
    last_job_at: RwLock<Instant>,
    cancel: CancellationToken,
}

impl Pool {
    pub fn new(
        order: Order,
        extra2_size: usize,
        idle_timeout: Duration,
        reconnect_min: Duration,
        reconnect_max: Duration,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            order,
            state: RwLock::new(PoolState::Init),
            writer: tokio::sync::Mutex::new(None),
            pending: rpc::PendingRequests::new(),
            jobs: DashMap::new(),
            current_job: RwLock::new(None),
            nonce_counter: RwLock::new(None),
            events,
            pool_difficulty: RwLock::new(Difficulty::default()),
            extra2_size,
            idle_timeout,
            reconnect_min,
            reconnect_max,
            last_job_at: RwLock::new(Instant::now()),
            cancel,
        })
    }

    pub fn state(&self) -> PoolState {
        *self.state.read()
    }

    pub fn is_active(&self) -> bool {
        self.state() == PoolState::Active
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<PoolEvent> {
        self.events.subscribe()
    }

    pub fn pool_difficulty(&self) -> Difficulty {
        *self.pool_difficulty.read()
    }

    pub fn current_job(&self) -> Option<Arc<Job>> {
        let id = (*self.current_job.read())?;
        self.jobs.get(&id).map(|entry| entry.clone())
    }

    pub fn job(&self, id: JobId) -> Option<Arc<Job>> {
        self.jobs.get(&id).map(|entry| entry.clone())
    }

    /// The worker-visible extranonce2 size: the tail the proxy hands to
    /// downstream miners, not the upstream pool's full extranonce2 size.
    pub fn worker_extranonce2_size(&self) -> Option<usize> {
        self.nonce_counter.read().as_ref().map(|n| n.nonce2_size())
    }

    pub fn next_extranonce(&self) -> Option<Extranonce> {
        self.nonce_counter.read().as_ref().map(|n| n.next())
    }

    pub fn nonce1_suffix(&self, downstream_extranonce1: &Extranonce) -> Option<Extranonce> {
        self.nonce_counter
            .read()
            .as_ref()
            .and_then(|n| n.nonce1_suffix(downstream_extranonce1))
    }

    /// Connects, subscribes, and authorizes against the upstream pool,
    /// retrying with exponential backoff (capped at
    /// [`MAX_RECONNECT_ATTEMPTS`]) until it succeeds or the pool is
    /// cancelled. Runs the read loop until disconnect, then loops back to
    /// reconnect; an idle timeout instead shuts the pool down outright, and
    /// exhausting reconnect attempts does too. Returns once the pool has
    /// permanently stopped, so the caller can evict it from the registry.
    pub async fn run(self: Arc<Self>) {
        loop {
            if self.cancel.is_cancelled() {
                *self.state.write() = PoolState::Closing;
                return;
            }

            *self.state.write() = PoolState::Reconnecting;

            let backoff = ExponentialBuilder::default()
                .with_min_delay(self.reconnect_min)
                .with_max_delay(self.reconnect_max)
                .with_max_times(MAX_RECONNECT_ATTEMPTS);

            let connect = || {
                let pool = self.clone();
                async move { pool.connect_and_handshake().await }
            };

            let connected = connect
                .retry(backoff)
                .sleep(tokio::time::sleep)
                .when(|_| !self.cancel.is_cancelled())
                .notify(|err: &Error, dur: Duration| {
                    warn!(
                        "pool {} reconnect failed, retrying in {dur:?}: {err:#}",
                        self.order.id
                    );
                })
                .await;

            let Ok(read_half) = connected else {
                error!(
                    "pool {} exhausted {MAX_RECONNECT_ATTEMPTS} reconnect attempts, giving up",
                    self.order.id
                );
                *self.state.write() = PoolState::Dead;
                self.events.send(PoolEvent::Disconnected).ok();
                *self.state.write() = PoolState::Closing;
                return;
            };

            *self.state.write() = PoolState::Active;
            *self.last_job_at.write() = Instant::now();
            info!("pool {} active at {}", self.order.id, self.order.address);

            let exit = self.read_loop(read_half).await;

            self.events.send(PoolEvent::Disconnected).ok();
            *self.nonce_counter.write() = None;
            *self.current_job.write() = None;
            self.pending.cancel_all();

            if self.cancel.is_cancelled() {
                *self.state.write() = PoolState::Closing;
                return;
            }

            if exit == ReadLoopExit::IdleTimeout {
                warn!("pool {} shutting down after idle timeout", self.order.id);
                *self.state.write() = PoolState::Closing;
                return;
            }
        }
    }

    async fn connect_and_handshake(self: &Arc<Self>) -> Result<tokio::net::tcp::OwnedReadHalf> {
        let stream = TcpStream::connect(&self.order.address)
            .await
            .with_context(|| format!("failed to connect to pool {}", self.order.address))?;
        stream.set_nodelay(true).ok();

        let (read_half, write_half) = stream.into_split();
        *self.writer.lock().await = Some(rpc::MessageWriter::new(write_half));
        *self.state.write() = PoolState::Connected;

        let mut reader = rpc::MessageReader::new(read_half);

        let subscribe_result = self.request_subscribe(&mut reader).await?;

        let extra2_size = self.extra2_size;
        let extra3_size = subscribe_result
            .extranonce2_size
            .checked_sub(extra2_size)
            .context("upstream extranonce2_size is smaller than the configured server share")?;

        let nonce_counter = NonceCounter::bind(
            subscribe_result.extranonce1,
            subscribe_result.extranonce2_size,
            extra2_size,
            extra3_size,
        )
        .map_err(|err| anyhow!("{err}"))?;
        *self.nonce_counter.write() = Some(Arc::new(nonce_counter));

        self.request_authorize(&mut reader).await?;
        *self.state.write() = PoolState::Authorized;

        Ok(reader.into_inner())
    }

    async fn request_subscribe(
        &self,
        reader: &mut rpc::MessageReader<tokio::net::tcp::OwnedReadHalf>,
    ) -> Result<SubscribeResult> {
        let params = serde_json::to_value(Subscribe {
            user_agent: Some(USER_AGENT.to_owned()),
            extranonce1: None,
        })?;

        let (id, rx) = self.pending.register();
        self.send(Message::request(id, "mining.subscribe", params)).await?;

        loop {
            let Some(message) = reader.next().await? else {
                bail!("upstream closed connection during subscribe");
            };
            match message {
                Message::Response { id: response_id, .. } if response_id == id => {
                    self.pending.resolve(response_id, message);
                    break;
                }
                other => self.handle_unsolicited(other),
            }
        }

        let response = rx.await.context("subscribe response channel closed")?;
        let Message::Response { result: Some(result), error: None, .. } = response else {
            bail!("mining.subscribe was rejected by upstream");
        };

        serde_json::from_value(result).context("invalid mining.subscribe result")
    }

    async fn request_authorize(
        &self,
        reader: &mut rpc::MessageReader<tokio::net::tcp::OwnedReadHalf>,
    ) -> Result<()> {
        let params = serde_json::to_value(Authorize {
            username: self.order.username.as_str().to_owned(),
            password: self.order.password.clone(),
        })?;

        let (id, rx) = self.pending.register();
        self.send(Message::request(id, "mining.authorize", params)).await?;

        loop {
            let Some(message) = reader.next().await? else {
                bail!("upstream closed connection during authorize");
            };
            match message {
                Message::Response { id: response_id, .. } if response_id == id => {
                    self.pending.resolve(response_id, message);
                    break;
                }
                other => self.handle_unsolicited(other),
            }
        }

        let response = rx.await.context("authorize response channel closed")?;
        match response {
            Message::Response { result: Some(Value::Bool(true)), .. } => Ok(()),
            Message::Response { error: Some(error), .. } => {
                bail!("mining.authorize rejected: {error}")
            }
            _ => bail!("mining.authorize rejected by upstream"),
        }
    }

    /// Drives the upstream read loop until disconnect, an idle timeout (no
    /// job seen for `idle_timeout`), or cancellation. These are distinct
    /// outcomes for the caller: a disconnect is retried, but an idle timeout
    /// shuts the pool down instead of reconnecting.
    async fn read_loop(self: &Arc<Self>, read_half: tokio::net::tcp::OwnedReadHalf) -> ReadLoopExit {
        let mut reader = rpc::MessageReader::new(read_half);

        loop {
            let deadline = tokio::time::Instant::from_std(*self.last_job_at.read() + self.idle_timeout);

            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    warn!(
                        "pool {} idle for {:?} with no job, shutting down",
                        self.order.id, self.idle_timeout
                    );
                    return ReadLoopExit::IdleTimeout;
                }
                result = reader.next() => {
                    match result {
                        Ok(Some(message)) => self.handle_message(message),
                        Ok(None) => {
                            warn!("pool {} upstream closed connection", self.order.id);
                            return ReadLoopExit::Disconnected;
                        }
                        Err(err) => {
                            error!("pool {} read error: {err:#}", self.order.id);
                            return ReadLoopExit::Disconnected;
                        }
                    }
                }
                _ = self.cancel.cancelled() => return ReadLoopExit::Disconnected,
            }
        }
    }

    fn handle_message(self: &Arc<Self>, message: Message) {
        match &message {
            Message::Response { id, .. } => self.pending.resolve(*id, message),
            Message::Notification { .. } | Message::Request { .. } => self.handle_unsolicited(message),
        }
    }

    fn handle_unsolicited(self: &Arc<Self>, message: Message) {
        let Message::Notification { method, params } = message else {
            return;
        };

        match method.as_str() {
            "mining.notify" => match rpc::parse_params::<Notify>(&params) {
                Ok(notify) => {
                    let clean_jobs = notify.clean_jobs;
                    let job = Arc::new(Job::from_notify(notify));
                    if clean_jobs {
                        self.jobs.clear();
                    }
                    self.jobs.insert(job.job_id, job.clone());
                    *self.current_job.write() = Some(job.job_id);
                    *self.last_job_at.write() = Instant::now();
                    self.events.send(PoolEvent::Job(job)).ok();
                }
                Err(err) => warn!("pool {} sent malformed mining.notify: {err}", self.order.id),
            },
            "mining.set_difficulty" => match rpc::parse_params::<SetDifficulty>(&params) {
                Ok(set_difficulty) => {
                    let difficulty = set_difficulty.difficulty();
                    *self.pool_difficulty.write() = difficulty;
                    self.events.send(PoolEvent::SetDifficulty(difficulty)).ok();
                }
                Err(err) => {
                    warn!("pool {} sent malformed mining.set_difficulty: {err}", self.order.id)
                }
            },
            _ => debug!("pool {} sent unhandled method {method}", self.order.id),
        }
    }

    /// Submits a reconstructed share upstream and returns whether the pool
    /// accepted it.
    pub async fn submit(&self, submit: Submit) -> Result<bool> {
        let params = serde_json::to_value(submit)?;
        let (id, rx) = self.pending.register();
        self.send(Message::request(id, "mining.submit", params)).await?;

        let response = rx.await.context("submit response channel closed")?;
        match response {
            Message::Response { result: Some(Value::Bool(accepted)), .. } => Ok(accepted),
            Message::Response { error: Some(error), .. } => bail!("share rejected: {error}"),
            _ => bail!("malformed mining.submit response"),
        }
    }

    async fn send(&self, message: Message) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().context("pool not connected")?;
        writer.write(message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> Arc<Pool> {
        let order = Order::parse(0, "pool.example.com:3333:user").unwrap();
        Pool::new(
            order,
            2,
            Duration::from_secs(600),
            Duration::from_secs(1),
            Duration::from_secs(60),
            CancellationToken::new(),
        )
    }

    fn notify_message(job_id: &str, clean_jobs: bool) -> Message {
        Message::notification(
            "mining.notify",
            serde_json::to_value(Notify {
                job_id: job_id.parse().unwrap(),
                prevhash: "4d16b6f85af6e2198f44ae2a6de67f78487ae5611b77c6c0440b921e00000000"
                    .parse()
                    .unwrap(),
                coinb1: "01000000".into(),
                coinb2: "072f736c7573682f0000000001".into(),
                merkle_branches: Vec::new(),
                version: "00000002".parse().unwrap(),
                nbits: "1c2ac4af".parse().unwrap(),
                ntime: "504e86b9".parse().unwrap(),
                clean_jobs,
            })
            .unwrap(),
        )
    }

    #[test]
    fn starts_in_init_state_with_no_job() {
        let pool = pool();
        assert_eq!(pool.state(), PoolState::Init);
        assert!(pool.current_job().is_none());
        assert!(!pool.is_active());
    }

    #[test]
    fn notify_installs_current_job_and_is_retrievable_by_id() {
        let pool = pool();
        pool.handle_message(notify_message("bf", true));

        let job = pool.current_job().expect("job installed");
        assert_eq!(job.job_id, "bf".parse().unwrap());
        assert_eq!(pool.job("bf".parse().unwrap()).unwrap().job_id, job.job_id);
    }

    #[test]
    fn clean_jobs_discards_prior_jobs() {
        let pool = pool();
        pool.handle_message(notify_message("aa", false));
        pool.handle_message(notify_message("bb", true));

        assert!(pool.job("aa".parse().unwrap()).is_none());
        assert!(pool.job("bb".parse().unwrap()).is_some());
    }

    #[test]
    fn set_difficulty_updates_pool_difficulty() {
        let pool = pool();
        assert_eq!(pool.pool_difficulty(), Difficulty::default());

        pool.handle_message(Message::notification(
            "mining.set_difficulty",
            serde_json::to_value(SetDifficulty::from(Difficulty::from(1024))).unwrap(),
        ));

        assert_eq!(pool.pool_difficulty(), Difficulty::from(1024));
    }
}
