use {
    super::*,
    pool::PoolEvent,
    tokio::net::tcp::OwnedReadHalf,
};

/// A downstream miner's live session: one TCP connection, bound to exactly
/// one pool. Tracks the subscribe/authorize handshake and owns the
/// worker-local vardiff controller.
pub struct Worker {
    id: u64,
    peer: SocketAddr,
    pool: Arc<Pool>,
    writer: tokio::sync::Mutex<rpc::MessageWriter<OwnedWriteHalf>>,
    username: RwLock<Option<Username>>,
    extranonce1: Extranonce,
    extranonce2_size: usize,
    authorized: AtomicBool,
    vardiff: Vardiff,
    accepted: AtomicU64,
    rejected: AtomicU64,
    sink: Arc<dyn ShareSink>,
    cancel: CancellationToken,
}

impl Worker {
    /// Drives one miner connection end to end: subscribe watchdog (asking the
    /// server for a pool to bind to via `first_available_pool`), then the
    /// authorize/submit loop until disconnect or cancellation. Never returns
    /// an error the caller needs to act on beyond logging -- a worker's
    /// failure is local to its connection.
    #[instrument(skip(stream, server, sink, vardiff_config))]
    pub async fn serve(
        id: u64,
        peer: SocketAddr,
        stream: TcpStream,
        server: Arc<Server>,
        sink: Arc<dyn ShareSink>,
        subscribe_timeout: Duration,
        initial_difficulty: Difficulty,
        vardiff_config: VardiffConfig,
        cancel: CancellationToken,
    ) {
        stream.set_nodelay(true).ok();
        let (read_half, write_half) = stream.into_split();
        let mut reader = rpc::MessageReader::new(read_half);
        let mut writer = rpc::MessageWriter::new(write_half);

        let Some((pool, request_id, extranonce1, extranonce2_size)) =
            Self::await_subscribe(&mut reader, &mut writer, &server, subscribe_timeout).await
        else {
            return;
        };

        let subscribe_result = SubscribeResult {
            subscriptions: vec![
                ("mining.set_difficulty".to_owned(), format!("{id:x}")),
                ("mining.notify".to_owned(), format!("{id:x}")),
            ],
            extranonce1: extranonce1.clone(),
            extranonce2_size,
        };
        if writer
            .write(Message::response(
                request_id,
                serde_json::to_value(&subscribe_result).unwrap(),
            ))
            .await
            .is_err()
        {
            return;
        }

        let worker = Arc::new(Self {
            id,
            peer,
            pool: pool.clone(),
            writer: tokio::sync::Mutex::new(writer),
            username: RwLock::new(None),
            extranonce1,
            extranonce2_size,
            authorized: AtomicBool::new(false),
            vardiff: Vardiff::new(initial_difficulty, vardiff_config),
            accepted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            sink,
            cancel,
        });

        info!(worker = id, %peer, "worker subscribed");

        tokio::time::sleep(Duration::from_millis(50)).await;
        if worker.push_difficulty(initial_difficulty).await.is_err() {
            return;
        }
        match pool.current_job() {
            Some(job) => {
                if worker.push_job(&job).await.is_err() {
                    return;
                }
            }
            None => {
                debug!(worker = id, "no job available at subscribe time, closing");
                return;
            }
        }

        worker.run(reader).await;
    }

    /// Waits for `mining.subscribe`, asking the server for a pool to bind to
    /// once it arrives. If no pool is active, responds with an `ErrorUnknown`
    /// and returns `None` (the caller drops the connection). Also returns
    /// `None` if the watchdog fires or the connection drops first.
    async fn await_subscribe(
        reader: &mut rpc::MessageReader<OwnedReadHalf>,
        writer: &mut rpc::MessageWriter<OwnedWriteHalf>,
        server: &Arc<Server>,
        timeout: Duration,
    ) -> Option<(Arc<Pool>, Id, Extranonce, usize)> {
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    warn!("subscribe watchdog expired, closing connection");
                    return None;
                }
                message = reader.next() => {
                    match message {
                        Ok(Some(Message::Request { id, method, .. })) if method == "mining.subscribe" => {
                            let Some(pool) = server.first_available_pool() else {
                                warn!("no pool available for subscribing worker, closing");
                                writer
                                    .write(Message::error(id, JsonRpcError {
                                        code: 20,
                                        message: "No pool available".to_owned(),
                                        data: None,
                                    }))
                                    .await
                                    .ok();
                                return None;
                            };
                            let extranonce1 = pool.next_extranonce()?;
                            let extranonce2_size = pool.worker_extranonce2_size()?;
                            return Some((pool, id, extranonce1, extranonce2_size));
                        }
                        Ok(Some(_)) => continue,
                        _ => return None,
                    }
                }
            }
        }
    }

    async fn run(self: Arc<Self>, mut reader: rpc::MessageReader<OwnedReadHalf>) {
        let mut events = self.pool.subscribe_events();

        loop {
            tokio::select! {
                message = reader.next() => {
                    match message {
                        Ok(Some(message)) => {
                            if let Err(err) = self.handle_message(message).await {
                                warn!(worker = self.id, "{err:#}");
                                return;
                            }
                        }
                        Ok(None) => {
                            info!(worker = self.id, "miner disconnected");
                            return;
                        }
                        Err(err) => {
                            warn!(worker = self.id, "read error: {err:#}");
                            return;
                        }
                    }
                }
                event = events.recv() => {
                    match event {
                        Ok(PoolEvent::Job(job)) => {
                            if self.push_job(&job).await.is_err() {
                                return;
                            }
                        }
                        Ok(PoolEvent::SetDifficulty(difficulty)) => {
                            if self.push_difficulty(difficulty).await.is_err() {
                                return;
                            }
                        }
                        Ok(PoolEvent::Disconnected) => {
                            info!(worker = self.id, "pool disconnected, closing worker");
                            return;
                        }
                        Err(broadcast::error::RecvError::Closed) => return,
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    }
                }
                _ = self.cancel.cancelled() => return,
            }
        }
    }

    async fn handle_message(&self, message: Message) -> Result<()> {
        let Message::Request { id, method, params } = message else {
            return Ok(());
        };

        match method.as_str() {
            "mining.authorize" => self.handle_authorize(id, &params).await,
            "mining.submit" => self.handle_submit(id, &params).await,
            _ => {
                self.respond_error(id, &StratumError::Malformed {
                    reason: format!("unsupported method {method}"),
                })
                .await
            }
        }
    }

    /// Validates the username's address component via
    /// [`Username::parse_address`]. A worker whose username doesn't carry a
    /// parseable address is rejected with `false` and the connection is
    /// closed after the response is flushed.
    async fn handle_authorize(&self, id: Id, params: &Value) -> Result<()> {
        let authorize = match rpc::parse_params::<Authorize>(params) {
            Ok(authorize) => authorize,
            Err(err) => return self.respond_error(id, &err).await,
        };

        let username = Username::new(authorize.username);
        if username.parse_address().is_err() {
            self.respond(id, json!(false)).await?;
            bail!("authorize rejected: invalid address in username '{username}'");
        }

        *self.username.write() = Some(username);
        self.authorized.store(true, Ordering::Relaxed);

        self.respond(id, json!(true)).await
    }

    async fn handle_submit(&self, id: Id, params: &Value) -> Result<()> {
        if !self.authorized.load(Ordering::Relaxed) {
            return self.reject_and_maybe_close(id, StratumError::UnauthorizedWorker).await;
        }

        let submit = match rpc::parse_params::<Submit>(params) {
            Ok(submit) => submit,
            Err(err) => return self.respond_error(id, &err).await,
        };

        let authorized_username = self.username.read().clone();
        if authorized_username.as_ref().map(Username::as_str) != Some(submit.username.as_str()) {
            return self.reject_and_maybe_close(id, StratumError::UnauthorizedWorker).await;
        }

        if submit.extranonce2.len() != self.extranonce2_size {
            return self
                .reject(id, StratumError::Malformed {
                    reason: format!(
                        "extranonce2 must be {} bytes, got {}",
                        self.extranonce2_size,
                        submit.extranonce2.len()
                    ),
                })
                .await;
        }

        let Some(job) = self.pool.job(submit.job_id) else {
            return self.reject(id, StratumError::JobNotFound).await;
        };

        if u32::from(submit.ntime) as u64 > now_unix() + 7200 {
            return self
                .reject(id, StratumError::Malformed {
                    reason: "ntime is more than 7200 seconds in the future".to_owned(),
                })
                .await;
        }

        let share_key = job::share_key(&self.extranonce1, &submit.extranonce2, submit.ntime, submit.nonce);
        if !job.record_share(&share_key) {
            return self.reject(id, StratumError::DuplicateShare).await;
        }

        let merkle_root = job
            .merkle_root(&self.extranonce1, &submit.extranonce2)
            .map_err(|err| anyhow!("{err}"))?;
        let header = job::header_bytes(
            job.version,
            job.prevhash,
            merkle_root,
            submit.ntime,
            job.nbits,
            submit.nonce,
        );
        let share_difficulty = job::share_difficulty(&header);
        let worker_difficulty = self.vardiff.current();

        let ctx = ShareContext {
            header,
            extranonce1: self.extranonce1.clone(),
            extranonce2: submit.extranonce2.clone(),
            ntime: submit.ntime,
            nonce: submit.nonce,
        };

        // Tolerate a narrow undershoot from float conversion: require
        // shareDifficulty / workerDifficulty >= 0.99 rather than a strict
        // >= 1.0, since both sides round-trip through f64.
        if share_difficulty.as_f64() / worker_difficulty.as_f64() < 0.99 {
            self.record_rejected(&job, worker_difficulty, share_difficulty, &ctx, "low difficulty share");
            return self.reject(id, StratumError::LowDifficultyShare).await;
        }

        let pool_difficulty = self.pool.pool_difficulty();
        let meets_pool_target = share_difficulty >= pool_difficulty;

        if meets_pool_target {
            // A missing nonce counter means the pool is mid-reconnect. Local
            // acceptance below doesn't depend on the upstream outcome, so log
            // and skip the resubmit rather than reject the miner's share.
            match self.pool.nonce1_suffix(&self.extranonce1) {
                Some(server_suffix) => {
                    let upstream_submit = Submit {
                        username: self.pool.order.username.as_str().to_owned(),
                        job_id: submit.job_id,
                        extranonce2: server_suffix.concat(&submit.extranonce2),
                        ntime: submit.ntime,
                        nonce: submit.nonce,
                    };

                    match self.pool.submit(upstream_submit).await {
                        Ok(true) => {}
                        Ok(false) => {
                            self.record_rejected(&job, pool_difficulty, share_difficulty, &ctx, "upstream rejected share");
                        }
                        Err(err) => {
                            warn!(worker = self.id, "upstream submit failed: {err:#}");
                        }
                    }
                }
                None => {
                    warn!(worker = self.id, "pool has no nonce counter bound, skipping upstream submit");
                }
            }
        }

        let network_difficulty = Difficulty::from(job.nbits);
        let is_block = share_difficulty >= network_difficulty;

        self.accepted.fetch_add(1, Ordering::Relaxed);
        let username = self.username.read().clone().unwrap_or_else(|| Username::new(""));
        let share = if is_block {
            Share::block(self.pool.order.id, &username, submit.job_id, pool_difficulty, share_difficulty, &ctx)
        } else {
            Share::accepted(self.pool.order.id, &username, submit.job_id, pool_difficulty, share_difficulty, &ctx)
        };
        self.archive(share);

        if let Some(new_difficulty) = self.vardiff.on_share(Instant::now()) {
            self.push_difficulty(new_difficulty).await.ok();
        }

        self.respond(id, json!(true)).await
    }

    fn record_rejected(
        &self,
        job: &Job,
        pool_difficulty: Difficulty,
        share_difficulty: Difficulty,
        ctx: &ShareContext,
        reason: &str,
    ) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        let username = self.username.read().clone().unwrap_or_else(|| Username::new(""));
        self.archive(Share::rejected(
            self.pool.order.id,
            &username,
            job.job_id,
            pool_difficulty,
            share_difficulty,
            ctx,
            reason,
        ));
    }

    fn archive(&self, share: Share) {
        let sink = self.sink.clone();
        tokio::spawn(async move {
            if let Err(err) = sink.record(share).await {
                warn!("failed to archive share: {err:#}");
            }
        });
    }

    async fn push_job(&self, job: &Job) -> Result<()> {
        self.write(Message::notification(
            "mining.notify",
            serde_json::to_value(job.to_notify())?,
        ))
        .await
    }

    async fn push_difficulty(&self, difficulty: Difficulty) -> Result<()> {
        self.write(Message::notification(
            "mining.set_difficulty",
            serde_json::to_value(SetDifficulty::from(difficulty))?,
        ))
        .await
    }

    async fn respond(&self, id: Id, result: Value) -> Result<()> {
        self.write(Message::response(id, result)).await
    }

    async fn respond_error(&self, id: Id, error: &StratumError) -> Result<()> {
        self.write(Message::error(id, error.into())).await
    }

    /// Rejects a share with the given protocol error, but does not close the
    /// connection -- only auth/subscribe failures do that.
    async fn reject(&self, id: Id, error: StratumError) -> Result<()> {
        self.respond_error(id, &error).await
    }

    async fn reject_and_maybe_close(&self, id: Id, error: StratumError) -> Result<()> {
        self.respond_error(id, &error).await?;
        if error.closes_connection() {
            bail!("{error}");
        }
        Ok(())
    }

    async fn write(&self, message: Message) -> Result<()> {
        self.writer.lock().await.write(message).await
    }

    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}
