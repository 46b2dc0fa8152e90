use super::*;

/// Process-wide registry of upstream pools and the accept loop that spawns
/// downstream worker sessions against them. Exclusively owns `pools`; workers
/// are tracked only for the duration of their connection task inside the
/// accept loop's `JoinSet` -- a worker's only durable registration is its
/// membership in the pool it's bound to.
pub struct Server {
    settings: Settings,
    pools: DashMap<u64, Arc<Pool>>,
    sink: Arc<dyn ShareSink>,
    next_worker_id: AtomicU64,
    cancel: CancellationToken,
    bound_addr: RwLock<Option<SocketAddr>>,
}

impl Server {
    pub fn new(settings: Settings, sink: Arc<dyn ShareSink>, cancel: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            settings,
            pools: DashMap::new(),
            sink,
            next_worker_id: AtomicU64::new(1),
            cancel,
            bound_addr: RwLock::new(None),
        })
    }

    /// The address the accept loop is actually listening on, once `run` has
    /// bound it. Differs from the configured `listen` address when the
    /// configured port is `0`; tests bind an ephemeral port and read this
    /// back to know where to connect.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.bound_addr.read()
    }

    /// The worker-rebinding policy seam: currently the only policy shipped is
    /// "first pool whose upstream handshake has completed". A load balancer
    /// or order-price comparator would replace this method's body, not its
    /// signature.
    pub fn first_available_pool(&self) -> Option<Arc<Pool>> {
        self.pools
            .iter()
            .find(|entry| entry.value().is_active())
            .map(|entry| entry.value().clone())
    }

    /// Initializes every configured order's pool concurrently, spawns the
    /// accept loop, and blocks until cancellation triggers ordered shutdown:
    /// stop accepting, let in-flight pool/worker tasks observe the shared
    /// cancellation token and exit, then return once they all have.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let mut tasks = JoinSet::new();

        for order in self.settings.orders.clone() {
            let pool = Pool::new(
                order,
                self.settings.extra2_size,
                self.settings.pool_idle_timeout,
                self.settings.reconnect_min,
                self.settings.reconnect_max,
                self.cancel.clone(),
            );
            let id = pool.order.id;
            self.pools.insert(id, pool.clone());
            let server = self.clone();
            tasks.spawn(async move {
                pool.run().await;
                // `Pool::run` only returns once the pool has permanently
                // stopped (cancelled, or gave up reconnecting/went idle), so
                // its registry entry is evicted here rather than polled for.
                server.pools.remove(&id);
            });
        }

        let listener = TcpListener::bind(self.settings.listen)
            .await
            .with_context(|| format!("failed to bind to {}", self.settings.listen))?;

        let local_addr = listener.local_addr().context("listener has no local address")?;
        *self.bound_addr.write() = Some(local_addr);

        info!("stratum proxy listening on {}", local_addr);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(err) => {
                            warn!("accept failed: {err:#}");
                            continue;
                        }
                    };

                    let id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
                    let server = self.clone();
                    let sink = self.sink.clone();
                    let subscribe_timeout = self.settings.subscribe_timeout;
                    let vardiff = self.settings.vardiff;
                    let cancel = self.cancel.child_token();

                    info!(worker = id, %peer, "accepted downstream connection");

                    tasks.spawn(async move {
                        Worker::serve(
                            id,
                            peer,
                            stream,
                            server,
                            sink,
                            subscribe_timeout,
                            vardiff.min,
                            vardiff,
                            cancel,
                        )
                        .await;
                    });
                }
                _ = self.cancel.cancelled() => {
                    info!("shutting down stratum proxy");
                    break;
                }
            }
        }

        self.sink.flush().await.ok();

        info!("waiting for {} in-flight tasks to finish", tasks.len());
        while tasks.join_next().await.is_some() {}
        info!("all tasks stopped");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(orders: Vec<&str>) -> Settings {
        Settings {
            listen: "127.0.0.1:0".parse().unwrap(),
            orders: orders
                .into_iter()
                .enumerate()
                .map(|(i, o)| Order::parse(i as u64, o).unwrap())
                .collect(),
            subscribe_timeout: Duration::from_secs(10),
            pool_idle_timeout: Duration::from_secs(600),
            reconnect_min: Duration::from_secs(1),
            reconnect_max: Duration::from_secs(60),
            extra2_size: 4,
            vardiff: VardiffConfig {
                min: Difficulty::from(1),
                max: Difficulty::from(1_000_000),
                target_seconds: 10.0,
                retarget_seconds: 100.0,
                variance_percent: 10.0,
            },
            share_log: None,
        }
    }

    #[test]
    fn first_available_pool_is_none_with_no_orders() {
        let server = Server::new(settings(Vec::new()), Arc::new(share_sink::NullSink), CancellationToken::new());
        assert!(server.first_available_pool().is_none());
    }

    #[test]
    fn first_available_pool_skips_inactive_pools() {
        let server = Server::new(
            settings(vec!["pool.example.com:3333:user"]),
            Arc::new(share_sink::NullSink),
            CancellationToken::new(),
        );
        let pool = Pool::new(
            Order::parse(0, "pool.example.com:3333:user").unwrap(),
            4,
            Duration::from_secs(600),
            Duration::from_secs(1),
            Duration::from_secs(60),
            CancellationToken::new(),
        );
        server.pools.insert(0, pool);

        // The pool hasn't completed its upstream handshake, so it isn't active.
        assert!(server.first_available_pool().is_none());
    }
}
