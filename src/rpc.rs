use {super::*, tokio_util::bytes::BytesMut};

/// Frames a byte stream into newline-delimited Stratum messages. Each line is
/// a complete JSON value; lines over [`stratum::MAX_MESSAGE_SIZE`] are
/// rejected rather than buffered indefinitely, since a miner or pool that
/// never sends a newline would otherwise grow the read buffer without bound.
#[derive(Debug, Default)]
pub struct LineCodec;

impl Decoder for LineCodec {
    type Item = Message;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        let Some(newline) = src.iter().position(|&b| b == b'\n') else {
            if src.len() > stratum::MAX_MESSAGE_SIZE {
                bail!(
                    "line exceeds maximum message size of {} bytes",
                    stratum::MAX_MESSAGE_SIZE
                );
            }
            return Ok(None);
        };

        let line = src.split_to(newline + 1);
        let line = &line[..line.len() - 1];

        if line.is_empty() {
            return Ok(None);
        }

        let message = serde_json::from_slice::<Message>(line)
            .with_context(|| format!("invalid JSON-RPC line: {}", String::from_utf8_lossy(line)))?;

        Ok(Some(message))
    }
}

impl Encoder<Message> for LineCodec {
    type Error = Error;

    fn encode(&mut self, message: Message, dst: &mut BytesMut) -> Result<()> {
        let line = serde_json::to_string(&message).context("failed to serialize message")?;
        dst.reserve(line.len() + 1);
        dst.extend_from_slice(line.as_bytes());
        dst.extend_from_slice(b"\n");
        Ok(())
    }
}

/// Reads one [`Message`] at a time off an async byte stream, buffering
/// partial lines across calls. Used instead of `tokio_util::codec::Framed`
/// so a connection's read and write halves can be driven from different
/// tasks without a `Stream`/`Sink` adapter in between.
pub struct MessageReader<R> {
    inner: R,
    codec: LineCodec,
    buf: BytesMut,
}

impl<R: tokio::io::AsyncRead + Unpin> MessageReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            codec: LineCodec,
            buf: BytesMut::with_capacity(4096),
        }
    }

    /// Returns the next complete message, or `Ok(None)` on clean EOF.
    pub async fn next(&mut self) -> Result<Option<Message>> {
        use tokio::io::AsyncReadExt;

        loop {
            if let Some(message) = self.codec.decode(&mut self.buf)? {
                return Ok(Some(message));
            }

            let read = self.inner.read_buf(&mut self.buf).await?;
            if read == 0 {
                return Ok(None);
            }
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

/// Writes [`Message`]s one at a time to an async byte stream.
pub struct MessageWriter<W> {
    inner: W,
    codec: LineCodec,
}

impl<W: tokio::io::AsyncWrite + Unpin> MessageWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, codec: LineCodec }
    }

    pub async fn write(&mut self, message: Message) -> Result<()> {
        use tokio::io::AsyncWriteExt as _;

        let mut buf = BytesMut::new();
        self.codec.encode(message, &mut buf)?;
        self.inner.write_all(&buf).await?;
        Ok(())
    }
}

/// A typed request/response correlation layer over the raw message stream.
/// Each session keeps one of these to hand out unique ids for outbound
/// requests and to match inbound responses back to their waiter.
#[derive(Debug, Default)]
pub struct PendingRequests {
    next_id: AtomicU64,
    waiters: DashMap<u64, oneshot::Sender<Message>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves an id for an outbound request and returns both the id to put
    /// on the wire and a receiver that will resolve when the matching
    /// response arrives.
    pub fn register(&self) -> (Id, oneshot::Receiver<Message>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = oneshot::channel();
        self.waiters.insert(id, tx);
        (Id::new(id), rx)
    }

    /// Delivers an inbound response to its waiter, if one is still
    /// registered (it may have been dropped by a timeout).
    pub fn resolve(&self, id: Id, message: Message) {
        if let Some((_, tx)) = self.waiters.remove(&u64::from(id)) {
            let _ = tx.send(message);
        }
    }

    pub fn cancel_all(&self) {
        self.waiters.clear();
    }
}

/// Parses a notification or request's `params` into a concrete Stratum
/// payload type, surfacing malformed params as a [`StratumError::Malformed`].
pub fn parse_params<T: for<'de> Deserialize<'de>>(params: &Value) -> std::result::Result<T, StratumError> {
    serde_json::from_value(params.clone()).map_err(|source| StratumError::Malformed {
        reason: source.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_one_line_at_a_time() {
        let mut codec = LineCodec;
        let mut buf = BytesMut::from(
            &b"{\"id\":1,\"method\":\"mining.subscribe\",\"params\":[]}\n{\"id\":2,\"method\":\"x\",\"params\":[]}\n"[..],
        );

        let first = codec.decode(&mut buf).unwrap().unwrap();
        assert!(matches!(first, Message::Request { id, .. } if id == Id::new(1)));

        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert!(matches!(second, Message::Request { id, .. } if id == Id::new(2)));

        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn decode_returns_none_without_newline() {
        let mut codec = LineCodec;
        let mut buf = BytesMut::from(&b"{\"id\":1"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn decode_rejects_oversized_line() {
        let mut codec = LineCodec;
        let mut buf = BytesMut::from(vec![b'a'; stratum::MAX_MESSAGE_SIZE + 1].as_slice());
        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn encode_appends_newline() {
        let mut codec = LineCodec;
        let mut buf = BytesMut::new();
        codec
            .encode(Message::notification("mining.notify", json!([])), &mut buf)
            .unwrap();
        assert!(buf.ends_with(b"\n"));
    }

    #[test]
    fn pending_requests_resolves_matching_waiter() {
        let pending = PendingRequests::new();
        let (id, rx) = pending.register();
        pending.resolve(id, Message::response(id, json!(true)));
        let response = rx.try_recv().unwrap();
        assert!(matches!(response, Message::Response { result: Some(v), .. } if v == json!(true)));
    }

    #[test]
    fn pending_requests_ignores_unknown_id() {
        let pending = PendingRequests::new();
        pending.resolve(Id::new(999), Message::response(Id::new(999), json!(true)));
    }

    #[test]
    fn parse_params_reports_malformed() {
        let err = parse_params::<Submit>(&json!("not an array")).unwrap_err();
        assert!(matches!(err, StratumError::Malformed { .. }));
    }
}
