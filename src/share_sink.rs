use super::*;

/// Durable archival for submitted shares, decoupled from the hot path that
/// decides accept/reject. A sink's job is just to persist the record; it
/// must never be consulted to decide validity.
#[async_trait]
pub trait ShareSink: Send + Sync {
    async fn record(&self, share: Share) -> Result<()>;
    async fn flush(&self) -> Result<()>;
}

/// Discards every share. The default when no archival path is configured.
#[derive(Debug, Default)]
pub struct NullSink;

#[async_trait]
impl ShareSink for NullSink {
    async fn record(&self, _share: Share) -> Result<()> {
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Appends one JSON-lines record per share to a file, opened once and kept
/// open for the lifetime of the proxy.
pub struct FileSink {
    writer: tokio::sync::Mutex<BufWriter<tokio::fs::File>>,
}

impl FileSink {
    pub async fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())
            .await
            .with_context(|| format!("failed to open share log at `{}`", path.as_ref().display()))?;

        Ok(Self {
            writer: tokio::sync::Mutex::new(BufWriter::new(file)),
        })
    }
}

#[async_trait]
impl ShareSink for FileSink {
    async fn record(&self, share: Share) -> Result<()> {
        let line = serde_json::to_string(&share).context("failed to serialize share")?;
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.writer.lock().await.flush().await?;
        Ok(())
    }
}
