use super::*;

/// The share-specific fields a caller already has on hand by the time a
/// submit has cleared validation: the assembled header and the exact wire
/// values it was built from. Bundled together so `Share`'s constructors
/// don't balloon into a dozen positional arguments.
#[derive(Debug, Clone)]
pub struct ShareContext {
    pub header: [u8; 80],
    pub extranonce1: Extranonce,
    pub extranonce2: Extranonce,
    pub ntime: Ntime,
    pub nonce: Nonce,
}

/// The durable record of a single submitted share, independent of whether it
/// was accepted, rejected, or turned out to solve a block. This is what gets
/// handed to a [`ShareSink`](crate::share_sink::ShareSink) for archival.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Share {
    pub timestamp: u64,
    pub pool_id: u64,
    pub username: String,
    pub worker_name: String,
    pub job_id: String,
    pub header: String,
    pub extranonce1: String,
    pub extranonce2: String,
    pub ntime: String,
    pub nonce: String,
    pub pool_difficulty: f64,
    pub share_difficulty: f64,
    pub result: ShareResult,
    pub reject_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareResult {
    Accepted,
    Rejected,
    Block,
}

impl Share {
    pub fn accepted(
        pool_id: u64,
        username: &Username,
        job_id: JobId,
        pool_difficulty: Difficulty,
        share_difficulty: Difficulty,
        ctx: &ShareContext,
    ) -> Self {
        Self::new(
            pool_id,
            username,
            job_id,
            pool_difficulty,
            share_difficulty,
            ctx,
            ShareResult::Accepted,
            None,
        )
    }

    pub fn block(
        pool_id: u64,
        username: &Username,
        job_id: JobId,
        pool_difficulty: Difficulty,
        share_difficulty: Difficulty,
        ctx: &ShareContext,
    ) -> Self {
        Self::new(
            pool_id,
            username,
            job_id,
            pool_difficulty,
            share_difficulty,
            ctx,
            ShareResult::Block,
            None,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn rejected(
        pool_id: u64,
        username: &Username,
        job_id: JobId,
        pool_difficulty: Difficulty,
        share_difficulty: Difficulty,
        ctx: &ShareContext,
        reason: impl Into<String>,
    ) -> Self {
        Self::new(
            pool_id,
            username,
            job_id,
            pool_difficulty,
            share_difficulty,
            ctx,
            ShareResult::Rejected,
            Some(reason.into()),
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn new(
        pool_id: u64,
        username: &Username,
        job_id: JobId,
        pool_difficulty: Difficulty,
        share_difficulty: Difficulty,
        ctx: &ShareContext,
        result: ShareResult,
        reject_reason: Option<String>,
    ) -> Self {
        Self {
            timestamp: now_unix(),
            pool_id,
            username: username.as_str().split('.').next().unwrap_or_default().to_owned(),
            worker_name: username.workername().to_owned(),
            job_id: job_id.to_string(),
            header: hex::encode(ctx.header),
            extranonce1: ctx.extranonce1.to_string(),
            extranonce2: ctx.extranonce2.to_string(),
            ntime: ctx.ntime.to_string(),
            nonce: ctx.nonce.to_string(),
            pool_difficulty: pool_difficulty.as_f64(),
            share_difficulty: share_difficulty.as_f64(),
            result,
            reject_reason,
        }
    }
}
