use {
    anyhow::{Context, Error, anyhow, bail},
    arguments::Arguments,
    async_trait::async_trait,
    bitcoin::{
        BlockHash,
        hashes::{Hash, sha256d},
    },
    clap::Parser,
    dashmap::DashMap,
    derive_more::Display,
    job::Job,
    nonce_counter::NonceCounter,
    order::Order,
    parking_lot::{Mutex, RwLock},
    serde::{Deserialize, Serialize},
    serde_json::{Value, json},
    settings::Settings,
    share::{Share, ShareContext, ShareResult},
    share_sink::ShareSink,
    std::{
        collections::{HashSet, VecDeque},
        fmt,
        net::SocketAddr,
        path::PathBuf,
        sync::{
            Arc,
            atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
        },
        time::{Duration, Instant, SystemTime, UNIX_EPOCH},
    },
    stratum::{
        Authorize, Difficulty, Extranonce, Id, JobId, JsonRpcError, Message, Nbits, Nonce,
        Notify, Ntime, PrevHash, SetDifficulty, StratumError, Submit, Subscribe, SubscribeResult,
        Username, Version, merkle_root,
    },
    tokio::{
        io::{AsyncWriteExt, BufWriter},
        net::{TcpListener, TcpStream, tcp::OwnedWriteHalf},
        sync::{broadcast, oneshot},
        task::JoinSet,
    },
    tokio_util::{
        codec::{Decoder, Encoder},
        sync::CancellationToken,
    },
    tracing::{debug, error, info, instrument, warn},
    vardiff::{Vardiff, VardiffConfig},
};

pub mod arguments;
pub mod job;
pub mod nonce_counter;
pub mod order;
pub mod pool;
pub mod rpc;
pub mod server;
pub mod settings;
pub mod share;
pub mod share_sink;
mod signal;
pub mod vardiff;
pub mod worker;

pub use {
    pool::Pool,
    server::Server,
    worker::Worker,
};

/// Process-wide user agent reported on `mining.subscribe` calls we make upstream.
pub const USER_AGENT: &str = "stratum-proxy/0.1.0";

type Result<T = (), E = Error> = std::result::Result<T, E>;

/// Entry point invoked by `src/bin/main.rs`. Returns the process exit code:
/// `0` on ordered shutdown, `255` on an unrecoverable error, matching the
/// reference implementations this protocol is modeled on.
pub fn main() -> i32 {
    let args = Arguments::parse();

    // Non-blocking stderr writer: logging never stalls the async runtime on
    // a slow terminal. The guard must stay alive for the process lifetime --
    // dropping it early would silently stop flushing.
    let (writer, _guard) = tracing_appender::non_blocking(std::io::stderr());
    let filter = tracing_subscriber::EnvFilter::from_default_env();
    if args.log_json {
        tracing_subscriber::fmt().json().with_writer(writer).with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_writer(writer).with_env_filter(filter).init();
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("error: failed to start async runtime: {err}");
            return 255;
        }
    };

    match runtime.block_on(args.run()) {
        Ok(()) => 0,
        Err(err) => {
            error!("error: {err:#}");
            255
        }
    }
}

pub(crate) fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
