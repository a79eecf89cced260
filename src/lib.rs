use {
    algorithm::Algorithm,
    anyhow::{Context, Error, anyhow, bail, ensure},
    arguments::Arguments,
    async_trait::async_trait,
    bans::{BanCheck, BanList, BanningOptions},
    bitcoin::{
        Amount, BlockHash, OutPoint, PubkeyHash, ScriptBuf, Sequence, Transaction, TxIn,
        TxMerkleNode, TxOut, Txid, VarInt, Witness, consensus,
        hashes::{Hash, sha256d},
        locktime::absolute::LockTime,
        script::write_scriptint,
    },
    block_template::{BlockTemplate, TemplateTransaction},
    byteorder::{BigEndian, ByteOrder, LittleEndian},
    bytes::{Buf, BufMut, Bytes, BytesMut},
    chain::Chain,
    clap::{Parser, ValueEnum},
    coinbase_builder::{CoinbaseBuilder, p2pkh_script},
    dashmap::DashMap,
    difficulty::{Difficulty, parse_target, target_hex},
    event::{Event, Events},
    futures::{sink::SinkExt, stream::StreamExt},
    hex::FromHex,
    hooks::{Authorization, AuthorizeRequest, Hooks, Share, Verdict},
    job::Job,
    jobs::Jobs,
    merkle::merkle_root,
    parking_lot::Mutex,
    primitive_types::{U256, U512},
    registry::{PortOptions, Registry, StratumOptions, TlsOptions},
    seed::SeedCache,
    serde::{
        Deserialize, Serialize,
        de::{self, Deserializer},
    },
    serde_json::{Value, json},
    settings::{PROTOCOL_VERSION, Recipient},
    sha3::{Digest, Keccak256},
    snafu::Snafu,
    std::{
        collections::{BTreeMap, HashMap, HashSet, VecDeque},
        env,
        fmt::{self, Display, Formatter},
        fs, io,
        net::{IpAddr, SocketAddr},
        path::PathBuf,
        process,
        str::FromStr,
        sync::{
            Arc, LazyLock,
            atomic::{AtomicU64, Ordering},
        },
        time::{Duration, Instant, SystemTime, UNIX_EPOCH},
    },
    stratum::{
        Authorize, Id, JsonRpcError, Message, Notify, ReplyError, Request, SetTarget,
        StratumError, Submit, SubscribeResult, Username,
    },
    tokio::{
        io::{AsyncRead, AsyncWrite},
        net::{TcpListener, TcpStream},
        runtime::Runtime,
        sync::mpsc,
        task::JoinSet,
        time::{MissedTickBehavior, interval, sleep},
    },
    tokio_util::{
        codec::{Decoder, Encoder, FramedRead, FramedWrite, LinesCodec, LinesCodecError},
        sync::CancellationToken,
    },
    tracing::{debug, error, info, warn},
    tracing_appender::non_blocking,
    tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt},
    upstream::Upstream,
    vardiff::{Vardiff, VardiffOptions, VardiffTracker},
    wire::FrameError,
    workbase::{Payout, Workbase},
};

pub mod algorithm;
mod arguments;
pub mod bans;
pub mod block_template;
pub mod chain;
pub mod coinbase_builder;
pub mod difficulty;
pub mod event;
pub mod hooks;
pub mod job;
mod jobs;
mod logs;
pub mod merkle;
pub mod options;
pub mod peer;
pub mod registry;
pub mod seed;
pub mod settings;
mod signal;
mod stratifier;
mod subcommand;
pub mod upstream;
pub mod vardiff;
pub mod wire;
pub mod workbase;

pub const USER_AGENT: &str = concat!("kawpool/", env!("CARGO_PKG_VERSION"));
/// Longest stratum line accepted before the socket counts as flooding.
pub const MAX_MESSAGE_SIZE: usize = 10_240;
pub const SUBSCRIPTION_PREFIX: &str = "deadbeefcafebabe";

type Result<T = (), E = Error> = std::result::Result<T, E>;

pub fn main() {
    let _guard = logs::init();

    let args = Arguments::parse();

    let runtime = match Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("error: failed to create tokio runtime: {err}");
            process::exit(1);
        }
    };

    runtime.block_on(async {
        let cancel_token = signal::setup_signal_handler();

        match args.run(cancel_token).await {
            Err(err) => {
                eprintln!("error: {err}");

                for (i, cause) in err.chain().skip(1).enumerate() {
                    if i == 0 {
                        eprintln!();
                        eprintln!("because:");
                    }
                    eprintln!("- {cause}");
                }

                if env::var_os("RUST_BACKTRACE")
                    .map(|val| val == "1")
                    .unwrap_or_default()
                {
                    eprintln!();
                    eprintln!("{}", err.backtrace());
                }
                process::exit(1);
            }
            Ok(_) => {
                process::exit(0);
            }
        }
    });
}
