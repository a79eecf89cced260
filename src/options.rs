use super::*;

#[derive(Clone, Default, Debug, Parser)]
#[command(group(
    clap::ArgGroup::new("chains")
        .required(false)
        .args(&["chain", "regtest", "testnet"]),
))]
pub struct Options {
    #[arg(long, help = "Load configuration from <CONFIG>.")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Load configuration from <CONFIG_DIR>/kawpool.toml.")]
    pub config_dir: Option<PathBuf>,

    #[arg(long = "chain", value_enum, help = "Use <CHAIN>. [default: mainnet]")]
    pub chain: Option<Chain>,

    #[arg(
        long,
        short = 'r',
        help = "Use regtest. Equivalent to `--chain regtest`."
    )]
    pub regtest: bool,

    #[arg(
        long,
        short = 't',
        help = "Use testnet. Equivalent to `--chain testnet`."
    )]
    pub testnet: bool,

    #[arg(long, help = "Pay block rewards to <POOL_ADDRESS>.")]
    pub pool_address: Option<String>,

    #[arg(long, help = "Connect to daemon RPC on <RPC_HOST>.")]
    pub rpc_host: Option<String>,

    #[arg(long, help = "Connect to daemon RPC at <RPC_PORT>.")]
    pub rpc_port: Option<u16>,

    #[arg(long, help = "Authenticate to daemon RPC as <RPC_USERNAME>.")]
    pub rpc_username: Option<String>,

    #[arg(long, help = "Authenticate to daemon RPC with <RPC_PASSWORD>.")]
    pub rpc_password: Option<String>,

    #[arg(long, help = "Connect to the daemon's P2P port on <P2P_HOST>.")]
    pub p2p_host: Option<String>,

    #[arg(long, help = "Connect to the daemon's P2P port at <P2P_PORT>.")]
    pub p2p_port: Option<u16>,
}
