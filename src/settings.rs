use {super::*, options::Options, peer::PeerOptions, upstream::UpstreamOptions};

pub const PROTOCOL_VERSION: u32 = 70028;

/// A fee output added to every coinbase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Recipient {
    pub address: String,
    pub percent: f64,
}

/// TOML config file structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub chain: Option<Chain>,
    pub pool_address: Option<String>,
    pub host: Option<IpAddr>,
    pub connection_timeout: Option<u64>,
    pub job_rebroadcast_timeout: Option<u64>,
    /// Milliseconds between template polls.
    pub block_refresh_interval: Option<u64>,
    pub tcp_proxy_protocol: Option<bool>,
    pub override_target: Option<String>,
    pub recipients: Option<Vec<Recipient>>,
    pub daemon: Option<DaemonSection>,
    pub p2p: Option<P2pSection>,
    pub banning: Option<BanningOptions>,
    pub tls: Option<TlsOptions>,
    pub ports: Option<Vec<PortOptions>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct P2pSection {
    pub enabled: Option<bool>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub magic: Option<String>,
    pub protocol_version: Option<u32>,
    pub disable_transactions: Option<bool>,
}

/// Unified settings struct with all resolved configuration
#[derive(Debug, Clone, Default, Serialize)]
pub struct Settings {
    pub chain: Option<Chain>,
    pub config: Option<PathBuf>,
    pub config_dir: Option<PathBuf>,
    pub pool_address: Option<String>,

    // Stratum
    pub host: Option<IpAddr>,
    pub connection_timeout: Option<u64>,
    pub job_rebroadcast_timeout: Option<u64>,
    pub block_refresh_interval: Option<u64>,
    pub tcp_proxy_protocol: bool,
    pub override_target: Option<String>,
    pub recipients: Option<Vec<Recipient>>,
    pub banning: Option<BanningOptions>,
    pub tls: Option<TlsOptions>,
    pub ports: Option<Vec<PortOptions>>,

    // Daemon
    pub rpc_host: Option<String>,
    pub rpc_port: Option<u16>,
    pub rpc_username: Option<String>,
    #[serde(skip_serializing)]
    pub rpc_password: Option<String>,
    pub rpc_timeout: Option<u64>,

    // P2P
    pub p2p_enabled: Option<bool>,
    pub p2p_host: Option<String>,
    pub p2p_port: Option<u16>,
    pub p2p_magic: Option<String>,
    pub p2p_protocol_version: Option<u32>,
    pub p2p_disable_transactions: bool,
}

impl Settings {
    /// Load settings from all sources with proper priority
    pub fn load(options: Options) -> Result<Self> {
        let mut env = BTreeMap::<String, String>::new();

        for (var, value) in env::vars_os() {
            let Some(var) = var.to_str() else {
                continue;
            };

            let Some(key) = var.strip_prefix("KAWPOOL_") else {
                continue;
            };

            env.insert(
                key.into(),
                value.into_string().map_err(|value| {
                    anyhow!(
                        "environment variable `{var}` not valid unicode: `{}`",
                        value.to_string_lossy()
                    )
                })?,
            );
        }

        Self::merge(options, env)
    }

    /// Merge all configuration sources
    pub fn merge(options: Options, env: BTreeMap<String, String>) -> Result<Self> {
        let settings = Self::from_options(&options).or(Self::from_env(&env)?);

        let config = match Self::find_config_path(&settings) {
            Some(config_path) => toml::from_str(&fs::read_to_string(&config_path).with_context(
                || format!("failed to open config file `{}`", config_path.display()),
            )?)
            .with_context(|| {
                format!(
                    "failed to deserialize config file `{}`",
                    config_path.display()
                )
            })?,
            None => Config::default(),
        };

        let settings = settings.or(Self::from_config(&config)).or_defaults();

        settings.validate()?;

        Ok(settings)
    }

    fn find_config_path(settings: &Self) -> Option<PathBuf> {
        if let Some(path) = &settings.config {
            return Some(path.clone());
        }

        if let Some(dir) = &settings.config_dir {
            let path = dir.join("kawpool.toml");
            if path.exists() {
                return Some(path);
            }
        }

        dirs::config_dir()
            .map(|dir| dir.join("kawpool").join("kawpool.toml"))
            .filter(|path| path.exists())
    }

    pub fn from_options(options: &Options) -> Self {
        Self {
            chain: options
                .regtest
                .then_some(Chain::Regtest)
                .or(options.testnet.then_some(Chain::Testnet))
                .or(options.chain),
            config: options.config.clone(),
            config_dir: options.config_dir.clone(),
            pool_address: options.pool_address.clone(),
            rpc_host: options.rpc_host.clone(),
            rpc_port: options.rpc_port,
            rpc_username: options.rpc_username.clone(),
            rpc_password: options.rpc_password.clone(),
            p2p_host: options.p2p_host.clone(),
            p2p_port: options.p2p_port,
            ..Default::default()
        }
    }

    pub fn from_env(env: &BTreeMap<String, String>) -> Result<Self> {
        let get_bool = |key: &str| {
            env.get(key)
                .map(|value| !value.is_empty() && value != "0" && value.to_lowercase() != "false")
                .unwrap_or_default()
        };

        let get_string = |key: &str| env.get(key).cloned();

        let get_path = |key: &str| env.get(key).map(PathBuf::from);

        let get_chain = |key: &str| -> Result<Option<Chain>> {
            env.get(key)
                .map(|chain| chain.parse::<Chain>())
                .transpose()
                .with_context(|| {
                    format!("failed to parse environment variable KAWPOOL_{key} as chain")
                })
        };

        let get_ip = |key: &str| -> Result<Option<IpAddr>> {
            env.get(key)
                .map(|ip| ip.parse::<IpAddr>())
                .transpose()
                .with_context(|| {
                    format!("failed to parse environment variable KAWPOOL_{key} as IP address")
                })
        };

        let get_u16 = |key: &str| -> Result<Option<u16>> {
            env.get(key)
                .map(|int| int.parse::<u16>())
                .transpose()
                .with_context(|| {
                    format!("failed to parse environment variable KAWPOOL_{key} as u16")
                })
        };

        let get_u64 = |key: &str| -> Result<Option<u64>> {
            env.get(key)
                .map(|int| int.parse::<u64>())
                .transpose()
                .with_context(|| {
                    format!("failed to parse environment variable KAWPOOL_{key} as u64")
                })
        };

        Ok(Self {
            chain: get_chain("CHAIN")?,
            config: get_path("CONFIG"),
            config_dir: get_path("CONFIG_DIR"),
            pool_address: get_string("POOL_ADDRESS"),

            host: get_ip("HOST")?,
            connection_timeout: get_u64("CONNECTION_TIMEOUT")?,
            job_rebroadcast_timeout: get_u64("JOB_REBROADCAST_TIMEOUT")?,
            block_refresh_interval: get_u64("BLOCK_REFRESH_INTERVAL")?,
            tcp_proxy_protocol: get_bool("TCP_PROXY_PROTOCOL"),
            override_target: get_string("OVERRIDE_TARGET"),
            recipients: None,
            banning: None,
            tls: None,
            ports: None,

            rpc_host: get_string("RPC_HOST"),
            rpc_port: get_u16("RPC_PORT")?,
            rpc_username: get_string("RPC_USERNAME"),
            rpc_password: get_string("RPC_PASSWORD"),
            rpc_timeout: get_u64("RPC_TIMEOUT")?,

            p2p_enabled: env
                .contains_key("P2P_ENABLED")
                .then(|| get_bool("P2P_ENABLED")),
            p2p_host: get_string("P2P_HOST"),
            p2p_port: get_u16("P2P_PORT")?,
            p2p_magic: get_string("P2P_MAGIC"),
            p2p_protocol_version: env
                .get("P2P_PROTOCOL_VERSION")
                .map(|int| int.parse::<u32>())
                .transpose()
                .context("failed to parse environment variable KAWPOOL_P2P_PROTOCOL_VERSION as u32")?,
            p2p_disable_transactions: get_bool("P2P_DISABLE_TRANSACTIONS"),
        })
    }

    pub fn from_config(config: &Config) -> Self {
        let daemon = config.daemon.as_ref();
        let p2p = config.p2p.as_ref();

        Self {
            chain: config.chain,
            config: None,
            config_dir: None,
            pool_address: config.pool_address.clone(),

            host: config.host,
            connection_timeout: config.connection_timeout,
            job_rebroadcast_timeout: config.job_rebroadcast_timeout,
            block_refresh_interval: config.block_refresh_interval,
            tcp_proxy_protocol: config.tcp_proxy_protocol.unwrap_or(false),
            override_target: config.override_target.clone(),
            recipients: config.recipients.clone(),
            banning: config.banning,
            tls: config.tls.clone(),
            ports: config.ports.clone(),

            rpc_host: daemon.and_then(|d| d.host.clone()),
            rpc_port: daemon.and_then(|d| d.port),
            rpc_username: daemon.and_then(|d| d.username.clone()),
            rpc_password: daemon.and_then(|d| d.password.clone()),
            rpc_timeout: daemon.and_then(|d| d.timeout),

            p2p_enabled: p2p.and_then(|p| p.enabled),
            p2p_host: p2p.and_then(|p| p.host.clone()),
            p2p_port: p2p.and_then(|p| p.port),
            p2p_magic: p2p.and_then(|p| p.magic.clone()),
            p2p_protocol_version: p2p.and_then(|p| p.protocol_version),
            p2p_disable_transactions: p2p.and_then(|p| p.disable_transactions).unwrap_or(false),
        }
    }

    /// Merge self with another Settings, self takes priority
    pub fn or(self, other: Self) -> Self {
        Self {
            chain: self.chain.or(other.chain),
            config: self.config.or(other.config),
            config_dir: self.config_dir.or(other.config_dir),
            pool_address: self.pool_address.or(other.pool_address),

            host: self.host.or(other.host),
            connection_timeout: self.connection_timeout.or(other.connection_timeout),
            job_rebroadcast_timeout: self.job_rebroadcast_timeout.or(other.job_rebroadcast_timeout),
            block_refresh_interval: self.block_refresh_interval.or(other.block_refresh_interval),
            tcp_proxy_protocol: self.tcp_proxy_protocol || other.tcp_proxy_protocol,
            override_target: self.override_target.or(other.override_target),
            recipients: self.recipients.or(other.recipients),
            banning: self.banning.or(other.banning),
            tls: self.tls.or(other.tls),
            ports: self.ports.or(other.ports),

            rpc_host: self.rpc_host.or(other.rpc_host),
            rpc_port: self.rpc_port.or(other.rpc_port),
            rpc_username: self.rpc_username.or(other.rpc_username),
            rpc_password: self.rpc_password.or(other.rpc_password),
            rpc_timeout: self.rpc_timeout.or(other.rpc_timeout),

            p2p_enabled: self.p2p_enabled.or(other.p2p_enabled),
            p2p_host: self.p2p_host.or(other.p2p_host),
            p2p_port: self.p2p_port.or(other.p2p_port),
            p2p_magic: self.p2p_magic.or(other.p2p_magic),
            p2p_protocol_version: self.p2p_protocol_version.or(other.p2p_protocol_version),
            p2p_disable_transactions: self.p2p_disable_transactions
                || other.p2p_disable_transactions,
        }
    }

    fn or_defaults(self) -> Self {
        let chain = self.chain.unwrap_or_default();
        let rpc_host = self.rpc_host.unwrap_or_else(|| "127.0.0.1".into());

        Self {
            chain: Some(chain),
            config: None,
            config_dir: None,
            pool_address: self.pool_address,

            host: Some(self.host.unwrap_or(IpAddr::from([0, 0, 0, 0]))),
            connection_timeout: Some(self.connection_timeout.unwrap_or(600)),
            job_rebroadcast_timeout: Some(self.job_rebroadcast_timeout.unwrap_or(55)),
            block_refresh_interval: Some(self.block_refresh_interval.unwrap_or(1000)),
            tcp_proxy_protocol: self.tcp_proxy_protocol,
            override_target: self.override_target,
            recipients: Some(self.recipients.unwrap_or_default()),
            banning: self.banning,
            tls: self.tls,
            ports: Some(self.ports.unwrap_or_else(|| {
                vec![PortOptions {
                    port: 3333,
                    diff: Difficulty::new(1.0),
                    tls: false,
                    vardiff: Some(VardiffOptions::default()),
                }]
            })),

            p2p_enabled: Some(self.p2p_enabled.unwrap_or(true)),
            p2p_host: Some(self.p2p_host.unwrap_or_else(|| rpc_host.clone())),
            p2p_port: Some(self.p2p_port.unwrap_or_else(|| chain.default_p2p_port())),
            p2p_magic: self.p2p_magic,
            p2p_protocol_version: Some(self.p2p_protocol_version.unwrap_or(PROTOCOL_VERSION)),
            p2p_disable_transactions: self.p2p_disable_transactions,

            rpc_host: Some(rpc_host),
            rpc_port: Some(self.rpc_port.unwrap_or_else(|| chain.default_rpc_port())),
            rpc_username: self.rpc_username,
            rpc_password: self.rpc_password,
            rpc_timeout: Some(self.rpc_timeout.unwrap_or(30)),
        }
    }

    fn validate(&self) -> Result {
        match (&self.rpc_username, &self.rpc_password) {
            (None, Some(_)) => bail!("daemon RPC password specified without username"),
            (Some(_), None) => bail!("daemon RPC username specified without password"),
            _ => {}
        }

        let percent = self.recipients().iter().map(|r| r.percent).sum::<f64>();
        ensure!(
            percent <= 100.0,
            "recipient percentages add up to {percent}, more than 100"
        );

        if let Some(recipient) = self.recipients().iter().find(|r| r.percent < 0.0) {
            bail!("recipient `{}` has a negative percentage", recipient.address);
        }

        let ports = self.ports.as_deref().unwrap_or_default();

        ensure!(!ports.is_empty(), "no stratum ports configured");

        let mut seen = HashSet::new();
        for port in ports {
            ensure!(seen.insert(port.port), "port {} configured twice", port.port);

            if let Some(vardiff) = &port.vardiff {
                ensure!(
                    vardiff.min_diff <= vardiff.max_diff,
                    "port {} vardiff min_diff {} exceeds max_diff {}",
                    port.port,
                    vardiff.min_diff,
                    vardiff.max_diff
                );
                ensure!(
                    vardiff.target_time > 0.0,
                    "port {} vardiff target_time must be positive",
                    port.port
                );
            }

            ensure!(
                !port.tls || self.tls.is_some(),
                "port {} uses TLS but no [tls] certificate is configured",
                port.port
            );
        }

        self.magic()?;
        self.override_target()?;

        Ok(())
    }

    pub fn chain(&self) -> Chain {
        self.chain.unwrap_or_default()
    }

    pub fn pool_address(&self) -> Result<&str> {
        self.pool_address
            .as_deref()
            .context("no pool address configured: set `pool_address` or pass `--pool-address`")
    }

    pub fn recipients(&self) -> &[Recipient] {
        self.recipients.as_deref().unwrap_or_default()
    }

    pub fn block_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.block_refresh_interval.unwrap_or(1000).max(1))
    }

    /// The network magic, taken from the chain unless overridden as 8 hex characters.
    pub fn magic(&self) -> Result<[u8; 4]> {
        match &self.p2p_magic {
            Some(magic) => <[u8; 4]>::from_hex(magic)
                .with_context(|| format!("invalid p2p magic `{magic}`: expected 8 hex characters")),
            None => Ok(self.chain().magic()),
        }
    }

    pub fn override_target(&self) -> Result<Option<U256>> {
        self.override_target
            .as_deref()
            .map(parse_target)
            .transpose()
            .context("invalid override target")
    }

    pub fn rpc_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.rpc_host.as_deref().unwrap_or("127.0.0.1"),
            self.rpc_port
                .unwrap_or_else(|| self.chain().default_rpc_port())
        )
    }

    pub fn upstream_options(&self) -> UpstreamOptions {
        UpstreamOptions {
            url: self.rpc_url(),
            username: self.rpc_username.clone().unwrap_or_default(),
            password: self.rpc_password.clone().unwrap_or_default(),
            timeout: Duration::from_secs(self.rpc_timeout.unwrap_or(30)),
        }
    }

    /// `None` when the peer client is disabled.
    pub fn peer_options(&self) -> Result<Option<PeerOptions>> {
        if !self.p2p_enabled.unwrap_or(true) {
            return Ok(None);
        }

        let chain = self.chain();

        Ok(Some(PeerOptions {
            host: self
                .p2p_host
                .clone()
                .or(self.rpc_host.clone())
                .unwrap_or_else(|| "127.0.0.1".into()),
            port: self.p2p_port.unwrap_or_else(|| chain.default_p2p_port()),
            magic: self.magic()?,
            protocol_version: self.p2p_protocol_version.unwrap_or(PROTOCOL_VERSION),
            disable_transactions: self.p2p_disable_transactions,
            reconnect_delay: Duration::from_secs(5),
        }))
    }

    pub fn stratum_options(&self) -> StratumOptions {
        let defaults = StratumOptions::default();

        StratumOptions {
            host: self.host.unwrap_or(defaults.host),
            ports: self.ports.clone().unwrap_or_default(),
            banning: self.banning,
            connection_timeout: self
                .connection_timeout
                .map(Duration::from_secs)
                .unwrap_or(defaults.connection_timeout),
            job_rebroadcast_timeout: self
                .job_rebroadcast_timeout
                .map(Duration::from_secs)
                .unwrap_or(defaults.job_rebroadcast_timeout),
            tcp_proxy_protocol: self.tcp_proxy_protocol,
            tls: self.tls.clone(),
            algorithm: Algorithm::KAWPOW,
        }
    }
}
