use {
    super::*,
    rustls::pki_types::{CertificateDer, PrivateKeyDer, pem::PemObject},
    stratifier::{Command, Connection},
    tokio_rustls::TlsAcceptor,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PortOptions {
    pub port: u16,
    /// Difficulty sent to miners right after they subscribe.
    pub diff: Difficulty,
    #[serde(default)]
    pub tls: bool,
    #[serde(default)]
    pub vardiff: Option<VardiffOptions>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TlsOptions {
    pub cert: PathBuf,
    pub key: PathBuf,
}

#[derive(Debug, Clone)]
pub struct StratumOptions {
    pub host: IpAddr,
    pub ports: Vec<PortOptions>,
    pub banning: Option<BanningOptions>,
    pub connection_timeout: Duration,
    pub job_rebroadcast_timeout: Duration,
    pub tcp_proxy_protocol: bool,
    pub tls: Option<TlsOptions>,
    pub algorithm: Algorithm,
}

impl Default for StratumOptions {
    fn default() -> Self {
        Self {
            host: IpAddr::from([0, 0, 0, 0]),
            ports: Vec::new(),
            banning: None,
            connection_timeout: Duration::from_secs(600),
            job_rebroadcast_timeout: Duration::from_secs(55),
            tcp_proxy_protocol: false,
            tls: None,
            algorithm: Algorithm::KAWPOW,
        }
    }
}

impl StratumOptions {
    pub(crate) fn banning_enabled(&self) -> bool {
        self.banning.is_some_and(|banning| banning.enabled)
    }
}

/// A listening port as seen by its connections.
pub(crate) struct Port {
    pub(crate) number: u16,
    pub(crate) difficulty: Difficulty,
    pub(crate) vardiff: Option<Vardiff>,
    tls: Option<TlsAcceptor>,
}

impl Port {
    pub(crate) fn new(options: &PortOptions, number: u16) -> Self {
        Self {
            number,
            difficulty: options.diff,
            vardiff: options.vardiff.map(Vardiff::new),
            tls: None,
        }
    }
}

struct Handle {
    remote: SocketAddr,
    commands: mpsc::UnboundedSender<Command>,
}

/// State shared by the registry and every connection task.
pub(crate) struct Shared {
    pub(crate) options: StratumOptions,
    pub(crate) hooks: Arc<dyn Hooks>,
    pub(crate) bans: BanList,
    pub(crate) events: Events,
    pub(crate) cancel: CancellationToken,
    connections: DashMap<u64, Handle>,
    next_id: AtomicU64,
    extranonces: AtomicU64,
    current_job: Mutex<Option<Arc<Job>>>,
    broadcasted: tokio::sync::Notify,
}

impl Shared {
    pub(crate) fn new(
        options: StratumOptions,
        hooks: Arc<dyn Hooks>,
        events: Events,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            bans: BanList::new(options.banning.map(|b| b.duration()).unwrap_or_default()),
            options,
            hooks,
            events,
            cancel,
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
            extranonces: AtomicU64::new(0),
            current_job: Mutex::new(None),
            broadcasted: tokio::sync::Notify::new(),
        }
    }

    /// Fixed prefix followed by a little-endian counter that wraps to zero.
    pub(crate) fn next_extranonce1(&self) -> String {
        let count = self
            .extranonces
            .fetch_add(1, Ordering::Relaxed)
            .wrapping_add(1);

        format!("{SUBSCRIPTION_PREFIX}{}", hex::encode(count.to_le_bytes()))
    }

    pub(crate) fn current_job(&self) -> Option<Arc<Job>> {
        self.current_job.lock().clone()
    }

    pub(crate) fn set_current_job(&self, job: Arc<Job>) {
        *self.current_job.lock() = Some(job);
    }

    /// Registers a socket and returns the connection that will serve it.
    pub(crate) fn connection<R, W>(
        self: &Arc<Self>,
        reader: R,
        writer: W,
        remote: SocketAddr,
        port: Arc<Port>,
    ) -> Connection<R, W>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();

        self.connections.insert(
            id,
            Handle {
                remote,
                commands: tx,
            },
        );

        debug!("Accepted connection {id} from {remote} on port {}", port.number);
        self.events.emit(Event::ClientConnected { id, remote });

        Connection::new(self.clone(), id, remote, port, reader, writer, rx)
    }

    pub(crate) fn command(&self, id: u64, command: Command) -> bool {
        self.connections
            .get(&id)
            .is_some_and(|handle| handle.commands.send(command).is_ok())
    }

    pub(crate) fn disconnected(&self, id: u64, label: String) {
        if self.connections.remove(&id).is_some() {
            info!("Disconnected {label}");
            self.events.emit(Event::ClientDisconnected { id, label });
        }
    }

    async fn accept(self: Arc<Self>, listener: TcpListener, port: Arc<Port>) {
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                accepted = listener.accept() => {
                    let (stream, remote) = match accepted {
                        Ok(accepted) => accepted,
                        Err(err) => {
                            warn!("Failed to accept on port {}: {err}", port.number);
                            continue;
                        }
                    };

                    if let Err(err) = stream.set_nodelay(true) {
                        debug!("Failed to set TCP_NODELAY for {remote}: {err}");
                    }

                    match port.tls.clone() {
                        None => {
                            let (reader, writer) = stream.into_split();
                            connections.spawn(self.connection(reader, writer, remote, port.clone()).run());
                        }
                        Some(acceptor) => {
                            let shared = self.clone();
                            let port = port.clone();

                            connections.spawn(async move {
                                match acceptor.accept(stream).await {
                                    Ok(stream) => {
                                        let (reader, writer) = tokio::io::split(stream);
                                        shared.connection(reader, writer, remote, port).run().await;
                                    }
                                    Err(err) => warn!("TLS handshake with {remote} failed: {err}"),
                                }
                            });
                        }
                    }
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        while connections.join_next().await.is_some() {}
    }

    async fn watchdog(self: Arc<Self>) {
        let timeout = self.options.job_rebroadcast_timeout;

        tokio::select! {
            _ = self.cancel.cancelled() => return,
            _ = self.broadcasted.notified() => {}
        }

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = self.broadcasted.notified() => {}
                _ = sleep(timeout) => {
                    warn!("No new job broadcast in {}s", timeout.as_secs());
                    self.events.emit(Event::BroadcastTimeout);
                }
            }
        }
    }

    async fn sweep_bans(self: Arc<Self>, every: Duration) {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let purged = self.bans.purge(Instant::now());
                    if purged > 0 {
                        info!("Purged {purged} expired bans, {} remaining", self.bans.len());
                    }
                }
            }
        }
    }
}

/// Owns the stratum listeners and the table of live connections.
#[derive(Clone)]
pub struct Registry {
    shared: Arc<Shared>,
}

impl Registry {
    pub fn new(
        options: StratumOptions,
        hooks: Arc<dyn Hooks>,
        cancel: CancellationToken,
    ) -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (events, rx) = Events::channel();

        (
            Self {
                shared: Arc::new(Shared::new(options, hooks, events, cancel)),
            },
            rx,
        )
    }

    /// Binds every configured port and starts the service tasks. Returns the bound addresses
    /// in port order.
    pub async fn spawn(&self, tasks: &mut JoinSet<()>) -> Result<Vec<SocketAddr>> {
        let options = &self.shared.options;

        let acceptor = if options.ports.iter().any(|port| port.tls) {
            let tls = options
                .tls
                .as_ref()
                .context("TLS port configured without a certificate")?;
            Some(tls_acceptor(tls)?)
        } else {
            None
        };

        let mut addresses = Vec::new();

        for port_options in &options.ports {
            let listener = TcpListener::bind((options.host, port_options.port))
                .await
                .with_context(|| format!("failed to bind to {}:{}", options.host, port_options.port))?;

            let address = listener.local_addr()?;

            let mut port = Port::new(port_options, address.port());
            if port_options.tls {
                port.tls = acceptor.clone();
            }

            info!(
                "Stratum listening on {address}{} at difficulty {}",
                if port_options.tls { " (TLS)" } else { "" },
                port_options.diff,
            );

            tasks.spawn(self.shared.clone().accept(listener, Arc::new(port)));
            addresses.push(address);
        }

        tasks.spawn(self.shared.clone().watchdog());

        if let Some(banning) = options.banning.filter(|banning| banning.enabled) {
            tasks.spawn(self.shared.clone().sweep_bans(banning.purge_interval()));
        }

        Ok(addresses)
    }

    /// Sends `job` to every connection and restarts the rebroadcast timer.
    pub fn broadcast(&self, job: Arc<Job>) {
        self.shared.set_current_job(job.clone());

        let mut sent = 0;
        for handle in self.shared.connections.iter() {
            if handle.commands.send(Command::Job(job.clone())).is_ok() {
                sent += 1;
            }
        }

        info!(
            "Broadcast job {} at height {} to {sent} connections",
            job.job_id, job.height
        );

        self.shared.broadcasted.notify_one();
    }

    pub fn disconnect(&self, id: u64) -> bool {
        self.shared.command(id, Command::Disconnect)
    }

    pub fn remote(&self, id: u64) -> Option<SocketAddr> {
        self.shared.connections.get(&id).map(|handle| handle.remote)
    }

    pub fn connection_count(&self) -> usize {
        self.shared.connections.len()
    }

    pub fn current_job(&self) -> Option<Arc<Job>> {
        self.shared.current_job()
    }

    pub fn bans(&self) -> &BanList {
        &self.shared.bans
    }
}

fn tls_acceptor(tls: &TlsOptions) -> Result<TlsAcceptor> {
    static RUSTLS_PROVIDER_INSTALLED: LazyLock<bool> = LazyLock::new(|| {
        rustls::crypto::ring::default_provider()
            .install_default()
            .is_ok()
    });

    ensure! {
        *RUSTLS_PROVIDER_INSTALLED || rustls::crypto::CryptoProvider::get_default().is_some(),
        "failed to install rustls ring crypto provider",
    }

    let certs = CertificateDer::pem_file_iter(&tls.cert)
        .and_then(|certs| certs.collect::<Result<Vec<_>, _>>())
        .with_context(|| format!("failed to load certificate `{}`", tls.cert.display()))?;

    let key = PrivateKeyDer::from_pem_file(&tls.key)
        .with_context(|| format!("failed to load private key `{}`", tls.key.display()))?;

    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("invalid TLS certificate or key")?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}
