use {
    super::*,
    tokio_util::codec::Framed,
    wire::{Frame, INV, RawMessage, VERACK, VERSION, WireCodec},
};

#[derive(Debug, Clone)]
pub struct PeerOptions {
    pub host: String,
    pub port: u16,
    pub magic: [u8; 4],
    pub protocol_version: u32,
    pub disable_transactions: bool,
    pub reconnect_delay: Duration,
}

impl PeerOptions {
    pub fn new(chain: Chain, host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: chain.default_p2p_port(),
            magic: chain.magic(),
            protocol_version: PROTOCOL_VERSION,
            disable_transactions: false,
            reconnect_delay: Duration::from_secs(5),
        }
    }

    fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// The node acknowledged our version.
    Connected,
    BlockFound(BlockHash),
    /// A handshaken session ended. A reconnect follows.
    Disconnected,
    /// The node hung up before acknowledging our version. No reconnect is attempted.
    ConnectionRejected,
    /// Nothing was listening. No reconnect is attempted.
    ConnectionFailed(String),
    SocketError(String),
    Corrupt(FrameError),
}

pub struct Peer {
    options: PeerOptions,
    events: mpsc::UnboundedSender<PeerEvent>,
}

pub fn user_agent() -> String {
    format!("/kawpool:{}/", env!("CARGO_PKG_VERSION"))
}

impl Peer {
    pub fn spawn(
        options: PeerOptions,
        cancel: CancellationToken,
        tasks: &mut JoinSet<()>,
    ) -> mpsc::UnboundedReceiver<PeerEvent> {
        let (events, receiver) = mpsc::unbounded_channel();

        let peer = Self { options, events };

        tasks.spawn(async move { peer.run(cancel).await });

        receiver
    }

    fn emit(&self, event: PeerEvent) {
        self.events.send(event).ok();
    }

    async fn run(self, cancel: CancellationToken) {
        let address = self.options.address();

        loop {
            let mut verack = false;

            let result = tokio::select! {
                _ = cancel.cancelled() => return,
                result = self.session(&mut verack) => result,
            };

            match result {
                Err(err) if err.kind() == io::ErrorKind::ConnectionRefused => {
                    warn!("P2P peer {address} refused connection");
                    self.emit(PeerEvent::ConnectionFailed(err.to_string()));
                    return;
                }
                Err(err) => {
                    warn!("P2P socket error with {address}: {err}");
                    self.emit(PeerEvent::SocketError(err.to_string()));
                }
                Ok(()) => {}
            }

            if !verack {
                warn!("P2P peer {address} closed connection before handshake");
                self.emit(PeerEvent::ConnectionRejected);
                return;
            }

            info!(
                "P2P peer {address} disconnected, reconnecting in {}s",
                self.options.reconnect_delay.as_secs_f64()
            );
            self.emit(PeerEvent::Disconnected);

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = sleep(self.options.reconnect_delay) => {}
            }
        }
    }

    async fn session(&self, verack: &mut bool) -> io::Result<()> {
        let stream = TcpStream::connect(self.options.address()).await?;

        let mut framed = Framed::new(stream, WireCodec::new(self.options.magic));

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;

        framed
            .send(RawMessage::new(
                VERSION,
                wire::version_payload(
                    self.options.protocol_version,
                    &user_agent(),
                    timestamp,
                    rand::random(),
                    self.options.disable_transactions,
                ),
            ))
            .await?;

        while let Some(frame) = framed.next().await {
            let message = match frame? {
                Frame::Message(message) => message,
                Frame::Corrupt(err) => {
                    debug!("Corrupt P2P frame: {err}");
                    self.emit(PeerEvent::Corrupt(err));
                    continue;
                }
            };

            match message.command.as_str() {
                VERSION => framed.send(RawMessage::new(VERACK, Bytes::new())).await?,
                VERACK => {
                    if !*verack {
                        *verack = true;
                        info!("P2P handshake with {} complete", self.options.address());
                        self.emit(PeerEvent::Connected);
                    }
                }
                INV => match wire::parse_inv(&message.payload) {
                    Ok(inventory) => {
                        for item in inventory.iter().filter(|item| item.is_block()) {
                            let hash = item.block_hash();
                            debug!("P2P block announcement {hash}");
                            self.emit(PeerEvent::BlockFound(hash));
                        }
                    }
                    Err(err) => {
                        debug!("Malformed inv: {err}");
                        self.emit(PeerEvent::Corrupt(err));
                    }
                },
                command => debug!("Ignoring P2P `{command}` message"),
            }
        }

        Ok(())
    }
}
