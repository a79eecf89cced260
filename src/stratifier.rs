use {
    super::*,
    bouncer::{Bouncer, Consequence},
    registry::{Port, Shared},
    state::State,
};

mod bouncer;
mod state;

#[derive(Debug)]
pub(crate) enum Command {
    Job(Arc<Job>),
    Disconnect,
}

/// One miner socket, from accept to close.
pub(crate) struct Connection<R, W> {
    id: u64,
    shared: Arc<Shared>,
    remote: SocketAddr,
    port: Arc<Port>,
    reader: FramedRead<R, LinesCodec>,
    writer: FramedWrite<W, LinesCodec>,
    commands: mpsc::UnboundedReceiver<Command>,
    state: State,
    worker_name: Option<String>,
    difficulty: Option<Difficulty>,
    previous_difficulty: Option<Difficulty>,
    pending_difficulty: Option<Difficulty>,
    bouncer: Bouncer,
    vardiff: Option<VardiffTracker>,
    last_activity: Instant,
}

impl<R, W> Connection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub(crate) fn new(
        shared: Arc<Shared>,
        id: u64,
        remote: SocketAddr,
        port: Arc<Port>,
        reader: R,
        writer: W,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        Self {
            bouncer: Bouncer::new(shared.options.banning),
            vardiff: port.vardiff.as_ref().map(Vardiff::tracker),
            id,
            remote,
            reader: FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_MESSAGE_SIZE)),
            writer: FramedWrite::new(writer, LinesCodec::new()),
            commands,
            state: State::default(),
            worker_name: None,
            difficulty: None,
            previous_difficulty: None,
            pending_difficulty: None,
            last_activity: Instant::now(),
            port,
            shared,
        }
    }

    /// `worker [ip]`, as it appears in logs and events.
    pub(crate) fn label(&self) -> String {
        format!(
            "{} [{}]",
            self.worker_name.as_deref().unwrap_or("(unauthorized)"),
            self.remote.ip()
        )
    }

    pub(crate) async fn run(mut self) {
        if let Err(err) = self.serve().await {
            debug!("Connection {} ended with error: {err}", self.label());
        }

        self.shared.disconnected(self.id, self.label());
    }

    async fn serve(&mut self) -> Result {
        let cancel = self.shared.cancel.clone();
        let mut awaiting_proxy = self.shared.options.tcp_proxy_protocol;

        if !awaiting_proxy && !self.check_ban() {
            return Ok(());
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                command = self.commands.recv() => match command {
                    Some(Command::Job(job)) => {
                        if !self.on_job(job).await? {
                            break;
                        }
                    }
                    Some(Command::Disconnect) | None => break,
                },
                frame = self.reader.next() => {
                    let line = match frame {
                        Some(Ok(line)) => line,
                        Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                            warn!(
                                "Flood from {}: over {MAX_MESSAGE_SIZE} bytes without a newline",
                                self.label()
                            );
                            self.shared.events.emit(Event::SocketFlooded {
                                id: self.id,
                                label: self.label(),
                            });
                            break;
                        }
                        Some(Err(LinesCodecError::Io(source))) => {
                            if source.kind() != io::ErrorKind::ConnectionReset {
                                warn!("Socket error from {}: {source}", self.label());
                                self.shared.events.emit(Event::SocketError {
                                    id: self.id,
                                    label: self.label(),
                                    error: source.to_string(),
                                });
                            }
                            break;
                        }
                        None => break,
                    };

                    if awaiting_proxy {
                        awaiting_proxy = false;

                        let preamble = self.on_proxy_line(&line);

                        if !self.check_ban() {
                            break;
                        }

                        if preamble {
                            continue;
                        }
                    }

                    if !self.on_line(line).await? {
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    /// Takes the client address from a `PROXY` preamble. Returns whether the line was one.
    fn on_proxy_line(&mut self, line: &str) -> bool {
        if !line.starts_with("PROXY") {
            warn!("Expected PROXY preamble from {}", self.remote);
            self.shared.events.emit(Event::TcpProxyError {
                id: self.id,
                line: line.into(),
            });
            return false;
        }

        match line.split(' ').nth(2).map(str::parse::<IpAddr>) {
            Some(Ok(ip)) => {
                debug!("PROXY preamble maps {} to {ip}", self.remote);
                self.remote.set_ip(ip);
            }
            _ => warn!("Malformed PROXY preamble from {}: {line}", self.remote),
        }

        true
    }

    fn check_ban(&self) -> bool {
        if !self.shared.options.banning_enabled() {
            return true;
        }

        let ip = self.remote.ip();

        match self.shared.bans.check(ip, Instant::now()) {
            BanCheck::Clear => true,
            BanCheck::Kicked { remaining } => {
                info!("Kicked banned {ip}, {}s left on ban", remaining.as_secs());
                self.shared.events.emit(Event::KickedBannedIp {
                    ip,
                    remaining_secs: remaining.as_secs(),
                });
                false
            }
            BanCheck::Forgiven => {
                info!("Forgave banned {ip}");
                self.shared.events.emit(Event::ForgaveBannedIp { ip });
                true
            }
        }
    }

    /// Handles one line. Returns false when the socket should close.
    async fn on_line(&mut self, line: String) -> Result<bool> {
        if line.trim().is_empty() {
            return Ok(true);
        }

        let value = match serde_json::from_str::<Value>(&line) {
            Ok(value) => value,
            Err(err) => {
                warn!("Malformed message from {}: {err}", self.label());
                self.shared.events.emit(Event::MalformedMessage {
                    id: self.id,
                    label: self.label(),
                    line,
                });
                return Ok(false);
            }
        };

        let message = match serde_json::from_value::<Message>(value) {
            Ok(message) => message,
            Err(err) => {
                debug!("Ignoring non-request from {}: {err}", self.label());
                return Ok(true);
            }
        };

        let (id, method, params) = match message {
            Message::Request { id, method, params } => (id, method, params),
            Message::Notification { method, params } => (Id::Null, method, params),
            Message::Response { .. } => {
                debug!("Ignoring response from {}", self.label());
                return Ok(true);
            }
        };

        let request = match Request::parse(&method, params) {
            Ok(request) => request,
            Err(err) => {
                warn!("{err} from {}", self.label());
                self.send_error(id, StratumError::Unsupported.with_message(err.to_string()))
                    .await?;
                return Ok(true);
            }
        };

        match request {
            Request::Subscribe(subscribe) => {
                info!(
                    "SUBSCRIBE from {} with {}",
                    self.label(),
                    subscribe.user_agent.as_deref().unwrap_or("no user agent")
                );
                self.on_subscribe(id).await
            }
            Request::Authorize(authorize) => {
                info!("AUTHORIZE from {} as {}", self.label(), authorize.username);
                self.on_authorize(id, authorize).await
            }
            Request::Submit(submit) => {
                debug!("SUBMIT from {} for job {}", self.label(), submit.job_id);
                self.last_activity = Instant::now();
                self.on_submit(id, submit).await
            }
            Request::GetTransactions => {
                self.send(Message::Response {
                    id: Id::Null,
                    result: Some(json!([])),
                    error: Some(ReplyError::Flag(true)),
                })
                .await?;
                Ok(true)
            }
            Request::ExtranonceSubscribe => {
                self.send(Message::Response {
                    id,
                    result: Some(json!(false)),
                    error: Some(StratumError::Unsupported.into()),
                })
                .await?;
                Ok(true)
            }
            Request::Unrecognized { method } => {
                debug!("Ignoring {method} from {}", self.label());
                Ok(true)
            }
        }
    }

    async fn on_subscribe(&mut self, id: Id) -> Result<bool> {
        if let Err(error) = self.shared.hooks.subscribe(self.remote).await {
            info!("Subscription from {} vetoed: {error}", self.label());
            self.send_error(id, error).await?;
            return Ok(true);
        }

        let first = !self.state.is_subscribed();

        if first {
            self.state.subscribe(self.shared.next_extranonce1());
        }

        let extranonce1 = self.state.extranonce1().unwrap_or_default().to_string();

        self.send(Message::Response {
            id,
            result: Some(json!(SubscribeResult { extranonce1 })),
            error: None,
        })
        .await?;

        if first {
            self.set_difficulty(self.port.difficulty).await?;

            if let Some(job) = self.shared.current_job() {
                self.send_notify(&job).await?;
            }
        }

        Ok(true)
    }

    async fn on_authorize(&mut self, id: Id, authorize: Authorize) -> Result<bool> {
        let username = Username::new(&authorize.username);
        self.worker_name = Some(username.to_string());

        let authorization = self
            .shared
            .hooks
            .authorize(AuthorizeRequest {
                remote: self.remote.ip(),
                local_port: self.port.number,
                username: username.clone(),
                password: authorize.password,
                extranonce1: self.state.extranonce1().map(str::to_string),
            })
            .await;

        let authorized = authorization.authorized && authorization.error.is_none();

        if authorized {
            info!("Authorized {}", self.label());
        } else {
            info!("Rejected authorization for {}", self.label());
        }

        self.state.authorize(authorized.then_some(username));

        self.send(Message::Response {
            id,
            result: Some(json!(authorized)),
            error: authorization.error.map(ReplyError::from),
        })
        .await?;

        Ok(!authorization.disconnect)
    }

    async fn on_submit(&mut self, id: Id, submit: Submit) -> Result<bool> {
        if self.worker_name.is_none() {
            self.worker_name = Some(Username::new(&submit.worker).to_string());
        }

        let rejection = if !self.state.is_subscribed() {
            Some(StratumError::NotSubscribed)
        } else if !self.state.is_authorized() {
            Some(StratumError::Unauthorized)
        } else {
            None
        };

        if let Some(error) = rejection {
            debug!("Rejected submit from {}: {error}", self.label());
            self.send_error(id, error).await?;
            return Ok(self.consider_ban(false));
        }

        let difficulty = self.difficulty.unwrap_or(self.port.difficulty);

        let share = Share {
            connection: self.id,
            remote: self.remote.ip(),
            local_port: self.port.number,
            worker: self
                .state
                .username()
                .map(Username::to_string)
                .unwrap_or_else(|| Username::new(&submit.worker).to_string()),
            extranonce1: self.state.extranonce1().unwrap_or_default().to_string(),
            difficulty,
            previous_difficulty: self.previous_difficulty,
            target: difficulty.to_target(&self.shared.options.algorithm),
            submit,
        };

        let verdict = self.shared.hooks.submit(share).await;

        let next = match (&self.port.vardiff, self.vardiff.as_mut()) {
            (Some(vardiff), Some(tracker)) => {
                vardiff.record_submit(tracker, difficulty, Instant::now())
            }
            _ => None,
        };

        if let Some(next) = next {
            debug!("Queued difficulty {next} for {}", self.label());
            self.pending_difficulty = Some(next);
        }

        self.send(Message::Response {
            id,
            result: Some(json!(verdict.accepted)),
            error: verdict.error.clone().map(ReplyError::from),
        })
        .await?;

        Ok(self.consider_ban(verdict.is_valid()))
    }

    /// Counts a submit toward the ban threshold. Returns false once the client is banned.
    fn consider_ban(&mut self, valid: bool) -> bool {
        match self.bouncer.record(valid) {
            Consequence::None => true,
            Consequence::Ban { invalid_percent } => {
                let ip = self.remote.ip();

                warn!(
                    "Banning {} with {invalid_percent:.1}% invalid shares",
                    self.label()
                );

                self.shared.bans.ban(ip, Instant::now());
                self.shared.events.emit(Event::BanTriggered {
                    id: self.id,
                    ip,
                    invalid_percent,
                });

                false
            }
        }
    }

    /// Returns false when the connection idled out instead.
    async fn on_job(&mut self, job: Arc<Job>) -> Result<bool> {
        if self.last_activity.elapsed() > self.shared.options.connection_timeout {
            info!("Closing idle connection {}", self.label());
            self.shared.events.emit(Event::IdleTimeout {
                id: self.id,
                label: self.label(),
            });
            return Ok(false);
        }

        if !self.state.is_subscribed() {
            return Ok(true);
        }

        if let Some(pending) = self.pending_difficulty.take() {
            if self.set_difficulty(pending).await? {
                info!("Difficulty for {} changed to {pending}", self.label());
                self.shared.events.emit(Event::DifficultyChanged {
                    id: self.id,
                    label: self.label(),
                    difficulty: pending,
                });
            }
        }

        self.send_notify(&job).await?;

        Ok(true)
    }

    /// Sends `mining.set_target` unless `difficulty` is already in effect.
    async fn set_difficulty(&mut self, difficulty: Difficulty) -> Result<bool> {
        if self.difficulty == Some(difficulty) {
            return Ok(false);
        }

        self.previous_difficulty = self.difficulty.replace(difficulty);

        self.send(Message::notification(
            "mining.set_target",
            SetTarget(difficulty.target_hex(&self.shared.options.algorithm)),
        ))
        .await?;

        Ok(true)
    }

    async fn send_notify(&mut self, job: &Job) -> Result {
        let target = self
            .difficulty
            .unwrap_or(self.port.difficulty)
            .target_hex(&self.shared.options.algorithm);

        self.send(Message::notification("mining.notify", job.notify(target)))
            .await
    }

    async fn send_error(&mut self, id: Id, error: impl Into<JsonRpcError>) -> Result {
        self.send(Message::Response {
            id,
            result: None,
            error: Some(ReplyError::Stratum(error.into())),
        })
        .await
    }

    async fn send(&mut self, message: Message) -> Result {
        let frame = serde_json::to_string(&message)?;
        self.writer.send(frame).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        pretty_assertions::assert_eq as pretty_assert_eq,
        tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf},
    };

    /// Accepts accounts other than `bad`, and shares whose nonce is not `00`.
    struct Gatekeeper;

    #[async_trait]
    impl Hooks for Gatekeeper {
        async fn authorize(&self, request: AuthorizeRequest) -> Authorization {
            match request.username.account() {
                "bad" => Authorization::denied(StratumError::Unauthorized),
                "kick" => Authorization {
                    disconnect: true,
                    ..Authorization::denied(StratumError::Unauthorized)
                },
                _ => Authorization::granted(),
            }
        }

        async fn submit(&self, share: Share) -> Verdict {
            if share.submit.nonce == "00" {
                Verdict::reject(StratumError::LowDifficulty)
            } else {
                Verdict::accept()
            }
        }
    }

    struct Client {
        lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
        writer: WriteHalf<DuplexStream>,
        events: mpsc::UnboundedReceiver<Event>,
        shared: Arc<Shared>,
        task: tokio::task::JoinHandle<()>,
    }

    impl Client {
        async fn send(&mut self, line: &str) {
            self.writer.write_all(line.as_bytes()).await.unwrap();
            self.writer.write_all(b"\n").await.unwrap();
        }

        async fn recv(&mut self) -> Value {
            let line = self.lines.next_line().await.unwrap().unwrap();
            serde_json::from_str(&line).unwrap()
        }

        async fn closed(&mut self) -> bool {
            self.lines.next_line().await.unwrap().is_none()
        }

        fn events(&mut self) -> Vec<Event> {
            let mut events = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                events.push(event);
            }
            events
        }

        async fn subscribe(&mut self) -> Value {
            self.send(r#"{"id":1,"method":"mining.subscribe","params":["kawpowminer/1.2.4"]}"#)
                .await;
            let reply = self.recv().await;
            let set_target = self.recv().await;
            assert_eq!(set_target["method"], "mining.set_target");
            reply
        }

        async fn authorize(&mut self, username: &str) -> Value {
            self.send(&format!(
                r#"{{"id":2,"method":"mining.authorize","params":["{username}","x"]}}"#
            ))
            .await;
            self.recv().await
        }

        async fn submit(&mut self, nonce: &str) -> Value {
            self.send(&format!(
                r#"{{"id":4,"method":"mining.submit","params":["acct.rig","1","0x{nonce}","0xaa","0xbb"]}}"#
            ))
            .await;
            self.recv().await
        }
    }

    fn options() -> StratumOptions {
        StratumOptions {
            banning: Some(BanningOptions {
                check_threshold: 10,
                invalid_percent: 50.0,
                ..BanningOptions::default()
            }),
            ..StratumOptions::default()
        }
    }

    fn port(vardiff: Option<VardiffOptions>) -> Arc<Port> {
        Arc::new(Port::new(
            &PortOptions {
                port: 3333,
                diff: Difficulty::new(1.0),
                tls: false,
                vardiff,
            },
            3333,
        ))
    }

    fn client_with(options: StratumOptions, port: Arc<Port>, remote: SocketAddr) -> Client {
        let (events, rx) = Events::channel();
        let shared = Arc::new(Shared::new(
            options,
            Arc::new(Gatekeeper),
            events,
            CancellationToken::new(),
        ));

        let (client, server) = tokio::io::duplex(64 * 1024);
        let (server_reader, server_writer) = tokio::io::split(server);
        let (client_reader, client_writer) = tokio::io::split(client);

        let connection = shared.connection(server_reader, server_writer, remote, port);
        let task = tokio::spawn(connection.run());

        Client {
            lines: BufReader::new(client_reader).lines(),
            writer: client_writer,
            events: rx,
            shared,
            task,
        }
    }

    fn client() -> Client {
        client_with(options(), port(None), "10.0.0.1:50000".parse().unwrap())
    }

    fn job() -> Arc<Job> {
        Arc::new(Job {
            job_id: "1".into(),
            header_hash: "aa".repeat(32),
            seed_hash: "bb".repeat(32),
            target: "00".repeat(32),
            clean_jobs: true,
            height: 3_000_000,
            bits: "1b00f3c9".into(),
        })
    }

    #[tokio::test]
    async fn subscribe_replies_with_extranonce_and_target() {
        let mut client = client();

        client
            .send(r#"{"id":1,"method":"mining.subscribe","params":["kawpowminer/1.2.4"]}"#)
            .await;

        pretty_assert_eq!(
            client.recv().await,
            json!({"id": 1, "result": [null, "deadbeefcafebabe0100000000000000"], "error": null})
        );

        pretty_assert_eq!(
            client.recv().await,
            json!({
                "id": null,
                "method": "mining.set_target",
                "params": ["00000000ff000000000000000000000000000000000000000000000000000000"]
            })
        );
    }

    #[tokio::test]
    async fn subscribe_sends_current_job() {
        let mut client = client();
        client.shared.set_current_job(job());

        client.subscribe().await;

        let notify = client.recv().await;
        assert_eq!(notify["method"], "mining.notify");
        assert_eq!(notify["params"][0], "1");
        assert_eq!(
            notify["params"][3],
            "00000000ff000000000000000000000000000000000000000000000000000000"
        );
        assert_eq!(notify["params"][5], 3_000_000);
    }

    #[tokio::test]
    async fn submit_before_subscribe_is_not_subscribed() {
        let mut client = client();

        pretty_assert_eq!(
            client.submit("01").await,
            json!({"id": 4, "result": null, "error": [25, "not subscribed", null]})
        );
        assert_eq!(client.shared.bans.len(), 0);
    }

    #[tokio::test]
    async fn submit_before_authorize_is_unauthorized() {
        let mut client = client();
        client.subscribe().await;

        assert_eq!(client.submit("01").await["error"][0], 24);
    }

    #[tokio::test]
    async fn authorize_before_subscribe_is_kept() {
        let mut client = client();

        pretty_assert_eq!(
            client.authorize("acct.rig").await,
            json!({"id": 2, "result": true, "error": null})
        );
        assert_eq!(client.submit("01").await["error"][0], 25);

        client.subscribe().await;

        pretty_assert_eq!(
            client.submit("01").await,
            json!({"id": 4, "result": true, "error": null})
        );
    }

    #[tokio::test]
    async fn negative_id_is_echoed() {
        let mut client = client();

        client
            .send(r#"{"id":-1,"method":"mining.subscribe","params":[]}"#)
            .await;

        let reply = client.recv().await;
        assert_eq!(reply["id"], -1);
        assert_eq!(reply["result"][1], "deadbeefcafebabe0100000000000000");
    }

    #[tokio::test]
    async fn json_that_is_not_a_message_is_ignored() {
        let mut client = client();

        client.send(r#"{"id":3}"#).await;
        client.send("[1,2]").await;
        client.send("").await;
        client
            .send(r#"{"id":5,"method":"mining.get_transactions","params":[]}"#)
            .await;

        assert_eq!(client.recv().await["result"], json!([]));
        assert!(
            !client
                .events()
                .iter()
                .any(|event| matches!(event, Event::MalformedMessage { .. }))
        );
    }

    #[tokio::test]
    async fn submit_worker_label_is_sanitized() {
        let mut client = client();

        client
            .send(r#"{"id":4,"method":"mining.submit","params":["acct.r<i>g\n","1","0x01","0xaa","0xbb"]}"#)
            .await;
        assert_eq!(client.recv().await["error"][0], 25);

        client.send("{not json").await;
        assert!(client.closed().await);
        (&mut client.task).await.unwrap();

        assert!(client.events().iter().any(|event| matches!(
            event,
            Event::ClientDisconnected { label, .. } if label == "acct.rign [10.0.0.1]"
        )));
    }

    #[tokio::test]
    async fn authorize_and_submit() {
        let mut client = client();
        client.subscribe().await;

        pretty_assert_eq!(
            client.authorize("acct.rig").await,
            json!({"id": 2, "result": true, "error": null})
        );

        pretty_assert_eq!(
            client.submit("01").await,
            json!({"id": 4, "result": true, "error": null})
        );

        pretty_assert_eq!(
            client.submit("00").await,
            json!({"id": 4, "result": false, "error": [23, "low difficulty share", null]})
        );
    }

    #[tokio::test]
    async fn failed_authorize_keeps_socket_open() {
        let mut client = client();
        client.subscribe().await;

        assert_eq!(
            client.authorize("bad.rig").await,
            json!({"id": 2, "result": false, "error": [24, "unauthorized worker", null]})
        );
        assert_eq!(client.submit("01").await["error"][0], 24);
    }

    #[tokio::test]
    async fn authorize_can_request_disconnect() {
        let mut client = client();
        client.subscribe().await;

        assert_eq!(client.authorize("kick").await["result"], false);
        assert!(client.closed().await);
    }

    #[tokio::test]
    async fn fixed_replies() {
        let mut client = client();

        client
            .send(r#"{"id":7,"method":"mining.get_transactions","params":[]}"#)
            .await;
        pretty_assert_eq!(
            client.recv().await,
            json!({"id": null, "result": [], "error": true})
        );

        client
            .send(r#"{"id":8,"method":"mining.extranonce.subscribe","params":[]}"#)
            .await;
        pretty_assert_eq!(
            client.recv().await,
            json!({"id": 8, "result": false, "error": [20, "Not supported.", null]})
        );

        client
            .send(r#"{"id":9,"method":"mining.suggest_difficulty","params":[1]}"#)
            .await;
        client
            .send(r#"{"id":10,"method":"mining.get_transactions","params":[]}"#)
            .await;
        assert_eq!(client.recv().await["result"], json!([]));
    }

    #[tokio::test]
    async fn malformed_json_closes() {
        let mut client = client();

        client.send("{not json").await;

        assert!(client.closed().await);
        (&mut client.task).await.unwrap();
        assert!(
            client
                .events()
                .iter()
                .any(|event| matches!(event, Event::MalformedMessage { .. }))
        );
    }

    #[tokio::test]
    async fn flood_closes_without_dispatch() {
        let mut client = client();

        client
            .writer
            .write_all(&vec![b'{'; MAX_MESSAGE_SIZE + 1])
            .await
            .unwrap();

        assert!(client.closed().await);
        (&mut client.task).await.unwrap();

        let events = client.events();
        assert!(matches!(events[0], Event::ClientConnected { .. }));
        assert!(matches!(events[1], Event::SocketFlooded { .. }));
        assert!(matches!(events[2], Event::ClientDisconnected { .. }));
    }

    #[tokio::test]
    async fn invalid_shares_trigger_ban() {
        let mut client = client();

        for _ in 0..9 {
            assert_eq!(client.submit("01").await["error"][0], 25);
        }

        assert_eq!(client.submit("01").await["error"][0], 25);
        assert!(client.closed().await);
        (&mut client.task).await.unwrap();

        assert!(matches!(
            client
                .shared
                .bans
                .check("10.0.0.1".parse().unwrap(), Instant::now()),
            BanCheck::Kicked { .. }
        ));
        assert!(
            client
                .events()
                .iter()
                .any(|event| matches!(event, Event::BanTriggered { .. }))
        );
    }

    #[tokio::test]
    async fn mostly_valid_shares_reset_counters() {
        let mut client = client();
        client.subscribe().await;
        client.authorize("acct.rig").await;

        for _ in 0..4 {
            client.submit("00").await;
        }
        for _ in 0..6 {
            client.submit("01").await;
        }

        assert_eq!(client.submit("01").await["result"], true);
        assert_eq!(client.shared.bans.len(), 0);
    }

    #[tokio::test]
    async fn banned_address_is_kicked() {
        let remote: SocketAddr = "10.0.0.9:40000".parse().unwrap();
        let (events, mut rx) = Events::channel();
        let shared = Arc::new(Shared::new(
            options(),
            Arc::new(Gatekeeper),
            events,
            CancellationToken::new(),
        ));

        shared.bans.ban(remote.ip(), Instant::now());

        let (_client, server) = tokio::io::duplex(1024);
        let (reader, writer) = tokio::io::split(server);
        shared.connection(reader, writer, remote, port(None)).run().await;

        assert!(matches!(rx.recv().await, Some(Event::ClientConnected { .. })));
        assert!(matches!(
            rx.recv().await,
            Some(Event::KickedBannedIp { ip, .. }) if ip == remote.ip()
        ));
    }

    #[tokio::test]
    async fn proxy_preamble_sets_remote() {
        let mut client = client_with(
            StratumOptions {
                tcp_proxy_protocol: true,
                ..options()
            },
            port(None),
            "127.0.0.1:50000".parse().unwrap(),
        );

        client
            .send("PROXY TCP4 198.51.100.7 10.0.0.1 50000 3333")
            .await;
        client.subscribe().await;
        client.authorize("acct.rig").await;

        client.send("{not json").await;
        assert!(client.closed().await);
        (&mut client.task).await.unwrap();

        assert!(client.events().iter().any(|event| matches!(
            event,
            Event::ClientDisconnected { label, .. } if label == "acct.rig [198.51.100.7]"
        )));
    }

    #[tokio::test]
    async fn missing_proxy_preamble_is_reported() {
        let mut client = client_with(
            StratumOptions {
                tcp_proxy_protocol: true,
                ..options()
            },
            port(None),
            "127.0.0.1:50000".parse().unwrap(),
        );

        let reply = client.subscribe().await;
        assert_eq!(reply["id"], 1);

        assert!(
            client
                .events()
                .iter()
                .any(|event| matches!(event, Event::TcpProxyError { .. }))
        );
    }

    #[tokio::test]
    async fn pending_difficulty_applies_with_next_job() {
        let mut client = client_with(
            options(),
            port(Some(VardiffOptions {
                target_time: 15.0,
                variance_percent: 30.0,
                retarget_time: 0.0,
                min_diff: 0.5,
                max_diff: 1000.0,
                x2mode: true,
            })),
            "10.0.0.1:50000".parse().unwrap(),
        );

        client.subscribe().await;
        client.authorize("acct.rig").await;
        client.submit("01").await;
        client.submit("01").await;

        assert!(client.shared.command(1, Command::Job(job())));

        pretty_assert_eq!(
            client.recv().await,
            json!({
                "id": null,
                "method": "mining.set_target",
                "params": ["000000007f800000000000000000000000000000000000000000000000000000"]
            })
        );
        assert_eq!(client.recv().await["method"], "mining.notify");

        assert!(client.events().iter().any(|event| matches!(
            event,
            Event::DifficultyChanged { difficulty, .. } if *difficulty == Difficulty::new(2.0)
        )));
    }

    #[tokio::test]
    async fn idle_connection_closes_on_job() {
        let mut client = client_with(
            StratumOptions {
                connection_timeout: Duration::ZERO,
                ..options()
            },
            port(None),
            "10.0.0.1:50000".parse().unwrap(),
        );

        client.subscribe().await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert!(client.shared.command(1, Command::Job(job())));

        assert!(client.closed().await);
    }
}
