use {
    super::*,
    peer::{Peer, PeerEvent},
    templates::Templates,
    validator::Validator,
};

mod templates;
mod validator;

#[derive(Parser, Debug)]
pub(crate) struct Pool {}

impl Pool {
    pub(crate) async fn run(self, settings: Settings, cancel_token: CancellationToken) -> Result {
        let mut tasks = JoinSet::new();

        let upstream = Arc::new(Upstream::new(settings.upstream_options())?);

        ensure!(
            upstream.is_online().await,
            "daemon RPC at {} is not reachable",
            upstream.url()
        );

        let payout = Payout::new(settings.pool_address()?, settings.recipients())?;

        let templates = Arc::new(Templates::new(
            upstream,
            payout,
            settings.override_target()?,
        ));

        let found = Arc::new(tokio::sync::Notify::new());

        let (registry, mut events) = Registry::new(
            settings.stratum_options(),
            Arc::new(Validator::new(templates.clone(), found.clone())),
            cancel_token.clone(),
        );

        templates
            .refresh(&registry, true)
            .await
            .context("failed to build initial job")?;

        registry.spawn(&mut tasks).await?;

        let mut peer_events = settings
            .peer_options()?
            .map(|options| {
                info!(
                    "Connecting to P2P peer {}:{} for block notifications",
                    options.host, options.port
                );
                Peer::spawn(options, cancel_token.clone(), &mut tasks)
            });

        let mut ticker = interval(settings.block_refresh_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    info!("Shutting down pool");
                    break;
                }
                Some(event) = events.recv() => {
                    if matches!(event, Event::BroadcastTimeout) {
                        info!("No new blocks for a while, rebroadcasting job");
                        refresh(&templates, &registry, true).await;
                    } else {
                        log_event(&event);
                    }
                }
                event = next_peer_event(&mut peer_events) => match event {
                    Some(PeerEvent::BlockFound(hash)) => {
                        info!("Block notification via P2P for {hash}");
                        refresh(&templates, &registry, false).await;
                    }
                    Some(event) => log_peer_event(&event),
                    None => {
                        warn!("P2P block notifications stopped, relying on polling");
                        peer_events = None;
                    }
                },
                _ = found.notified() => refresh(&templates, &registry, false).await,
                _ = ticker.tick() => refresh(&templates, &registry, false).await,
            }
        }

        info!("Waiting for {} tasks to complete...", tasks.len());
        while tasks.join_next().await.is_some() {}
        info!("All pool tasks stopped");

        Ok(())
    }
}

async fn refresh(templates: &Templates, registry: &Registry, force: bool) {
    if let Err(err) = templates.refresh(registry, force).await {
        warn!("{err:#}");
    }
}

async fn next_peer_event(
    events: &mut Option<mpsc::UnboundedReceiver<PeerEvent>>,
) -> Option<PeerEvent> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}

pub(crate) fn log_peer_event(event: &PeerEvent) {
    match event {
        PeerEvent::Connected => info!("P2P peer handshake complete"),
        PeerEvent::BlockFound(hash) => info!("P2P block announcement {hash}"),
        PeerEvent::Disconnected => warn!("P2P peer disconnected"),
        PeerEvent::ConnectionRejected => {
            error!("P2P peer rejected connection, check network magic and protocol version")
        }
        PeerEvent::ConnectionFailed(err) => error!("P2P connection failed: {err}"),
        PeerEvent::SocketError(err) => warn!("P2P socket error: {err}"),
        PeerEvent::Corrupt(err) => debug!("P2P frame skipped: {err}"),
    }
}

fn log_event(event: &Event) {
    match event {
        Event::ClientConnected { id, remote } => debug!("Client {id} connected from {remote}"),
        Event::ClientDisconnected { id, label } => debug!("Client {id} {label} disconnected"),
        Event::SocketFlooded { label, .. } => warn!("Detected socket flooding from {label}"),
        Event::SocketError { label, error, .. } => warn!("Socket error from {label}: {error}"),
        Event::MalformedMessage { label, line, .. } => {
            warn!("Malformed message from {label}: {line}")
        }
        Event::TcpProxyError { line, .. } => {
            error!("Client IP detection failed, tcp_proxy_protocol is enabled yet did not receive proxy protocol message: {line}")
        }
        Event::BanTriggered {
            ip,
            invalid_percent,
            ..
        } => warn!("Banned {ip} with {invalid_percent:.1}% invalid shares"),
        Event::KickedBannedIp { ip, remaining_secs } => {
            info!("Rejected incoming connection from {ip}, banned for {remaining_secs} more seconds")
        }
        Event::ForgaveBannedIp { ip } => info!("Forgave banned IP {ip}"),
        Event::DifficultyChanged {
            label, difficulty, ..
        } => info!("Difficulty update to {difficulty} for {label}"),
        Event::IdleTimeout { label, .. } => info!("Closed idle connection {label}"),
        Event::BroadcastTimeout => info!("Job rebroadcast timeout"),
    }
}
