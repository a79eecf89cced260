use {super::*, peer::Peer};

#[derive(Parser, Debug)]
pub(crate) struct Watch {
    #[arg(long, help = "Exit after <BLOCKS> block announcements.")]
    blocks: Option<u64>,
}

impl Watch {
    pub(crate) async fn run(self, settings: Settings, cancel_token: CancellationToken) -> Result {
        let options = settings
            .peer_options()?
            .context("P2P is disabled in the configuration")?;

        info!(
            "Watching {}:{} on {} for block announcements",
            options.host,
            options.port,
            settings.chain()
        );

        let mut tasks = JoinSet::new();
        let mut events = Peer::spawn(options, cancel_token.clone(), &mut tasks);
        let mut seen = 0;

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => break,
                event = events.recv() => match event {
                    Some(PeerEvent::BlockFound(hash)) => {
                        println!("{hash}");
                        seen += 1;
                        if self.blocks.is_some_and(|blocks| seen >= blocks) {
                            cancel_token.cancel();
                            break;
                        }
                    }
                    Some(event) => pool::log_peer_event(&event),
                    None => bail!("P2P peer client stopped"),
                },
            }
        }

        while tasks.join_next().await.is_some() {}

        Ok(())
    }
}
