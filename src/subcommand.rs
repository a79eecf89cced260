use {super::*, peer::PeerEvent, settings::Settings};

mod config;
pub(crate) mod pool;
mod watch;

#[derive(Debug, Parser)]
pub(crate) enum Subcommand {
    #[command(about = "Print resolved configuration")]
    Config(config::Config),
    #[command(about = "Run the mining pool")]
    Pool(pool::Pool),
    #[command(about = "Log block announcements from the P2P network")]
    Watch(watch::Watch),
}

impl Subcommand {
    pub(crate) async fn run(self, settings: Settings, cancel_token: CancellationToken) -> Result {
        match self {
            Self::Config(config) => config.run(settings),
            Self::Pool(pool) => pool.run(settings, cancel_token).await,
            Self::Watch(watch) => watch.run(settings, cancel_token).await,
        }
    }
}
