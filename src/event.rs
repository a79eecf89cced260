use super::*;

/// Things the stratum server reports upward while it runs.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    ClientConnected {
        id: u64,
        remote: SocketAddr,
    },
    ClientDisconnected {
        id: u64,
        label: String,
    },
    SocketFlooded {
        id: u64,
        label: String,
    },
    SocketError {
        id: u64,
        label: String,
        error: String,
    },
    MalformedMessage {
        id: u64,
        label: String,
        line: String,
    },
    TcpProxyError {
        id: u64,
        line: String,
    },
    BanTriggered {
        id: u64,
        ip: IpAddr,
        invalid_percent: f64,
    },
    KickedBannedIp {
        ip: IpAddr,
        remaining_secs: u64,
    },
    ForgaveBannedIp {
        ip: IpAddr,
    },
    DifficultyChanged {
        id: u64,
        label: String,
        difficulty: Difficulty,
    },
    IdleTimeout {
        id: u64,
        label: String,
    },
    BroadcastTimeout,
}

/// Sending half of the event channel. Events are dropped once the receiver is gone.
#[derive(Debug, Clone)]
pub struct Events {
    tx: mpsc::UnboundedSender<Event>,
}

impl Events {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: Event) {
        self.tx.send(event).ok();
    }
}
