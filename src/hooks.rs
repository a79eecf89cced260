use super::*;

#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizeRequest {
    pub remote: IpAddr,
    pub local_port: u16,
    pub username: Username,
    pub password: Option<String>,
    /// `None` when the miner authorizes before subscribing.
    pub extranonce1: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Authorization {
    pub authorized: bool,
    pub error: Option<JsonRpcError>,
    pub disconnect: bool,
}

impl Authorization {
    pub fn granted() -> Self {
        Self {
            authorized: true,
            ..Self::default()
        }
    }

    pub fn denied(error: impl Into<JsonRpcError>) -> Self {
        Self {
            authorized: false,
            error: Some(error.into()),
            disconnect: false,
        }
    }
}

/// A `mining.submit` that passed the subscription and authorization checks.
#[derive(Debug, Clone, PartialEq)]
pub struct Share {
    pub connection: u64,
    pub remote: IpAddr,
    pub local_port: u16,
    pub worker: String,
    pub extranonce1: String,
    pub difficulty: Difficulty,
    /// Difficulty in effect before the last change, for shares still in flight.
    pub previous_difficulty: Option<Difficulty>,
    pub target: U256,
    pub submit: Submit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub accepted: bool,
    pub error: Option<JsonRpcError>,
}

impl Verdict {
    pub fn accept() -> Self {
        Self {
            accepted: true,
            error: None,
        }
    }

    pub fn reject(error: impl Into<JsonRpcError>) -> Self {
        Self {
            accepted: false,
            error: Some(error.into()),
        }
    }

    /// Counts toward the invalid share ratio unless accepted without error.
    pub fn is_valid(&self) -> bool {
        self.accepted && self.error.is_none()
    }
}

/// Decisions the stratum server delegates to its owner.
#[async_trait]
pub trait Hooks: Send + Sync + 'static {
    /// Returning an error vetoes the subscription.
    async fn subscribe(&self, _remote: SocketAddr) -> Result<(), JsonRpcError> {
        Ok(())
    }

    async fn authorize(&self, request: AuthorizeRequest) -> Authorization;

    async fn submit(&self, share: Share) -> Verdict;
}
