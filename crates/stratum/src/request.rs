use {super::*, error::InvalidParamsSnafu, snafu::ResultExt};

/// A decoded client request. Unknown methods are kept so callers can log and skip them.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Subscribe(Subscribe),
    Authorize(Authorize),
    Submit(Submit),
    GetTransactions,
    ExtranonceSubscribe,
    Unrecognized { method: String },
}

impl Request {
    pub fn parse(method: &str, params: Value) -> Result<Self> {
        let context = || InvalidParamsSnafu { method };

        Ok(match method {
            "mining.subscribe" => {
                Self::Subscribe(serde_json::from_value(params).with_context(|_| context())?)
            }
            "mining.authorize" => {
                Self::Authorize(serde_json::from_value(params).with_context(|_| context())?)
            }
            "mining.submit" => {
                Self::Submit(serde_json::from_value(params).with_context(|_| context())?)
            }
            "mining.get_transactions" => Self::GetTransactions,
            "mining.extranonce.subscribe" => Self::ExtranonceSubscribe,
            method => Self::Unrecognized {
                method: method.into(),
            },
        })
    }

    pub fn method(&self) -> &str {
        match self {
            Self::Subscribe(_) => "mining.subscribe",
            Self::Authorize(_) => "mining.authorize",
            Self::Submit(_) => "mining.submit",
            Self::GetTransactions => "mining.get_transactions",
            Self::ExtranonceSubscribe => "mining.extranonce.subscribe",
            Self::Unrecognized { method } => method,
        }
    }
}
