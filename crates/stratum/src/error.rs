use super::*;

pub type Result<T, E = InternalError> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum InternalError {
    #[snafu(display("invalid params for {method}: {source}"))]
    InvalidParams {
        method: String,
        source: serde_json::Error,
    },
}

/// Error codes used in replies to miners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[repr(i32)]
pub enum StratumError {
    #[display("Not supported.")]
    Unsupported = 20,
    #[display("job not found")]
    JobNotFound = 21,
    #[display("duplicate share")]
    Duplicate = 22,
    #[display("low difficulty share")]
    LowDifficulty = 23,
    #[display("unauthorized worker")]
    Unauthorized = 24,
    #[display("not subscribed")]
    NotSubscribed = 25,
}

impl StratumError {
    pub fn into_response(self) -> JsonRpcError {
        JsonRpcError {
            error_code: self as i32,
            message: self.to_string(),
            traceback: None,
        }
    }

    pub fn with_message(self, message: impl Into<String>) -> JsonRpcError {
        JsonRpcError {
            error_code: self as i32,
            message: message.into(),
            traceback: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JsonRpcError {
    pub error_code: i32,
    pub message: String,
    pub traceback: Option<Value>,
}

impl Serialize for JsonRpcError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (&self.error_code, &self.message, &self.traceback).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for JsonRpcError {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let (error_code, message, traceback) =
            <(i32, String, Option<Value>)>::deserialize(deserializer)?;

        Ok(Self {
            error_code,
            message,
            traceback,
        })
    }
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Stratum error {}: {}", self.error_code, self.message)
    }
}

impl From<StratumError> for JsonRpcError {
    fn from(error: StratumError) -> Self {
        error.into_response()
    }
}

/// The `error` member of a reply. `mining.get_transactions` answers with a bare `true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReplyError {
    Stratum(JsonRpcError),
    Flag(bool),
}

impl From<JsonRpcError> for ReplyError {
    fn from(error: JsonRpcError) -> Self {
        Self::Stratum(error)
    }
}

impl From<StratumError> for ReplyError {
    fn from(error: StratumError) -> Self {
        Self::Stratum(error.into_response())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes() {
        assert_eq!(StratumError::Unsupported as i32, 20);
        assert_eq!(StratumError::Unauthorized as i32, 24);
        assert_eq!(StratumError::NotSubscribed as i32, 25);
    }

    #[test]
    fn serializes_as_triple() {
        assert_eq!(
            serde_json::to_value(StratumError::Unsupported.into_response()).unwrap(),
            json!([20, "Not supported.", null])
        );
    }

    #[test]
    fn reply_error_flag() {
        assert_eq!(serde_json::to_value(ReplyError::Flag(true)).unwrap(), json!(true));
        assert_eq!(
            serde_json::from_value::<ReplyError>(json!([25, "not subscribed", null])).unwrap(),
            ReplyError::Stratum(StratumError::NotSubscribed.into_response())
        );
    }
}
