use {
    derive_more::Display,
    serde::{
        Deserialize, Serialize, Serializer,
        de::{self, Deserializer},
        ser::{SerializeMap, SerializeSeq},
    },
    serde_json::{Number, Value},
    snafu::Snafu,
    std::fmt::{self, Formatter},
};

pub use {
    authorize::Authorize,
    error::{InternalError, JsonRpcError, ReplyError, Result, StratumError},
    message::{Id, Message},
    notify::Notify,
    request::Request,
    set_target::SetTarget,
    submit::Submit,
    subscribe::{Subscribe, SubscribeResult},
    username::Username,
};

mod authorize;
mod error;
mod message;
mod notify;
mod request;
mod set_target;
mod submit;
mod subscribe;
mod username;

#[cfg(test)]
use serde_json::json;
