use super::*;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Display, Clone)]
#[serde(untagged)]
pub enum Id {
    #[display("null")]
    Null,
    Number(Number),
    String(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request {
        id: Id,
        method: String,
        params: Value,
    },
    Response {
        id: Id,
        result: Option<Value>,
        error: Option<ReplyError>,
    },
    Notification {
        method: String,
        params: Value,
    },
}

impl Message {
    pub fn notification(method: impl Into<String>, params: impl Serialize) -> Self {
        Self::Notification {
            method: method.into(),
            params: serde_json::to_value(params).unwrap_or(Value::Null),
        }
    }
}

/// Miners expect every reply to carry `result` and `error`, even when null, and every
/// notification to carry `"id": null`.
impl Serialize for Message {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(3))?;

        match self {
            Message::Request { id, method, params } => {
                map.serialize_entry("id", id)?;
                map.serialize_entry("method", method)?;
                map.serialize_entry("params", params)?;
            }
            Message::Response { id, result, error } => {
                map.serialize_entry("id", id)?;
                map.serialize_entry("result", result)?;
                map.serialize_entry("error", error)?;
            }
            Message::Notification { method, params } => {
                map.serialize_entry("id", &Id::Null)?;
                map.serialize_entry("method", method)?;
                map.serialize_entry("params", params)?;
            }
        }

        map.end()
    }
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;

        let Some(object) = value.as_object() else {
            return Err(de::Error::custom("message is not an object"));
        };

        let id = match object.get("id") {
            Some(id) => Id::deserialize(id).map_err(de::Error::custom)?,
            None => Id::Null,
        };

        if let Some(method) = object.get("method") {
            let method = method
                .as_str()
                .ok_or_else(|| de::Error::custom("method is not a string"))?
                .to_string();

            let params = object.get("params").cloned().unwrap_or(Value::Null);

            return Ok(if id == Id::Null {
                Message::Notification { method, params }
            } else {
                Message::Request { id, method, params }
            });
        }

        if object.contains_key("result") || object.contains_key("error") {
            let result = object.get("result").filter(|v| !v.is_null()).cloned();

            let error = object
                .get("error")
                .filter(|v| !v.is_null())
                .map(ReplyError::deserialize)
                .transpose()
                .map_err(de::Error::custom)?;

            return Ok(Message::Response { id, result, error });
        }

        Err(de::Error::custom("unknown message format"))
    }
}
