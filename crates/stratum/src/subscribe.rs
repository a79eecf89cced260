use super::*;

#[derive(Debug, PartialEq, Clone, Default)]
pub struct Subscribe {
    pub user_agent: Option<String>,
}

impl<'de> Deserialize<'de> for Subscribe {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Miners send anything from `[]` to `[agent, session, host, port]`.
        let params = Value::deserialize(deserializer)?;

        let user_agent = params
            .as_array()
            .and_then(|params| params.first())
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(Subscribe { user_agent })
    }
}

/// Reply to `mining.subscribe`: `[null, extranonce1]`.
#[derive(Debug, PartialEq, Clone)]
pub struct SubscribeResult {
    pub extranonce1: String,
}

impl Serialize for SubscribeResult {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(2))?;
        seq.serialize_element(&Value::Null)?;
        seq.serialize_element(&self.extranonce1)?;
        seq.end()
    }
}

impl<'de> Deserialize<'de> for SubscribeResult {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let (_, extranonce1) = <(Value, String)>::deserialize(deserializer)?;
        Ok(SubscribeResult { extranonce1 })
    }
}
