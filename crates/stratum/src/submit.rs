use super::*;

/// `mining.submit` parameters. Hex fields arrive `0x`-prefixed and are stored without it.
#[derive(Debug, PartialEq, Clone)]
pub struct Submit {
    pub worker: String,
    pub job_id: String,
    pub nonce: String,
    pub header: String,
    pub mixhash: String,
}

fn strip_prefix(s: String) -> String {
    match s.strip_prefix("0x") {
        Some(stripped) => stripped.to_string(),
        None => s,
    }
}

impl Serialize for Submit {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(5))?;
        seq.serialize_element(&self.worker)?;
        seq.serialize_element(&self.job_id)?;
        seq.serialize_element(&format!("0x{}", self.nonce))?;
        seq.serialize_element(&format!("0x{}", self.header))?;
        seq.serialize_element(&format!("0x{}", self.mixhash))?;
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Submit {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let (worker, job_id, nonce, header, mixhash) =
            <(String, String, String, String, String)>::deserialize(deserializer)?;

        Ok(Submit {
            worker,
            job_id,
            nonce: strip_prefix(nonce),
            header: strip_prefix(header),
            mixhash: strip_prefix(mixhash),
        })
    }
}
