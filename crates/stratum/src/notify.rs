use super::*;

/// `mining.notify` parameters for KawPoW.
#[derive(Debug, PartialEq, Clone)]
pub struct Notify {
    pub job_id: String,
    pub header_hash: String,
    pub seed_hash: String,
    pub target: String,
    pub clean_jobs: bool,
    pub height: u64,
    pub bits: String,
}

impl Serialize for Notify {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(7))?;
        seq.serialize_element(&self.job_id)?;
        seq.serialize_element(&self.header_hash)?;
        seq.serialize_element(&self.seed_hash)?;
        seq.serialize_element(&self.target)?;
        seq.serialize_element(&self.clean_jobs)?;
        seq.serialize_element(&self.height)?;
        seq.serialize_element(&self.bits)?;
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Notify {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let (job_id, header_hash, seed_hash, target, clean_jobs, height, bits) =
            <(String, String, String, String, bool, u64, String)>::deserialize(deserializer)?;

        Ok(Notify {
            job_id,
            header_hash,
            seed_hash,
            target,
            clean_jobs,
            height,
            bits,
        })
    }
}
