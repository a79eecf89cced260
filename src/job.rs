use super::*;

/// Immutable unit of work broadcast to miners.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub job_id: String,
    pub header_hash: String,
    pub seed_hash: String,
    pub target: String,
    pub clean_jobs: bool,
    pub height: u64,
    pub bits: String,
}

impl Job {
    /// Notify parameters carrying the recipient's own share target.
    pub fn notify(&self, target: String) -> Notify {
        Notify {
            job_id: self.job_id.clone(),
            header_hash: self.header_hash.clone(),
            seed_hash: self.seed_hash.clone(),
            target,
            clean_jobs: self.clean_jobs,
            height: self.height,
            bits: self.bits.clone(),
        }
    }
}
