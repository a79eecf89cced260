use super::*;

/// Workbases issued for the current chain tip, keyed by job id.
#[derive(Debug, Default)]
pub(crate) struct Jobs {
    latest: Option<Arc<Workbase>>,
    next_id: u64,
    valid: HashMap<String, Arc<Workbase>>,
}

impl Jobs {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn next_id(&mut self) -> String {
        self.next_id = self.next_id.wrapping_add(1);
        format!("{:x}", self.next_id)
    }

    pub(crate) fn get(&self, job_id: &str) -> Option<Arc<Workbase>> {
        self.valid.get(job_id).cloned()
    }

    pub(crate) fn latest(&self) -> Option<Arc<Workbase>> {
        self.latest.clone()
    }

    /// Makes `workbase` the current job. Older jobs are dropped when the previous block hash
    /// changed. Returns whether that happened.
    pub(crate) fn insert(&mut self, workbase: Arc<Workbase>) -> bool {
        let new_tip = self.latest.as_ref().is_none_or(|latest| {
            latest.template().previous_block_hash != workbase.template().previous_block_hash
        });

        if new_tip {
            self.valid.clear();
        }

        self.valid
            .insert(workbase.job().job_id.clone(), workbase.clone());
        self.latest = Some(workbase);

        new_tip
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::workbase::tests::{template, workbase},
    };

    #[track_caller]
    fn assert_invariants(jobs: &Jobs) {
        assert_eq!(jobs.latest.is_some(), !jobs.valid.is_empty());

        if let Some(latest) = &jobs.latest {
            assert!(jobs.valid.contains_key(&latest.job().job_id));
        }
    }

    #[test]
    fn ids_are_hex_counters() {
        let mut jobs = Jobs::new();
        assert_eq!(jobs.next_id(), "1");

        jobs.next_id = 9;
        assert_eq!(jobs.next_id(), "a");

        jobs.next_id = u64::MAX;
        assert_eq!(jobs.next_id(), "0");
    }

    #[test]
    fn same_tip_keeps_older_jobs() {
        let mut jobs = Jobs::new();

        let id_1 = jobs.next_id();
        assert!(jobs.insert(Arc::new(workbase(&id_1, template()))));
        assert_invariants(&jobs);

        let mut refreshed = template();
        refreshed.current_time += 30;
        let id_2 = jobs.next_id();
        assert!(!jobs.insert(Arc::new(workbase(&id_2, refreshed))));
        assert_invariants(&jobs);

        assert_eq!(jobs.valid.len(), 2);
        assert!(jobs.get(&id_1).is_some());
        assert_eq!(jobs.latest().unwrap().job().job_id, id_2);
    }

    #[test]
    fn new_tip_clears_jobs() {
        let mut jobs = Jobs::new();

        let id_1 = jobs.next_id();
        jobs.insert(Arc::new(workbase(&id_1, template())));

        let mut next = template();
        next.height += 1;
        next.previous_block_hash = BlockHash::from_byte_array([7; 32]);
        let id_2 = jobs.next_id();
        assert!(jobs.insert(Arc::new(workbase(&id_2, next))));
        assert_invariants(&jobs);

        assert_eq!(jobs.valid.len(), 1);
        assert!(jobs.get(&id_1).is_none());
        assert!(jobs.get(&id_2).is_some());
    }
}
