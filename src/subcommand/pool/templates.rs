use super::*;

/// Turns daemon templates into jobs and keeps the jobs valid for the current tip.
pub(crate) struct Templates {
    upstream: Arc<Upstream>,
    payout: Payout,
    seeds: SeedCache,
    override_target: Option<U256>,
    jobs: Mutex<Jobs>,
}

impl Templates {
    pub(crate) fn new(upstream: Arc<Upstream>, payout: Payout, override_target: Option<U256>) -> Self {
        Self {
            upstream,
            payout,
            seeds: SeedCache::new(Algorithm::KAWPOW),
            override_target,
            jobs: Mutex::new(Jobs::new()),
        }
    }

    pub(crate) fn upstream(&self) -> &Upstream {
        &self.upstream
    }

    pub(crate) fn get(&self, job_id: &str) -> Option<Arc<Workbase>> {
        self.jobs.lock().get(job_id)
    }

    /// Fetches a template and broadcasts a job built from it. Unless `force` is set, a
    /// template on the same tip as the current job is ignored. Returns the broadcast job.
    pub(crate) async fn refresh(&self, registry: &Registry, force: bool) -> Result<Option<Arc<Job>>> {
        let template = self
            .upstream
            .get_block_template()
            .await
            .context("failed to fetch block template")?;

        let Some(workbase) = self.update(template, force)? else {
            return Ok(None);
        };

        let job = workbase.job();

        registry.broadcast(job.clone());

        Ok(Some(job))
    }

    /// Builds and stores a workbase for `template`. A failed build leaves the current job in
    /// place.
    pub(crate) fn update(&self, template: BlockTemplate, force: bool) -> Result<Option<Arc<Workbase>>> {
        let mut jobs = self.jobs.lock();

        if let Some(latest) = jobs.latest() {
            let current = latest.template();

            if template.height < current.height {
                debug!(
                    "Ignoring stale template at height {} below {}",
                    template.height, current.height
                );
                return Ok(None);
            }

            if !force && template.previous_block_hash == current.previous_block_hash {
                return Ok(None);
            }
        }

        let job_id = jobs.next_id();

        let workbase = Arc::new(
            Workbase::build(
                job_id,
                template,
                &self.payout,
                &Algorithm::KAWPOW,
                &self.seeds,
                self.override_target,
            )
            .context("failed to build job from template")?,
        );

        let new_block = jobs.insert(workbase.clone());

        info!(
            "{} job {} at height {} (difficulty {}, {} transactions)",
            if new_block { "New block" } else { "Refreshed" },
            workbase.job().job_id,
            workbase.template().height,
            workbase.difficulty(),
            workbase.template().transactions.len(),
        );

        Ok(Some(workbase))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use {
        super::*,
        crate::{
            upstream::UpstreamOptions,
            workbase::tests::{POOL, template},
        },
    };

    pub(crate) fn templates() -> Templates {
        Templates::new(
            Arc::new(
                Upstream::new(UpstreamOptions {
                    url: "http://127.0.0.1:1".into(),
                    username: "user".into(),
                    password: "pass".into(),
                    timeout: Duration::from_secs(1),
                })
                .unwrap(),
            ),
            Payout::new(POOL, &[]).unwrap(),
            None,
        )
    }

    #[test]
    fn first_template_becomes_job_one() {
        let templates = templates();

        let workbase = templates.update(template(), false).unwrap().unwrap();

        assert_eq!(workbase.job().job_id, "1");
        assert!(templates.get("1").is_some());
    }

    #[test]
    fn same_tip_needs_force() {
        let templates = templates();
        templates.update(template(), false).unwrap();

        assert!(templates.update(template(), false).unwrap().is_none());

        let forced = templates.update(template(), true).unwrap().unwrap();
        assert_eq!(forced.job().job_id, "2");
        assert!(templates.get("1").is_some());
    }

    #[test]
    fn new_tip_replaces_jobs() {
        let templates = templates();
        templates.update(template(), false).unwrap();

        let mut next = template();
        next.height += 1;
        next.previous_block_hash = BlockHash::from_byte_array([9; 32]);

        let workbase = templates.update(next, false).unwrap().unwrap();

        assert_eq!(workbase.job().height, 3_000_001);
        assert!(templates.get("1").is_none());
    }

    #[test]
    fn stale_template_is_ignored() {
        let templates = templates();
        templates.update(template(), false).unwrap();

        let mut stale = template();
        stale.height -= 1;
        stale.previous_block_hash = BlockHash::from_byte_array([9; 32]);

        assert!(templates.update(stale, true).unwrap().is_none());
    }

    #[test]
    fn failed_build_keeps_previous_job() {
        let templates = templates();
        templates.update(template(), false).unwrap();

        let mut broken = template();
        broken.previous_block_hash = BlockHash::from_byte_array([9; 32]);
        broken.bits = "zz".into();

        assert!(templates.update(broken, false).is_err());
        assert!(templates.get("1").is_some());
        assert_eq!(templates.jobs.lock().latest().unwrap().job().job_id, "1");
    }
}
