use super::*;

/// Authorizes payout addresses and checks shares against the daemon's KawPoW hash.
pub(crate) struct Validator {
    templates: Arc<Templates>,
    found: Arc<tokio::sync::Notify>,
}

impl Validator {
    pub(crate) fn new(templates: Arc<Templates>, found: Arc<tokio::sync::Notify>) -> Self {
        Self { templates, found }
    }

    async fn submit_block(&self, workbase: &Workbase, share: &Share) -> Result {
        let block = workbase.serialize_block(&share.submit.nonce, &share.submit.mixhash)?;

        self.templates.upstream().submit_block(&block).await?;

        info!(
            "Block found at height {} by {} [{}]",
            workbase.template().height,
            share.worker,
            share.remote
        );

        self.found.notify_one();

        Ok(())
    }
}

fn is_hex(value: &str, len: usize) -> bool {
    value.len() == len && value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Accounts must be base58check payloads of a version byte and a 20-byte hash.
fn is_address(account: &str) -> bool {
    bitcoin::base58::decode_check(account).is_ok_and(|payload| payload.len() == 21)
}

#[async_trait]
impl Hooks for Validator {
    async fn authorize(&self, request: AuthorizeRequest) -> Authorization {
        if is_address(request.username.account()) {
            Authorization::granted()
        } else {
            debug!(
                "Rejecting authorization for `{}` from {}",
                request.username, request.remote
            );
            Authorization::denied(StratumError::Unauthorized)
        }
    }

    async fn submit(&self, share: Share) -> Verdict {
        let submit = &share.submit;

        let Some(workbase) = self.templates.get(&submit.job_id) else {
            return Verdict::reject(StratumError::JobNotFound);
        };

        if !is_hex(&submit.nonce, 16) {
            return Verdict::reject(StratumError::Unsupported.with_message("incorrect size of nonce"));
        }

        if !is_hex(&submit.header, 64) {
            return Verdict::reject(
                StratumError::Unsupported.with_message("incorrect size of header hash"),
            );
        }

        if !is_hex(&submit.mixhash, 64) {
            return Verdict::reject(StratumError::Unsupported.with_message("incorrect size of mixhash"));
        }

        let job = workbase.job();

        if !submit.header.eq_ignore_ascii_case(&job.header_hash) {
            return Verdict::reject(StratumError::Unsupported.with_message("incorrect header hash"));
        }

        if !workbase.register_submit(&submit.header, &submit.nonce) {
            return Verdict::reject(StratumError::Duplicate);
        }

        let hash = match self
            .templates
            .upstream()
            .get_kawpow_hash(
                &submit.header,
                &submit.mixhash,
                &submit.nonce,
                job.height,
                &target_hex(workbase.network_target()),
            )
            .await
        {
            Ok(hash) => hash,
            Err(err) => {
                warn!("Failed to hash share from {}: {err:#}", share.worker);
                return Verdict::reject(
                    StratumError::Unsupported.with_message("share could not be verified"),
                );
            }
        };

        let digest = match parse_target(&hash.digest) {
            Ok(digest) => digest,
            Err(err) => {
                warn!("Daemon returned bad KawPoW digest: {err:#}");
                return Verdict::reject(
                    StratumError::Unsupported.with_message("share could not be verified"),
                );
            }
        };

        if digest <= workbase.network_target() {
            if let Err(err) = self.submit_block(&workbase, &share).await {
                error!(
                    "Failed to submit block at height {}: {err:#}",
                    workbase.template().height
                );
            }
            return Verdict::accept();
        }

        if digest <= share.target {
            return Verdict::accept();
        }

        if share
            .previous_difficulty
            .is_some_and(|previous| digest <= previous.to_target(&Algorithm::KAWPOW))
        {
            return Verdict::accept();
        }

        Verdict::reject(StratumError::LowDifficulty.with_message(format!(
            "low difficulty share of {}",
            Difficulty::from_target(&Algorithm::KAWPOW, digest)
        )))
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::workbase::tests::{POOL, template},
        templates::tests::templates,
    };

    fn validator() -> Validator {
        let templates = Arc::new(templates());
        templates.update(template(), false).unwrap();
        Validator::new(templates, Arc::new(tokio::sync::Notify::new()))
    }

    fn share(validator: &Validator, submit: impl FnOnce(&mut Submit)) -> Share {
        let job = validator.templates.get("1").unwrap().job();

        let mut params = Submit {
            worker: format!("{POOL}.rig"),
            job_id: job.job_id.clone(),
            nonce: "00000000deadbeef".into(),
            header: job.header_hash.clone(),
            mixhash: "11".repeat(32),
        };

        submit(&mut params);

        Share {
            connection: 1,
            remote: IpAddr::from([127, 0, 0, 1]),
            local_port: 3333,
            worker: params.worker.clone(),
            extranonce1: format!("{SUBSCRIPTION_PREFIX}0100000000000000"),
            difficulty: Difficulty::new(1.0),
            previous_difficulty: None,
            target: Difficulty::new(1.0).to_target(&Algorithm::KAWPOW),
            submit: params,
        }
    }

    fn code(verdict: &Verdict) -> Option<i32> {
        verdict.error.as_ref().map(|error| error.error_code)
    }

    #[tokio::test]
    async fn authorizes_addresses_only() {
        let validator = validator();

        let request = |username: &str| AuthorizeRequest {
            remote: IpAddr::from([127, 0, 0, 1]),
            local_port: 3333,
            username: Username::new(username),
            password: None,
            extranonce1: None,
        };

        assert!(validator.authorize(request(&format!("{POOL}.rig"))).await.authorized);

        let denied = validator.authorize(request("satoshi.rig")).await;
        assert!(!denied.authorized);
        assert_eq!(denied.error.unwrap().error_code, 24);

        assert!(!validator.authorize(request("R9HDHYTuwAr3PyRkXrhYgwycrxC7Xja8zz")).await.authorized);
    }

    #[tokio::test]
    async fn unknown_job() {
        let validator = validator();
        let verdict = validator
            .submit(share(&validator, |submit| submit.job_id = "ff".into()))
            .await;

        assert!(!verdict.accepted);
        assert_eq!(code(&verdict), Some(21));
    }

    #[tokio::test]
    async fn header_mismatch() {
        let validator = validator();
        let verdict = validator
            .submit(share(&validator, |submit| submit.header = "22".repeat(32)))
            .await;

        assert_eq!(code(&verdict), Some(20));
        assert_eq!(verdict.error.unwrap().message, "incorrect header hash");
    }

    #[tokio::test]
    async fn malformed_fields() {
        let validator = validator();

        let verdict = validator
            .submit(share(&validator, |submit| submit.nonce = "beef".into()))
            .await;
        assert_eq!(verdict.error.unwrap().message, "incorrect size of nonce");

        let verdict = validator
            .submit(share(&validator, |submit| submit.mixhash = "zz".repeat(32)))
            .await;
        assert_eq!(verdict.error.unwrap().message, "incorrect size of mixhash");
    }

    #[tokio::test]
    async fn duplicate_is_caught_before_hashing() {
        let validator = validator();

        let first = validator.submit(share(&validator, |_| {})).await;
        assert_eq!(
            first.error.unwrap().message,
            "share could not be verified"
        );

        let second = validator.submit(share(&validator, |_| {})).await;
        assert_eq!(code(&second), Some(22));
    }
}
