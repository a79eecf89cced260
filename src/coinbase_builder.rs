use super::*;

/// Pay-to-pubkey-hash script for a base58check address.
pub fn p2pkh_script(address: &str) -> Result<ScriptBuf> {
    let payload = bitcoin::base58::decode_check(address)
        .with_context(|| format!("invalid base58check address `{address}`"))?;

    ensure!(
        payload.len() == 21,
        "address `{address}` has a {} byte payload, expected 21",
        payload.len()
    );

    let mut hash = [0; 20];
    hash.copy_from_slice(&payload[1..]);

    Ok(ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array(hash)))
}

#[derive(Clone)]
pub struct CoinbaseBuilder {
    height: u64,
    pool_script: ScriptBuf,
    recipients: Vec<(ScriptBuf, f64)>,
    reward: Amount,
    witness_commitment: Option<ScriptBuf>,
}

impl CoinbaseBuilder {
    const MAX_COINBASE_SCRIPT_SIG_SIZE: usize = 100;
    const POOL_TAG: &'static [u8] = b"kawpow";

    pub fn new(height: u64, pool_script: ScriptBuf, reward: Amount) -> Self {
        Self {
            height,
            pool_script,
            recipients: Vec::new(),
            reward,
            witness_commitment: None,
        }
    }

    pub fn with_recipients(mut self, recipients: Vec<(ScriptBuf, f64)>) -> Self {
        self.recipients = recipients;
        self
    }

    pub fn with_witness_commitment(mut self, witness_commitment: Option<ScriptBuf>) -> Self {
        self.witness_commitment = witness_commitment;
        self
    }

    fn script_sig(&self) -> Result<ScriptBuf> {
        let mut buf: Vec<u8> = Vec::with_capacity(Self::MAX_COINBASE_SCRIPT_SIG_SIZE);

        let mut minimally_encoded_height = [0u8; 8];
        let len = write_scriptint(
            &mut minimally_encoded_height,
            self.height.try_into().context("block height out of range")?,
        );
        buf.push(len as u8);
        buf.extend_from_slice(&minimally_encoded_height[..len]);

        // OP_0
        buf.push(0x00);
        buf.extend_from_slice(Self::POOL_TAG);

        ensure!(
            buf.len() <= Self::MAX_COINBASE_SCRIPT_SIG_SIZE,
            "Script sig too large is {} bytes (max {})",
            buf.len(),
            Self::MAX_COINBASE_SCRIPT_SIG_SIZE
        );

        Ok(ScriptBuf::from_bytes(buf))
    }

    pub fn build(self) -> Result<Transaction> {
        let script_sig = self.script_sig()?;

        let reward = self.reward.to_sat();

        let mut payouts = Vec::with_capacity(self.recipients.len());
        for (script_pubkey, percent) in self.recipients {
            ensure!(
                percent.is_finite() && percent >= 0.0,
                "invalid recipient percentage {percent}"
            );

            payouts.push(TxOut {
                value: Amount::from_sat((reward as f64 * percent / 100.0).round() as u64),
                script_pubkey,
            });
        }

        let paid = payouts.iter().map(|output| output.value.to_sat()).sum::<u64>();

        let pool_reward = reward
            .checked_sub(paid)
            .ok_or_else(|| anyhow!("recipients take {paid} of a {reward} reward"))?;

        let mut output = vec![TxOut {
            value: Amount::from_sat(pool_reward),
            script_pubkey: self.pool_script,
        }];

        output.extend(payouts);

        if let Some(witness_commitment) = self.witness_commitment {
            output.push(TxOut {
                value: Amount::ZERO,
                script_pubkey: witness_commitment,
            });
        }

        Ok(Transaction {
            version: bitcoin::transaction::Version::ONE,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint::null(),
                script_sig,
                sequence: Sequence::MAX,
                witness: Witness::new(),
            }],
            output,
        })
    }
}

#[cfg(test)]
mod tests {
    use {super::*, pretty_assertions::assert_eq as pretty_assert_eq};

    const POOL: &str = "R9HDHYTuwAr3PyRkXrhYgwycrxC7Xja8zs";
    const FEE_A: &str = "RAqS1bAuWqW2f6ufsU5H4XpKfy5Pqj2oHz";
    const FEE_B: &str = "RCPfwfTXRrCVFCT9GmAS2YJSafhC2XqEbD";

    fn builder(height: u64, reward: u64) -> CoinbaseBuilder {
        CoinbaseBuilder::new(
            height,
            p2pkh_script(POOL).unwrap(),
            Amount::from_sat(reward),
        )
    }

    #[test]
    fn exact_serialization() {
        let tx = builder(3_000_000, 1_000_000_000)
            .with_recipients(vec![
                (p2pkh_script(FEE_A).unwrap(), 1.5),
                (p2pkh_script(FEE_B).unwrap(), 0.3333),
            ])
            .build()
            .unwrap();

        pretty_assert_eq!(
            hex::encode(consensus::serialize(&tx)),
            "01000000010000000000000000000000000000000000000000000000000000000000000000ffffffff0b03c0c62d006b6177706f77ffffffff03b80c833a000000001976a914000102030405060708090a0b0c0d0e0f1011121388acc0e1e400000000001976a914111111111111111111111111111111111111111188ac88db3200000000001976a914222222222222222222222222222222222222222288ac00000000"
        );

        assert_eq!(
            tx.compute_txid().to_string(),
            "b2848f4148f642513bdae0dd279ce060b70938e9967adbe3a4c7bcd931e0527d"
        );
    }

    #[test]
    fn payouts_sum_to_reward() {
        let tx = builder(100, 999_999_999)
            .with_recipients(vec![
                (p2pkh_script(FEE_A).unwrap(), 33.3333),
                (p2pkh_script(FEE_B).unwrap(), 33.3333),
            ])
            .build()
            .unwrap();

        let total = tx.output.iter().map(|o| o.value.to_sat()).sum::<u64>();
        assert_eq!(total, 999_999_999);
        assert_eq!(tx.output[0].script_pubkey, p2pkh_script(POOL).unwrap());
    }

    #[test]
    fn recipients_exceeding_reward() {
        let err = builder(100, 1000)
            .with_recipients(vec![
                (p2pkh_script(FEE_A).unwrap(), 60.0),
                (p2pkh_script(FEE_B).unwrap(), 60.0),
            ])
            .build()
            .unwrap_err();

        assert!(err.to_string().contains("recipients take"), "{err}");
    }

    #[test]
    fn witness_commitment_is_last_with_zero_value() {
        let commitment = ScriptBuf::from_bytes(
            hex::decode("6a24aa21a9ede2f61c3f71d1defd3fa999dfa36953755c690689799962b48bebd836974e8cf9")
                .unwrap(),
        );

        let tx = builder(1, 5000)
            .with_witness_commitment(Some(commitment.clone()))
            .build()
            .unwrap();

        let last = tx.output.last().unwrap();
        assert_eq!(last.value, Amount::ZERO);
        assert_eq!(last.script_pubkey, commitment);
        assert_eq!(tx.output[0].value, Amount::from_sat(5000));
    }

    #[test]
    fn height_push_is_minimal() {
        #[track_caller]
        fn case(height: u64, expected: &str) {
            let tx = builder(height, 1).build().unwrap();
            let script_sig = tx.input[0].script_sig.as_bytes();
            assert_eq!(hex::encode(&script_sig[..script_sig.len() - 7]), expected);
            assert!(script_sig.ends_with(b"\x00kawpow"));
        }

        case(1, "0101");
        case(0x7f, "017f");
        case(0x80, "028000");
        case(3_000_000, "03c0c62d");
    }

    #[test]
    fn rejects_bad_addresses() {
        assert!(p2pkh_script("not-an-address").is_err());
        assert!(p2pkh_script("R9HDHYTuwAr3PyRkXrhYgwycrxC7Xja8zt").is_err());
    }
}
