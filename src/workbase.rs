use super::*;

/// Where block rewards go: the pool output plus fee recipients.
#[derive(Debug, Clone, PartialEq)]
pub struct Payout {
    pub pool_script: ScriptBuf,
    pub recipients: Vec<(ScriptBuf, f64)>,
}

impl Payout {
    pub fn new(pool_address: &str, recipients: &[Recipient]) -> Result<Self> {
        Ok(Self {
            pool_script: p2pkh_script(pool_address)
                .with_context(|| format!("invalid pool address `{pool_address}`"))?,
            recipients: recipients
                .iter()
                .map(|recipient| Ok((p2pkh_script(&recipient.address)?, recipient.percent)))
                .collect::<Result<Vec<_>>>()?,
        })
    }
}

/// A block template turned into a job, together with everything needed to assemble the block.
#[derive(Debug)]
pub struct Workbase {
    template: BlockTemplate,
    difficulty: Difficulty,
    total_fees: u64,
    coinbase: Vec<u8>,
    merkle_root: TxMerkleNode,
    header: [u8; 80],
    network_target: U256,
    job: Arc<Job>,
    submits: Mutex<HashSet<String>>,
}

impl Workbase {
    pub fn build(
        job_id: String,
        template: BlockTemplate,
        payout: &Payout,
        algorithm: &Algorithm,
        seeds: &SeedCache,
        override_target: Option<U256>,
    ) -> Result<Self> {
        let network_target = template.target()?;
        let difficulty = Difficulty::from_target(algorithm, network_target);
        let total_fees = template.total_fees();

        let coinbase = CoinbaseBuilder::new(
            template.height,
            payout.pool_script.clone(),
            template.coinbase_value,
        )
        .with_recipients(payout.recipients.clone())
        .with_witness_commitment(template.default_witness_commitment.clone())
        .build()?;

        let txids = template
            .transactions
            .iter()
            .map(TemplateTransaction::merkle_id)
            .collect::<Result<Vec<Txid>>>()?;

        let merkle_root = merkle_root(coinbase.compute_txid(), &txids);

        let header = Self::serialize_header(&template, merkle_root)?;

        let mut header_hash = sha256d::Hash::hash(&header).to_byte_array();
        header_hash.reverse();

        let mut target = difficulty.to_target(algorithm);
        if let Some(override_target) = override_target.filter(|t| !t.is_zero()) {
            if target > override_target {
                target = override_target;
            }
        }

        let job = Arc::new(Job {
            job_id,
            header_hash: hex::encode(header_hash),
            seed_hash: hex::encode(seeds.seed_hash(template.height)),
            target: target_hex(target),
            clean_jobs: true,
            height: template.height,
            bits: template.bits.clone(),
        });

        debug!(
            "Built job {} at height {} with difficulty {difficulty} and {total_fees} in fees",
            job.job_id, template.height
        );

        Ok(Self {
            coinbase: consensus::serialize(&coinbase),
            difficulty,
            header,
            job,
            merkle_root,
            network_target,
            submits: Mutex::new(HashSet::new()),
            template,
            total_fees,
        })
    }

    /// Height, bits, time, merkle root, previous hash and version, big-endian, then the whole
    /// buffer reversed. Equivalent to each field little-endian in reverse order.
    fn serialize_header(template: &BlockTemplate, merkle_root: TxMerkleNode) -> Result<[u8; 80]> {
        let height = u32::try_from(template.height).context("block height out of range")?;

        let bits = <[u8; 4]>::from_hex(&template.bits)
            .with_context(|| format!("invalid bits `{}`", template.bits))?;

        let mut merkle_root = merkle_root.to_byte_array();
        merkle_root.reverse();

        let mut previous_block_hash = template.previous_block_hash.to_byte_array();
        previous_block_hash.reverse();

        let mut header = [0u8; 80];
        BigEndian::write_u32(&mut header[0..4], height);
        header[4..8].copy_from_slice(&bits);
        BigEndian::write_u32(&mut header[8..12], template.current_time);
        header[12..44].copy_from_slice(&merkle_root);
        header[44..76].copy_from_slice(&previous_block_hash);
        BigEndian::write_u32(&mut header[76..80], template.version);

        header.reverse();

        Ok(header)
    }

    pub fn job(&self) -> Arc<Job> {
        self.job.clone()
    }

    pub fn template(&self) -> &BlockTemplate {
        &self.template
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn total_fees(&self) -> u64 {
        self.total_fees
    }

    pub fn network_target(&self) -> U256 {
        self.network_target
    }

    pub fn merkle_root(&self) -> TxMerkleNode {
        self.merkle_root
    }

    pub fn header(&self) -> &[u8; 80] {
        &self.header
    }

    pub fn coinbase(&self) -> &[u8] {
        &self.coinbase
    }

    /// Header, reversed nonce and mix hash, transaction count, coinbase, then template
    /// transactions in order.
    pub fn serialize_block(&self, nonce: &str, mix_hash: &str) -> Result<Vec<u8>> {
        let mut nonce = <[u8; 8]>::from_hex(nonce).with_context(|| format!("invalid nonce `{nonce}`"))?;
        nonce.reverse();

        let mut mix_hash =
            <[u8; 32]>::from_hex(mix_hash).with_context(|| format!("invalid mix hash `{mix_hash}`"))?;
        mix_hash.reverse();

        let mut block = Vec::with_capacity(80 + 40 + 9 + self.coinbase.len());
        block.extend_from_slice(&self.header);
        block.extend_from_slice(&nonce);
        block.extend_from_slice(&mix_hash);
        block.extend(consensus::serialize(&VarInt(
            self.template.transactions.len() as u64 + 1,
        )));
        block.extend_from_slice(&self.coinbase);

        for tx in &self.template.transactions {
            block.extend(
                hex::decode(&tx.data).with_context(|| format!("invalid transaction data `{}`", tx.data))?,
            );
        }

        Ok(block)
    }

    /// Records a header/nonce pair, returning false if it was already seen for this job.
    pub fn register_submit(&self, header: &str, nonce: &str) -> bool {
        self.submits.lock().insert(format!("{header}{nonce}"))
    }
}
