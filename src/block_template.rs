use super::*;

/// The subset of a `getblocktemplate` result used to build jobs.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct BlockTemplate {
    pub height: u64,
    pub bits: String,
    #[serde(rename = "curtime")]
    pub current_time: u32,
    pub version: u32,
    #[serde(rename = "previousblockhash")]
    pub previous_block_hash: BlockHash,
    pub target: String,
    #[serde(rename = "coinbasevalue", with = "bitcoin::amount::serde::as_sat")]
    pub coinbase_value: Amount,
    #[serde(default)]
    pub transactions: Vec<TemplateTransaction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_witness_commitment: Option<ScriptBuf>,
}

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct TemplateTransaction {
    pub data: String,
    #[serde(default)]
    pub fee: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub txid: Option<Txid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<Txid>,
}

impl TemplateTransaction {
    /// The id used for the merkle tree, falling back to `hash` when `txid` is absent.
    pub fn merkle_id(&self) -> Result<Txid> {
        self.txid
            .or(self.hash)
            .ok_or_else(|| anyhow!("template transaction has neither txid nor hash"))
    }
}

impl BlockTemplate {
    pub fn total_fees(&self) -> u64 {
        self.transactions.iter().map(|tx| tx.fee).sum()
    }

    pub fn target(&self) -> Result<U256> {
        parse_target(&self.target)
    }
}
