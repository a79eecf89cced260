use super::*;

/// Merkle root over the coinbase followed by the template transactions, in template order.
pub fn merkle_root(coinbase: Txid, transactions: &[Txid]) -> TxMerkleNode {
    let hashes = std::iter::once(coinbase)
        .chain(transactions.iter().copied())
        .map(|txid| TxMerkleNode::from_raw_hash(txid.to_raw_hash()));

    // never empty, the coinbase is always present
    bitcoin::merkle_tree::calculate_root(hashes)
        .unwrap_or_else(|| TxMerkleNode::from_raw_hash(coinbase.to_raw_hash()))
}
