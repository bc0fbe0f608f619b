use ledgerlink_common::types::{Hash, Transaction};
use sha2::{Digest, Sha256};

/// SHA-256 of left ++ right.
fn merge_hash(left: &[u8], right: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().to_vec()
}

/// Builds the Merkle tree over the transaction hashes and returns the root.
///
/// Levels are folded pairwise. A node left without a partner is merged with
/// an empty node, which also applies to a lone transaction, so the root of a
/// one-transaction block is `sha256(tx_hash)` rather than the tx hash itself.
/// An empty block has the zero root.
pub fn build_merkle_tree(txs: &[Transaction]) -> Hash {
    if txs.is_empty() {
        return Hash::ZERO;
    }

    let mut level: Vec<Vec<u8>> = txs.iter().map(|tx| tx.hash().0.to_vec()).collect();
    loop {
        level = level
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => merge_hash(left, right),
                [single] => merge_hash(single, &[]),
                _ => unreachable!("chunks(2) yields one or two nodes"),
            })
            .collect();

        if level.len() == 1 {
            break;
        }
    }

    Hash::from_slice(&level[0])
}
