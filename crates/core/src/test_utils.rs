//! Block builders shared by the unit and integration tests.
//!
//! Blocks are mined against targets so easy that a handful of nonces is
//! enough. Enabled for downstream tests through the `test-utils` feature.

use crate::merkle::build_merkle_tree;
use ledgerlink_common::types::{Block, BlockHeader, Hash, OutPoint, Transaction, TxInput, TxOutput};
use ledgerlink_common::work::CompactTarget;

// The name is the work each block contributes.
pub const WORK_1: u32 = 0x2100_8000;
pub const WORK_2: u32 = 0x207f_ffff;
pub const WORK_3: u32 = 0x2055_5555;
pub const WORK_4: u32 = 0x203f_ffff;
pub const WORK_5: u32 = 0x2033_3333;
pub const WORK_16: u32 = 0x200f_ffff;

pub fn coinbase(tag: u32) -> Transaction {
    Transaction {
        outputs: vec![TxOutput {
            value: 50,
            script_pubkey: tag.to_le_bytes().to_vec(),
        }],
        ..Default::default()
    }
}

pub fn spend(from: &Transaction, index: u32) -> Transaction {
    Transaction {
        inputs: vec![TxInput {
            claimed: OutPoint::new(from.hash(), index),
            script_sig: vec![0x51],
        }],
        outputs: vec![TxOutput {
            value: 25,
            script_pubkey: vec![0xac],
        }],
        ..Default::default()
    }
}

/// Bumps the nonce until the header meets its own target.
pub fn solve(block: &mut Block) {
    let target = CompactTarget(block.header.bits);
    while let Ok(false) = target.is_met_by(&block.hash()) {
        block.header.nonce += 1;
    }
}

pub fn mine_with(prev: Hash, bits: u32, transactions: Vec<Transaction>) -> Block {
    let mut block = Block {
        header: BlockHeader {
            version: 1,
            prev_block_hash: prev,
            merkle_root: build_merkle_tree(&transactions),
            bits,
            ..Default::default()
        },
        transactions,
    };
    solve(&mut block);
    block
}

/// A block holding a single coinbase tagged `tag`.
pub fn mine(prev: Hash, bits: u32, tag: u32) -> Block {
    mine_with(prev, bits, vec![coinbase(tag)])
}

/// `count` blocks extending `from`, each with the given target.
pub fn chain(from: Hash, bits: u32, count: u32, first_tag: u32) -> Vec<Block> {
    let mut prev = from;
    (0..count)
        .map(|i| {
            let block = mine(prev, bits, first_tag + i);
            prev = block.hash();
            block
        })
        .collect()
}
