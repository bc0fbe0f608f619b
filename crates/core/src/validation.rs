use crate::config::ConsensusConfig;
use crate::merkle::build_merkle_tree;
use chrono::Utc;
use ledgerlink_common::error::{LedgerError, Result, ValidationError};
use ledgerlink_common::types::{Block, Hash, OutPoint, Transaction, TxInput, TxOutput};
use ledgerlink_common::work::{ChainWork, CompactTarget};
use ledgerlink_common::{ChainLink, ChainLinkStore};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Structural self-consistency checks that need nothing but the block.
#[derive(Debug, Clone)]
pub struct BlockValidator {
    /// Maximum allowed timestamp drift from current time (seconds)
    max_future_drift_secs: i64,
}

impl BlockValidator {
    pub fn new(config: &ConsensusConfig) -> Self {
        Self {
            max_future_drift_secs: config.max_future_drift_secs,
        }
    }

    /// Validates the block and returns the work its own target contributes.
    pub fn validate(&self, block: &Block) -> std::result::Result<ChainWork, ValidationError> {
        let hash = block.hash();
        debug!("Validating block {}", hash);

        // 1. Transactions
        validate_transactions(block)?;

        // 2. Merkle root
        validate_merkle_root(block)?;

        // 3. Proof of work against the block's own target
        let work = validate_proof_of_work(block, &hash)?;

        // 4. Timestamp
        self.validate_timestamp(block)?;

        Ok(work)
    }

    fn validate_timestamp(&self, block: &Block) -> std::result::Result<(), ValidationError> {
        let now = Utc::now().timestamp();
        let limit = now.saturating_add(self.max_future_drift_secs);
        if block.header.timestamp > limit {
            warn!(
                "Block timestamp {} is beyond the allowed drift (limit {})",
                block.header.timestamp, limit
            );
            return Err(ValidationError::InvalidTimestamp(format!(
                "{} is more than {}s ahead of local time",
                block.header.timestamp, self.max_future_drift_secs
            )));
        }
        Ok(())
    }
}

impl Default for BlockValidator {
    fn default() -> Self {
        Self::new(&ConsensusConfig::default())
    }
}

fn validate_transactions(block: &Block) -> std::result::Result<(), ValidationError> {
    if block.transactions.is_empty() {
        return Err(ValidationError::EmptyBlock);
    }

    for (index, tx) in block.transactions.iter().enumerate() {
        if tx.outputs.is_empty() {
            return Err(ValidationError::InvalidTransaction {
                index,
                reason: "no outputs".to_string(),
            });
        }

        let mut claimed = HashSet::new();
        if let Some(input) = tx.inputs.iter().find(|input| !claimed.insert(input.claimed)) {
            return Err(ValidationError::InvalidTransaction {
                index,
                reason: format!("claims {} more than once", input.claimed),
            });
        }
    }
    Ok(())
}

fn validate_merkle_root(block: &Block) -> std::result::Result<(), ValidationError> {
    let actual = build_merkle_tree(&block.transactions);
    if actual != block.header.merkle_root {
        warn!("Merkle root mismatch: header {}, computed {}", block.header.merkle_root, actual);
        return Err(ValidationError::MerkleMismatch {
            expected: block.header.merkle_root,
            actual,
        });
    }
    Ok(())
}

fn validate_proof_of_work(block: &Block, hash: &Hash) -> std::result::Result<ChainWork, ValidationError> {
    let target = CompactTarget(block.header.bits);
    if !target.is_met_by(hash)? {
        return Err(ValidationError::InsufficientWork(*hash));
    }
    ChainWork::from_bits(block.header.bits)
}

/// Decides whether an input may spend the output it claims.
///
/// Script semantics live outside the engine; this is the seam a script
/// interpreter plugs into.
pub trait ScriptVerifier: Send + Sync {
    fn verify(&self, input: &TxInput, claimed: &TxOutput) -> bool;
}

/// Accepts every input.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllScripts;

impl ScriptVerifier for AcceptAllScripts {
    fn verify(&self, _input: &TxInput, _claimed: &TxOutput) -> bool {
        true
    }
}

/// Checks a candidate block's claims against the branch ending at its parent.
///
/// Spend validity is branch-relative: an output claimed on a competing
/// branch is still spendable here.
pub struct SpendValidator<'a, S: ?Sized, V> {
    store: &'a S,
    verifier: V,
}

impl<'a, S, V> SpendValidator<'a, S, V>
where
    S: ChainLinkStore + ?Sized,
    V: ScriptVerifier,
{
    pub fn new(store: &'a S, verifier: V) -> Self {
        Self { store, verifier }
    }

    pub async fn validate(&self, block: &Block) -> Result<()> {
        let parent = self.branch_head(block).await?;

        let mut in_block: HashMap<Hash, &Transaction> = HashMap::new();
        let mut claimed_here: HashSet<OutPoint> = HashSet::new();

        for (index, tx) in block.transactions.iter().enumerate() {
            for input in &tx.inputs {
                if !claimed_here.insert(input.claimed) {
                    return Err(reject(index, format!("{} claimed twice in block", input.claimed)));
                }

                let output = match in_block.get(&input.claimed.tx_hash) {
                    Some(earlier) => claimed_output(earlier, input, index)?,
                    None => {
                        let output = self.claimed_on_branch(parent.as_ref(), input, index).await?;
                        if let Some(head) = parent.as_ref() {
                            if let Some(claimer) = self.store.get_claimer_link(head, input).await? {
                                return Err(reject(
                                    index,
                                    format!("{} already claimed in block {}", input.claimed, claimer.hash()),
                                ));
                            }
                        }
                        output
                    }
                };

                if !self.verifier.verify(input, &output) {
                    return Err(reject(index, format!("script rejected claim on {}", input.claimed)));
                }
            }
            in_block.insert(tx.hash(), tx);
        }
        Ok(())
    }

    /// The resolved parent, or `None` for a genesis candidate.
    async fn branch_head(&self, block: &Block) -> Result<Option<ChainLink>> {
        let prev = block.prev_hash();
        if prev.is_zero() {
            return Ok(None);
        }
        match self.store.get_link(&prev).await? {
            Some(parent) if parent.is_resolved() => Ok(Some(parent)),
            Some(_) => Err(LedgerError::NotFound(format!("parent {} is not resolved", prev))),
            None => Err(LedgerError::NotFound(format!("parent {}", prev))),
        }
    }

    async fn claimed_on_branch(&self, head: Option<&ChainLink>, input: &TxInput, index: usize) -> Result<TxOutput> {
        let link = match head {
            Some(head) => self.store.get_claimed_link(head, input).await?,
            None => None,
        };
        let tx = link
            .as_ref()
            .and_then(|link| link.block.find_transaction(&input.claimed.tx_hash))
            .ok_or_else(|| reject(index, format!("claims unknown transaction {}", input.claimed.tx_hash)))?;
        claimed_output(tx, input, index)
    }
}

fn claimed_output(tx: &Transaction, input: &TxInput, index: usize) -> Result<TxOutput> {
    tx.outputs
        .get(input.claimed.index as usize)
        .cloned()
        .ok_or_else(|| reject(index, format!("output {} does not exist", input.claimed)))
}

fn reject(index: usize, reason: String) -> LedgerError {
    ValidationError::InvalidTransaction { index, reason }.into()
}
