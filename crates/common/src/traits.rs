use crate::error::Result;
use crate::link::ChainLink;
use crate::types::{Hash, TxInput};
use async_trait::async_trait;

/// Durable, queryable map of block hash to chain link.
///
/// A pure store: it never computes orphan/resolved status nor cascades
/// promotions. Only the consensus engine may call the mutating methods.
#[async_trait]
pub trait ChainLinkStore: Send + Sync {
    /// Inserts a new link and returns it with its insertion sequence assigned.
    /// Fails with `LedgerError::DuplicateLink` if the hash is already stored.
    async fn add_link(&self, link: ChainLink) -> Result<ChainLink>;

    async fn get_link(&self, hash: &Hash) -> Result<Option<ChainLink>>;

    /// The unique resolved link at height 0.
    async fn get_genesis_link(&self) -> Result<Option<ChainLink>>;

    /// The resolved link with maximum work, earliest stored on a tie.
    async fn get_last_link(&self) -> Result<Option<ChainLink>>;

    /// Every stored link, orphan or resolved, whose parent is `hash`.
    async fn get_next_links(&self, hash: &Hash) -> Result<Vec<ChainLink>>;

    /// Overwrites the record of an existing link. Status, height and work are
    /// published together; the stored insertion sequence is kept.
    async fn update_link(&self, link: ChainLink) -> Result<()>;

    /// Inserts `link` and applies every record of `promoted` as one unit, so
    /// a failure leaves the store exactly as it was. Entries of `promoted`
    /// that are already resolved are skipped; a missing one fails the batch.
    async fn add_and_promote(&self, link: ChainLink, promoted: Vec<ChainLink>) -> Result<ChainLink>;

    /// Deletes a link that is still an orphan.
    async fn remove_orphan(&self, hash: &Hash) -> Result<ChainLink>;

    /// All orphan links, oldest first.
    async fn get_orphan_links(&self) -> Result<Vec<ChainLink>>;

    async fn link_count(&self) -> Result<usize>;

    /// Walks from `from` (inclusive) toward genesis and returns the first link
    /// whose block contains the transaction `input` claims from.
    async fn get_claimed_link(&self, from: &ChainLink, input: &TxInput) -> Result<Option<ChainLink>> {
        let tx_hash = input.claimed.tx_hash;
        let mut cursor = Some(from.clone());
        while let Some(link) = cursor {
            if link.block.contains_transaction(&tx_hash) {
                return Ok(Some(link));
            }
            cursor = self.parent_of(&link).await?;
        }
        Ok(None)
    }

    /// Walks from `from` (inclusive) toward genesis and returns the first link
    /// holding an input that claims the same outpoint as `input`.
    async fn get_claimer_link(&self, from: &ChainLink, input: &TxInput) -> Result<Option<ChainLink>> {
        let outpoint = input.claimed;
        let mut cursor = Some(from.clone());
        while let Some(link) = cursor {
            if link.block.claimer_of(&outpoint).is_some() {
                return Ok(Some(link));
            }
            cursor = self.parent_of(&link).await?;
        }
        Ok(None)
    }

    /// Parent of `link`, or `None` at genesis or when the parent is not stored.
    async fn parent_of(&self, link: &ChainLink) -> Result<Option<ChainLink>> {
        if link.is_genesis() || link.parent_hash().is_zero() {
            return Ok(None);
        }
        self.get_link(&link.parent_hash()).await
    }
}
