use ledgerlink_common::error::{LedgerError, Result};
use ledgerlink_common::types::{Block, Hash, OutPoint, TxInput};
use ledgerlink_common::{ChainLink, ChainLinkStore};
use std::collections::HashMap;
use tracing::error;

/// The blocks from genesis to one chosen tip.
///
/// Built once by walking parent hashes and not maintained afterwards; keep
/// the value around to answer several queries against the same tip.
#[derive(Debug, Clone)]
pub struct BlockPath {
    /// Genesis first. Index equals height.
    links: Vec<ChainLink>,
    index: HashMap<Hash, usize>,
}

impl BlockPath {
    pub async fn to_tip<S>(store: &S, tip_hash: &Hash) -> Result<Self>
    where
        S: ChainLinkStore + ?Sized,
    {
        let tip = store
            .get_link(tip_hash)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("link {}", tip_hash)))?;
        Self::from_link(store, tip).await
    }

    pub async fn from_link<S>(store: &S, tip: ChainLink) -> Result<Self>
    where
        S: ChainLinkStore + ?Sized,
    {
        let height = tip
            .height()
            .ok_or_else(|| LedgerError::NotFound(format!("path to orphan link {}", tip.hash())))?;

        let mut links = Vec::with_capacity(height as usize + 1);
        let mut cursor = Some(tip);
        while let Some(link) = cursor {
            cursor = store.parent_of(&link).await?;
            links.push(link);
        }
        links.reverse();

        if !links.first().is_some_and(|l| l.is_genesis()) || links.len() as u64 != height + 1 {
            error!("Path to height {} has {} links and no genesis root", height, links.len());
            return Err(LedgerError::Invariant(format!(
                "broken ancestry: {} links for height {}",
                links.len(),
                height
            )));
        }

        let index = links.iter().enumerate().map(|(i, l)| (l.hash(), i)).collect();
        Ok(Self { links, index })
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn tip(&self) -> &ChainLink {
        // from_link never builds an empty path
        &self.links[self.links.len() - 1]
    }

    pub fn genesis(&self) -> &ChainLink {
        &self.links[0]
    }

    pub fn links(&self) -> &[ChainLink] {
        &self.links
    }

    /// Blocks in chain order.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> + '_ {
        self.links.iter().map(|l| &l.block)
    }

    pub fn block_at(&self, height: u64) -> Option<&Block> {
        self.links.get(usize::try_from(height).ok()?).map(|l| &l.block)
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.index.contains_key(hash)
    }

    pub fn link(&self, hash: &Hash) -> Option<&ChainLink> {
        self.index.get(hash).map(|&i| &self.links[i])
    }

    /// The input on this path that claims `outpoint`, if it was spent here.
    pub fn get_claimer_input(&self, outpoint: &OutPoint) -> Option<&TxInput> {
        self.blocks().find_map(|block| block.claimer_of(outpoint))
    }
}
