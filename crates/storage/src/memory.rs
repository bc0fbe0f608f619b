use async_trait::async_trait;
use ledgerlink_common::error::{LedgerError, Result, StorageError};
use ledgerlink_common::{ChainLink, ChainLinkStore, Hash};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Default)]
struct MemoryState {
    links: HashMap<Hash, ChainLink>,
    // parent -> children, in insertion order
    children: HashMap<Hash, Vec<Hash>>,
    genesis: Option<Hash>,
    best: Option<Hash>,
    next_seq: u64,
}

impl MemoryState {
    fn check_genesis(&self, link: &ChainLink) -> Result<()> {
        match self.genesis {
            Some(existing) if link.is_genesis() && existing != link.hash() => Err(LedgerError::Invariant(format!(
                "second genesis link {} (existing {})",
                link.hash(),
                existing
            ))),
            _ => Ok(()),
        }
    }

    fn record_resolved(&mut self, link: &ChainLink) {
        if link.is_genesis() {
            self.genesis = Some(link.hash());
        }

        let better = match self.best.and_then(|h| self.links.get(&h)) {
            Some(current) => link.is_better_tip_than(current),
            None => link.is_resolved(),
        };
        if better {
            self.best = Some(link.hash());
        }
    }

    // Every check runs before the first write.
    fn insert(&mut self, mut link: ChainLink) -> Result<ChainLink> {
        let hash = link.hash();
        if self.links.contains_key(&hash) {
            return Err(LedgerError::DuplicateLink(hash));
        }
        self.check_genesis(&link)?;

        link.seq = self.next_seq;
        self.next_seq += 1;
        self.children.entry(link.parent_hash()).or_default().push(hash);
        self.links.insert(hash, link.clone());
        if link.is_resolved() {
            self.record_resolved(&link);
        }

        debug!(hash = %hash, seq = link.seq, orphan = link.is_orphan(), "Stored link");
        Ok(link)
    }

    /// Seq of the orphan record `link` would overwrite, or `None` when the
    /// stored record is already resolved.
    fn check_update(&self, link: &ChainLink) -> Result<Option<u64>> {
        let hash = link.hash();
        let stored = self.links.get(&hash).ok_or(StorageError::Missing(hash))?;
        // Resolved records are final.
        if stored.is_resolved() {
            return Ok(None);
        }
        self.check_genesis(link)?;
        Ok(Some(stored.seq))
    }

    fn apply_update(&mut self, link: ChainLink, seq: u64) {
        let updated = link.with_seq(seq);
        self.links.insert(updated.hash(), updated.clone());
        if updated.is_resolved() {
            self.record_resolved(&updated);
        }
    }
}

/// Arena store: links live in one map keyed by hash and every traversal is
/// a key lookup. A single lock publishes each record whole.
#[derive(Default)]
pub struct MemoryLinkStore {
    state: RwLock<MemoryState>,
}

impl MemoryLinkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChainLinkStore for MemoryLinkStore {
    async fn add_link(&self, link: ChainLink) -> Result<ChainLink> {
        self.state.write().await.insert(link)
    }

    async fn get_link(&self, hash: &Hash) -> Result<Option<ChainLink>> {
        Ok(self.state.read().await.links.get(hash).cloned())
    }

    async fn get_genesis_link(&self) -> Result<Option<ChainLink>> {
        let state = self.state.read().await;
        Ok(state.genesis.and_then(|h| state.links.get(&h).cloned()))
    }

    async fn get_last_link(&self) -> Result<Option<ChainLink>> {
        let state = self.state.read().await;
        Ok(state.best.and_then(|h| state.links.get(&h).cloned()))
    }

    async fn get_next_links(&self, hash: &Hash) -> Result<Vec<ChainLink>> {
        let state = self.state.read().await;
        Ok(state
            .children
            .get(hash)
            .map(|kids| kids.iter().filter_map(|h| state.links.get(h).cloned()).collect())
            .unwrap_or_default())
    }

    async fn update_link(&self, link: ChainLink) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(seq) = state.check_update(&link)? {
            state.apply_update(link, seq);
        }
        Ok(())
    }

    async fn add_and_promote(&self, link: ChainLink, promoted: Vec<ChainLink>) -> Result<ChainLink> {
        let mut state = self.state.write().await;
        let mut pending = Vec::with_capacity(promoted.len());
        for update in promoted {
            if let Some(seq) = state.check_update(&update)? {
                pending.push((update, seq));
            }
        }

        let stored = state.insert(link)?;
        for (update, seq) in pending {
            state.apply_update(update, seq);
        }
        Ok(stored)
    }

    async fn remove_orphan(&self, hash: &Hash) -> Result<ChainLink> {
        let mut state = self.state.write().await;
        match state.links.get(hash) {
            None => return Err(StorageError::Missing(*hash).into()),
            Some(link) if link.is_resolved() => return Err(StorageError::NotOrphan(*hash).into()),
            Some(_) => {}
        }

        let link = state.links.remove(hash).ok_or(StorageError::Missing(*hash))?;
        let parent = link.parent_hash();
        if let Some(kids) = state.children.get_mut(&parent) {
            kids.retain(|h| h != hash);
            if kids.is_empty() {
                state.children.remove(&parent);
            }
        }
        Ok(link)
    }

    async fn get_orphan_links(&self) -> Result<Vec<ChainLink>> {
        let state = self.state.read().await;
        let mut orphans: Vec<ChainLink> = state.links.values().filter(|l| l.is_orphan()).cloned().collect();
        orphans.sort_by_key(|l| l.seq);
        Ok(orphans)
    }

    async fn link_count(&self) -> Result<usize> {
        Ok(self.state.read().await.links.len())
    }
}
