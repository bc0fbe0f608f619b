//! Common-ancestor search and the undo/apply delta between two tips.

use ledgerlink_common::error::{LedgerError, Result};
use ledgerlink_common::{ChainLink, ChainLinkStore};
use tracing::{debug, error};

/// Reacts to the blocks a branch change removes from, and adds to, the
/// active chain.
pub trait BranchListener {
    fn undo_block(&mut self, link: &ChainLink) -> Result<()>;
    fn apply_block(&mut self, link: &ChainLink) -> Result<()>;
}

/// The blocks separating two tips.
#[derive(Debug, Clone)]
pub struct ReorgDelta {
    pub ancestor: ChainLink,
    /// Old tip first, down to (excluding) the ancestor.
    pub undo: Vec<ChainLink>,
    /// Ancestor's child first, up to the new tip.
    pub apply: Vec<ChainLink>,
}

impl ReorgDelta {
    /// Walks both tips toward genesis until they meet.
    ///
    /// Both links must be resolved. Tips that never meet cannot occur within
    /// one store and are reported as an invariant violation.
    pub async fn between<S>(store: &S, old_tip: &ChainLink, new_tip: &ChainLink) -> Result<Self>
    where
        S: ChainLinkStore + ?Sized,
    {
        let mut old = old_tip.clone();
        let mut new = new_tip.clone();
        let mut undo = Vec::new();
        let mut apply = Vec::new();

        // Bring the taller side down to the other's height, then step both.
        while old.hash() != new.hash() {
            let (old_height, new_height) = (height_of(&old)?, height_of(&new)?);
            if old_height >= new_height {
                let parent = step(store, &old).await?;
                undo.push(std::mem::replace(&mut old, parent));
            }
            if new_height >= old_height {
                let parent = step(store, &new).await?;
                apply.push(std::mem::replace(&mut new, parent));
            }
        }

        apply.reverse();
        debug!(
            ancestor = %old.hash(),
            undo = undo.len(),
            apply = apply.len(),
            "Resolved branch delta"
        );
        Ok(Self { ancestor: old, undo, apply })
    }

    pub fn is_extension(&self) -> bool {
        self.undo.is_empty()
    }

    /// Undo from the old tip toward the ancestor, then apply outward to the
    /// new tip. Stops at the first listener error.
    pub fn replay<L: BranchListener + ?Sized>(&self, listener: &mut L) -> Result<()> {
        for link in &self.undo {
            listener.undo_block(link)?;
        }
        for link in &self.apply {
            listener.apply_block(link)?;
        }
        Ok(())
    }
}

/// Lowest link shared by the histories of `a` and `b`.
pub async fn common_ancestor<S>(store: &S, a: &ChainLink, b: &ChainLink) -> Result<ChainLink>
where
    S: ChainLinkStore + ?Sized,
{
    Ok(ReorgDelta::between(store, a, b).await?.ancestor)
}

fn height_of(link: &ChainLink) -> Result<u64> {
    link.height().ok_or_else(|| {
        error!("Ancestor walk reached orphan link {}", link.hash());
        LedgerError::Invariant(format!("ancestor walk reached orphan link {}", link.hash()))
    })
}

async fn step<S>(store: &S, link: &ChainLink) -> Result<ChainLink>
where
    S: ChainLinkStore + ?Sized,
{
    match store.parent_of(link).await? {
        Some(parent) => Ok(parent),
        None => {
            error!("Tips are disconnected below {}", link.hash());
            Err(LedgerError::Invariant(format!(
                "no common ancestor: walk ended at {}",
                link.hash()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerlink_common::{Block, ChainWork, Hash};
    use ledgerlink_storage::MemoryLinkStore;

    fn block(prev: Hash, nonce: u32) -> Block {
        let mut block = Block::default();
        block.header.prev_block_hash = prev;
        block.header.nonce = nonce;
        block
    }

    async fn extend(store: &MemoryLinkStore, parent: &ChainLink, nonce: u32) -> ChainLink {
        let height = parent.height().unwrap() + 1;
        let work = parent.work().unwrap() + &ChainWork::from(1);
        store
            .add_link(ChainLink::resolved(block(parent.hash(), nonce), height, work))
            .await
            .unwrap()
    }

    /// genesis - a1 - a2 - a3
    ///         \ b1 - b2
    async fn forked() -> (MemoryLinkStore, Vec<ChainLink>, Vec<ChainLink>) {
        let store = MemoryLinkStore::new();
        let genesis = store.add_link(ChainLink::genesis(block(Hash::ZERO, 0))).await.unwrap();
        let mut a = vec![genesis.clone()];
        for nonce in 1..=3 {
            let next = extend(&store, a.last().unwrap(), nonce).await;
            a.push(next);
        }
        let mut b = vec![genesis];
        for nonce in 11..=12 {
            let next = extend(&store, b.last().unwrap(), nonce).await;
            b.push(next);
        }
        (store, a, b)
    }

    #[derive(Default)]
    struct Recorder(Vec<String>);

    impl BranchListener for Recorder {
        fn undo_block(&mut self, link: &ChainLink) -> Result<()> {
            self.0.push(format!("undo {}", link.height().unwrap()));
            Ok(())
        }

        fn apply_block(&mut self, link: &ChainLink) -> Result<()> {
            self.0.push(format!("apply {}", link.height().unwrap()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_ancestor_of_fork() {
        let (store, a, b) = forked().await;
        let ancestor = common_ancestor(&store, &a[3], &b[2]).await.unwrap();
        assert_eq!(ancestor.hash(), a[0].hash());

        let same = common_ancestor(&store, &a[2], &a[2]).await.unwrap();
        assert_eq!(same.hash(), a[2].hash());
    }

    #[tokio::test]
    async fn test_delta_orders_undo_then_apply() {
        let (store, a, b) = forked().await;
        let delta = ReorgDelta::between(&store, &a[3], &b[2]).await.unwrap();

        let undo: Vec<_> = delta.undo.iter().map(|l| l.hash()).collect();
        assert_eq!(undo, vec![a[3].hash(), a[2].hash(), a[1].hash()]);
        let apply: Vec<_> = delta.apply.iter().map(|l| l.hash()).collect();
        assert_eq!(apply, vec![b[1].hash(), b[2].hash()]);
        assert!(!delta.is_extension());

        let mut recorder = Recorder::default();
        delta.replay(&mut recorder).unwrap();
        assert_eq!(recorder.0, vec!["undo 3", "undo 2", "undo 1", "apply 1", "apply 2"]);
    }

    #[tokio::test]
    async fn test_extension_has_no_undo() {
        let (store, a, _) = forked().await;
        let delta = ReorgDelta::between(&store, &a[1], &a[3]).await.unwrap();
        assert!(delta.is_extension());
        assert_eq!(delta.ancestor.hash(), a[1].hash());
        assert_eq!(delta.apply.len(), 2);
    }

    #[tokio::test]
    async fn test_orphan_is_invariant_violation() {
        let (store, a, _) = forked().await;
        let orphan = ChainLink::orphan(block(Hash([8u8; 32]), 99));
        let err = common_ancestor(&store, &a[1], &orphan).await.unwrap_err();
        assert!(matches!(err, LedgerError::Invariant(_)));
    }
}
