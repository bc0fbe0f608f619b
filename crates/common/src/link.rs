use crate::types::{Block, Hash};
use crate::work::ChainWork;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Chain-position state of a link.
///
/// Height and work only exist together with the resolved state, so a reader
/// can never see one without the other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkStatus {
    /// Parent unknown or itself unresolved.
    Orphan,
    /// Full ancestry back to genesis is known.
    Resolved { height: u64, work: ChainWork },
}

/// A block plus its position in the block tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainLink {
    hash: Hash,
    pub block: Block,
    pub status: LinkStatus,
    /// Insertion order, assigned by the store on `add_link`.
    pub seq: u64,
}

impl ChainLink {
    pub fn new(block: Block, status: LinkStatus) -> Self {
        Self {
            hash: block.hash(),
            block,
            status,
            seq: 0,
        }
    }

    pub fn orphan(block: Block) -> Self {
        Self::new(block, LinkStatus::Orphan)
    }

    pub fn resolved(block: Block, height: u64, work: ChainWork) -> Self {
        Self::new(block, LinkStatus::Resolved { height, work })
    }

    /// Genesis anchors the tree at height 0 and carries no work of its own.
    pub fn genesis(block: Block) -> Self {
        Self::resolved(block, 0, ChainWork::zero())
    }

    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = seq;
        self
    }

    pub fn hash(&self) -> Hash {
        self.hash
    }

    pub fn parent_hash(&self) -> Hash {
        self.block.header.prev_block_hash
    }

    pub fn is_orphan(&self) -> bool {
        matches!(self.status, LinkStatus::Orphan)
    }

    pub fn is_resolved(&self) -> bool {
        !self.is_orphan()
    }

    pub fn is_genesis(&self) -> bool {
        self.height() == Some(0)
    }

    pub fn height(&self) -> Option<u64> {
        match &self.status {
            LinkStatus::Resolved { height, .. } => Some(*height),
            LinkStatus::Orphan => None,
        }
    }

    pub fn work(&self) -> Option<&ChainWork> {
        match &self.status {
            LinkStatus::Resolved { work, .. } => Some(work),
            LinkStatus::Orphan => None,
        }
    }

    /// Tip ordering: more work wins, equal work falls back to the earlier insertion.
    /// Orphans never compare as better than anything.
    pub fn is_better_tip_than(&self, other: &ChainLink) -> bool {
        match (self.work(), other.work()) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(mine), Some(theirs)) => match mine.cmp(theirs) {
                Ordering::Greater => true,
                Ordering::Less => false,
                Ordering::Equal => self.seq < other.seq,
            },
        }
    }
}
