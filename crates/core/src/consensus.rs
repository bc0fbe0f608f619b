//! The consensus engine: the single writer of the chain-link store.
//!
//! Every `add_block` runs validate -> plan promotions -> store -> pick tip ->
//! notify under one async mutex, so no other writer can interleave with a
//! cascade. The block and every orphan it completes are written in one store
//! call. Reads go straight to the store.

use crate::block_path::BlockPath;
use crate::config::ConsensusConfig;
use crate::events::{BranchChange, BranchSubscription, EventPublisher};
use crate::metrics::ConsensusMetrics;
use crate::reorg::common_ancestor;
use crate::validation::{BlockValidator, ScriptVerifier, SpendValidator};
use futures::future::join_all;
use ledgerlink_common::error::{LedgerError, Result, StorageError, ValidationError};
use ledgerlink_common::types::{Block, Hash};
use ledgerlink_common::work::ChainWork;
use ledgerlink_common::{ChainLink, ChainLinkStore, LinkStatus};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

/// What `add_block` did with a block.
#[derive(Debug, Clone)]
pub struct BlockOutcome {
    pub hash: Hash,
    /// Status of the submitted block after the whole call, cascade included.
    pub status: LinkStatus,
    /// Orphans resolved because this block arrived, in promotion order.
    pub promoted: Vec<Hash>,
    pub branch_change: Option<BranchChange>,
}

impl BlockOutcome {
    pub fn is_orphan(&self) -> bool {
        matches!(self.status, LinkStatus::Orphan)
    }

    pub fn height(&self) -> Option<u64> {
        match &self.status {
            LinkStatus::Resolved { height, .. } => Some(*height),
            LinkStatus::Orphan => None,
        }
    }
}

// Writer-side state, only touched while holding the lock
struct EngineState {
    tip: Option<ChainLink>,
    // orphan hashes, oldest first
    orphans: VecDeque<Hash>,
}

pub struct ConsensusEngine<S: ?Sized> {
    store: Arc<S>,
    config: ConsensusConfig,
    validator: BlockValidator,
    events: EventPublisher,
    metrics: ConsensusMetrics,
    state: Mutex<EngineState>,
}

impl<S> ConsensusEngine<S>
where
    S: ChainLinkStore + ?Sized,
{
    /// Opens an engine over `store`, picking up its current tip and orphans.
    pub async fn open(store: Arc<S>, config: ConsensusConfig) -> Result<Self> {
        Self::open_with_metrics(store, config, ConsensusMetrics::new()?).await
    }

    pub async fn open_with_metrics(store: Arc<S>, config: ConsensusConfig, metrics: ConsensusMetrics) -> Result<Self> {
        if config.max_orphans == 0 {
            return Err(LedgerError::Config("max_orphans must be at least 1".to_string()));
        }

        let tip = store.get_last_link().await?;
        let orphans: VecDeque<Hash> = store.get_orphan_links().await?.iter().map(|l| l.hash()).collect();

        match &tip {
            Some(tip) => info!(
                "Loaded existing chain, tip {} at height {}, {} orphans",
                tip.hash(),
                tip.height().unwrap_or_default(),
                orphans.len()
            ),
            None => info!("Opened empty chain, waiting for genesis"),
        }

        metrics.tip_height.set(tip.as_ref().and_then(|t| t.height()).unwrap_or_default() as i64);
        metrics.orphan_count.set(orphans.len() as i64);

        Ok(Self {
            validator: BlockValidator::new(&config),
            events: EventPublisher::new(config.event_capacity),
            store,
            config,
            metrics,
            state: Mutex::new(EngineState { tip, orphans }),
        })
    }

    /// Validates and stores a block, promotes any orphans it completes, and
    /// moves the tip if a heavier branch now exists.
    ///
    /// Validation failures and duplicates leave the store untouched. A storage
    /// failure leaves the stored links and the recorded tip as they were,
    /// apart from orphans already evicted to make room, so the block can be
    /// sent again.
    #[instrument(skip_all)]
    pub async fn add_block(&self, block: Block) -> Result<BlockOutcome> {
        let _timer = self.metrics.block_processing_time.start_timer();
        let hash = block.hash();
        let mut state = self.state.lock().await;

        let own_work = match self.validator.validate(&block) {
            Ok(work) => work,
            Err(e) => return Err(self.reject(&hash, e)),
        };

        if self.store.get_link(&hash).await?.is_some() {
            self.metrics.blocks_duplicate_total.inc();
            debug!("Block {} already stored", hash);
            return Err(LedgerError::DuplicateLink(hash));
        }

        let status = match self.position(&block, &hash, &own_work).await {
            Ok(status) => status,
            Err(LedgerError::Validation(e)) => return Err(self.reject(&hash, e)),
            Err(e) => return Err(e),
        };

        let promotions = match &status {
            LinkStatus::Resolved { height, work } => self.plan_promotions(&hash, *height, work).await?,
            LinkStatus::Orphan => {
                self.evict_orphans(&mut state).await?;
                Vec::new()
            }
        };
        let promoted: Vec<Hash> = promotions.iter().map(|l| l.hash()).collect();

        let link = ChainLink::new(block, status);
        let stored = if link.is_orphan() {
            self.store.add_link(link).await?
        } else {
            self.store.add_and_promote(link, promotions).await?
        };

        match stored.height() {
            None => {
                state.orphans.push_back(hash);
                self.metrics.blocks_orphaned_total.inc();
                info!("Block {} orphaned, parent {} not resolved", hash, stored.parent_hash());
            }
            Some(height) => {
                self.metrics.blocks_accepted_total.inc();
                info!("Block {} accepted at height {}", hash, height);
                if !promoted.is_empty() {
                    self.metrics.blocks_promoted_total.inc_by(promoted.len() as u64);
                    let done: HashSet<&Hash> = promoted.iter().collect();
                    state.orphans.retain(|h| !done.contains(h));
                    info!("Promotion cascade from {} resolved {} orphans", hash, promoted.len());
                }
            }
        }
        self.metrics.orphan_count.set(state.orphans.len() as i64);

        let branch_change = self.update_tip(&mut state).await?;

        Ok(BlockOutcome {
            hash,
            status: stored.status,
            promoted,
            branch_change,
        })
    }

    fn reject(&self, hash: &Hash, err: ValidationError) -> LedgerError {
        self.metrics.blocks_rejected_total.inc();
        warn!("Block {} rejected: {}", hash, err);
        err.into()
    }

    /// Orphan or resolved, from the parent's current state.
    async fn position(&self, block: &Block, hash: &Hash, own_work: &ChainWork) -> Result<LinkStatus> {
        let prev = block.prev_hash();
        if prev.is_zero() {
            self.check_genesis(hash).await?;
            return Ok(LinkStatus::Resolved {
                height: 0,
                work: ChainWork::zero(),
            });
        }

        let parent = self.store.get_link(&prev).await?;
        Ok(match parent.map(|p| p.status) {
            Some(LinkStatus::Resolved { height, work }) => LinkStatus::Resolved {
                height: height + 1,
                work: &work + own_work,
            },
            _ => LinkStatus::Orphan,
        })
    }

    async fn check_genesis(&self, hash: &Hash) -> Result<()> {
        if let Some(expected) = self.config.genesis_hash {
            if expected != *hash {
                return Err(ValidationError::InvalidGenesis(format!("expected {}, got {}", expected, hash)).into());
            }
        }
        if let Some(existing) = self.store.get_genesis_link().await? {
            return Err(ValidationError::InvalidGenesis(format!("genesis {} already stored", existing.hash())).into());
        }
        Ok(())
    }

    /// Makes room for one more orphan by dropping the oldest ones.
    async fn evict_orphans(&self, state: &mut EngineState) -> Result<()> {
        while state.orphans.len() >= self.config.max_orphans {
            let Some(oldest) = state.orphans.pop_front() else {
                break;
            };
            match self.store.remove_orphan(&oldest).await {
                Ok(_) => {
                    self.metrics.orphans_evicted_total.inc();
                    info!("Evicted orphan {} (cap {})", oldest, self.config.max_orphans);
                }
                Err(LedgerError::Storage(StorageError::Missing(_) | StorageError::NotOrphan(_))) => {
                    debug!("Orphan {} no longer pending", oldest);
                }
                Err(e) => {
                    state.orphans.push_front(oldest);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Breadth-first walk of the orphans waiting below `root`, each resolved
    /// from its parent's height and work. Writes nothing.
    async fn plan_promotions(&self, root: &Hash, height: u64, work: &ChainWork) -> Result<Vec<ChainLink>> {
        let mut planned = Vec::new();
        let mut queue = VecDeque::from([(*root, height, work.clone())]);

        while let Some((parent, height, work)) = queue.pop_front() {
            for child in self.store.get_next_links(&parent).await? {
                if child.is_resolved() {
                    continue;
                }
                let own_work = ChainWork::from_bits(child.block.header.bits)?;
                let total = &work + &own_work;
                let seq = child.seq;
                let resolved = ChainLink::resolved(child.block, height + 1, total.clone()).with_seq(seq);

                debug!("Promoting orphan {} to height {}", resolved.hash(), height + 1);
                queue.push_back((resolved.hash(), height + 1, total));
                planned.push(resolved);
            }
        }
        Ok(planned)
    }

    /// Re-reads the best link and publishes a branch change when it moved.
    async fn update_tip(&self, state: &mut EngineState) -> Result<Option<BranchChange>> {
        let Some(new_tip) = self.store.get_last_link().await? else {
            return Ok(None);
        };
        if state.tip.as_ref().map(|t| t.hash()) == Some(new_tip.hash()) {
            return Ok(None);
        }

        let common = match &state.tip {
            Some(old_tip) => Some(common_ancestor(self.store.as_ref(), old_tip, &new_tip).await.map_err(|e| {
                error!("Cannot relate tips {} and {}: {}", old_tip.hash(), new_tip.hash(), e);
                e
            })?),
            None => None,
        };

        let change = BranchChange {
            old_tip: state.tip.take(),
            new_tip: new_tip.clone(),
            common_ancestor: common,
        };

        let height = new_tip.height().unwrap_or_default();
        if change.is_reorg() {
            self.metrics.reorgs_total.inc();
            info!(
                "Chain reorganization: tip {} -> {} at height {}, common ancestor {}",
                change.old_tip.as_ref().map(|t| t.hash().to_string()).unwrap_or_default(),
                new_tip.hash(),
                height,
                change.common_ancestor.as_ref().map(|a| a.hash().to_string()).unwrap_or_default()
            );
        } else {
            debug!("Tip advanced to {} at height {}", new_tip.hash(), height);
        }

        self.metrics.tip_height.set(height as i64);
        state.tip = Some(new_tip);
        self.events.publish(change.clone());
        Ok(Some(change))
    }

    /// Structural validation of independent blocks on the blocking pool.
    ///
    /// Touches no engine state; feed the accepted blocks to
    /// [`add_block`](Self::add_block) afterwards, parents first.
    pub async fn validate_batch(&self, blocks: Vec<Block>) -> Vec<Result<ChainWork>> {
        let tasks = blocks.into_iter().map(|block| {
            let validator = self.validator.clone();
            tokio::task::spawn_blocking(move || validator.validate(&block))
        });

        join_all(tasks)
            .await
            .into_iter()
            .map(|joined| match joined {
                Ok(result) => result.map_err(LedgerError::from),
                Err(e) => Err(LedgerError::Invariant(format!("validation task failed: {}", e))),
            })
            .collect()
    }

    pub fn subscribe(&self) -> BranchSubscription {
        self.events.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.events.listener_count()
    }

    pub async fn tip(&self) -> Result<Option<ChainLink>> {
        self.store.get_last_link().await
    }

    pub async fn get_link(&self, hash: &Hash) -> Result<Option<ChainLink>> {
        self.store.get_link(hash).await
    }

    /// Path from genesis to `tip_hash`.
    pub async fn block_path(&self, tip_hash: &Hash) -> Result<BlockPath> {
        BlockPath::to_tip(self.store.as_ref(), tip_hash).await
    }

    /// Path from genesis to the active tip.
    pub async fn active_path(&self) -> Result<BlockPath> {
        let tip = self
            .tip()
            .await?
            .ok_or_else(|| LedgerError::NotFound("active tip".to_string()))?;
        BlockPath::from_link(self.store.as_ref(), tip).await
    }

    /// Spend checks for a block about to be submitted, against its parent's branch.
    pub fn spend_validator<V: ScriptVerifier>(&self, verifier: V) -> SpendValidator<'_, S, V> {
        SpendValidator::new(self.store.as_ref(), verifier)
    }

    pub async fn orphan_count(&self) -> usize {
        self.state.lock().await.orphans.len()
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn metrics(&self) -> &ConsensusMetrics {
        &self.metrics
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }
}
