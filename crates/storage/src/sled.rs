use async_trait::async_trait;
use ledgerlink_common::error::{LedgerError, Result, StorageError};
use ledgerlink_common::utils::codec::{decode_record, encode_record};
use ledgerlink_common::utils::db_keys::{
    child_from_key, child_key, link_key, seq_key, BEST_KEY, CHILDREN_TREE, GENESIS_KEY, LINKS_TREE,
    META_TREE, ORPHANS_TREE, SEQ_KEY,
};
use ledgerlink_common::{ChainLink, ChainLinkStore, Hash};
use moka::sync::Cache;
use ::sled::transaction::{
    abort, ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
    TransactionalTree,
};
use ::sled::{Transactional, Tree};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

const LINK_CACHE_CAPACITY: u64 = 4096;

type TxResult<T> = ConflictableTransactionResult<T, LedgerError>;

fn backend<E: std::fmt::Display>(e: E) -> LedgerError {
    StorageError::Backend(e.to_string()).into()
}

fn flatten(err: TransactionError<LedgerError>) -> LedgerError {
    match err {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => backend(e),
    }
}

fn tx_decode(bytes: &[u8]) -> TxResult<ChainLink> {
    decode_record(bytes).map_err(|e| ConflictableTransactionError::Abort(e.into()))
}

fn tx_encode(link: &ChainLink) -> TxResult<Vec<u8>> {
    encode_record(link).map_err(|e| ConflictableTransactionError::Abort(e.into()))
}

struct SledInner {
    db: ::sled::Db,
    links: Tree,
    children: Tree,
    orphans: Tree,
    meta: Tree,
    cache: Cache<Hash, ChainLink>,
}

/// Chain-link store on sled. Every mutation touches the link record, the
/// children index, the orphan queue and the best/genesis pointers inside one
/// multi-tree transaction, so readers never see a half-applied promotion.
#[derive(Clone)]
pub struct SledLinkStore {
    inner: Arc<SledInner>,
}

impl SledLinkStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = ::sled::open(path.as_ref()).map_err(backend)?;
        info!("Opened link store at {:?}", path.as_ref());
        Self::from_db(db)
    }

    /// Create a store from an existing sled::Db
    pub fn from_db(db: ::sled::Db) -> Result<Self> {
        let inner = SledInner {
            links: db.open_tree(LINKS_TREE).map_err(backend)?,
            children: db.open_tree(CHILDREN_TREE).map_err(backend)?,
            orphans: db.open_tree(ORPHANS_TREE).map_err(backend)?,
            meta: db.open_tree(META_TREE).map_err(backend)?,
            cache: Cache::new(LINK_CACHE_CAPACITY),
            db,
        };
        Ok(Self { inner: Arc::new(inner) })
    }

    /// Flush dirty pages to disk.
    pub async fn flush(&self) -> Result<()> {
        self.inner.db.flush_async().await.map_err(backend)?;
        Ok(())
    }

    // Sled operations are generally fast, but we use spawn_blocking for consistency
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&SledInner) -> Result<T> + Send + 'static,
    {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || f(&inner)).await.map_err(backend)?
    }
}

impl SledInner {
    fn load(&self, hash: &Hash) -> Result<Option<ChainLink>> {
        if let Some(link) = self.cache.get(hash) {
            return Ok(Some(link));
        }
        match self.links.get(link_key(hash)).map_err(backend)? {
            Some(bytes) => {
                let link: ChainLink = decode_record(&bytes)?;
                // Resolved records never change again; orphans stay uncached
                if link.is_resolved() {
                    self.cache.insert(*hash, link.clone());
                }
                Ok(Some(link))
            }
            None => Ok(None),
        }
    }

    fn load_pointer(&self, key: &[u8]) -> Result<Option<ChainLink>> {
        match self.meta.get(key).map_err(backend)? {
            Some(hash) => self.load(&Hash::from_slice(&hash)),
            None => Ok(None),
        }
    }
}

/// Genesis and best-tip bookkeeping for a link that just became resolved.
fn record_resolved(links: &TransactionalTree, meta: &TransactionalTree, link: &ChainLink) -> TxResult<()> {
    if link.is_genesis() {
        match meta.get(GENESIS_KEY)? {
            Some(existing) if Hash::from_slice(&existing) != link.hash() => {
                return abort(LedgerError::Invariant(format!(
                    "second genesis link {} (existing {})",
                    link.hash(),
                    Hash::from_slice(&existing)
                )));
            }
            _ => {
                meta.insert(GENESIS_KEY, link_key(&link.hash()))?;
            }
        }
    }

    let current = match meta.get(BEST_KEY)? {
        Some(best) => match links.get(best)? {
            Some(bytes) => Some(tx_decode(&bytes)?),
            None => None,
        },
        None => None,
    };
    let better = match &current {
        Some(current) => link.is_better_tip_than(current),
        None => true,
    };
    if better {
        meta.insert(BEST_KEY, link_key(&link.hash()))?;
    }
    Ok(())
}

fn next_seq(meta: &TransactionalTree) -> TxResult<u64> {
    match meta.get(SEQ_KEY)? {
        Some(raw) => {
            let buf = <[u8; 8]>::try_from(&*raw).map_err(|_| {
                ConflictableTransactionError::Abort(LedgerError::from(StorageError::Codec(format!(
                    "sequence counter is {} bytes",
                    raw.len()
                ))))
            })?;
            Ok(u64::from_be_bytes(buf))
        }
        None => Ok(0),
    }
}

/// Writes a new link with the next sequence number.
fn insert_link(
    links: &TransactionalTree,
    children: &TransactionalTree,
    orphans: &TransactionalTree,
    meta: &TransactionalTree,
    link: &ChainLink,
) -> TxResult<ChainLink> {
    let hash = link.hash();
    let key = link_key(&hash);
    if links.get(&key)?.is_some() {
        return abort(LedgerError::DuplicateLink(hash));
    }

    let seq = next_seq(meta)?;
    meta.insert(SEQ_KEY, seq_key(seq + 1).to_vec())?;

    let stored = link.clone().with_seq(seq);
    links.insert(key.as_slice(), tx_encode(&stored)?)?;
    children.insert(child_key(&stored.parent_hash(), &hash), Vec::<u8>::new())?;
    if stored.is_orphan() {
        orphans.insert(seq_key(seq).to_vec(), key.as_slice())?;
    } else {
        record_resolved(links, meta, &stored)?;
    }
    Ok(stored)
}

/// Overwrites an orphan record, keeping its seq. `None` when the stored
/// record is already resolved.
fn promote_link(
    links: &TransactionalTree,
    orphans: &TransactionalTree,
    meta: &TransactionalTree,
    link: &ChainLink,
) -> TxResult<Option<ChainLink>> {
    let hash = link.hash();
    let key = link_key(&hash);
    let stored = match links.get(&key)? {
        Some(bytes) => tx_decode(&bytes)?,
        None => return abort(LedgerError::from(StorageError::Missing(hash))),
    };
    // Resolved records are final.
    if stored.is_resolved() {
        return Ok(None);
    }

    let updated = link.clone().with_seq(stored.seq);
    links.insert(key.as_slice(), tx_encode(&updated)?)?;
    if updated.is_resolved() {
        orphans.remove(seq_key(updated.seq).to_vec())?;
        record_resolved(links, meta, &updated)?;
    }
    Ok(Some(updated))
}

#[async_trait]
impl ChainLinkStore for SledLinkStore {
    async fn add_link(&self, link: ChainLink) -> Result<ChainLink> {
        self.blocking(move |inner| {
            let stored = (&inner.links, &inner.children, &inner.orphans, &inner.meta)
                .transaction(|(links, children, orphans, meta)| insert_link(links, children, orphans, meta, &link))
                .map_err(flatten)?;

            if stored.is_resolved() {
                inner.cache.insert(stored.hash(), stored.clone());
            }
            debug!(hash = %stored.hash(), seq = stored.seq, orphan = stored.is_orphan(), "Stored link");
            Ok(stored)
        })
        .await
    }

    async fn get_link(&self, hash: &Hash) -> Result<Option<ChainLink>> {
        let hash = *hash;
        self.blocking(move |inner| inner.load(&hash)).await
    }

    async fn get_genesis_link(&self) -> Result<Option<ChainLink>> {
        self.blocking(|inner| inner.load_pointer(GENESIS_KEY)).await
    }

    async fn get_last_link(&self) -> Result<Option<ChainLink>> {
        self.blocking(|inner| inner.load_pointer(BEST_KEY)).await
    }

    async fn get_next_links(&self, hash: &Hash) -> Result<Vec<ChainLink>> {
        let parent = *hash;
        self.blocking(move |inner| {
            let mut next = Vec::new();
            for entry in inner.children.scan_prefix(link_key(&parent)) {
                let (key, _) = entry.map_err(backend)?;
                let child = child_from_key(&key);
                match inner.load(&child)? {
                    Some(link) => next.push(link),
                    None => return Err(StorageError::Missing(child).into()),
                }
            }
            next.sort_by_key(|l| l.seq);
            Ok(next)
        })
        .await
    }

    async fn update_link(&self, link: ChainLink) -> Result<()> {
        self.blocking(move |inner| {
            let written = (&inner.links, &inner.orphans, &inner.meta)
                .transaction(|(links, orphans, meta)| promote_link(links, orphans, meta, &link))
                .map_err(flatten)?;

            if let Some(updated) = written.filter(|l| l.is_resolved()) {
                inner.cache.insert(updated.hash(), updated);
            }
            Ok(())
        })
        .await
    }

    async fn add_and_promote(&self, link: ChainLink, promoted: Vec<ChainLink>) -> Result<ChainLink> {
        self.blocking(move |inner| {
            let (stored, written) = (&inner.links, &inner.children, &inner.orphans, &inner.meta)
                .transaction(|(links, children, orphans, meta)| {
                    let stored = insert_link(links, children, orphans, meta, &link)?;
                    let mut written = Vec::with_capacity(promoted.len());
                    for update in &promoted {
                        if let Some(updated) = promote_link(links, orphans, meta, update)? {
                            written.push(updated);
                        }
                    }
                    Ok((stored, written))
                })
                .map_err(flatten)?;

            for updated in written.into_iter().chain(std::iter::once(stored.clone())) {
                if updated.is_resolved() {
                    inner.cache.insert(updated.hash(), updated);
                }
            }
            debug!(hash = %stored.hash(), seq = stored.seq, "Stored link with its promotions");
            Ok(stored)
        })
        .await
    }

    async fn remove_orphan(&self, hash: &Hash) -> Result<ChainLink> {
        let hash = *hash;
        self.blocking(move |inner| {
            let key = link_key(&hash);
            let removed = (&inner.links, &inner.children, &inner.orphans)
                .transaction(|(links, children, orphans)| {
                    let stored = match links.get(&key)? {
                        Some(bytes) => tx_decode(&bytes)?,
                        None => return abort(LedgerError::from(StorageError::Missing(hash))),
                    };
                    if stored.is_resolved() {
                        return abort(LedgerError::from(StorageError::NotOrphan(hash)));
                    }
                    links.remove(key.as_slice())?;
                    children.remove(child_key(&stored.parent_hash(), &hash))?;
                    orphans.remove(seq_key(stored.seq).to_vec())?;
                    Ok(stored)
                })
                .map_err(flatten)?;

            inner.cache.invalidate(&hash);
            Ok(removed)
        })
        .await
    }

    async fn get_orphan_links(&self) -> Result<Vec<ChainLink>> {
        self.blocking(|inner| {
            let mut orphans = Vec::new();
            for entry in inner.orphans.iter() {
                let (_, hash) = entry.map_err(backend)?;
                let hash = Hash::from_slice(&hash);
                if let Some(link) = inner.load(&hash)? {
                    orphans.push(link);
                }
            }
            Ok(orphans)
        })
        .await
    }

    async fn link_count(&self) -> Result<usize> {
        self.blocking(|inner| Ok(inner.links.len())).await
    }
}
