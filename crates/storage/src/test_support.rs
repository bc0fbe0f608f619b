//! Backend-independent conformance checks, run against every store.

use ledgerlink_common::error::{LedgerError, StorageError};
use ledgerlink_common::{
    Block, BlockHeader, ChainLink, ChainLinkStore, ChainWork, Hash, OutPoint, Transaction, TxInput, TxOutput,
};

pub fn block(prev: Hash, tag: u32, transactions: Vec<Transaction>) -> Block {
    Block {
        header: BlockHeader {
            prev_block_hash: prev,
            nonce: tag,
            ..Default::default()
        },
        transactions,
    }
}

pub fn coinbase(tag: u8) -> Transaction {
    Transaction {
        outputs: vec![TxOutput { value: 50, script_pubkey: vec![tag] }],
        ..Default::default()
    }
}

/// Resolved child of `parent` adding `own_work`.
pub fn child(parent: &ChainLink, tag: u32, own_work: u64, txs: Vec<Transaction>) -> ChainLink {
    let height = parent.height().unwrap() + 1;
    let work = parent.work().unwrap() + &ChainWork::from(own_work);
    ChainLink::resolved(block(parent.hash(), tag, txs), height, work)
}

pub async fn add_genesis<S: ChainLinkStore>(store: &S) -> ChainLink {
    store.add_link(ChainLink::genesis(block(Hash::ZERO, 0, vec![]))).await.unwrap()
}

pub async fn sequential_chain<S: ChainLinkStore>(store: &S) {
    assert!(store.get_genesis_link().await.unwrap().is_none());
    assert!(store.get_last_link().await.unwrap().is_none());

    let genesis = add_genesis(store).await;
    let mut tip = genesis.clone();
    for tag in 1..=5 {
        tip = store.add_link(child(&tip, tag, 1, vec![])).await.unwrap();
    }

    let last = store.get_last_link().await.unwrap().unwrap();
    assert_eq!(last.height(), Some(5));
    assert_eq!(last.hash(), tip.hash());
    assert_eq!(store.get_genesis_link().await.unwrap().unwrap().hash(), genesis.hash());
    assert_eq!(store.link_count().await.unwrap(), 6);
}

pub async fn orphan_never_tip<S: ChainLinkStore>(store: &S) {
    let mut tip = add_genesis(store).await;
    for tag in 1..=4 {
        tip = store.add_link(child(&tip, tag, 1, vec![])).await.unwrap();
    }
    assert_eq!(tip.work(), Some(&ChainWork::from(4)));

    let stray = ChainLink::orphan(block(Hash([9u8; 32]), 99, vec![]));
    store.add_link(stray.clone()).await.unwrap();

    let last = store.get_last_link().await.unwrap().unwrap();
    assert_eq!(last.hash(), tip.hash());
    assert_eq!(last.height(), Some(4));

    let orphans = store.get_orphan_links().await.unwrap();
    assert_eq!(orphans.len(), 1);
    assert_eq!(orphans[0].hash(), stray.hash());
}

pub async fn heavier_branch_wins<S: ChainLinkStore>(store: &S) {
    let root = add_genesis(store).await;

    let a1 = store.add_link(child(&root, 1, 5, vec![])).await.unwrap();
    let a2 = store.add_link(child(&a1, 2, 5, vec![])).await.unwrap();

    let mut b = root.clone();
    for (tag, w) in [(11, 1), (12, 1), (13, 1), (14, 2)] {
        b = store.add_link(child(&b, tag, w, vec![])).await.unwrap();
    }
    assert_eq!(b.height(), Some(4));
    assert_eq!(b.work(), Some(&ChainWork::from(5)));

    let last = store.get_last_link().await.unwrap().unwrap();
    assert_eq!(last.hash(), a2.hash());
    assert_eq!(last.work(), Some(&ChainWork::from(10)));
}

pub async fn equal_work_first_stored_wins<S: ChainLinkStore>(store: &S) {
    let root = add_genesis(store).await;
    let first = store.add_link(child(&root, 1, 3, vec![])).await.unwrap();
    let second = store.add_link(child(&root, 2, 3, vec![])).await.unwrap();
    assert!(second.seq > first.seq);

    let last = store.get_last_link().await.unwrap().unwrap();
    assert_eq!(last.hash(), first.hash());
}

pub async fn fork_children<S: ChainLinkStore>(store: &S) {
    let root = add_genesis(store).await;
    let mut expected = Vec::new();
    for tag in 1..=3 {
        expected.push(store.add_link(child(&root, tag, tag as u64, vec![])).await.unwrap().hash());
    }
    // an orphan grandchild must not show up as a child of the root
    store.add_link(ChainLink::orphan(block(Hash([7u8; 32]), 50, vec![]))).await.unwrap();

    let next: Vec<Hash> = store.get_next_links(&root.hash()).await.unwrap().iter().map(|l| l.hash()).collect();
    assert_eq!(next.len(), 3);
    for hash in &expected {
        assert!(next.contains(hash));
    }
    assert!(store.get_next_links(&expected[0]).await.unwrap().is_empty());
}

pub async fn duplicate_rejected<S: ChainLinkStore>(store: &S) {
    let root = add_genesis(store).await;
    let link = child(&root, 1, 1, vec![]);
    store.add_link(link.clone()).await.unwrap();

    let err = store.add_link(link.clone()).await.unwrap_err();
    assert!(matches!(err, LedgerError::DuplicateLink(h) if h == link.hash()));
    assert_eq!(store.link_count().await.unwrap(), 2);
}

pub async fn update_idempotent<S: ChainLinkStore>(store: &S) {
    let root = add_genesis(store).await;
    let pending = store.add_link(ChainLink::orphan(block(root.hash(), 1, vec![]))).await.unwrap();
    assert_eq!(store.get_last_link().await.unwrap().unwrap().hash(), root.hash());

    let promoted = ChainLink::resolved(pending.block.clone(), 1, ChainWork::from(5));
    store.update_link(promoted.clone()).await.unwrap();

    let stored = store.get_link(&pending.hash()).await.unwrap().unwrap();
    assert_eq!(stored.height(), Some(1));
    assert_eq!(stored.work(), Some(&ChainWork::from(5)));
    assert_eq!(stored.seq, pending.seq);
    assert_eq!(store.get_last_link().await.unwrap().unwrap().hash(), pending.hash());
    assert!(store.get_orphan_links().await.unwrap().is_empty());

    // promoting again is a no-op, even with different numbers
    store.update_link(promoted.clone()).await.unwrap();
    store
        .update_link(ChainLink::resolved(pending.block.clone(), 9, ChainWork::from(99)))
        .await
        .unwrap();
    let again = store.get_link(&pending.hash()).await.unwrap().unwrap();
    assert_eq!(again.height(), Some(1));
    assert_eq!(again.work(), Some(&ChainWork::from(5)));

    let unknown = ChainLink::orphan(block(Hash([3u8; 32]), 77, vec![]));
    let err = store.update_link(unknown).await.unwrap_err();
    assert!(matches!(err, LedgerError::Storage(StorageError::Missing(_))));
}

pub async fn claims_are_branch_scoped<S: ChainLinkStore>(store: &S) {
    let root = add_genesis(store).await;
    let funding = coinbase(1);
    let input = TxInput {
        claimed: OutPoint::new(funding.hash(), 0),
        script_sig: vec![],
    };

    let x = store.add_link(child(&root, 1, 1, vec![funding.clone()])).await.unwrap();
    let y = store.add_link(child(&root, 2, 1, vec![coinbase(2)])).await.unwrap();

    assert!(store.get_claimed_link(&y, &input).await.unwrap().is_none());
    let claimed = store.get_claimed_link(&x, &input).await.unwrap().unwrap();
    assert_eq!(claimed.hash(), x.hash());

    let spend = Transaction {
        inputs: vec![input.clone()],
        outputs: vec![TxOutput { value: 50, script_pubkey: vec![] }],
        ..Default::default()
    };
    let x2 = store.add_link(child(&x, 3, 1, vec![coinbase(3), spend])).await.unwrap();
    let x3 = store.add_link(child(&x2, 4, 1, vec![coinbase(4)])).await.unwrap();

    // the same outpoint may be spent once per branch
    assert!(store.get_claimer_link(&x, &input).await.unwrap().is_none());
    assert!(store.get_claimer_link(&y, &input).await.unwrap().is_none());
    let claimer = store.get_claimer_link(&x3, &input).await.unwrap().unwrap();
    assert_eq!(claimer.hash(), x2.hash());

    let other_output = TxInput {
        claimed: OutPoint::new(funding.hash(), 1),
        script_sig: vec![],
    };
    assert!(store.get_claimer_link(&x3, &other_output).await.unwrap().is_none());
}

pub async fn orphan_removal<S: ChainLinkStore>(store: &S) {
    let root = add_genesis(store).await;
    let orphan = store.add_link(ChainLink::orphan(block(root.hash(), 1, vec![]))).await.unwrap();
    assert_eq!(store.get_next_links(&root.hash()).await.unwrap().len(), 1);

    let err = store.remove_orphan(&root.hash()).await.unwrap_err();
    assert!(matches!(err, LedgerError::Storage(StorageError::NotOrphan(_))));

    let removed = store.remove_orphan(&orphan.hash()).await.unwrap();
    assert_eq!(removed.hash(), orphan.hash());
    assert!(store.get_link(&orphan.hash()).await.unwrap().is_none());
    assert!(store.get_next_links(&root.hash()).await.unwrap().is_empty());
    assert!(store.get_orphan_links().await.unwrap().is_empty());
    assert_eq!(store.link_count().await.unwrap(), 1);

    // the evicted block may be stored again later
    store.add_link(ChainLink::orphan(orphan.block.clone())).await.unwrap();
}

/// A late parent lands together with the orphans it completes.
pub async fn add_and_promote<S: ChainLinkStore>(store: &S) {
    let root = add_genesis(store).await;
    let parent = child(&root, 1, 2, vec![]);
    let first = store.add_link(ChainLink::orphan(block(parent.hash(), 2, vec![]))).await.unwrap();
    let second = store.add_link(ChainLink::orphan(block(first.hash(), 3, vec![]))).await.unwrap();

    let promoted = vec![
        ChainLink::resolved(first.block.clone(), 2, ChainWork::from(4)),
        ChainLink::resolved(second.block.clone(), 3, ChainWork::from(6)),
    ];
    let stored = store.add_and_promote(parent.clone(), promoted).await.unwrap();
    assert_eq!(stored.height(), Some(1));
    assert!(stored.seq > second.seq);

    let last = store.get_last_link().await.unwrap().unwrap();
    assert_eq!(last.hash(), second.hash());
    assert_eq!(last.height(), Some(3));
    assert_eq!(last.seq, second.seq);
    assert!(store.get_orphan_links().await.unwrap().is_empty());
    assert_eq!(store.link_count().await.unwrap(), 4);
}

pub async fn failed_promotion_batch_writes_nothing<S: ChainLinkStore>(store: &S) {
    let root = add_genesis(store).await;
    let parent = child(&root, 1, 2, vec![]);
    let waiting = store.add_link(ChainLink::orphan(block(parent.hash(), 2, vec![]))).await.unwrap();

    let promoted = vec![
        ChainLink::resolved(waiting.block.clone(), 2, ChainWork::from(4)),
        ChainLink::resolved(block(Hash([4u8; 32]), 3, vec![]), 5, ChainWork::from(10)),
    ];
    let err = store.add_and_promote(parent.clone(), promoted).await.unwrap_err();
    assert!(matches!(err, LedgerError::Storage(StorageError::Missing(_))));

    assert!(store.get_link(&parent.hash()).await.unwrap().is_none());
    assert!(store.get_link(&waiting.hash()).await.unwrap().unwrap().is_orphan());
    assert_eq!(store.get_last_link().await.unwrap().unwrap().hash(), root.hash());
    assert_eq!(store.get_orphan_links().await.unwrap().len(), 1);
    assert_eq!(store.link_count().await.unwrap(), 2);

    // the aborted batch consumed no sequence number
    let promoted = vec![ChainLink::resolved(waiting.block.clone(), 2, ChainWork::from(4))];
    let stored = store.add_and_promote(parent, promoted).await.unwrap();
    assert_eq!(stored.seq, waiting.seq + 1);
    assert_eq!(store.get_last_link().await.unwrap().unwrap().hash(), waiting.hash());
}

/// Builds genesis -> 2 resolved links plus one orphan; returns (tip, orphan).
pub async fn chain_with_orphan<S: ChainLinkStore>(store: &S) -> (Hash, Hash) {
    let root = add_genesis(store).await;
    let a = store.add_link(child(&root, 1, 2, vec![])).await.unwrap();
    let b = store.add_link(child(&a, 2, 2, vec![])).await.unwrap();
    let orphan = store.add_link(ChainLink::orphan(block(Hash([5u8; 32]), 9, vec![]))).await.unwrap();
    (b.hash(), orphan.hash())
}
