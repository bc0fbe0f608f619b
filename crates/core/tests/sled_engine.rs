//! Engine over the persistent sled backend.

use ledgerlink_core::test_utils::*;
use ledgerlink_common::{ChainLinkStore, Hash};
use ledgerlink_core::{ConsensusConfig, ConsensusEngine};
use ledgerlink_storage::SledLinkStore;
use std::sync::Arc;
use tempfile::TempDir;

async fn open(dir: &TempDir, config: ConsensusConfig) -> ConsensusEngine<SledLinkStore> {
    let store = Arc::new(SledLinkStore::open(dir.path()).unwrap());
    ConsensusEngine::open(store, config).await.unwrap()
}

#[tokio::test]
async fn test_restart_resumes_tip_and_orphan_queue() {
    let dir = TempDir::new().unwrap();
    let genesis = mine(Hash::ZERO, WORK_2, 0);
    let blocks = chain(genesis.hash(), WORK_2, 5, 1);

    {
        let engine = open(&dir, ConsensusConfig::default()).await;
        engine.add_block(genesis.clone()).await.unwrap();
        engine.add_block(blocks[0].clone()).await.unwrap();
        engine.add_block(blocks[1].clone()).await.unwrap();
        // blocks[2] is missing, so these wait as orphans
        engine.add_block(blocks[3].clone()).await.unwrap();
        engine.add_block(blocks[4].clone()).await.unwrap();
        engine.store().flush().await.unwrap();
    }

    let engine = open(&dir, ConsensusConfig::default()).await;
    assert_eq!(engine.orphan_count().await, 2);
    assert_eq!(engine.tip().await.unwrap().unwrap().hash(), blocks[1].hash());

    let outcome = engine.add_block(blocks[2].clone()).await.unwrap();
    assert_eq!(outcome.promoted, vec![blocks[3].hash(), blocks[4].hash()]);
    let tip = engine.tip().await.unwrap().unwrap();
    assert_eq!(tip.hash(), blocks[4].hash());
    assert_eq!(tip.height(), Some(5));
    assert_eq!(engine.orphan_count().await, 0);
}

#[tokio::test]
async fn test_eviction_survives_restart() {
    let dir = TempDir::new().unwrap();
    let config = ConsensusConfig {
        max_orphans: 2,
        ..Default::default()
    };
    let strays: Vec<_> = (1..=3u32).map(|tag| mine(Hash([tag as u8; 32]), WORK_2, tag)).collect();

    {
        let engine = open(&dir, config.clone()).await;
        engine.add_block(strays[0].clone()).await.unwrap();
        engine.add_block(strays[1].clone()).await.unwrap();
        engine.store().flush().await.unwrap();
    }

    let engine = open(&dir, config).await;
    engine.add_block(strays[2].clone()).await.unwrap();

    let remaining: Vec<Hash> = engine
        .store()
        .get_orphan_links()
        .await
        .unwrap()
        .iter()
        .map(|l| l.hash())
        .collect();
    assert_eq!(remaining, vec![strays[1].hash(), strays[2].hash()]);
}

#[tokio::test]
async fn test_reorg_event_over_sled() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir, ConsensusConfig::default()).await;
    let genesis = mine(Hash::ZERO, WORK_2, 0);
    engine.add_block(genesis.clone()).await.unwrap();

    let main = chain(genesis.hash(), WORK_2, 3, 1);
    for block in &main {
        engine.add_block(block.clone()).await.unwrap();
    }

    let mut events = engine.subscribe();
    let side = chain(main[0].hash(), WORK_16, 1, 50);
    engine.add_block(side[0].clone()).await.unwrap();

    let change = events.recv().await.unwrap();
    assert!(change.is_reorg());
    assert_eq!(change.old_tip.unwrap().hash(), main[2].hash());
    assert_eq!(change.new_tip.hash(), side[0].hash());
    assert_eq!(change.common_ancestor.unwrap().hash(), main[0].hash());

    let path = engine.active_path().await.unwrap();
    assert_eq!(path.len(), 3);
    assert!(path.contains(&main[0].hash()));
    assert!(!path.contains(&main[1].hash()));
}
