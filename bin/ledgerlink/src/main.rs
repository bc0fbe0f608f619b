mod cli;
mod config_loader;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use ledgerlink_common::utils::logging::init_logging;
use ledgerlink_common::{Block, Hash, LedgerError};
use ledgerlink_core::ConsensusEngine;
use ledgerlink_storage::SledLinkStore;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

type Engine = ConsensusEngine<SledLinkStore>;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Parse CLI
    let args = cli::Cli::parse();

    // 2. Load Config
    let (config, found) = config_loader::load_node_config(&args.config, args.data_dir)?;

    // 3. Setup Logging
    let _guard = init_logging(&config.logging)?;
    if !found {
        warn!("Config file {:?} not found, using defaults", args.config);
    }

    // 4. Open store and engine
    let store = Arc::new(SledLinkStore::open(&config.data_dir)?);
    let engine = ConsensusEngine::open(store.clone(), config.consensus.clone()).await?;

    let result = match args.command {
        cli::Commands::Import { file } => import(&engine, &file).await,
        cli::Commands::Tip => print_tip(&engine).await,
        cli::Commands::Path { hash } => print_path(&engine, hash.as_deref()).await,
    };

    store.flush().await?;
    result
}

#[derive(Debug, Default)]
struct ImportSummary {
    accepted: usize,
    orphaned: usize,
    promoted: usize,
    duplicate: usize,
    rejected: usize,
}

async fn import(engine: &Engine, file: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(file).with_context(|| format!("Failed to read {:?}", file))?;
    let blocks: Vec<Block> = serde_json::from_str(&raw).with_context(|| format!("Failed to parse {:?}", file))?;
    info!("Importing {} blocks from {:?}", blocks.len(), file);

    // Structural checks run in parallel; only the survivors take the engine lock.
    let checks = engine.validate_batch(blocks.clone()).await;

    let mut summary = ImportSummary::default();
    for (block, check) in blocks.into_iter().zip(checks) {
        if let Err(e) = check {
            warn!("Skipping block {}: {}", block.hash(), e);
            summary.rejected += 1;
            continue;
        }

        match engine.add_block(block).await {
            Ok(outcome) => {
                if outcome.is_orphan() {
                    summary.orphaned += 1;
                } else {
                    summary.accepted += 1;
                }
                summary.promoted += outcome.promoted.len();
            }
            Err(LedgerError::DuplicateLink(_)) => summary.duplicate += 1,
            Err(e) if e.is_recoverable() => summary.rejected += 1,
            Err(e) => return Err(e.into()),
        }
    }

    info!(?summary, "Import finished");
    println!(
        "accepted={} orphaned={} promoted={} duplicate={} rejected={}",
        summary.accepted, summary.orphaned, summary.promoted, summary.duplicate, summary.rejected
    );
    print_tip(engine).await
}

async fn print_tip(engine: &Engine) -> Result<()> {
    match engine.tip().await? {
        Some(tip) => println!(
            "{} height={} work={}",
            tip.hash(),
            tip.height().unwrap_or_default(),
            tip.work().map(|w| w.to_string()).unwrap_or_default()
        ),
        None => println!("empty chain"),
    }
    Ok(())
}

async fn print_path(engine: &Engine, hash: Option<&str>) -> Result<()> {
    let path = match hash {
        Some(hex) => {
            let hash = Hash::from_hex(hex).map_err(|e| anyhow!("Invalid hash {}: {}", hex, e))?;
            engine.block_path(&hash).await?
        }
        None => engine.active_path().await?,
    };

    for link in path.links() {
        println!(
            "{:>8} {} txs={}",
            link.height().unwrap_or_default(),
            link.hash(),
            link.block.transactions.len()
        );
    }
    Ok(())
}
