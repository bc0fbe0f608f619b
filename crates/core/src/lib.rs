pub mod block_path;
pub mod config;
pub mod consensus;
pub mod events;
pub mod merkle;
pub mod metrics;
pub mod reorg;
pub mod validation;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export commonly used types
pub use block_path::BlockPath;
pub use config::ConsensusConfig;
pub use consensus::{BlockOutcome, ConsensusEngine};
pub use events::{BranchChange, BranchSubscription};
pub use reorg::{common_ancestor, BranchListener, ReorgDelta};
pub use validation::{AcceptAllScripts, BlockValidator, ScriptVerifier, SpendValidator};
