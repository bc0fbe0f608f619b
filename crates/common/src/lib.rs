pub mod error;
pub mod link;
pub mod traits;
pub mod types;
pub mod utils;
pub mod work;

pub use error::{LedgerError, Result, StorageError, ValidationError};
pub use link::{ChainLink, LinkStatus};
pub use traits::ChainLinkStore;
pub use types::{Block, BlockHeader, Hash, OutPoint, Transaction, TxInput, TxOutput};
pub use work::{ChainWork, CompactTarget};
