//! Backends for the chain-link store.
//!
//! Both implement [`ChainLinkStore`](ledgerlink_common::ChainLinkStore): an
//! in-memory arena for tests and light nodes, and an embedded transactional
//! store on sled.

pub mod memory;
pub mod sled;

pub use memory::MemoryLinkStore;
pub use self::sled::SledLinkStore;

#[cfg(test)]
pub(crate) mod test_support;
