//! Infrastructure layer - Storage adapters
//!
//! - `fs`: durable filesystem store (atomic replace, write-once markers)
//! - `memory`: in-process store for tests and single-process runs

pub mod fs;
pub mod memory;

pub use fs::FsPartitionStore;
pub use memory::InMemoryPartitionStore;
