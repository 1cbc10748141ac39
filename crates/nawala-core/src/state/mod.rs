// # Store Implementations
//
// This module provides implementations of the Store trait for different
// persistence strategies. Both share the table logic in [`Dataset`].

pub mod dataset;
pub mod file;
pub mod memory;

pub use dataset::Dataset;
pub use file::{FileStore, FileStoreFactory};
pub use memory::{MemoryStore, MemoryStoreFactory};
