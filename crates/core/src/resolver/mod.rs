//! Resolver pool: turns queued info-hashes into resolved catalog entries.
//!
//! Each worker dequeues a hash, skips it if the catalog already has it
//! resolved, asks the metadata client for a metadata-only handle, waits up
//! to the configured timeout, records the result and drops the handle.

mod pool;
mod resolve;
mod types;

pub use pool::ResolverPool;
pub use resolve::Resolver;
pub use types::*;
