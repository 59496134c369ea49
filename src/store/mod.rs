//! Policy and chunk storage.

mod service;
pub mod types;

pub use service::StoreService;
pub use types::{
    ChunkRecord, ContextUpdate, PolicyContext, PolicyRecord, PolicySummary, StoreError,
    compute_chunk_hash,
};
