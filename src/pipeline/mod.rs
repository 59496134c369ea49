//! Multi-stage document processing pipeline.

mod chain;
mod stages;

pub use chain::{Orchestrator, StartedChain, execute_chain, expand_documents};
pub use stages::{
    ItemResult, ItemStatus, PipelineContext, StageKind, StageReport, contextualize_stage,
    embed_stage, extract_stage, store_stage,
};
