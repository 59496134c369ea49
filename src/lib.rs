#![deny(missing_docs)]

//! Core library for the policy-pipeline server.

/// Advisory collaborator for contextualize-stage policy updates.
pub mod advisory;
/// HTTP routing and REST handlers.
pub mod api;
/// Policy chunking engine.
pub mod chunking;
/// Environment-driven configuration management.
pub mod config;
/// Term-weight embedding store and vocabulary snapshots.
pub mod embedding;
/// Document extraction collaborator abstraction and adapters.
pub mod extract;
/// Structured logging and tracing setup.
pub mod logging;
/// Pipeline ingestion and query metrics helpers.
pub mod metrics;
/// Chained processing pipeline orchestration.
pub mod pipeline;
/// Scoped similarity search and answer extraction.
pub mod retrieval;
/// Top-level service wiring shared by external surfaces.
pub mod service;
/// Policy and chunk storage.
pub mod store;
/// Durable processing-task state tracking.
pub mod tasks;
