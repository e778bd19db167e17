//! Relational storage for tracelens.
//!
//! Span, agent and message tables are written by the ingestion side and only
//! read here. Analysis and replay write through three disciplines:
//! wholesale replacement of automatic failure annotations, insert-if-absent
//! for checkpoints, and append-only replay history.

mod records;
mod store;

pub use records::{CheckpointListing, CheckpointRecord, ReplayRecord};
pub use store::{StoreError, TraceStore};
