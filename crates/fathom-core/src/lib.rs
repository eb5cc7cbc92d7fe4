//! Fathom engine: stream aggregation and session tracking for a
//! multi-agent research chat client.
//!
//! The engine consumes an incremental event stream, folds it into a
//! canonical message ledger, groups agent activity into research
//! sessions, and persists finalized messages to a durable, deduplicated
//! conversation log.

pub mod config;
pub mod ledger;
pub mod logging;
pub mod merge;
pub mod research;
pub mod session;
pub mod store;

pub use fathom_types as types;
