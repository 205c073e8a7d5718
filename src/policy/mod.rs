//! Policy API resources managed as trees of sub-resources
//!
//! - [`flatten`] - builds one request body from a spec item
//! - [`walker`] - ordered create/update, delete and hierarchy fetch
//! - [`gateway`] - per-tree execution functions
//! - [`log`] - execution log returned by walks

pub mod flatten;
pub mod gateway;
pub mod log;
mod transforms;
pub mod walker;

pub use gateway::PolicyResource;
pub use log::{ExecutionLog, LogEntry, Outcome};
pub use walker::WalkOptions;
