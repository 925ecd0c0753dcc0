//! brewpipe - brewery data ETL with cached query serving.
//!
//! Records are pulled page by page from a primary upstream (falling back to
//! a secondary one), normalized, deduplicated and loaded into a SQLite
//! warehouse. The same HTTP plumbing backs a query service whose answers are
//! cached in memory and on disk.

pub mod cache;
pub mod cli;
pub mod collector;
pub mod config;
pub mod context;
pub mod dedup;
pub mod extract;
pub mod http_client;
pub mod pipeline;
pub mod rate_limit;
pub mod server;
pub mod service;
pub mod transform;
pub mod warehouse;
