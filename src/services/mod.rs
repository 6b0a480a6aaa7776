pub mod access;
pub mod compiler;
pub mod generator;
pub mod masking;
pub mod planner;
pub mod providers;
pub mod query_cache; // In-process row cache with LRU and TTL
pub mod query_service;
pub mod registry;

pub use access::*;
pub use compiler::*;
pub use generator::{GeneratedSql, SqlDialect, SqlGenerator};
pub use masking::*;
pub use planner::*;
pub use providers::*;
pub use query_cache::*;
pub use query_service::*;
pub use registry::*;
