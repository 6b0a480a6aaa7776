pub mod config;
pub mod error;
pub mod models;
pub mod services;

pub use error::{QueryError, Result};
pub use models::{CallerContext, QueryDefinition, QueryPlan, QueryResult, QueryResultMeta};
pub use services::{
    compile_query, CacheProvider, CompiledQuery, DbExecutor, MemoryCacheProvider, QueryService,
    Registry, RegistrySnapshot, SqlGenerator,
};
