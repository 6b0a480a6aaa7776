use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Read;
use std::sync::Arc;
use tracing::{error, info};

use multi_db_query::config::Config;
use multi_db_query::error::{ErrorResponse, QueryError};
use multi_db_query::models::{CallerContext, DialectName, QueryDefinition, QueryResultMeta};
use multi_db_query::services::{
    FileMetadataProvider, FileRoleProvider, MemoryCacheProvider, QueryService, Registry,
};

/// Request read from stdin
#[derive(Debug, Deserialize)]
struct CompileRequest {
    definition: QueryDefinition,
    #[serde(default)]
    context: CallerContext,
}

#[derive(Debug, Serialize)]
struct CompileOutput {
    sql: String,
    params: Vec<Value>,
    dialect: DialectName,
    meta: QueryResultMeta,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;

    // Initialize logging on stderr; stdout carries the JSON answer
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .with_writer(std::io::stderr)
        .init();

    info!(
        "Loading metadata from {} and roles from {}",
        config.metadata.path, config.roles.path
    );
    let registry = Registry::load(
        Arc::new(FileMetadataProvider::new(&config.metadata.path)),
        Arc::new(FileRoleProvider::new(&config.roles.path)),
    )
    .await
    .map_err(|e| {
        error!("Failed to load registry: {:#}", e);
        e
    })?;

    let snapshot = registry.snapshot().await;
    let mut service = QueryService::new(Arc::new(registry));
    for cache in &snapshot.config().caches {
        service.register_cache(
            cache.id.clone(),
            Arc::new(MemoryCacheProvider::new(
                config.cache.max_entries,
                config.cache.ttl_secs,
            )),
        );
    }

    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input)?;

    match compile(&service, &input).await {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(e) => {
            error!("Compilation failed: {}", e);
            println!("{}", serde_json::to_string_pretty(&ErrorResponse::from(e))?);
            std::process::exit(1);
        }
    }
}

async fn compile(service: &QueryService, input: &str) -> Result<CompileOutput, QueryError> {
    let request: CompileRequest = serde_json::from_str(input)?;
    let compiled = service.compile(&request.definition, &request.context).await?;

    Ok(CompileOutput {
        sql: compiled.generated.sql,
        params: compiled.generated.params,
        dialect: compiled.generated.dialect,
        meta: compiled.meta,
    })
}
