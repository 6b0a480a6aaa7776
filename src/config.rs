use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub metadata: MetadataSource,
    pub roles: RolesSource,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetadataSource {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RolesSource {
    pub path: String,
}

/// Sizing of the in-process row cache
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Values from .env count as environment variables below
        let _ = dotenv::dotenv();

        let mut builder = config::Config::builder()
            .set_default("metadata.path", "./metadata.json")?
            .set_default("roles.path", "./roles.json")?
            .set_default("cache.max_entries", 1000)?
            .set_default("cache.ttl_secs", 300)?
            .set_default("logging.level", "info")?;

        if let Ok(path) = env::var("METADATA_PATH") {
            builder = builder.set_override("metadata.path", path)?;
        }

        if let Ok(path) = env::var("ROLES_PATH") {
            builder = builder.set_override("roles.path", path)?;
        }

        if let Ok(max_entries) = env::var("CACHE_MAX_ENTRIES") {
            let max_entries = max_entries.parse::<u64>().map_err(|e| {
                config::ConfigError::Message(format!("CACHE_MAX_ENTRIES: {}", e))
            })?;
            builder = builder.set_override("cache.max_entries", max_entries)?;
        }

        if let Ok(ttl) = env::var("CACHE_TTL_SECS") {
            let ttl = ttl
                .parse::<u64>()
                .map_err(|e| config::ConfigError::Message(format!("CACHE_TTL_SECS: {}", e)))?;
            builder = builder.set_override("cache.ttl_secs", ttl)?;
        }

        if let Ok(log_level) = env::var("RUST_LOG") {
            builder = builder.set_override("logging.level", log_level)?;
        }

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        env::remove_var("METADATA_PATH");
        env::remove_var("ROLES_PATH");
        env::remove_var("CACHE_MAX_ENTRIES");
        env::remove_var("CACHE_TTL_SECS");

        let config = Config::from_env();
        assert!(config.is_ok());

        let config = config.unwrap();
        assert_eq!(config.metadata.path, "./metadata.json");
        assert_eq!(config.roles.path, "./roles.json");
        assert_eq!(config.cache.max_entries, 1000);
        assert_eq!(config.cache.ttl_secs, 300);
    }
}
