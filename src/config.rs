use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Static and runtime bounds applied to every request. Zero disables a limit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryLimits {
    pub max_depth: u32,
    pub max_fields: u32,
    pub max_aliases: u32,
    /// Assumed length of list fields when scoring complexity, and the hard
    /// bound on list results at runtime.
    pub max_array_size: u32,
    pub max_concurrent_resolvers: u32,
    pub max_complexity: u64,
}

impl Default for QueryLimits {
    fn default() -> Self {
        QueryLimits {
            max_depth: 10,
            max_fields: 50,
            max_aliases: 15,
            max_array_size: 0,
            max_concurrent_resolvers: 0,
            max_complexity: 0,
        }
    }
}

impl QueryLimits {
    pub fn unbounded() -> Self {
        QueryLimits {
            max_depth: 0,
            max_fields: 0,
            max_aliases: 0,
            max_array_size: 0,
            max_concurrent_resolvers: 0,
            max_complexity: 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: u64,
    /// Eviction window for general entries, in seconds.
    pub default_ttl_secs: u64,
    /// Lifetime of cached plans and plan errors, in seconds.
    pub plan_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            enabled: true,
            max_entries: 1024,
            default_ttl_secs: 300,
            plan_ttl_secs: 3600,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    /// Capacity of each subscriber's inbound queue.
    pub buffer_size: usize,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        SubscriptionConfig { buffer_size: 10 }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub limits: QueryLimits,
    pub cache: CacheConfig,
    pub subscriptions: SubscriptionConfig,
    pub introspection: bool,
    pub port: Option<u16>,
}

impl EngineConfig {
    pub fn from_yaml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(source)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = EngineConfig::from_yaml_str(
            r#"
limits:
  max_depth: 4
  max_concurrent_resolvers: 2
cache:
  plan_ttl_secs: 60
introspection: true
"#,
        )
        .unwrap();

        assert_eq!(config.limits.max_depth, 4);
        assert_eq!(config.limits.max_concurrent_resolvers, 2);
        assert_eq!(config.limits.max_fields, QueryLimits::default().max_fields);
        assert_eq!(config.cache.plan_ttl_secs, 60);
        assert_eq!(config.cache.default_ttl_secs, 300);
        assert_eq!(config.subscriptions.buffer_size, 10);
        assert!(config.introspection);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = EngineConfig::load("/nonexistent/quickgraph.yaml").unwrap_err();
        assert!(err.to_string().contains("quickgraph.yaml"));
    }
}
