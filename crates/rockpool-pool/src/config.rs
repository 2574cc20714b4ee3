//! Pool configs: the persistent descriptor of a pool.

use serde::{Deserialize, Serialize};

use rockpool_cache::Cache;

use crate::error::{PoolError, Result};

/// Persistent descriptor of a pool.
///
/// The name is a slash-separated path; `#child` segments denote sub-pools.
/// Public transports are shared by all members; private transports are
/// locally preferred (e.g. a LAN mirror).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Pool name, e.g. `team/project` or `team/project/#drafts`.
    pub name: String,

    /// Transport URLs shared by every member.
    #[serde(default)]
    pub public: Vec<String>,

    /// Locally preferred transport URLs.
    #[serde(default)]
    pub private: Vec<String>,

    /// Enabled application channel tags, e.g. `chat`.
    #[serde(default)]
    pub apps: Vec<String>,
}

impl Config {
    /// Validate the descriptor.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(PoolError::InvalidConfig("empty pool name".into()));
        }
        if self.public.is_empty() && self.private.is_empty() {
            return Err(PoolError::InvalidConfig(format!(
                "pool '{}' has no transport urls",
                self.name
            )));
        }
        Ok(())
    }

    /// Transport URLs in preference order: private first.
    pub fn preferred_urls(&self) -> impl Iterator<Item = &String> {
        self.private.iter().chain(self.public.iter())
    }
}

/// Validate and persist a config, replacing any previous definition.
pub async fn define(cache: &dyn Cache, config: &Config) -> Result<()> {
    config.validate()?;
    let json = serde_json::to_string(config)?;
    cache.save_config(&config.name, &json).await?;
    Ok(())
}

/// Load a defined config by pool name.
pub async fn load_config(cache: &dyn Cache, name: &str) -> Result<Config> {
    let json = cache
        .load_config(name)
        .await?
        .ok_or_else(|| PoolError::NotExist(format!("pool '{name}' is not defined")))?;
    Ok(serde_json::from_str(&json)?)
}

/// Names of every defined pool.
pub async fn list_pools(cache: &dyn Cache) -> Result<Vec<String>> {
    Ok(cache.list_configs().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rockpool_cache::MemoryCache;

    fn sample() -> Config {
        Config {
            name: "p".into(),
            public: vec!["mem://a".into()],
            private: vec![],
            apps: vec!["chat".into()],
        }
    }

    #[test]
    fn test_validate() {
        sample().validate().unwrap();

        let mut no_name = sample();
        no_name.name.clear();
        assert!(matches!(
            no_name.validate().unwrap_err(),
            PoolError::InvalidConfig(_)
        ));

        let mut no_urls = sample();
        no_urls.public.clear();
        assert!(matches!(
            no_urls.validate().unwrap_err(),
            PoolError::InvalidConfig(_)
        ));
    }

    #[test]
    fn test_preferred_urls_private_first() {
        let config = Config {
            name: "p".into(),
            public: vec!["mem://pub".into()],
            private: vec!["mem://lan".into()],
            apps: vec![],
        };
        let urls: Vec<_> = config.preferred_urls().collect();
        assert_eq!(urls, vec!["mem://lan", "mem://pub"]);
    }

    #[tokio::test]
    async fn test_define_and_load() {
        let cache = MemoryCache::new();
        define(&cache, &sample()).await.unwrap();

        let loaded = load_config(&cache, "p").await.unwrap();
        assert_eq!(loaded, sample());
        assert_eq!(list_pools(&cache).await.unwrap(), vec!["p"]);
    }

    #[tokio::test]
    async fn test_define_rejects_invalid() {
        let cache = MemoryCache::new();
        let bad = Config {
            name: String::new(),
            public: vec![],
            private: vec![],
            apps: vec![],
        };
        assert!(define(&cache, &bad).await.is_err());
        assert!(load_config(&cache, "").await.is_err());
    }
}
