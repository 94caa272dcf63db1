//! Agent configuration

use pageguard_classifiers::HttpBackendConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Agent configuration, read from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Model backend
    #[serde(default)]
    pub backend: HttpBackendConfig,

    /// Settings store file (settings, block list, statistics)
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    /// Fetch broker used for cross-origin images
    #[serde(default)]
    pub fetch_proxy_url: Option<String>,

    /// Broker listen address
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Budget for a single image download
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
}

/// Values given on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub backend_url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub store_path: Option<PathBuf>,
    pub fetch_proxy_url: Option<String>,
    pub listen: Option<String>,
}

impl AgentConfig {
    /// Load from `config_path` if it exists, then apply overrides
    pub fn load(config_path: impl AsRef<Path>, overrides: ConfigOverrides) -> anyhow::Result<Self> {
        let config_path = config_path.as_ref();
        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(config_path)?;
            Self::from_yaml(&content)?
        } else {
            Self::default()
        };

        config.apply(overrides);
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn apply(&mut self, overrides: ConfigOverrides) {
        if let Some(url) = overrides.backend_url {
            self.backend.base_url = url;
        }
        if let Some(model) = overrides.model {
            self.backend.model = model;
        }
        if overrides.api_key.is_some() {
            self.backend.api_key = overrides.api_key;
        }
        if let Some(path) = overrides.store_path {
            self.store_path = path;
        }
        if overrides.fetch_proxy_url.is_some() {
            self.fetch_proxy_url = overrides.fetch_proxy_url;
        }
        if let Some(listen) = overrides.listen {
            self.listen = listen;
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            backend: HttpBackendConfig::default(),
            store_path: default_store_path(),
            fetch_proxy_url: None,
            listen: default_listen(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("pageguard-store.json")
}

fn default_listen() -> String {
    "127.0.0.1:8787".to_string()
}

fn default_fetch_timeout_ms() -> u64 {
    4000
}
