//! Configuration file loading.
//!
//! ```json
//! {
//!   "engine": { "cache_capacity": 500, "get_timeout_ms": 5000 },
//!   "store": { "endpoint": "http://localhost:9000", "anonymous": true }
//! }
//! ```
//!
//! Both sections are optional. Command-line flags override file values.

use std::path::Path;

use serde::{Deserialize, Serialize};

use pcapvault_core::{EngineConfig, StoreConfig};

use super::Args;
use crate::error::{Error, Result};

/// Settings loaded from `--config`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

impl AppConfig {
    /// Load `path`, or the defaults when no file is given.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let data = tokio::fs::read(path).await.map_err(|e| Error::Config {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        serde_json::from_slice(&data).map_err(|e| Error::Config {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Apply command-line overrides.
    pub fn with_args(mut self, args: &Args) -> Self {
        if let Some(endpoint) = &args.endpoint {
            self.store = self.store.with_endpoint(endpoint.clone());
        }
        if args.anonymous {
            self.store = self.store.with_anonymous(true);
        }
        if let Some(capacity) = args.cache_capacity {
            self.engine = self.engine.with_cache_capacity(capacity);
        }
        self
    }
}
