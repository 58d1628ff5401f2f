//! Configuration management module for the sync core.
//!
//! Provides hierarchical configuration loading from multiple sources with priority:
//! 1. Default values (hardcoded)
//! 2. Base config file
//! 3. Deployment-specific config file
//! 4. Local overrides
//! 5. Environment variables (highest priority)
//!

mod billing;
mod cache;
mod feed;
mod monitoring;
mod retry;
mod server;
pub use billing::*;
pub use cache::*;
pub use feed::*;
pub use monitoring::*;
pub use retry::*;
pub use server::*;

#[cfg(test)]
mod config_test;

//---
use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;

use crate::Result;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    /// Change-feed channel parameters
    #[serde(default)]
    pub feed: FeedConfig,
    /// Query cache sizing
    #[serde(default)]
    pub cache: CacheConfig,
    /// Webhook admission, plan catalog and record store settings
    #[serde(default)]
    pub billing: BillingConfig,
    /// HTTP listener and log output
    #[serde(default)]
    pub server: ServerConfig,
    /// Metrics and monitoring settings
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    /// Retry policies for feed reconnection
    #[serde(default)]
    pub retry: RetryPolicies,
}

impl Settings {
    /// Load configuration from multiple sources with priority:
    /// 1. Base config file
    /// 2. Deployment-specific config
    /// 3. Local overrides
    /// 4. Environment variables
    ///
    /// # Arguments
    /// * `config_path` - Optional path to deployment-specific configuration
    ///
    /// # Returns
    /// Merged and validated configuration with proper priority ordering
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Config::builder();

        // 1. Base config; optional so a bare process starts on defaults
        config = config.add_source(File::with_name("config/tidemark").required(false));

        // 2. Overwrite with deployment config
        if let Some(path) = config_path {
            config = config.add_source(File::with_name(path).required(true));
        }

        // 3. Local overrides
        config = config.add_source(File::with_name("config/local").required(false));

        // 4. Environment variables (highest priority)
        config = config.add_source(
            Environment::with_prefix("TIDEMARK")
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let settings: Settings = config.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validates every section that carries cross-field rules
    pub fn validate(&self) -> Result<()> {
        self.billing.validate()?;
        self.server.validate()?;
        self.monitoring.validate()?;
        Ok(())
    }
}
