use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_listen_host")]
    pub listen_host: String,

    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_host: default_listen_host(),
            listen_port: default_listen_port(),
            log_dir: default_log_dir(),
        }
    }
}

impl ServerConfig {
    /// Validates listener configuration
    /// # Errors
    /// Returns `Error::InvalidConfig` if any configuration rules are violated
    pub fn validate(&self) -> Result<()> {
        if self.listen_port == 0 {
            return Err(Error::InvalidConfig(
                "server.listen_port must specify a non-zero port".into(),
            ));
        }

        if self.log_dir.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("server.log_dir path cannot be empty".into()));
        }

        #[cfg(not(test))]
        {
            use std::fs;
            if !self.log_dir.exists() {
                fs::create_dir_all(&self.log_dir).map_err(|e| {
                    Error::InvalidConfig(format!(
                        "Failed to create log directory at {}: {}",
                        self.log_dir.display(),
                        e
                    ))
                })?;
            }
        }

        Ok(())
    }
}

fn default_listen_host() -> String {
    "0.0.0.0".to_string()
}
fn default_listen_port() -> u16 {
    8080
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("/tmp/tidemark/logs")
}
