//! Download configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the HTTP downloader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// TCP connect timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// User agent sent with archive requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("pressline/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DownloadConfig::default();
        assert_eq!(config.connect_timeout_secs, 30);
        assert!(config.user_agent.starts_with("pressline/"));
    }
}
