use serde::{Deserialize, Serialize};

pub use crate::download::DownloadConfig;
pub use crate::engine::EngineConfig;
pub use crate::queue::QueueConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub engine: EngineConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub download: DownloadConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_minimal_config() {
        let toml = r#"
[engine]
work_folder = "/srv/work"
destination_root = "/srv/out"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.engine.work_folder.to_str().unwrap(), "/srv/work");
        assert_eq!(config.queue.max_concurrent, 4);
        assert_eq!(config.queue.poll_interval_ms, 60_000);
        assert_eq!(config.download.connect_timeout_secs, 30);
    }

    #[test]
    fn test_deserialize_missing_engine_fails() {
        let toml = r#"
[queue]
max_concurrent = 2
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_full_config() {
        let toml = r#"
[engine]
source_id = 7
id_suffix = "-b"
work_folder = "/srv/work"
destination_root = "/srv/out"
page_size = 20
debug = true
operator_email = "ops@example.com"
cancel_comment = "cancelled"
notify_customer = true

[queue]
max_concurrent = 2
poll_interval_ms = 250

[download]
connect_timeout_secs = 5
user_agent = "pressline-test"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.engine.source_id, 7);
        assert_eq!(config.engine.id_suffix, "-b");
        assert_eq!(config.engine.page_size, 20);
        assert!(config.engine.debug);
        assert!(config.engine.notify_customer);
        assert_eq!(config.queue.max_concurrent, 2);
        assert_eq!(config.queue.poll_interval_ms, 250);
        assert_eq!(config.download.user_agent, "pressline-test");
    }
}
