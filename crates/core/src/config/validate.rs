use super::{types::Config, ConfigError};

/// Largest vendor page the engine will request in one scan.
const MAX_PAGE_SIZE: u32 = 500;

/// Validate configuration
/// Currently validates:
/// - Engine section exists (enforced by serde)
/// - Queue concurrency and interval are not 0
/// - Page size is within 1..=500
/// - Work folder and destination root differ
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.queue.max_concurrent == 0 {
        return Err(ConfigError::ValidationError(
            "queue.max_concurrent cannot be 0".to_string(),
        ));
    }

    if config.queue.poll_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "queue.poll_interval_ms cannot be 0".to_string(),
        ));
    }

    if config.engine.page_size == 0 || config.engine.page_size > MAX_PAGE_SIZE {
        return Err(ConfigError::ValidationError(format!(
            "engine.page_size must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }

    if config.engine.work_folder == config.engine.destination_root {
        return Err(ConfigError::ValidationError(
            "engine.work_folder and engine.destination_root must differ".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DownloadConfig, EngineConfig, QueueConfig};

    fn valid_config() -> Config {
        Config {
            engine: EngineConfig::new("/srv/work", "/srv/out"),
            queue: QueueConfig::default(),
            download: DownloadConfig::default(),
        }
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_validate_zero_concurrency_fails() {
        let mut config = valid_config();
        config.queue.max_concurrent = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_page_size_bounds() {
        let mut config = valid_config();
        config.engine.page_size = 0;
        assert!(validate_config(&config).is_err());

        config.engine.page_size = 501;
        assert!(validate_config(&config).is_err());

        config.engine.page_size = 500;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_same_folders_fails() {
        let mut config = valid_config();
        config.engine.destination_root = config.engine.work_folder.clone();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("must differ"));
    }
}
