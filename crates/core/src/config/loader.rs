use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Load configuration from file with environment variable overrides.
///
/// Environment keys use the `PRESSLINE_` prefix and `__` as the section
/// separator, e.g. `PRESSLINE_QUEUE__MAX_CONCURRENT=8`.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("PRESSLINE_").split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[engine]
work_folder = "/tmp/work"
destination_root = "/tmp/out"

[queue]
max_concurrent = 9
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.queue.max_concurrent, 9);
        assert_eq!(config.engine.page_size, 50);
    }

    #[test]
    fn test_load_config_from_str_missing_engine() {
        let toml = r#"
[queue]
max_concurrent = 2
"#;
        let result = load_config_from_str(toml);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/pressline.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[engine]
source_id = 3
work_folder = "/data/work"
destination_root = "/data/ftp"

[queue]
poll_interval_ms = 1500
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.engine.source_id, 3);
        assert_eq!(config.queue.poll_interval_ms, 1500);
        assert_eq!(config.engine.destination_root.to_str().unwrap(), "/data/ftp");
    }
}
