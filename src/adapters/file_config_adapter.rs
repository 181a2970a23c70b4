//! INI file configuration adapter.

use crate::domain::error::IndexwatchError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, IndexwatchError> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config
            .load(path)
            .map_err(|reason| IndexwatchError::ConfigParse {
                file: path.display().to_string(),
                reason,
            })?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, IndexwatchError> {
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| IndexwatchError::ConfigParse {
                file: "<inline>".to_string(),
                reason,
            })?;
        Ok(Self { config })
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.config
            .getint(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::settings::{Settings, SignalMatch};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    const FULL: &str = r#"
[database]
path = /var/lib/indexwatch/indexwatch.db
pool_size = 8

[web]
listen = 0.0.0.0:9000
cors_origins = http://localhost:3000

[upload]
extensions = csv, txt

[alerts]
signal_match = phrase
"#;

    #[test]
    fn from_string_parses_config() {
        let adapter = FileConfigAdapter::from_string(FULL).unwrap();
        assert_eq!(
            adapter.get_string("database", "path"),
            Some("/var/lib/indexwatch/indexwatch.db".to_string())
        );
        assert_eq!(adapter.get_int("database", "pool_size", 4), 8);
    }

    #[test]
    fn get_string_returns_none_for_missing_key() {
        let adapter = FileConfigAdapter::from_string("[web]\nlisten = 127.0.0.1:8000\n").unwrap();
        assert_eq!(adapter.get_string("web", "missing"), None);
        assert_eq!(adapter.get_string("missing_section", "key"), None);
    }

    #[test]
    fn get_int_returns_default_for_missing() {
        let adapter = FileConfigAdapter::from_string("[database]\n").unwrap();
        assert_eq!(adapter.get_int("database", "pool_size", 4), 4);
    }

    #[test]
    fn get_int_returns_default_for_non_numeric() {
        let adapter = FileConfigAdapter::from_string("[database]\npool_size = many\n").unwrap();
        assert_eq!(adapter.get_int("database", "pool_size", 4), 4);
    }

    #[test]
    fn get_list_splits_and_trims() {
        let adapter = FileConfigAdapter::from_string("[upload]\nextensions = csv, ,txt \n").unwrap();
        assert_eq!(
            adapter.get_list("upload", "extensions"),
            Some(vec!["csv".to_string(), "txt".to_string()])
        );
        assert_eq!(adapter.get_list("upload", "missing"), None);
    }

    #[test]
    fn from_file_reads_config() {
        let file = create_temp_config("[database]\npath = /tmp/iw.db\n");
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(
            adapter.get_string("database", "path"),
            Some("/tmp/iw.db".to_string())
        );
    }

    #[test]
    fn from_file_returns_error_for_missing_file() {
        let result = FileConfigAdapter::from_file("/nonexistent/path/config.ini");
        assert!(matches!(result, Err(IndexwatchError::ConfigParse { .. })));
    }

    #[test]
    fn full_file_builds_settings() {
        let adapter = FileConfigAdapter::from_string(FULL).unwrap();
        let settings = Settings::from_config(&adapter).unwrap();
        assert_eq!(settings.web.listen.port(), 9000);
        assert_eq!(settings.web.cors_origins, vec!["http://localhost:3000"]);
        assert_eq!(settings.upload.extensions, vec!["csv", "txt"]);
        assert_eq!(settings.alerts.signal_match, SignalMatch::Phrase);
    }
}
