//! INI file configuration adapter.

use crate::domain::error::AlertEngineError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, AlertEngineError> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config
            .load(path)
            .map_err(|reason| AlertEngineError::ConfigParse {
                file: path.display().to_string(),
                reason,
            })?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, String> {
        let mut config = Ini::new();
        config.read(content.to_string())?;
        Ok(Self { config })
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        }
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

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.config
            .getfloat(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.config
            .get(section, key)
            .as_deref()
            .and_then(Self::parse_bool)
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn from_string_reads_engine_sections() {
        let content = r#"
[engine]
history_capacity = 250
strict_identifiers = no

[logging]
level = debug
"#;
        let adapter = FileConfigAdapter::from_string(content).unwrap();
        assert_eq!(adapter.get_int("engine", "history_capacity", 0), 250);
        assert!(!adapter.get_bool("engine", "strict_identifiers", true));
        assert_eq!(
            adapter.get_string("logging", "level"),
            Some("debug".to_string())
        );
    }

    #[test]
    fn get_string_returns_none_for_missing_key() {
        let adapter = FileConfigAdapter::from_string("[engine]\nhistory_capacity = 10\n").unwrap();
        assert_eq!(adapter.get_string("engine", "missing"), None);
        assert_eq!(adapter.get_string("missing_section", "key"), None);
    }

    #[test]
    fn get_int_returns_default_for_non_numeric() {
        let adapter =
            FileConfigAdapter::from_string("[engine]\nmax_composite_depth = abc\n").unwrap();
        assert_eq!(adapter.get_int("engine", "max_composite_depth", 8), 8);
    }

    #[test]
    fn get_double_reads_and_defaults() {
        let adapter = FileConfigAdapter::from_string("[alerts]\nthreshold = 101.5\nbad = x\n").unwrap();
        assert_eq!(adapter.get_double("alerts", "threshold", 0.0), 101.5);
        assert_eq!(adapter.get_double("alerts", "bad", 9.5), 9.5);
        assert_eq!(adapter.get_double("alerts", "missing", 1.5), 1.5);
    }

    #[test]
    fn get_bool_accepts_word_and_digit_forms() {
        let adapter = FileConfigAdapter::from_string(
            "[engine]\na = TRUE\nb = yes\nc = 1\nd = false\ne = No\nf = 0\ng = perhaps\n",
        )
        .unwrap();
        for key in ["a", "b", "c"] {
            assert!(adapter.get_bool("engine", key, false), "{key}");
        }
        for key in ["d", "e", "f"] {
            assert!(!adapter.get_bool("engine", key, true), "{key}");
        }
        assert!(adapter.get_bool("engine", "g", true));
        assert!(!adapter.get_bool("engine", "missing", false));
    }

    #[test]
    fn from_file_reads_config() {
        let file = create_temp_config("[logging]\nlevel = warn\n");
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(
            adapter.get_string("logging", "level"),
            Some("warn".to_string())
        );
    }

    #[test]
    fn from_file_reports_missing_file() {
        let result = FileConfigAdapter::from_file("/nonexistent/path/engine.ini");
        match result {
            Err(AlertEngineError::ConfigParse { file, .. }) => {
                assert_eq!(file, "/nonexistent/path/engine.ini")
            }
            _ => panic!("expected ConfigParse"),
        }
    }
}
