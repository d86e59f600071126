//! Settings - コンテキストの設定
//!
//! JSON ドキュメントから読み込む。キーはすべて省略可能でデフォルトにフォールバックし、
//! 未知のキーは無視する。`validate` は最初の1件で止まらず、不正なキーをすべて報告する。

use serde::{Deserialize, Serialize};
use std::path::Path;

/// What to do when the correlation table detects a protocol violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationPolicy {
    /// Log and abort the offending call path.
    #[default]
    Panic,
    /// Log and hand the violation back as an error.
    Report,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub session_name: String,
    pub first_handle: u32,
    pub registry_shards: usize,
    pub on_protocol_violation: ViolationPolicy,
    pub log_filter: String,
    pub loopback_workers: usize,
    pub loopback_max_delay_ms: u64,
}

pub const MAX_REGISTRY_SHARDS: usize = 1024;
pub const MAX_LOOPBACK_WORKERS: usize = 64;
pub const MAX_LOOPBACK_DELAY_MS: u64 = 10_000;

impl Default for Settings {
    fn default() -> Self {
        Self {
            session_name: "default".to_string(),
            first_handle: 1,
            registry_shards: crate::app::registry::DEFAULT_SHARDS,
            on_protocol_violation: ViolationPolicy::default(),
            log_filter: "info".to_string(),
            loopback_workers: 4,
            loopback_max_delay_ms: 5,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("could not find configuration file: {0}")]
    NotFound(String),

    #[error("could not read configuration file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid settings: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

fn is_valid_name(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl Settings {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, SettingsError> {
        let settings: Settings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load, parse and validate a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(SettingsError::NotFound(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let mut problems = Vec::new();

        if !is_valid_name(&self.session_name) {
            problems.push(format!("session_name has invalid setting: {:?}", self.session_name));
        }
        if self.first_handle == 0 {
            problems.push("first_handle must be at least 1".to_string());
        }
        if !(1..=MAX_REGISTRY_SHARDS).contains(&self.registry_shards) {
            problems.push(format!(
                "registry_shards must be within 1..={MAX_REGISTRY_SHARDS}, got {}",
                self.registry_shards
            ));
        }
        if self.log_filter.trim().is_empty() {
            problems.push("log_filter must not be empty".to_string());
        }
        if !(1..=MAX_LOOPBACK_WORKERS).contains(&self.loopback_workers) {
            problems.push(format!(
                "loopback_workers must be within 1..={MAX_LOOPBACK_WORKERS}, got {}",
                self.loopback_workers
            ));
        }
        if self.loopback_max_delay_ms > MAX_LOOPBACK_DELAY_MS {
            problems.push(format!(
                "loopback_max_delay_ms must be at most {MAX_LOOPBACK_DELAY_MS}, got {}",
                self.loopback_max_delay_ms
            ));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(SettingsError::Invalid(problems))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.first_handle, 1);
        assert_eq!(settings.on_protocol_violation, ViolationPolicy::Panic);
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let settings = Settings::from_json_str(r#"{"session_name": "wallet_1"}"#).unwrap();
        assert_eq!(settings.session_name, "wallet_1");
        assert_eq!(settings.registry_shards, Settings::default().registry_shards);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let settings = Settings::from_json_str(r#"{"a": "a", "b": "b"}"#).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn policy_parses_lowercase() {
        let settings = Settings::from_json_str(r#"{"on_protocol_violation": "report"}"#).unwrap();
        assert_eq!(settings.on_protocol_violation, ViolationPolicy::Report);
    }

    #[test]
    fn every_invalid_key_is_reported() {
        let err = Settings::from_json_str(
            r#"{"session_name": "*98*", "registry_shards": 0, "first_handle": 0}"#,
        )
        .unwrap_err();
        match err {
            SettingsError::Invalid(problems) => {
                assert_eq!(problems.len(), 3);
                assert!(problems[0].contains("session_name"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = Settings::from_json_str("{session_name: 1}").unwrap_err();
        assert!(matches!(err, SettingsError::Parse(_)));
    }

    #[test]
    fn bad_path_is_not_found() {
        let err = Settings::from_file("garbage.txt").unwrap_err();
        assert!(matches!(err, SettingsError::NotFound(_)));
        assert!(err.to_string().starts_with("could not find configuration file"));
    }

    #[test]
    fn loads_from_file() {
        let path = std::env::temp_dir().join(format!("tether_settings_{}.json", std::process::id()));
        {
            let mut file = std::fs::File::create(&path).unwrap();
            file.write_all(br#"{"session_name": "from_file", "loopback_workers": 2}"#)
                .unwrap();
        }

        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.session_name, "from_file");
        assert_eq!(settings.loopback_workers, 2);

        std::fs::remove_file(&path).unwrap();
    }
}
