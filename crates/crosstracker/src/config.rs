//! Engine configuration.

use std::path::Path;

use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::types::TqlResult;

/// How users are displayed in `user` representations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserDisplayFormat {
    /// `Real Name (login)`
    #[default]
    RealNameAndLogin,
    /// `login (Real Name)`
    LoginAndRealName,
    Login,
    RealName,
}

impl UserDisplayFormat {
    pub fn display(&self, user_name: &str, real_name: &str) -> String {
        match self {
            UserDisplayFormat::RealNameAndLogin => format!("{real_name} ({user_name})"),
            UserDisplayFormat::LoginAndRealName => format!("{user_name} ({real_name})"),
            UserDisplayFormat::Login => user_name.to_string(),
            UserDisplayFormat::RealName => real_name.to_string(),
        }
    }
}

/// Tunables of the engine, loadable from a JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Offset of the platform timezone, used for date literals and day bounds.
    pub utc_offset_seconds: i32,
    /// Maximum number of trackers a query may span. `None` disables the check.
    pub max_trackers: Option<usize>,
    pub max_limit: usize,
    pub default_limit: usize,
    pub user_display_format: UserDisplayFormat,
    /// Prefix of artifact and user URIs in representations.
    pub base_uri: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            utc_offset_seconds: 0,
            max_trackers: Some(100),
            max_limit: 50,
            default_limit: 50,
            user_display_format: UserDisplayFormat::default(),
            base_uri: String::new(),
        }
    }
}

impl EngineConfig {
    /// Read a JSON configuration file; absent keys keep their defaults.
    pub fn from_file(path: &Path) -> TqlResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// The configured timezone, falling back to UTC on an out of range offset.
    pub fn timezone(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_seconds).unwrap_or_else(|| {
            tracing::warn!(
                "Invalid utc_offset_seconds {}, using UTC",
                self.utc_offset_seconds
            );
            Utc.fix()
        })
    }

    /// Clamp a requested page size.
    pub fn clamp_limit(&self, requested: Option<usize>) -> usize {
        let limit = requested.unwrap_or(self.default_limit);
        if limit > self.max_limit {
            tracing::warn!("Limit {limit} clamped to {}", self.max_limit);
            return self.max_limit.max(1);
        }
        limit.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"utc_offset_seconds": 3600, "max_limit": 10}}"#).unwrap();
        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.utc_offset_seconds, 3600);
        assert_eq!(config.max_limit, 10);
        assert_eq!(config.default_limit, 50);
        assert_eq!(config.timezone().local_minus_utc(), 3600);
    }

    #[test]
    fn test_clamp_limit() {
        let config = EngineConfig {
            max_limit: 20,
            default_limit: 10,
            ..Default::default()
        };
        assert_eq!(config.clamp_limit(None), 10);
        assert_eq!(config.clamp_limit(Some(500)), 20);
        assert_eq!(config.clamp_limit(Some(0)), 1);
    }

    #[test]
    fn test_zero_max_limit_still_returns_one_artifact() {
        let config = EngineConfig {
            max_limit: 0,
            ..Default::default()
        };
        assert_eq!(config.clamp_limit(None), 1);
        assert_eq!(config.clamp_limit(Some(7)), 1);
    }

    #[test]
    fn test_out_of_range_offset_falls_back_to_utc() {
        let config = EngineConfig {
            utc_offset_seconds: 90_000,
            ..Default::default()
        };
        assert_eq!(config.timezone().local_minus_utc(), 0);
    }

    #[test]
    fn test_user_display_format() {
        assert_eq!(
            UserDisplayFormat::RealNameAndLogin.display("jdoe", "John Doe"),
            "John Doe (jdoe)"
        );
        assert_eq!(UserDisplayFormat::Login.display("jdoe", "John Doe"), "jdoe");
    }
}
