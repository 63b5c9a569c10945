//! Configuration loading and resolution.

use std::path::{Path, PathBuf};

use crosstracker::EngineConfig;

/// Resolve the tracker database path.
pub fn resolve_db_path(explicit: Option<&str>) -> String {
    if let Some(path) = explicit {
        return path.to_string();
    }

    if let Ok(env_path) = std::env::var("CROSSTRACKER_DB") {
        return env_path;
    }

    let cwd_db = PathBuf::from(".crosstracker/tracker.db");
    if cwd_db.exists() {
        return cwd_db.display().to_string();
    }

    resolve_default_db_path()
}

fn resolve_default_db_path() -> String {
    format!("{}/.crosstracker/tracker.db", home_dir())
}

pub(crate) fn home_dir() -> String {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string())
}

/// Load the engine configuration from `--config`, then `CROSSTRACKER_CONFIG`.
///
/// Without either, the defaults apply.
pub fn load_engine_config(explicit: Option<&str>) -> anyhow::Result<EngineConfig> {
    let path = explicit
        .map(str::to_string)
        .or_else(|| std::env::var("CROSSTRACKER_CONFIG").ok());
    match path {
        Some(path) => {
            let config = EngineConfig::from_file(Path::new(&path))
                .map_err(|e| anyhow::anyhow!("Cannot read configuration {path}: {e}"))?;
            tracing::debug!("Loaded configuration from {path}");
            Ok(config)
        }
        None => Ok(EngineConfig::default()),
    }
}
