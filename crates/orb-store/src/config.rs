//! TOML configuration files and the data directory layout.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use orb_core::OrbConfig;

use crate::error::{Result, StoreError};

pub const DATA_DIR_ENV: &str = "ORB_DATA_DIR";
pub const DATABASE_FILE: &str = "orb.db";

/// Parse and validate a TOML config. Omitted keys keep their defaults.
pub fn parse(text: &str) -> Result<OrbConfig> {
    let config: OrbConfig = toml::from_str(text)?;
    config.validate()?;
    Ok(config)
}

pub fn load(path: &Path) -> Result<OrbConfig> {
    let text = fs::read_to_string(path)?;
    parse(&text)
}

pub fn load_or_default(path: Option<&Path>) -> Result<OrbConfig> {
    match path {
        Some(path) => load(path),
        None => Ok(OrbConfig::default()),
    }
}

pub fn to_toml_string(config: &OrbConfig) -> Result<String> {
    toml::to_string_pretty(config).map_err(|e| StoreError::InvalidData(e.to_string()))
}

/// `$ORB_DATA_DIR`, else `~/.orb-field`.
pub fn data_dir() -> PathBuf {
    env::var(DATA_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".orb-field"))
}

fn home_dir() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Create `dir` if needed and return the database path inside it.
pub fn database_path(dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    Ok(dir.join(DATABASE_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(parse("").unwrap(), OrbConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let config = parse(
            "[field]\nhard_cap = 100\ntrigger_threshold = 80\nrelease_threshold = 60\n\n[decay]\nfactor = 0.9\n",
        )
        .unwrap();
        assert_eq!(config.field.hard_cap, 100);
        assert_eq!(config.field.dimension, 18);
        assert_eq!(config.decay.factor, 0.9);
        assert_eq!(config.decay.interval_ms, 1000);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = parse("[field]\nrelease_threshold = 900\n").unwrap_err();
        assert!(matches!(err, StoreError::Config(_)), "{err}");
    }

    #[test]
    fn test_malformed_toml_rejected() {
        assert!(matches!(parse("[field\n"), Err(StoreError::Toml(_))));
    }

    #[test]
    fn test_toml_roundtrip() {
        let text = to_toml_string(&OrbConfig::default()).unwrap();
        assert!(text.contains("[field]"));
        assert_eq!(parse(&text).unwrap(), OrbConfig::default());
    }

    #[test]
    fn test_database_path_creates_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let path = database_path(&nested).unwrap();
        assert!(nested.is_dir());
        assert_eq!(path.file_name().unwrap(), DATABASE_FILE);
    }
}
