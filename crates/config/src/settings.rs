// Application settings
// Loaded from ~/.config/gridpen/settings.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Error from the strict load/save paths.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("settings io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Session-cache tuning. Keys mirror the host configuration surface, so
/// the file speaks camelCase with two legacy spellings kept verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionSettings {
    /// Ceiling on simultaneously live editing sessions
    pub max_active_sessions: usize,

    #[serde(rename = "maxMemoryUsageMB")]
    pub max_memory_usage_mb: f64,

    /// Inactivity span after which a session counts as expired
    #[serde(rename = "sessionTTLms")]
    pub session_ttl_ms: u64,

    /// Period of the unconditional eviction sweep
    pub cleanup_interval_ms: u64,

    pub enable_metrics: bool,

    pub enable_memory_tracking: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_active_sessions: 50,
            max_memory_usage_mb: 100.0,
            session_ttl_ms: 300_000,
            cleanup_interval_ms: 30_000,
            enable_metrics: true,
            enable_memory_tracking: true,
        }
    }
}

impl SessionSettings {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_millis(self.session_ttl_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Session cache
    #[serde(rename = "session")]
    pub session: SessionSettings,
}

impl Settings {
    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gridpen");
        config_dir.join("settings.json")
    }

    /// Load settings from the default path, falling back to defaults
    pub fn load() -> Self {
        let path = Self::config_path();

        if !path.exists() {
            let settings = Self::default();
            settings.create_default_file(&path);
            return settings;
        }

        Self::load_from(&path)
    }

    /// Load settings from a specific file, falling back to defaults on
    /// any read or parse problem
    pub fn load_from(path: &Path) -> Self {
        match Self::try_load_from(path) {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!("Error loading {}: {}", path.display(), e);
                eprintln!("Using default settings");
                Self::default()
            }
        }
    }

    /// Strict load: any io or parse failure is reported
    pub fn try_load_from(path: &Path) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path)?;

        // Strip comments (lines starting with //)
        let cleaned: String = contents
            .lines()
            .filter(|line| !line.trim().starts_with("//"))
            .collect::<Vec<_>>()
            .join("\n");

        Ok(serde_json::from_str(&cleaned)?)
    }

    /// Save current settings to the default path
    pub fn save(&self) -> Result<(), SettingsError> {
        self.save_to(&Self::config_path())
    }

    /// Save current settings to a specific file
    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Create default settings file with comments
    fn create_default_file(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                eprintln!("Error creating config directory: {}", e);
                return;
            }
        }

        let default_config = r#"{
    // Session cache
    "session": {
        "maxActiveSessions": 50,
        "maxMemoryUsageMB": 100,
        "sessionTTLms": 300000,
        "cleanupIntervalMs": 30000,
        "enableMetrics": true,
        "enableMemoryTracking": true
    }
}
"#;

        if let Err(e) = fs::write(path, default_config) {
            eprintln!("Error writing default settings.json: {}", e);
        }
    }

    /// Get the config file path for display/opening
    pub fn config_path_display() -> String {
        Self::config_path().to_string_lossy().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.session.max_active_sessions, 50);
        assert!((settings.session.max_memory_usage_mb - 100.0).abs() < f64::EPSILON);
        assert_eq!(settings.session.session_ttl(), Duration::from_secs(300));
        assert_eq!(settings.session.cleanup_interval(), Duration::from_secs(30));
        assert!(settings.session.enable_metrics);
        assert!(settings.session.enable_memory_tracking);
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let mut settings = Settings::default();
        settings.session.max_active_sessions = 12;
        settings.session.session_ttl_ms = 60_000;
        settings.save_to(&path).unwrap();

        let loaded = Settings::try_load_from(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_key_spelling_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        Settings::default().save_to(&path).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"maxActiveSessions\""));
        assert!(raw.contains("\"maxMemoryUsageMB\""));
        assert!(raw.contains("\"sessionTTLms\""));
        assert!(raw.contains("\"cleanupIntervalMs\""));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "session": { "maxActiveSessions": 7 } }"#).unwrap();

        let loaded = Settings::try_load_from(&path).unwrap();
        assert_eq!(loaded.session.max_active_sessions, 7);
        assert_eq!(loaded.session.session_ttl_ms, 300_000);
    }

    #[test]
    fn test_unknown_fields_and_comments_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{
    // tuned down for the demo machine
    "session": { "maxActiveSessions": 3 },
    "someFutureSection": { "x": 1 }
}"#,
        )
        .unwrap();

        let loaded = Settings::try_load_from(&path).unwrap();
        assert_eq!(loaded.session.max_active_sessions, 3);
    }

    #[test]
    fn test_garbage_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "not json at all").unwrap();

        assert!(Settings::try_load_from(&path).is_err());
        let loaded = Settings::load_from(&path);
        assert_eq!(loaded, Settings::default());
    }

    #[test]
    fn test_missing_file_is_strict_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.json");
        assert!(matches!(
            Settings::try_load_from(&path),
            Err(SettingsError::Io(_))
        ));
    }
}
