// Configuration loading

pub mod settings;

pub use settings::{SessionSettings, Settings, SettingsError};
