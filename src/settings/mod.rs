//! Settings module for subcompiler
//!
//! Global configuration: logging, outbound fetch limits, default templates
//! and output defaults.

pub mod settings_struct;

pub use settings_struct::{
    update_settings_from_content, update_settings_from_file, CommonSettings, FetchSettings,
    OutputSettings, Settings, SettingsError, TemplateSettings, GLOBAL,
};
