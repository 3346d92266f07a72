//! Loading [`Settings`] from TOML, JSON, and the environment.
//!
//! Missing keys keep their defaults, so a file only needs to mention what it
//! changes:
//!
//! ```toml
//! debug = false
//! log_level = "warn"
//! template_dirs = ["templates"]
//!
//! [formsets]
//! extra = 3
//! ```
//!
//! Environment overrides:
//!
//! - `VANILLA_DEBUG` -> `debug`
//! - `VANILLA_LOG_LEVEL` -> `log_level`
//! - `VANILLA_TEMPLATE_DIRS` -> `template_dirs` (comma separated)
//! - `VANILLA_FORMSET_EXTRA` -> `formsets.extra`
//! - `VANILLA_FORMSET_MAX_NUM` -> `formsets.default_max_num`

use std::path::{Path, PathBuf};

use crate::error::{VanillaError, VanillaResult};
use crate::settings::Settings;

/// Parses settings from a TOML string.
pub fn from_toml_str(toml_str: &str) -> VanillaResult<Settings> {
    toml::from_str(toml_str)
        .map_err(|e| VanillaError::ConfigurationError(format!("Failed to parse TOML: {e}")))
}

/// Loads settings from a TOML file.
pub fn from_toml_file(path: impl AsRef<Path>) -> VanillaResult<Settings> {
    let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
        VanillaError::ConfigurationError(format!(
            "Failed to read TOML file '{}': {e}",
            path.as_ref().display()
        ))
    })?;
    from_toml_str(&content)
}

/// Loads settings from a TOML file and then applies environment overrides.
pub fn from_toml_file_with_env(path: impl AsRef<Path>) -> VanillaResult<Settings> {
    let mut settings = from_toml_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Parses settings from a JSON string.
pub fn from_json_str(json_str: &str) -> VanillaResult<Settings> {
    serde_json::from_str(json_str)
        .map_err(|e| VanillaError::ConfigurationError(format!("Failed to parse JSON: {e}")))
}

/// Builds settings from defaults plus environment overrides.
pub fn from_env() -> Settings {
    let mut settings = Settings::default();
    apply_env_overrides(&mut settings);
    settings
}

/// Applies `VANILLA_*` environment variables on top of `settings`.
///
/// Values that fail to parse are ignored.
pub fn apply_env_overrides(settings: &mut Settings) {
    apply_overrides(settings, |key| std::env::var(key).ok());
}

fn apply_overrides(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(val) = lookup("VANILLA_DEBUG") {
        settings.debug = matches!(val.to_lowercase().as_str(), "true" | "1" | "yes");
    }

    if let Some(val) = lookup("VANILLA_LOG_LEVEL") {
        settings.log_level = val;
    }

    if let Some(val) = lookup("VANILLA_TEMPLATE_DIRS") {
        settings.template_dirs = val
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .collect();
    }

    if let Some(extra) = lookup("VANILLA_FORMSET_EXTRA").and_then(|v| v.parse().ok()) {
        settings.formsets.extra = extra;
    }

    if let Some(max_num) = lookup("VANILLA_FORMSET_MAX_NUM").and_then(|v| v.parse().ok()) {
        settings.formsets.default_max_num = max_num;
    }
}
