//! Settings for vanilla-ext.
//!
//! [`Settings`] holds the knobs the formset and view layers consult: debug
//! mode and log filter, template search directories, and the defaults every
//! formset configuration starts from. [`SETTINGS`] is a process-wide slot an
//! application may fill once at startup; library code always accepts an
//! explicit `&Settings` and falls back to [`Settings::default`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::error::{VanillaError, VanillaResult};

/// Defaults applied to newly declared formset configurations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormSetSettings {
    /// Number of blank extra rows a formset shows.
    pub extra: usize,
    /// Upper bound on rows when a configuration does not set `max_num`.
    pub default_max_num: usize,
    /// Headroom above `max_num` accepted from submitted `TOTAL_FORMS`
    /// before the count is clamped.
    pub absolute_max_headroom: usize,
    /// Prefix used by plain and model formsets when none is configured.
    pub default_prefix: String,
}

impl Default for FormSetSettings {
    fn default() -> Self {
        Self {
            extra: 2,
            default_max_num: 1000,
            absolute_max_headroom: 1000,
            default_prefix: "form".to_string(),
        }
    }
}

/// The complete set of library settings.
///
/// # Examples
///
/// ```
/// use vanilla_ext_core::settings::Settings;
///
/// let settings = Settings::default();
/// assert!(settings.debug);
/// assert_eq!(settings.formsets.extra, 2);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Whether debug mode is enabled.
    pub debug: bool,
    /// The log filter (e.g. "info", "vanilla_ext_views=debug").
    pub log_level: String,
    /// Directories the Tera renderer loads templates from.
    pub template_dirs: Vec<PathBuf>,
    /// Suffix appended to `{app_label}/{model_name}` to build template names.
    pub template_name_suffix: String,
    /// Formset defaults.
    pub formsets: FormSetSettings,
    /// Custom settings that don't fit into the above categories.
    pub extra: HashMap<String, serde_json::Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: true,
            log_level: "info".to_string(),
            template_dirs: Vec::new(),
            template_name_suffix: "_form".to_string(),
            formsets: FormSetSettings::default(),
            extra: HashMap::new(),
        }
    }
}

/// A lazily-initialized, globally-accessible settings slot.
pub struct LazySettings {
    inner: OnceLock<Settings>,
}

impl Default for LazySettings {
    fn default() -> Self {
        Self::new()
    }
}

impl LazySettings {
    /// Creates a new, unconfigured `LazySettings`.
    pub const fn new() -> Self {
        Self {
            inner: OnceLock::new(),
        }
    }

    /// Configures the global settings. May be called only once.
    pub fn configure(&self, settings: Settings) -> VanillaResult<()> {
        self.inner.set(settings).map_err(|_| {
            VanillaError::ConfigurationError("Settings have already been configured".to_string())
        })
    }

    /// Returns the configured settings, if any.
    pub fn get(&self) -> Option<&Settings> {
        self.inner.get()
    }

    /// Returns the configured settings or the defaults.
    pub fn get_or_default(&self) -> Settings {
        self.inner.get().cloned().unwrap_or_default()
    }

    /// Returns `true` if settings have been configured.
    pub fn is_configured(&self) -> bool {
        self.inner.get().is_some()
    }
}

/// The global settings instance.
pub static SETTINGS: LazySettings = LazySettings::new();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let s = Settings::default();
        assert!(s.debug);
        assert_eq!(s.log_level, "info");
        assert_eq!(s.template_name_suffix, "_form");
        assert!(s.template_dirs.is_empty());
    }

    #[test]
    fn test_default_formset_settings() {
        let f = FormSetSettings::default();
        assert_eq!(f.extra, 2);
        assert_eq!(f.default_max_num, 1000);
        assert_eq!(f.absolute_max_headroom, 1000);
        assert_eq!(f.default_prefix, "form");
    }

    #[test]
    fn test_lazy_settings_configure_and_get() {
        let lazy = LazySettings::new();
        assert!(!lazy.is_configured());
        assert!(lazy.get().is_none());
        assert_eq!(lazy.get_or_default().formsets.extra, 2);

        let mut settings = Settings::default();
        settings.debug = false;
        settings.formsets.extra = 5;
        lazy.configure(settings).unwrap();

        assert!(lazy.is_configured());
        assert!(!lazy.get().unwrap().debug);
        assert_eq!(lazy.get_or_default().formsets.extra, 5);
    }

    #[test]
    fn test_lazy_settings_configure_twice_fails() {
        let lazy = LazySettings::new();
        lazy.configure(Settings::default()).unwrap();
        let err = lazy.configure(Settings::default()).unwrap_err();
        assert!(matches!(err, VanillaError::ConfigurationError(_)));
    }
}
