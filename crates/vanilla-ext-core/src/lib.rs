//! # vanilla-ext-core
//!
//! Core types shared by every vanilla-ext crate. This crate has no framework
//! dependencies and provides the foundation for all other crates.
//!
//! ## Modules
//!
//! - [`error`] - Error types and result aliases
//! - [`context`] - Render context values handed to template renderers
//! - [`utils`] - Utility types (`MultiValueDict`)
//! - [`settings`] - Library settings and formset defaults
//! - [`settings_loader`] - TOML / JSON / environment loaders
//! - [`logging`] - Tracing-based logging integration

pub mod context;
pub mod error;
pub mod logging;
pub mod settings;
pub mod settings_loader;
pub mod utils;

// Re-export the most commonly used types at the crate root.
pub use context::{Context, ContextValue};
pub use error::{ValidationError, VanillaError, VanillaResult};
pub use settings::{Settings, SETTINGS};
