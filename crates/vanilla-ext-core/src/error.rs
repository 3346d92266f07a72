//! Core error types for vanilla-ext.
//!
//! [`VanillaError`] covers the failures the formset layer can surface:
//! configuration mistakes caught when a factory or view is assembled,
//! persistence failures reported by a model store, template failures, and
//! the I/O and parsing errors of the settings loaders.
//!
//! Form validation failures are *not* errors in this sense. They are
//! collected as data on the forms and formsets and rendered back to the
//! user. [`ValidationError`] exists for the few places where a validation
//! outcome has to travel through a `Result`.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

/// Represents a validation error with optional field-level errors.
///
/// # Examples
///
/// ```
/// use vanilla_ext_core::error::ValidationError;
///
/// let err = ValidationError::new("This field is required.", "required");
/// assert_eq!(err.to_string(), "This field is required.");
///
/// let mut field_errors = std::collections::HashMap::new();
/// field_errors.insert(
///     "email".to_string(),
///     vec![ValidationError::new("Enter a valid email address.", "invalid")],
/// );
/// let err = ValidationError::with_field_errors(field_errors);
/// assert!(err.to_string().contains("email"));
/// ```
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The primary error message.
    pub message: String,
    /// A short code identifying the failure (e.g. "required", "invalid").
    pub code: String,
    /// Per-field validation errors, keyed by field name.
    pub field_errors: HashMap<String, Vec<Self>>,
}

impl ValidationError {
    /// Creates a new `ValidationError` with a message and code.
    pub fn new(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: code.into(),
            field_errors: HashMap::new(),
        }
    }

    /// Creates a `ValidationError` containing per-field errors.
    pub fn with_field_errors(field_errors: HashMap<String, Vec<Self>>) -> Self {
        Self {
            message: String::new(),
            code: String::new(),
            field_errors,
        }
    }

    /// Flattens this error into the `field -> messages` shape forms use.
    ///
    /// A message without field errors is filed under `__all__`.
    pub fn into_message_map(self) -> HashMap<String, Vec<String>> {
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        if !self.message.is_empty() {
            map.entry("__all__".to_string())
                .or_default()
                .push(self.message);
        }
        for (field, errors) in self.field_errors {
            map.entry(field)
                .or_default()
                .extend(errors.into_iter().map(|e| e.message));
        }
        map
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.message.is_empty() {
            write!(f, "{}", self.message)?;
        } else if !self.field_errors.is_empty() {
            let mut fields: Vec<&String> = self.field_errors.keys().collect();
            fields.sort();
            let mut first = true;
            for field in fields {
                for error in &self.field_errors[field] {
                    if !first {
                        write!(f, "; ")?;
                    }
                    write!(f, "{field}: {error}")?;
                    first = false;
                }
            }
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// The primary error type for vanilla-ext.
///
/// Each variant maps to an HTTP status code via [`VanillaError::status_code`]
/// so the view layer can turn an unexpected failure into a response.
#[derive(Error, Debug)]
pub enum VanillaError {
    // ── HTTP errors ──────────────────────────────────────────────────

    /// HTTP 404 Not Found.
    #[error("Not found: {0}")]
    NotFound(String),

    // ── Persistence errors ───────────────────────────────────────────

    /// Raised when a lookup expected exactly one result but found none.
    #[error("Object does not exist: {0}")]
    DoesNotExist(String),

    /// A generic storage error reported by a model store.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// A storage integrity constraint was violated.
    #[error("Integrity error: {0}")]
    IntegrityError(String),

    // ── Validation ───────────────────────────────────────────────────

    /// One or more fields failed validation.
    #[error("Validation error: {0}")]
    ValidationError(ValidationError),

    // ── Configuration ────────────────────────────────────────────────

    /// A settings value is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// A formset factory or view was declared inconsistently.
    #[error("Improperly configured: {0}")]
    ImproperlyConfigured(String),

    // ── Templates ────────────────────────────────────────────────────

    /// The template renderer failed.
    #[error("Template error: {0}")]
    TemplateError(String),

    // ── Serialization ────────────────────────────────────────────────

    /// An error occurred during serialization or deserialization.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    // ── IO ───────────────────────────────────────────────────────────

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    // ── Security ─────────────────────────────────────────────────────

    /// A potentially malicious operation was detected.
    #[error("Suspicious operation: {0}")]
    SuspiciousOperation(String),
}

impl VanillaError {
    /// Returns the HTTP status code associated with this error.
    ///
    /// - `ValidationError` -> 400
    /// - `SuspiciousOperation` -> 403
    /// - `NotFound`, `DoesNotExist` -> 404
    /// - Everything else -> 500
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::ValidationError(_) => 400,
            Self::SuspiciousOperation(_) => 403,
            Self::NotFound(_) | Self::DoesNotExist(_) => 404,
            Self::DatabaseError(_)
            | Self::IntegrityError(_)
            | Self::ConfigurationError(_)
            | Self::ImproperlyConfigured(_)
            | Self::TemplateError(_)
            | Self::SerializationError(_)
            | Self::IoError(_) => 500,
        }
    }
}

impl From<ValidationError> for VanillaError {
    fn from(err: ValidationError) -> Self {
        Self::ValidationError(err)
    }
}

/// A convenience type alias for `Result<T, VanillaError>`.
pub type VanillaResult<T> = Result<T, VanillaError>;
