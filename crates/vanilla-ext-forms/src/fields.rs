//! Form field definitions and type-level validation.
//!
//! Each [`FormFieldDef`] describes a single form field: its type, whether it
//! is required, its initial value, and its label. [`clean_field_value`] turns
//! the raw submitted string into a typed [`Value`] or a list of error
//! messages; [`clean_file_value`] does the same for uploads.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use vanilla_ext_db::value::Value;
use vanilla_ext_http::UploadedFile;

/// The message used when a required field is left empty.
pub const REQUIRED_MESSAGE: &str = "This field is required.";

static EMAIL_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}$").ok()
});

static SLUG_RE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^[-a-zA-Z0-9_]+$").ok());

fn is_match(re: &LazyLock<Option<Regex>>, input: &str) -> bool {
    re.as_ref().is_some_and(|re| re.is_match(input))
}

/// The type of a form field, including type-specific parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum FormFieldType {
    /// A character (string) field.
    Char {
        /// Minimum length (characters).
        min_length: Option<usize>,
        /// Maximum length (characters).
        max_length: Option<usize>,
        /// Whether to strip leading/trailing whitespace.
        strip: bool,
    },
    /// An integer field.
    Integer {
        /// Minimum allowed value.
        min_value: Option<i64>,
        /// Maximum allowed value.
        max_value: Option<i64>,
    },
    /// A floating-point field.
    Float {
        /// Minimum allowed value.
        min_value: Option<f64>,
        /// Maximum allowed value.
        max_value: Option<f64>,
    },
    /// A checkbox. Absent input means `false`.
    Boolean,
    /// A date field (YYYY-MM-DD).
    Date,
    /// A date-time field (YYYY-MM-DDTHH:MM[:SS]).
    DateTime,
    /// An email address field.
    Email,
    /// A slug field (letters, numbers, hyphens, underscores).
    Slug,
    /// A UUID field.
    Uuid,
    /// A single-choice field.
    Choice {
        /// Available choices as `(value, display_label)` pairs.
        choices: Vec<(String, String)>,
    },
    /// A file upload field.
    File {
        /// Maximum file size in bytes.
        max_size: Option<usize>,
        /// Allowed file extensions (e.g. `["jpg", "png"]`).
        allowed_extensions: Vec<String>,
    },
}

impl FormFieldType {
    /// A plain, stripped, unbounded text field.
    pub const fn text() -> Self {
        Self::Char {
            min_length: None,
            max_length: None,
            strip: true,
        }
    }

    /// An unbounded integer field.
    pub const fn integer() -> Self {
        Self::Integer {
            min_value: None,
            max_value: None,
        }
    }
}

/// Complete definition of a form field.
#[derive(Debug, Clone)]
pub struct FormFieldDef {
    /// The field name (HTML name attribute, before prefixing).
    pub name: String,
    /// The field type, controlling parsing and coercion.
    pub field_type: FormFieldType,
    /// Whether this field is required.
    pub required: bool,
    /// Default/initial value.
    pub initial: Option<Value>,
    /// Help text displayed alongside the field.
    pub help_text: String,
    /// Human-readable label.
    pub label: String,
    /// Whether the field renders as a hidden input.
    pub hidden: bool,
    /// Whether the field is disabled (rendered but not editable).
    pub disabled: bool,
    /// Custom error messages keyed by error code.
    pub error_messages: HashMap<String, String>,
}

impl FormFieldDef {
    /// Creates a required field labelled after its name.
    pub fn new(name: impl Into<String>, field_type: FormFieldType) -> Self {
        let name = name.into();
        let label = name.replace('_', " ");
        Self {
            name,
            field_type,
            required: true,
            initial: None,
            help_text: String::new(),
            label,
            hidden: false,
            disabled: false,
            error_messages: HashMap::new(),
        }
    }

    /// Sets whether this field is required.
    #[must_use]
    pub const fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Sets the initial value.
    #[must_use]
    pub fn initial(mut self, value: impl Into<Value>) -> Self {
        self.initial = Some(value.into());
        self
    }

    /// Sets the help text.
    #[must_use]
    pub fn help_text(mut self, text: impl Into<String>) -> Self {
        self.help_text = text.into();
        self
    }

    /// Sets the label.
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Renders this field as a hidden input.
    #[must_use]
    pub const fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Sets whether this field is disabled.
    #[must_use]
    pub const fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Sets a custom error message for a given code.
    #[must_use]
    pub fn error_message(mut self, code: impl Into<String>, msg: impl Into<String>) -> Self {
        self.error_messages.insert(code.into(), msg.into());
        self
    }

    /// Returns `true` for file upload fields.
    pub const fn is_file(&self) -> bool {
        matches!(self.field_type, FormFieldType::File { .. })
    }

    fn required_message(&self) -> String {
        self.error_messages
            .get("required")
            .cloned()
            .unwrap_or_else(|| REQUIRED_MESSAGE.to_string())
    }
}

/// Interprets a checkbox submission.
pub fn parse_bool(raw: Option<&str>) -> bool {
    raw.is_some_and(|s| matches!(s.to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on"))
}

/// Cleans a raw form input string into a typed `Value`.
///
/// Performs the required check, type coercion, and the type-specific
/// constraints. Returns the cleaned `Value` or a list of error messages.
pub fn clean_field_value(field: &FormFieldDef, raw: Option<&str>) -> Result<Value, Vec<String>> {
    if field.field_type == FormFieldType::Boolean {
        let checked = parse_bool(raw);
        if field.required && !checked {
            return Err(vec![field.required_message()]);
        }
        return Ok(Value::Bool(checked));
    }

    let raw_str = match &field.field_type {
        FormFieldType::Char { strip: false, .. } => raw.unwrap_or(""),
        _ => raw.unwrap_or("").trim(),
    };

    if raw_str.is_empty() {
        if field.required {
            return Err(vec![field.required_message()]);
        }
        return Ok(match field.field_type {
            FormFieldType::Char { .. } | FormFieldType::Email | FormFieldType::Slug => {
                Value::String(String::new())
            }
            _ => Value::Null,
        });
    }

    let mut errors = Vec::new();

    let value = match &field.field_type {
        FormFieldType::Char {
            min_length,
            max_length,
            ..
        } => {
            let len = raw_str.chars().count();
            if let Some(min) = min_length {
                if len < *min {
                    errors.push(format!(
                        "Ensure this value has at least {min} characters (it has {len})."
                    ));
                }
            }
            if let Some(max) = max_length {
                if len > *max {
                    errors.push(format!(
                        "Ensure this value has at most {max} characters (it has {len})."
                    ));
                }
            }
            Value::String(raw_str.to_string())
        }

        FormFieldType::Integer {
            min_value,
            max_value,
        } => match raw_str.parse::<i64>() {
            Ok(n) => {
                if let Some(min) = min_value {
                    if n < *min {
                        errors.push(format!(
                            "Ensure this value is greater than or equal to {min}."
                        ));
                    }
                }
                if let Some(max) = max_value {
                    if n > *max {
                        errors.push(format!("Ensure this value is less than or equal to {max}."));
                    }
                }
                Value::Int(n)
            }
            Err(_) => {
                errors.push("Enter a whole number.".to_string());
                Value::Null
            }
        },

        FormFieldType::Float {
            min_value,
            max_value,
        } => match raw_str.parse::<f64>() {
            Ok(n) => {
                if let Some(min) = min_value {
                    if n < *min {
                        errors.push(format!(
                            "Ensure this value is greater than or equal to {min}."
                        ));
                    }
                }
                if let Some(max) = max_value {
                    if n > *max {
                        errors.push(format!("Ensure this value is less than or equal to {max}."));
                    }
                }
                Value::Float(n)
            }
            Err(_) => {
                errors.push("Enter a number.".to_string());
                Value::Null
            }
        },

        FormFieldType::Boolean => Value::Bool(true),

        FormFieldType::Date => match chrono::NaiveDate::parse_from_str(raw_str, "%Y-%m-%d") {
            Ok(d) => Value::Date(d),
            Err(_) => {
                errors.push("Enter a valid date.".to_string());
                Value::Null
            }
        },

        FormFieldType::DateTime => {
            let result = chrono::NaiveDateTime::parse_from_str(raw_str, "%Y-%m-%dT%H:%M:%S")
                .or_else(|_| chrono::NaiveDateTime::parse_from_str(raw_str, "%Y-%m-%dT%H:%M"))
                .or_else(|_| chrono::NaiveDateTime::parse_from_str(raw_str, "%Y-%m-%d %H:%M:%S"));
            match result {
                Ok(dt) => Value::DateTime(dt),
                Err(_) => {
                    errors.push("Enter a valid date/time.".to_string());
                    Value::Null
                }
            }
        }

        FormFieldType::Email => {
            if !is_match(&EMAIL_RE, raw_str) {
                errors.push("Enter a valid email address.".to_string());
            }
            Value::String(raw_str.to_string())
        }

        FormFieldType::Slug => {
            if !is_match(&SLUG_RE, raw_str) {
                errors.push(
                    "Enter a valid \"slug\" consisting of letters, numbers, underscores or hyphens."
                        .to_string(),
                );
            }
            Value::String(raw_str.to_string())
        }

        FormFieldType::Uuid => match uuid::Uuid::parse_str(raw_str) {
            Ok(u) => Value::Uuid(u),
            Err(_) => {
                errors.push("Enter a valid UUID.".to_string());
                Value::Null
            }
        },

        FormFieldType::Choice { choices } => {
            if !choices.iter().any(|(v, _)| v == raw_str) {
                errors.push(format!(
                    "Select a valid choice. {raw_str} is not one of the available choices."
                ));
            }
            Value::String(raw_str.to_string())
        }

        // Uploads arrive through `clean_file_value`; a plain string here is
        // a previously stored filename.
        FormFieldType::File { .. } => Value::String(raw_str.to_string()),
    };

    if errors.is_empty() {
        Ok(value)
    } else {
        Err(errors)
    }
}

/// Cleans an uploaded file for a [`FormFieldType::File`] field.
///
/// The cleaned value is the uploaded filename. When no file was uploaded the
/// field falls back to its initial value (the stored filename) before the
/// required check applies.
pub fn clean_file_value(
    field: &FormFieldDef,
    file: Option<&UploadedFile>,
    initial: Option<&Value>,
) -> Result<Value, Vec<String>> {
    let FormFieldType::File {
        max_size,
        allowed_extensions,
    } = &field.field_type
    else {
        return clean_field_value(field, file.map(|f| f.name.as_str()));
    };

    let Some(file) = file else {
        return match initial {
            Some(value) if !value.is_blank() => Ok(value.clone()),
            _ if field.required => Err(vec![field.required_message()]),
            _ => Ok(Value::Null),
        };
    };

    let mut errors = Vec::new();
    if file.size == 0 {
        errors.push("The submitted file is empty.".to_string());
    }
    if let Some(max) = max_size {
        if file.size > *max {
            errors.push(format!("File size exceeds maximum of {max} bytes."));
        }
    }
    if !allowed_extensions.is_empty() {
        let ext = file.extension().unwrap_or_default();
        if !allowed_extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext)) {
            errors.push(format!(
                "File extension \u{201c}{ext}\u{201d} is not allowed. Allowed extensions are: {}.",
                allowed_extensions.join(", ")
            ));
        }
    }

    if errors.is_empty() {
        Ok(Value::String(file.name.clone()))
    } else {
        Err(errors)
    }
}
