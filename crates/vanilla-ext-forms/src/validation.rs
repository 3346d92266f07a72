//! Field-level validation pipeline.
//!
//! Every field is cleaned and errors accumulate rather than short-circuiting,
//! so all validation issues are reported at once. Form-level cross-field
//! validation runs afterwards through the form's clean hook.

use std::collections::HashMap;

use vanilla_ext_db::value::Value;
use vanilla_ext_http::UploadedFile;

use crate::fields::{clean_field_value, clean_file_value, FormFieldDef};
use crate::form::FormErrors;

/// Submitted input for one form, keyed by unprefixed field name.
#[derive(Debug, Clone, Copy)]
pub struct RawInput<'a> {
    /// Raw string values.
    pub data: &'a HashMap<String, Option<String>>,
    /// Uploaded files.
    pub files: &'a HashMap<String, UploadedFile>,
    /// Initial values, used by disabled and file fields.
    pub initial: &'a HashMap<String, Value>,
}

/// Performs field-level validation for all fields.
///
/// Disabled fields take their initial value and skip validation. File fields
/// read from the uploads; all other fields read from the string data.
pub fn clean_fields(
    field_defs: &[FormFieldDef],
    input: &RawInput<'_>,
    cleaned_data: &mut HashMap<String, Value>,
    errors: &mut FormErrors,
) {
    for field in field_defs {
        let initial = input
            .initial
            .get(&field.name)
            .or(field.initial.as_ref());

        if field.disabled {
            if let Some(initial) = initial {
                cleaned_data.insert(field.name.clone(), initial.clone());
            }
            continue;
        }

        let result = if field.is_file() {
            clean_file_value(field, input.files.get(&field.name), initial)
        } else {
            let raw = input.data.get(&field.name).and_then(|v| v.as_deref());
            clean_field_value(field, raw)
        };

        match result {
            Ok(value) => {
                cleaned_data.insert(field.name.clone(), value);
            }
            Err(field_errors) => {
                errors.insert(field.name.clone(), field_errors);
            }
        }
    }
}
