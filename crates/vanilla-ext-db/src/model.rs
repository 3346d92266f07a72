//! The [`Model`] trait and its metadata.
//!
//! A model is a plain Rust struct that can report its fields as [`Value`]s
//! and accept new values by field name. That is all the form layer needs to
//! generate form fields, pre-fill forms from existing rows, and copy cleaned
//! data back onto an instance before it is saved.

use vanilla_ext_core::{VanillaError, VanillaResult};

use crate::fields::FieldDef;
use crate::value::Value;

/// The core trait for all models.
///
/// # Examples
///
/// ```
/// use std::sync::LazyLock;
///
/// use vanilla_ext_core::{VanillaError, VanillaResult};
/// use vanilla_ext_db::fields::{FieldDef, FieldType};
/// use vanilla_ext_db::model::{Model, ModelMeta};
/// use vanilla_ext_db::value::Value;
///
/// #[derive(Debug, Clone, Default)]
/// struct Author {
///     id: Option<i64>,
///     name: String,
/// }
///
/// impl Model for Author {
///     fn meta() -> &'static ModelMeta {
///         static META: LazyLock<ModelMeta> = LazyLock::new(|| {
///             ModelMeta::new("library", "author", vec![
///                 FieldDef::new("id", FieldType::BigAutoField).primary_key(),
///                 FieldDef::new("name", FieldType::CharField).max_length(100),
///             ])
///         });
///         &META
///     }
///
///     fn pk(&self) -> Option<Value> {
///         self.id.map(Value::Int)
///     }
///
///     fn set_pk(&mut self, value: Value) {
///         self.id = value.as_i64();
///     }
///
///     fn field_values(&self) -> Vec<(&'static str, Value)> {
///         vec![("id", self.id.into()), ("name", self.name.clone().into())]
///     }
///
///     fn set_field_value(&mut self, name: &str, value: Value) -> VanillaResult<()> {
///         match (name, value) {
///             ("name", Value::String(s)) => self.name = s,
///             (other, _) => {
///                 return Err(VanillaError::DatabaseError(format!("cannot set {other}")))
///             }
///         }
///         Ok(())
///     }
/// }
///
/// let mut author = Author::default();
/// author.set_field_value("name", "Ursula".into()).unwrap();
/// assert_eq!(author.field_value("name"), Some(Value::from("Ursula")));
/// ```
pub trait Model: Clone + Default + Send + Sync + 'static {
    /// Returns the static metadata for this model type.
    fn meta() -> &'static ModelMeta;

    /// Returns the primary key value, or `None` if unsaved.
    fn pk(&self) -> Option<Value>;

    /// Sets the primary key value (used after an insert).
    fn set_pk(&mut self, value: Value);

    /// Returns the name of the primary key field.
    fn pk_field_name() -> &'static str {
        Self::meta().pk_field().map_or("id", |f| f.name)
    }

    /// Returns all field name-value pairs for this instance.
    fn field_values(&self) -> Vec<(&'static str, Value)>;

    /// Returns the value of a single field.
    fn field_value(&self, name: &str) -> Option<Value> {
        self.field_values()
            .into_iter()
            .find(|(field, _)| *field == name)
            .map(|(_, value)| value)
    }

    /// Assigns a value to a field by name.
    fn set_field_value(&mut self, name: &str, value: Value) -> VanillaResult<()>;
}

/// Metadata about a model.
#[derive(Debug)]
pub struct ModelMeta {
    /// The application label (e.g. "shop").
    pub app_label: &'static str,
    /// The model name in lowercase (e.g. "order").
    pub model_name: &'static str,
    /// Human-readable singular name.
    pub verbose_name: String,
    /// Human-readable plural name.
    pub verbose_name_plural: String,
    /// Field definitions for this model.
    pub fields: Vec<FieldDef>,
}

impl ModelMeta {
    /// Creates metadata with verbose names derived from the model name.
    pub fn new(app_label: &'static str, model_name: &'static str, fields: Vec<FieldDef>) -> Self {
        let verbose_name = model_name.replace('_', " ");
        Self {
            app_label,
            model_name,
            verbose_name_plural: format!("{verbose_name}s"),
            verbose_name,
            fields,
        }
    }

    /// Returns the `"app_label.model_name"` label.
    pub fn label(&self) -> String {
        format!("{}.{}", self.app_label, self.model_name)
    }

    /// Returns `true` if `reference` names this model, either by full label
    /// or by bare model name.
    pub fn is_referenced_by(&self, reference: &str) -> bool {
        reference.eq_ignore_ascii_case(&self.label())
            || reference.eq_ignore_ascii_case(self.model_name)
    }

    /// Looks up a field by name.
    pub fn get_field(&self, name: &str) -> VanillaResult<&FieldDef> {
        self.fields.iter().find(|f| f.name == name).ok_or_else(|| {
            VanillaError::ImproperlyConfigured(format!(
                "{} has no field named '{name}'",
                self.label()
            ))
        })
    }

    /// Returns the primary key field, if one is declared.
    pub fn pk_field(&self) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.primary_key)
    }

    /// Returns every foreign key on this model that points at `target`.
    pub fn foreign_keys_to(&self, target: &Self) -> Vec<&FieldDef> {
        self.fields
            .iter()
            .filter(|f| f.related_model().is_some_and(|to| target.is_referenced_by(to)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::LazyLock;

    use super::*;
    use crate::fields::FieldType;

    static ORDER: LazyLock<ModelMeta> = LazyLock::new(|| {
        ModelMeta::new(
            "shop",
            "order",
            vec![
                FieldDef::new("id", FieldType::BigAutoField).primary_key(),
                FieldDef::new("customer", FieldType::CharField).max_length(50),
            ],
        )
    });

    static LINE: LazyLock<ModelMeta> = LazyLock::new(|| {
        ModelMeta::new(
            "shop",
            "order_line",
            vec![
                FieldDef::new("id", FieldType::BigAutoField).primary_key(),
                FieldDef::foreign_key("order", "shop.order"),
                FieldDef::foreign_key("replaces", "order").nullable(),
                FieldDef::foreign_key("supplier", "shop.supplier"),
                FieldDef::new("sku", FieldType::CharField),
            ],
        )
    });

    #[test]
    fn test_label_and_verbose_names() {
        assert_eq!(ORDER.label(), "shop.order");
        assert_eq!(LINE.verbose_name, "order line");
        assert_eq!(LINE.verbose_name_plural, "order lines");
    }

    #[test]
    fn test_get_field() {
        assert_eq!(ORDER.get_field("customer").unwrap().name, "customer");
        let err = ORDER.get_field("missing").unwrap_err();
        assert!(err.to_string().contains("shop.order has no field named 'missing'"));
    }

    #[test]
    fn test_pk_field() {
        assert_eq!(ORDER.pk_field().unwrap().name, "id");
    }

    #[test]
    fn test_foreign_keys_to() {
        let names: Vec<&str> = LINE.foreign_keys_to(&ORDER).iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["order", "replaces"]);
        assert!(ORDER.foreign_keys_to(&LINE).is_empty());
    }
}
