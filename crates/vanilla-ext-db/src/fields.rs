//! Model field metadata.
//!
//! [`FieldDef`] describes one column of a model: its type, nullability,
//! default, and the presentation hints (`verbose_name`, `help_text`) that
//! generated forms pick up.

use crate::value::Value;

/// The type of a model field.
///
/// Relational fields name their target with a model label; see
/// [`ModelMeta::label`](crate::model::ModelMeta::label).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    /// Auto-incrementing 32-bit integer primary key.
    AutoField,
    /// Auto-incrementing 64-bit integer primary key.
    BigAutoField,
    /// Bounded string.
    CharField,
    /// Unbounded string.
    TextField,
    /// 32-bit integer.
    IntegerField,
    /// 64-bit integer.
    BigIntegerField,
    /// Floating point number.
    FloatField,
    /// Boolean.
    BooleanField,
    /// Calendar date.
    DateField,
    /// Date and time.
    DateTimeField,
    /// Email address string.
    EmailField,
    /// Slug string.
    SlugField,
    /// UUID.
    UuidField,
    /// Many-to-one relation.
    ForeignKey {
        /// Label of the target model (`"app_label.model_name"` or `"model_name"`).
        to: String,
        /// Reverse accessor name on the target model.
        related_name: Option<String>,
    },
}

/// Metadata for a single model field.
#[derive(Debug, Clone)]
pub struct FieldDef {
    /// The attribute name of this field.
    pub name: &'static str,
    /// The type of this field.
    pub field_type: FieldType,
    /// Whether this field is the primary key.
    pub primary_key: bool,
    /// Whether NULL is allowed.
    pub null: bool,
    /// Whether the field may be left blank in forms.
    pub blank: bool,
    /// Default value for new instances.
    pub default: Option<Value>,
    /// Maximum character length.
    pub max_length: Option<usize>,
    /// Human-readable help text.
    pub help_text: String,
    /// Human-readable name for the field.
    pub verbose_name: String,
    /// Whether the field is editable in forms.
    pub editable: bool,
}

impl FieldDef {
    /// Creates a new `FieldDef`: non-null, editable, no default.
    pub fn new(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            primary_key: false,
            null: false,
            blank: false,
            default: None,
            max_length: None,
            help_text: String::new(),
            verbose_name: name.replace('_', " "),
            editable: true,
        }
    }

    /// Creates a foreign key to the model with the given label.
    pub fn foreign_key(name: &'static str, to: impl Into<String>) -> Self {
        Self::new(
            name,
            FieldType::ForeignKey {
                to: to.into(),
                related_name: None,
            },
        )
    }

    /// Marks this field as the primary key.
    #[must_use]
    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Allows NULL values.
    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.null = true;
        self
    }

    /// Allows the field to be left blank in forms.
    #[must_use]
    pub const fn blank(mut self) -> Self {
        self.blank = true;
        self
    }

    /// Sets the maximum character length.
    #[must_use]
    pub const fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Sets the verbose name.
    #[must_use]
    pub fn verbose_name(mut self, name: impl Into<String>) -> Self {
        self.verbose_name = name.into();
        self
    }

    /// Sets the help text.
    #[must_use]
    pub fn help_text(mut self, text: impl Into<String>) -> Self {
        self.help_text = text.into();
        self
    }

    /// Excludes this field from generated forms.
    #[must_use]
    pub const fn not_editable(mut self) -> Self {
        self.editable = false;
        self
    }

    /// Returns `true` if this is a relational field.
    pub const fn is_relation(&self) -> bool {
        matches!(self.field_type, FieldType::ForeignKey { .. })
    }

    /// Returns the target label if this is a foreign key.
    pub fn related_model(&self) -> Option<&str> {
        match &self.field_type {
            FieldType::ForeignKey { to, .. } => Some(to),
            _ => None,
        }
    }

    /// Parses a raw lookup such as a URL segment into a value of this
    /// field's type. Returns `None` when the text cannot be one.
    pub fn value_from_str(&self, raw: &str) -> Option<Value> {
        match self.field_type {
            FieldType::AutoField
            | FieldType::BigAutoField
            | FieldType::IntegerField
            | FieldType::BigIntegerField
            | FieldType::ForeignKey { .. } => raw.trim().parse().ok().map(Value::Int),
            _ => Some(Value::String(raw.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_defaults() {
        let f = FieldDef::new("publish_date", FieldType::DateField);
        assert!(!f.primary_key);
        assert!(!f.null);
        assert!(f.editable);
        assert_eq!(f.verbose_name, "publish date");
        assert!(!f.is_relation());
    }

    #[test]
    fn test_builder_chain() {
        let f = FieldDef::new("title", FieldType::CharField)
            .max_length(80)
            .blank()
            .default("untitled")
            .help_text("Shown in lists")
            .verbose_name("Title");
        assert_eq!(f.max_length, Some(80));
        assert!(f.blank);
        assert_eq!(f.default, Some(Value::from("untitled")));
        assert_eq!(f.help_text, "Shown in lists");
        assert_eq!(f.verbose_name, "Title");
    }

    #[test]
    fn test_foreign_key() {
        let f = FieldDef::foreign_key("order", "shop.order");
        assert!(f.is_relation());
        assert_eq!(f.related_model(), Some("shop.order"));
        assert_eq!(
            FieldDef::new("id", FieldType::BigAutoField).related_model(),
            None
        );
    }

    #[test]
    fn test_value_from_str() {
        let id = FieldDef::new("id", FieldType::BigAutoField).primary_key();
        assert_eq!(id.value_from_str("12"), Some(Value::Int(12)));
        assert_eq!(id.value_from_str("abc"), None);

        let slug = FieldDef::new("slug", FieldType::SlugField);
        assert_eq!(slug.value_from_str("abc"), Some(Value::from("abc")));
    }
}
