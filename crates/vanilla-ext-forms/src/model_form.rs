//! Model-backed forms that generate their fields from model metadata.
//!
//! [`ModelFormConfig`] says which model fields become form fields and how to
//! label them. [`generate_form_fields`] turns the model's
//! [`FieldDef`] entries into [`FormFieldDef`]s, and [`model_form_class`]
//! wraps the result in a [`FormClass`] a formset can build rows from.
//!
//! [`ModelForm`] pairs a form with the instance it edits and writes the
//! cleaned data back through a [`ModelStore`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use vanilla_ext_core::{ContextValue, ValidationError, VanillaError, VanillaResult};
use vanilla_ext_db::fields::{FieldDef, FieldType};
use vanilla_ext_db::model::{Model, ModelMeta};
use vanilla_ext_db::store::ModelStore;
use vanilla_ext_db::value::Value;
use vanilla_ext_http::{FileDict, QueryDict};

use crate::fields::{FormFieldDef, FormFieldType};
use crate::form::{BaseForm, Form, FormClass, FormErrors, FormKwargs};

/// Which model fields a generated form includes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelFormFields {
    /// Every editable, non-relational field.
    All,
    /// Only the named fields. Relational fields may be named explicitly.
    Include(Vec<String>),
    /// Every editable, non-relational field except the named ones.
    Exclude(Vec<String>),
}

impl ModelFormFields {
    /// Includes the given field names.
    pub fn include<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Include(names.into_iter().map(Into::into).collect())
    }

    /// Excludes the given field names.
    pub fn exclude<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Exclude(names.into_iter().map(Into::into).collect())
    }

    /// Adds `name` to the excluded set, or drops it from the included set.
    #[must_use]
    pub fn without(self, name: &str) -> Self {
        match self {
            Self::All => Self::Exclude(vec![name.to_string()]),
            Self::Include(mut names) => {
                names.retain(|n| n != name);
                Self::Include(names)
            }
            Self::Exclude(mut names) => {
                if !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
                Self::Exclude(names)
            }
        }
    }
}

/// Overrides how one model field becomes a form field. Returning `None`
/// drops the field from the form.
pub type FormFieldCallback =
    Arc<dyn Fn(&FieldDef, FormFieldDef) -> Option<FormFieldDef> + Send + Sync>;

/// Configuration for generating a model-backed form.
#[derive(Clone)]
pub struct ModelFormConfig {
    /// The model metadata to generate fields from.
    pub model_meta: &'static ModelMeta,
    /// Which model fields to include.
    pub fields: ModelFormFields,
    /// Label overrides keyed by field name.
    pub labels: HashMap<String, String>,
    /// Help text overrides keyed by field name.
    pub help_texts: HashMap<String, String>,
    /// Per-field construction override.
    pub formfield_callback: Option<FormFieldCallback>,
}

impl fmt::Debug for ModelFormConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelFormConfig")
            .field("model", &self.model_meta.label())
            .field("fields", &self.fields)
            .field("labels", &self.labels)
            .field("help_texts", &self.help_texts)
            .field("formfield_callback", &self.formfield_callback.is_some())
            .finish()
    }
}

impl ModelFormConfig {
    /// Creates a config that includes all editable fields.
    pub fn new(model_meta: &'static ModelMeta) -> Self {
        Self {
            model_meta,
            fields: ModelFormFields::All,
            labels: HashMap::new(),
            help_texts: HashMap::new(),
            formfield_callback: None,
        }
    }

    /// Sets which fields to include.
    #[must_use]
    pub fn with_fields(mut self, fields: ModelFormFields) -> Self {
        self.fields = fields;
        self
    }

    /// Adds a label override for a specific field.
    #[must_use]
    pub fn with_label(mut self, field_name: impl Into<String>, label: impl Into<String>) -> Self {
        self.labels.insert(field_name.into(), label.into());
        self
    }

    /// Adds a help text override for a specific field.
    #[must_use]
    pub fn with_help_text(
        mut self,
        field_name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        self.help_texts.insert(field_name.into(), text.into());
        self
    }

    /// Installs a per-field construction override.
    #[must_use]
    pub fn with_formfield_callback(
        mut self,
        callback: impl Fn(&FieldDef, FormFieldDef) -> Option<FormFieldDef> + Send + Sync + 'static,
    ) -> Self {
        self.formfield_callback = Some(Arc::new(callback));
        self
    }
}

/// Generates form field definitions from a model form configuration.
///
/// Non-editable fields and the primary key are always skipped. Relational
/// fields are skipped unless named in [`ModelFormFields::Include`]. Naming a
/// field the model does not have is a configuration error.
pub fn generate_form_fields(config: &ModelFormConfig) -> VanillaResult<Vec<FormFieldDef>> {
    let meta = config.model_meta;
    if let ModelFormFields::Include(names) = &config.fields {
        let unknown: Vec<&str> = names
            .iter()
            .filter(|name| meta.get_field(name).is_err())
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            return Err(VanillaError::ImproperlyConfigured(format!(
                "Unknown field(s) ({}) specified for {}",
                unknown.join(", "),
                meta.label()
            )));
        }
    }

    let mut form_fields = Vec::new();
    for model_field in &meta.fields {
        if !model_field.editable || model_field.primary_key {
            continue;
        }

        let name = model_field.name;
        let included = match &config.fields {
            ModelFormFields::All => !model_field.is_relation(),
            ModelFormFields::Include(names) => names.iter().any(|n| n == name),
            ModelFormFields::Exclude(names) => {
                !model_field.is_relation() && !names.iter().any(|n| n == name)
            }
        };
        if !included {
            continue;
        }

        let mut form_field = FormFieldDef::new(name, model_field_to_form_field_type(model_field))
            .required(!model_field.null && !model_field.blank && model_field.default.is_none())
            .label(
                config
                    .labels
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| model_field.verbose_name.clone()),
            )
            .help_text(
                config
                    .help_texts
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| model_field.help_text.clone()),
            );
        if let Some(default) = &model_field.default {
            form_field = form_field.initial(default.clone());
        }

        match &config.formfield_callback {
            Some(callback) => {
                if let Some(field) = callback(model_field, form_field) {
                    form_fields.push(field);
                }
            }
            None => form_fields.push(form_field),
        }
    }

    Ok(form_fields)
}

fn model_field_to_form_field_type(field_def: &FieldDef) -> FormFieldType {
    match &field_def.field_type {
        FieldType::CharField | FieldType::TextField => FormFieldType::Char {
            min_length: None,
            max_length: field_def.max_length,
            strip: true,
        },
        FieldType::AutoField
        | FieldType::BigAutoField
        | FieldType::IntegerField
        | FieldType::BigIntegerField
        | FieldType::ForeignKey { .. } => FormFieldType::integer(),
        FieldType::FloatField => FormFieldType::Float {
            min_value: None,
            max_value: None,
        },
        FieldType::BooleanField => FormFieldType::Boolean,
        FieldType::DateField => FormFieldType::Date,
        FieldType::DateTimeField => FormFieldType::DateTime,
        FieldType::EmailField => FormFieldType::Email,
        FieldType::SlugField => FormFieldType::Slug,
        FieldType::UuidField => FormFieldType::Uuid,
    }
}

/// Returns the form class name for a model, e.g. `order_line` ->
/// `OrderLineForm`.
pub fn form_class_name(meta: &ModelMeta) -> String {
    let mut name: String = meta
        .model_name
        .split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect()
            })
        })
        .collect();
    name.push_str("Form");
    name
}

/// Builds a form class whose fields are generated from the model.
pub fn model_form_class(config: &ModelFormConfig) -> VanillaResult<FormClass> {
    let fields = generate_form_fields(config)?;
    tracing::debug!(
        model = %config.model_meta.label(),
        fields = fields.len(),
        "generated model form class"
    );
    Ok(FormClass::from_fields(
        form_class_name(config.model_meta),
        fields,
    ))
}

/// Returns an instance's field values keyed by field name, for use as form
/// initial data.
pub fn instance_initial<M: Model>(instance: &M) -> HashMap<String, Value> {
    instance
        .field_values()
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

/// Copies cleaned form data onto `instance`.
///
/// Only the model's own fields are written; the primary key and the names in
/// `exclude` are left alone. Extra form fields such as `DELETE` are ignored.
pub fn construct_instance<M: Model>(
    instance: &mut M,
    cleaned_data: &HashMap<String, Value>,
    exclude: &[&str],
) -> VanillaResult<()> {
    for field in &M::meta().fields {
        if field.primary_key || exclude.contains(&field.name) {
            continue;
        }
        if let Some(value) = cleaned_data.get(field.name) {
            instance.set_field_value(field.name, value.clone())?;
        }
    }
    Ok(())
}

/// A form bound to the model instance it creates or edits.
pub struct ModelForm<M: Model> {
    form: BaseForm,
    instance: M,
    validated: Option<bool>,
}

impl<M: Model + fmt::Debug> fmt::Debug for ModelForm<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelForm")
            .field("form", &self.form)
            .field("instance", &self.instance)
            .field("validated", &self.validated)
            .finish()
    }
}

impl<M: Model> ModelForm<M> {
    /// Constructs an unbound form pre-filled from `instance`. Initial values
    /// in `kwargs` win over the instance's values.
    pub fn new(form_class: &FormClass, instance: M, mut kwargs: FormKwargs) -> Self {
        let mut initial = instance_initial(&instance);
        initial.extend(std::mem::take(&mut kwargs.initial));
        kwargs.initial = initial;
        Self {
            form: form_class.construct(kwargs),
            instance,
            validated: None,
        }
    }

    /// Returns the instance being edited.
    pub const fn instance(&self) -> &M {
        &self.instance
    }

    /// Returns the underlying form.
    pub const fn form(&self) -> &BaseForm {
        &self.form
    }

    /// Copies the cleaned data onto the instance.
    pub fn construct_instance(&mut self) -> VanillaResult<()> {
        construct_instance(&mut self.instance, self.form.cleaned_data(), &[])
    }

    /// Writes the cleaned data onto the instance and saves it.
    ///
    /// Returns the saved instance, with its primary key assigned on insert.
    /// Saving a form that has not passed validation, or that gained errors
    /// since, fails.
    pub async fn save(&mut self, store: &dyn ModelStore<M>) -> VanillaResult<M> {
        if self.validated != Some(true) || !self.form.errors().is_empty() {
            let verb = if self.instance.pk().is_some() {
                "changed"
            } else {
                "created"
            };
            return Err(VanillaError::ValidationError(ValidationError::new(
                format!(
                    "The {} could not be {verb} because the data didn't validate.",
                    M::meta().model_name
                ),
                "invalid",
            )));
        }
        self.construct_instance()?;
        store.save(&mut self.instance).await?;
        tracing::debug!(
            model = %M::meta().label(),
            pk = ?self.instance.pk(),
            "saved model form"
        );
        Ok(self.instance.clone())
    }
}

#[async_trait]
impl<M: Model> Form for ModelForm<M> {
    fn fields(&self) -> &[FormFieldDef] {
        self.form.fields()
    }

    fn initial(&self) -> &HashMap<String, Value> {
        self.form.initial()
    }

    fn prefix(&self) -> Option<&str> {
        self.form.prefix()
    }

    fn bind(&mut self, data: &QueryDict, files: &FileDict) {
        self.validated = None;
        self.form.bind(data, files);
    }

    fn is_bound(&self) -> bool {
        self.form.is_bound()
    }

    fn empty_permitted(&self) -> bool {
        self.form.empty_permitted()
    }

    fn has_changed(&self) -> bool {
        self.form.has_changed()
    }

    async fn is_valid(&mut self) -> bool {
        let valid = self.form.is_valid().await;
        self.validated = Some(valid);
        valid
    }

    fn errors(&self) -> &FormErrors {
        self.form.errors()
    }

    fn add_error(&mut self, field: Option<&str>, message: String) {
        self.form.add_error(field, message);
    }

    fn cleaned_data(&self) -> &HashMap<String, Value> {
        self.form.cleaned_data()
    }

    fn as_context(&self) -> HashMap<String, ContextValue> {
        self.form.as_context()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::LazyLock;

    use vanilla_ext_db::store::MemoryStore;

    use super::*;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Article {
        id: Option<i64>,
        title: String,
        body: String,
        published: bool,
        views: i64,
        author: Option<i64>,
    }

    static ARTICLE: LazyLock<ModelMeta> = LazyLock::new(|| {
        ModelMeta::new(
            "blog",
            "blog_article",
            vec![
                FieldDef::new("id", FieldType::BigAutoField).primary_key(),
                FieldDef::new("title", FieldType::CharField)
                    .max_length(200)
                    .verbose_name("Title"),
                FieldDef::new("body", FieldType::TextField)
                    .blank()
                    .help_text("Markdown"),
                FieldDef::new("published", FieldType::BooleanField).default(false),
                FieldDef::new("views", FieldType::IntegerField)
                    .default(0_i64)
                    .not_editable(),
                FieldDef::foreign_key("author", "blog.author").nullable(),
            ],
        )
    });

    impl Model for Article {
        fn meta() -> &'static ModelMeta {
            &ARTICLE
        }

        fn pk(&self) -> Option<Value> {
            self.id.map(Value::Int)
        }

        fn set_pk(&mut self, value: Value) {
            self.id = value.as_i64();
        }

        fn field_values(&self) -> Vec<(&'static str, Value)> {
            vec![
                ("id", self.id.into()),
                ("title", self.title.clone().into()),
                ("body", self.body.clone().into()),
                ("published", self.published.into()),
                ("views", self.views.into()),
                ("author", self.author.into()),
            ]
        }

        fn set_field_value(&mut self, name: &str, value: Value) -> VanillaResult<()> {
            match (name, value) {
                ("title", Value::String(s)) => self.title = s,
                ("body", Value::String(s)) => self.body = s,
                ("published", Value::Bool(b)) => self.published = b,
                ("views", v) => self.views = v.as_i64().unwrap_or_default(),
                ("author", v) => self.author = v.as_i64(),
                (other, v) => {
                    return Err(VanillaError::DatabaseError(format!(
                        "cannot assign {v} to {other}"
                    )))
                }
            }
            Ok(())
        }
    }

    fn names(fields: &[FormFieldDef]) -> Vec<&str> {
        fields.iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn test_generate_all_fields() {
        let fields = generate_form_fields(&ModelFormConfig::new(&ARTICLE)).unwrap();
        assert_eq!(names(&fields), vec!["title", "body", "published"]);
        assert!(fields[0].required);
        assert!(!fields[1].required);
        assert!(!fields[2].required);
        assert_eq!(fields[0].label, "Title");
        assert_eq!(fields[1].help_text, "Markdown");
        assert_eq!(fields[2].initial, Some(Value::Bool(false)));
    }

    #[test]
    fn test_include_and_exclude() {
        let config = ModelFormConfig::new(&ARTICLE)
            .with_fields(ModelFormFields::include(["title", "author"]));
        let fields = generate_form_fields(&config).unwrap();
        assert_eq!(names(&fields), vec!["title", "author"]);
        assert_eq!(fields[1].field_type, FormFieldType::integer());

        let config =
            ModelFormConfig::new(&ARTICLE).with_fields(ModelFormFields::exclude(["body"]));
        let fields = generate_form_fields(&config).unwrap();
        assert_eq!(names(&fields), vec!["title", "published"]);
    }

    #[test]
    fn test_unknown_field_is_improperly_configured() {
        let config = ModelFormConfig::new(&ARTICLE)
            .with_fields(ModelFormFields::include(["title", "subtitle"]));
        let err = generate_form_fields(&config).unwrap_err();
        assert!(matches!(err, VanillaError::ImproperlyConfigured(ref m) if m.contains("subtitle")));
    }

    #[test]
    fn test_overrides_and_callback() {
        let config = ModelFormConfig::new(&ARTICLE)
            .with_label("body", "Text")
            .with_help_text("title", "Keep it short")
            .with_formfield_callback(|model_field, form_field| {
                (model_field.name != "published").then_some(form_field)
            });
        let fields = generate_form_fields(&config).unwrap();
        assert_eq!(names(&fields), vec!["title", "body"]);
        assert_eq!(fields[0].help_text, "Keep it short");
        assert_eq!(fields[1].label, "Text");
    }

    #[test]
    fn test_fields_without() {
        assert_eq!(
            ModelFormFields::All.without("author"),
            ModelFormFields::exclude(["author"])
        );
        assert_eq!(
            ModelFormFields::include(["title", "author"]).without("author"),
            ModelFormFields::include(["title"])
        );
        assert_eq!(
            ModelFormFields::exclude(["author"]).without("author"),
            ModelFormFields::exclude(["author"])
        );
    }

    #[test]
    fn test_form_class_name() {
        assert_eq!(form_class_name(&ARTICLE), "BlogArticleForm");
        let class = model_form_class(&ModelFormConfig::new(&ARTICLE)).unwrap();
        assert_eq!(class.name(), "BlogArticleForm");
        assert_eq!(class.field_names(), vec!["title", "body", "published"]);
    }

    #[test]
    fn test_construct_instance_skips_pk_and_extras() {
        let mut article = Article {
            id: Some(4),
            ..Article::default()
        };
        let cleaned = HashMap::from([
            ("id".to_string(), Value::Int(99)),
            ("title".to_string(), Value::from("Hello")),
            ("DELETE".to_string(), Value::Bool(false)),
        ]);
        construct_instance(&mut article, &cleaned, &[]).unwrap();
        assert_eq!(article.id, Some(4));
        assert_eq!(article.title, "Hello");
    }

    #[tokio::test]
    async fn test_model_form_save() {
        let store = MemoryStore::<Article>::new();
        let class = model_form_class(&ModelFormConfig::new(&ARTICLE)).unwrap();
        let mut form = ModelForm::new(&class, Article::default(), FormKwargs::default());
        form.bind(
            &QueryDict::parse("title=First&body=&published=on"),
            &FileDict::new(),
        );
        assert!(form.is_valid().await);
        let saved = form.save(&store).await.unwrap();
        assert_eq!(saved.id, Some(1));
        assert!(saved.published);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_model_form_initial_from_instance() {
        let article = Article {
            id: Some(2),
            title: "Draft".into(),
            ..Article::default()
        };
        let class = model_form_class(&ModelFormConfig::new(&ARTICLE)).unwrap();
        let form = ModelForm::new(&class, article, FormKwargs::default());
        assert_eq!(form.form().initial_value("title"), Some(&Value::from("Draft")));
        assert_eq!(form.instance().id, Some(2));
    }

    #[tokio::test]
    async fn test_model_form_save_rejects_invalid() {
        let store = MemoryStore::<Article>::new();
        let class = model_form_class(&ModelFormConfig::new(&ARTICLE)).unwrap();
        let mut form = ModelForm::new(&class, Article::default(), FormKwargs::default());
        form.bind(&QueryDict::parse("title="), &FileDict::new());
        assert!(!form.is_valid().await);
        assert!(matches!(
            form.save(&store).await,
            Err(VanillaError::ValidationError(_))
        ));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_model_form_save_requires_validation() {
        let store = MemoryStore::<Article>::new();
        let class = model_form_class(&ModelFormConfig::new(&ARTICLE)).unwrap();
        let mut form = ModelForm::new(&class, Article::default(), FormKwargs::default());
        let long_title = "x".repeat(300);
        form.bind(
            &QueryDict::from_pairs([("title", long_title.as_str())]),
            &FileDict::new(),
        );
        assert!(matches!(
            form.save(&store).await,
            Err(VanillaError::ValidationError(_))
        ));
        assert!(store.is_empty().await);
        assert!(!form.is_valid().await);
        assert!(form.save(&store).await.is_err());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_model_form_rebind_clears_validation() {
        let store = MemoryStore::<Article>::new();
        let class = model_form_class(&ModelFormConfig::new(&ARTICLE)).unwrap();
        let mut form = ModelForm::new(&class, Article::default(), FormKwargs::default());
        form.bind(&QueryDict::parse("title=First"), &FileDict::new());
        assert!(form.is_valid().await);
        form.bind(&QueryDict::parse("title="), &FileDict::new());
        assert!(form.save(&store).await.is_err());
        assert!(store.is_empty().await);
    }
}
