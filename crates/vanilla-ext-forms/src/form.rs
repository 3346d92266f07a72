//! The [`Form`] trait, [`BaseForm`], and form classes.
//!
//! A [`FormClass`] is a reusable constructor for [`BaseForm`] instances. It
//! plays the role of a form "class" in a formset: the formset asks it for one
//! form per row, passing per-row [`FormKwargs`]. [`FormClass::curry`] derives
//! a new class that merges extra keyword arguments into every construction,
//! leaving the original class untouched.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use vanilla_ext_core::ContextValue;
use vanilla_ext_db::value::Value;
use vanilla_ext_http::{FileDict, QueryDict, UploadedFile};

use crate::fields::{parse_bool, FormFieldDef, FormFieldType};
use crate::validation::{self, RawInput};

/// Per-field error messages. Form-level errors live under [`NON_FIELD_ERRORS`].
pub type FormErrors = HashMap<String, Vec<String>>;

/// The error key for errors that do not belong to a single field.
pub const NON_FIELD_ERRORS: &str = "__all__";

/// A cross-field validation hook run after field cleaning.
pub type CleanHook =
    Arc<dyn Fn(&HashMap<String, Value>) -> Result<(), FormErrors> + Send + Sync>;

/// The core form trait.
///
/// `is_valid()` and `clean()` are async so cross-field validation can
/// consult a store.
#[async_trait]
pub trait Form: Send + Sync {
    /// Returns the form's field definitions.
    fn fields(&self) -> &[FormFieldDef];

    /// Returns the initial values for fields.
    fn initial(&self) -> &HashMap<String, Value>;

    /// Returns the form prefix.
    fn prefix(&self) -> Option<&str>;

    /// Returns the submitted key for a field name.
    fn add_prefix(&self, field_name: &str) -> String {
        match self.prefix() {
            Some(prefix) => format!("{prefix}-{field_name}"),
            None => field_name.to_string(),
        }
    }

    /// Binds submitted data and uploads to this form.
    fn bind(&mut self, data: &QueryDict, files: &FileDict);

    /// Returns `true` if this form has been bound to data.
    fn is_bound(&self) -> bool;

    /// Returns `true` if an unchanged submission is accepted without
    /// validation.
    fn empty_permitted(&self) -> bool;

    /// Returns `true` if the submitted data differs from the initial data.
    fn has_changed(&self) -> bool;

    /// Validates the form. Returns `true` if valid.
    async fn is_valid(&mut self) -> bool;

    /// Returns per-field validation errors.
    fn errors(&self) -> &FormErrors;

    /// Records an error after validation. `None` targets the form itself.
    fn add_error(&mut self, field: Option<&str>, message: String);

    /// Returns the form-level errors.
    fn non_field_errors(&self) -> &[String] {
        self.errors()
            .get(NON_FIELD_ERRORS)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Returns the cleaned data. Populated by `is_valid()`.
    fn cleaned_data(&self) -> &HashMap<String, Value>;

    /// Describes the form for a template.
    fn as_context(&self) -> HashMap<String, ContextValue>;

    /// Cross-field validation hook. The default accepts everything.
    async fn clean(&self) -> Result<(), FormErrors> {
        Ok(())
    }
}

/// Construction arguments for one form instance.
#[derive(Debug, Clone, Default)]
pub struct FormKwargs {
    /// The form prefix, e.g. `"lines-0"`.
    pub prefix: Option<String>,
    /// Initial values merged over the fields' own initial values.
    pub initial: HashMap<String, Value>,
    /// Extra keyword arguments for custom form constructors.
    pub extra: HashMap<String, Value>,
    /// Whether an unchanged form skips validation.
    pub empty_permitted: bool,
}

impl FormKwargs {
    /// Sets the prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Sets the initial values.
    #[must_use]
    pub fn with_initial(mut self, initial: HashMap<String, Value>) -> Self {
        self.initial = initial;
        self
    }

    /// Adds one extra keyword argument.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// A general-purpose form built from a list of field definitions.
pub struct BaseForm {
    field_defs: Vec<FormFieldDef>,
    initial_data: HashMap<String, Value>,
    prefix: Option<String>,
    kwargs: HashMap<String, Value>,
    empty_permitted: bool,
    bound: bool,
    raw_data: HashMap<String, Option<String>>,
    raw_files: HashMap<String, UploadedFile>,
    errors: FormErrors,
    cleaned_data: HashMap<String, Value>,
    clean_hook: Option<CleanHook>,
}

impl fmt::Debug for BaseForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseForm")
            .field("fields", &self.field_names())
            .field("prefix", &self.prefix)
            .field("bound", &self.bound)
            .field("errors", &self.errors)
            .finish_non_exhaustive()
    }
}

impl BaseForm {
    /// Creates an unbound form with the given fields.
    pub fn new(fields: Vec<FormFieldDef>) -> Self {
        Self {
            field_defs: fields,
            initial_data: HashMap::new(),
            prefix: None,
            kwargs: HashMap::new(),
            empty_permitted: false,
            bound: false,
            raw_data: HashMap::new(),
            raw_files: HashMap::new(),
            errors: HashMap::new(),
            cleaned_data: HashMap::new(),
            clean_hook: None,
        }
    }

    /// Sets initial values for fields.
    #[must_use]
    pub fn with_initial(mut self, initial: HashMap<String, Value>) -> Self {
        self.initial_data = initial;
        self
    }

    /// Sets the form prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Installs a cross-field validation hook.
    #[must_use]
    pub fn with_clean(
        mut self,
        hook: impl Fn(&HashMap<String, Value>) -> Result<(), FormErrors> + Send + Sync + 'static,
    ) -> Self {
        self.clean_hook = Some(Arc::new(hook));
        self
    }

    /// Applies construction arguments: prefix, initial values, extra
    /// keyword arguments, and `empty_permitted`.
    #[must_use]
    pub fn with_kwargs(mut self, kwargs: FormKwargs) -> Self {
        if kwargs.prefix.is_some() {
            self.prefix = kwargs.prefix;
        }
        self.initial_data.extend(kwargs.initial);
        self.kwargs.extend(kwargs.extra);
        self.empty_permitted = kwargs.empty_permitted;
        self
    }

    /// Appends a field. Formsets use this for their `DELETE`, `ORDER`, and
    /// primary key fields.
    pub fn add_field(&mut self, field: FormFieldDef) {
        self.field_defs.retain(|f| f.name != field.name);
        self.field_defs.push(field);
    }

    /// Looks up a field definition by name.
    pub fn field(&self, name: &str) -> Option<&FormFieldDef> {
        self.field_defs.iter().find(|f| f.name == name)
    }

    /// Returns the field names in declaration order.
    pub fn field_names(&self) -> Vec<&str> {
        self.field_defs.iter().map(|f| f.name.as_str()).collect()
    }

    /// Returns the extra keyword arguments this form was constructed with.
    pub const fn kwargs(&self) -> &HashMap<String, Value> {
        &self.kwargs
    }

    /// Returns the raw submitted string for a field, if bound.
    pub fn raw_value(&self, name: &str) -> Option<&str> {
        self.raw_data.get(name).and_then(|v| v.as_deref())
    }

    /// Returns the effective initial value of a field.
    pub fn initial_value(&self, name: &str) -> Option<&Value> {
        self.initial_data
            .get(name)
            .or_else(|| self.field(name).and_then(|f| f.initial.as_ref()))
    }

    /// Returns the names of fields whose submitted value differs from the
    /// initial value.
    pub fn changed_data(&self) -> Vec<String> {
        self.field_defs
            .iter()
            .filter(|field| self.field_has_changed(field))
            .map(|field| field.name.clone())
            .collect()
    }

    fn field_has_changed(&self, field: &FormFieldDef) -> bool {
        if field.disabled {
            return false;
        }
        if field.is_file() {
            return self.raw_files.contains_key(&field.name);
        }
        let initial = self.initial_value(&field.name);
        let raw = self.raw_value(&field.name);
        if field.field_type == FormFieldType::Boolean {
            return parse_bool(raw) != initial.is_some_and(|v| !v.is_blank());
        }
        let initial = initial.map(Value::to_form_string).unwrap_or_default();
        raw.unwrap_or("").trim() != initial.trim()
    }

    /// The value a template should show for a field: the submitted value
    /// when bound, otherwise the initial value.
    fn display_value(&self, field: &FormFieldDef) -> String {
        if self.bound && !field.is_file() {
            return self.raw_value(&field.name).unwrap_or("").to_string();
        }
        self.initial_value(&field.name)
            .map(Value::to_form_string)
            .unwrap_or_default()
    }

    fn field_context(&self, field: &FormFieldDef) -> ContextValue {
        let errors = self
            .errors
            .get(&field.name)
            .map(|errs| errs.iter().cloned().map(ContextValue::String).collect())
            .unwrap_or_default();
        ContextValue::Dict(HashMap::from([
            ("name".to_string(), ContextValue::String(field.name.clone())),
            (
                "html_name".to_string(),
                ContextValue::String(self.add_prefix(&field.name)),
            ),
            ("label".to_string(), ContextValue::String(field.label.clone())),
            (
                "help_text".to_string(),
                ContextValue::String(field.help_text.clone()),
            ),
            (
                "value".to_string(),
                ContextValue::String(self.display_value(field)),
            ),
            ("errors".to_string(), ContextValue::List(errors)),
            ("required".to_string(), ContextValue::Bool(field.required)),
            ("hidden".to_string(), ContextValue::Bool(field.hidden)),
        ]))
    }
}

#[async_trait]
impl Form for BaseForm {
    fn fields(&self) -> &[FormFieldDef] {
        &self.field_defs
    }

    fn initial(&self) -> &HashMap<String, Value> {
        &self.initial_data
    }

    fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    fn bind(&mut self, data: &QueryDict, files: &FileDict) {
        self.bound = true;
        self.raw_data.clear();
        self.raw_files.clear();
        self.errors.clear();
        self.cleaned_data.clear();

        for field in &self.field_defs {
            let html_name = self.add_prefix(&field.name);
            if field.is_file() {
                if let Some(file) = files.get(&html_name) {
                    self.raw_files.insert(field.name.clone(), file.clone());
                }
            }
            let value = data.get(&html_name).map(String::from);
            self.raw_data.insert(field.name.clone(), value);
        }
    }

    fn is_bound(&self) -> bool {
        self.bound
    }

    fn empty_permitted(&self) -> bool {
        self.empty_permitted
    }

    fn has_changed(&self) -> bool {
        self.field_defs
            .iter()
            .any(|field| self.field_has_changed(field))
    }

    async fn is_valid(&mut self) -> bool {
        if !self.bound {
            return false;
        }

        self.errors.clear();
        self.cleaned_data.clear();

        if self.empty_permitted && !self.has_changed() {
            return true;
        }

        let input = RawInput {
            data: &self.raw_data,
            files: &self.raw_files,
            initial: &self.initial_data,
        };
        validation::clean_fields(
            &self.field_defs,
            &input,
            &mut self.cleaned_data,
            &mut self.errors,
        );

        if let Err(form_errors) = self.clean().await {
            for (key, msgs) in form_errors {
                self.errors.entry(key).or_default().extend(msgs);
            }
        }

        self.errors.is_empty()
    }

    fn errors(&self) -> &FormErrors {
        &self.errors
    }

    fn add_error(&mut self, field: Option<&str>, message: String) {
        let key = field.unwrap_or(NON_FIELD_ERRORS).to_string();
        self.cleaned_data.remove(&key);
        self.errors.entry(key).or_default().push(message);
    }

    fn cleaned_data(&self) -> &HashMap<String, Value> {
        &self.cleaned_data
    }

    fn as_context(&self) -> HashMap<String, ContextValue> {
        let fields = self
            .field_defs
            .iter()
            .map(|field| self.field_context(field))
            .collect();

        let errors = self
            .errors
            .iter()
            .map(|(k, v)| {
                let list = v.iter().cloned().map(ContextValue::String).collect();
                (k.clone(), ContextValue::List(list))
            })
            .collect();

        let non_field = self
            .non_field_errors()
            .iter()
            .cloned()
            .map(ContextValue::String)
            .collect();

        let kwargs = self
            .kwargs
            .iter()
            .map(|(k, v)| (k.clone(), ContextValue::from(v.to_json())))
            .collect();

        HashMap::from([
            ("fields".to_string(), ContextValue::List(fields)),
            ("errors".to_string(), ContextValue::Dict(errors)),
            ("non_field_errors".to_string(), ContextValue::List(non_field)),
            ("is_bound".to_string(), ContextValue::Bool(self.bound)),
            (
                "prefix".to_string(),
                self.prefix
                    .clone()
                    .map_or(ContextValue::None, ContextValue::String),
            ),
            ("kwargs".to_string(), ContextValue::Dict(kwargs)),
        ])
    }

    async fn clean(&self) -> Result<(), FormErrors> {
        match &self.clean_hook {
            Some(hook) => hook(&self.cleaned_data),
            None => Ok(()),
        }
    }
}

type FormConstructor = dyn Fn(&FormKwargs) -> BaseForm + Send + Sync;

/// A reusable constructor for forms.
///
/// # Examples
///
/// ```
/// use std::collections::HashMap;
///
/// use vanilla_ext_db::value::Value;
/// use vanilla_ext_forms::fields::{FormFieldDef, FormFieldType};
/// use vanilla_ext_forms::form::{FormClass, FormKwargs};
///
/// let class = FormClass::from_fields(
///     "ContactForm",
///     vec![FormFieldDef::new("email", FormFieldType::Email)],
/// );
/// let curried = class.curry(HashMap::from([("user".to_string(), Value::Int(7))]));
///
/// let form = curried.construct(FormKwargs::default());
/// assert_eq!(form.kwargs().get("user"), Some(&Value::Int(7)));
/// assert!(class.bound_kwargs().is_empty());
/// ```
#[derive(Clone)]
pub struct FormClass {
    name: String,
    constructor: Arc<FormConstructor>,
    bound_kwargs: HashMap<String, Value>,
}

impl fmt::Debug for FormClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormClass")
            .field("name", &self.name)
            .field("bound_kwargs", &self.bound_kwargs)
            .finish_non_exhaustive()
    }
}

impl FormClass {
    /// Creates a form class from a constructor. The constructor receives the
    /// merged kwargs and may shape the fields from them.
    pub fn new(
        name: impl Into<String>,
        constructor: impl Fn(&FormKwargs) -> BaseForm + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            constructor: Arc::new(constructor),
            bound_kwargs: HashMap::new(),
        }
    }

    /// Creates a form class whose forms all carry the given fields.
    pub fn from_fields(name: impl Into<String>, fields: Vec<FormFieldDef>) -> Self {
        Self::new(name, move |_| BaseForm::new(fields.clone()))
    }

    /// Returns the class name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the keyword arguments bound by [`curry`](Self::curry).
    pub const fn bound_kwargs(&self) -> &HashMap<String, Value> {
        &self.bound_kwargs
    }

    /// Derives a class that passes `extra` to every form it constructs.
    ///
    /// Keyword arguments given at construction time take precedence over
    /// curried ones.
    #[must_use]
    pub fn curry(&self, extra: HashMap<String, Value>) -> Self {
        let mut bound_kwargs = self.bound_kwargs.clone();
        bound_kwargs.extend(extra);
        Self {
            name: self.name.clone(),
            constructor: Arc::clone(&self.constructor),
            bound_kwargs,
        }
    }

    /// Constructs an unbound form.
    pub fn construct(&self, mut kwargs: FormKwargs) -> BaseForm {
        let mut extra = self.bound_kwargs.clone();
        extra.extend(std::mem::take(&mut kwargs.extra));
        kwargs.extra = extra;
        (self.constructor)(&kwargs).with_kwargs(kwargs)
    }

    /// Returns the field names a freshly constructed form carries.
    pub fn field_names(&self) -> Vec<String> {
        self.construct(FormKwargs::default())
            .field_names()
            .into_iter()
            .map(String::from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact_fields() -> Vec<FormFieldDef> {
        vec![
            FormFieldDef::new(
                "username",
                FormFieldType::Char {
                    min_length: Some(3),
                    max_length: Some(20),
                    strip: true,
                },
            ),
            FormFieldDef::new("email", FormFieldType::Email),
            FormFieldDef::new(
                "age",
                FormFieldType::Integer {
                    min_value: Some(0),
                    max_value: Some(150),
                },
            )
            .required(false),
        ]
    }

    fn bound(form: &mut BaseForm, query: &str) {
        form.bind(&QueryDict::parse(query), &FileDict::new());
    }

    #[tokio::test]
    async fn test_unbound_form_is_invalid() {
        let mut form = BaseForm::new(contact_fields());
        assert!(!form.is_bound());
        assert!(!form.is_valid().await);
    }

    #[tokio::test]
    async fn test_bind_and_validate() {
        let mut form = BaseForm::new(contact_fields());
        bound(&mut form, "username=alice&email=alice@example.com&age=30");
        assert!(form.is_valid().await);
        assert_eq!(form.cleaned_data().get("age"), Some(&Value::Int(30)));
    }

    #[tokio::test]
    async fn test_errors_accumulate() {
        let mut form = BaseForm::new(contact_fields());
        bound(&mut form, "username=al&email=nope&age=-2");
        assert!(!form.is_valid().await);
        assert_eq!(form.errors().len(), 3);
    }

    #[tokio::test]
    async fn test_prefixed_binding() {
        let mut form = BaseForm::new(contact_fields()).with_prefix("contacts-0");
        bound(&mut form, "contacts-0-username=alice&contacts-0-email=a@b.io");
        assert_eq!(form.add_prefix("email"), "contacts-0-email");
        assert!(form.is_valid().await);
    }

    #[tokio::test]
    async fn test_clean_hook_adds_non_field_error() {
        let mut form = BaseForm::new(contact_fields()).with_clean(|data| {
            if data.get("username") == data.get("email") {
                return Err(HashMap::from([(
                    NON_FIELD_ERRORS.to_string(),
                    vec!["Username and email must differ.".to_string()],
                )]));
            }
            Ok(())
        });
        bound(&mut form, "username=a@b.io&email=a@b.io");
        assert!(!form.is_valid().await);
        assert_eq!(form.non_field_errors(), ["Username and email must differ."]);
    }

    #[tokio::test]
    async fn test_empty_permitted_skips_unchanged() {
        let mut form = BaseForm::new(contact_fields()).with_kwargs(FormKwargs {
            empty_permitted: true,
            ..FormKwargs::default()
        });
        bound(&mut form, "");
        assert!(!form.has_changed());
        assert!(form.is_valid().await);
        assert!(form.errors().is_empty());

        bound(&mut form, "username=x");
        assert!(form.has_changed());
        assert!(!form.is_valid().await);
    }

    #[test]
    fn test_has_changed_against_initial() {
        let mut form = BaseForm::new(contact_fields()).with_initial(HashMap::from([
            ("username".to_string(), Value::from("alice")),
            ("age".to_string(), Value::Int(30)),
        ]));
        bound(&mut form, "username=alice&age=30");
        assert!(!form.has_changed());
        bound(&mut form, "username=alice&age=31");
        assert_eq!(form.changed_data(), vec!["age".to_string()]);
    }

    #[test]
    fn test_boolean_has_changed() {
        let mut form = BaseForm::new(vec![
            FormFieldDef::new("DELETE", FormFieldType::Boolean).required(false)
        ]);
        bound(&mut form, "");
        assert!(!form.has_changed());
        bound(&mut form, "DELETE=on");
        assert!(form.has_changed());
    }

    #[tokio::test]
    async fn test_add_error_after_validation() {
        let mut form = BaseForm::new(contact_fields());
        bound(&mut form, "username=alice&email=a@b.io");
        assert!(form.is_valid().await);
        form.add_error(Some("email"), "Taken.".to_string());
        assert_eq!(form.errors()["email"], vec!["Taken."]);
        assert!(!form.cleaned_data().contains_key("email"));
    }

    #[test]
    fn test_add_field_replaces_same_name() {
        let mut form = BaseForm::new(contact_fields());
        form.add_field(FormFieldDef::new("age", FormFieldType::text()).hidden());
        assert_eq!(form.field_names(), vec!["username", "email", "age"]);
        assert!(form.field("age").unwrap().hidden);
    }

    #[test]
    fn test_as_context() {
        let form = BaseForm::new(contact_fields())
            .with_prefix("p")
            .with_initial(HashMap::from([("username".to_string(), Value::from("bob"))]));
        let ctx = form.as_context();
        let fields = ctx["fields"].as_list().unwrap();
        assert_eq!(fields.len(), 3);
        assert_eq!(
            fields[0].get("html_name"),
            Some(&ContextValue::String("p-username".into()))
        );
        assert_eq!(
            fields[0].get("value"),
            Some(&ContextValue::String("bob".into()))
        );
        assert_eq!(ctx["is_bound"], ContextValue::Bool(false));
    }

    #[test]
    fn test_curry_returns_new_class() {
        let class = FormClass::from_fields("ContactForm", contact_fields());
        let curried = class.curry(HashMap::from([("user".to_string(), Value::Int(1))]));
        assert!(class.bound_kwargs().is_empty());
        assert_eq!(curried.bound_kwargs().len(), 1);
        assert_eq!(curried.name(), "ContactForm");
        assert_eq!(curried.field_names(), class.field_names());
    }

    #[test]
    fn test_explicit_kwargs_override_curried() {
        let class = FormClass::from_fields("F", vec![])
            .curry(HashMap::from([("mode".to_string(), Value::from("curried"))]));
        let form = class.construct(FormKwargs::default().with_extra("mode", "explicit"));
        assert_eq!(form.kwargs()["mode"], Value::from("explicit"));
    }

    #[test]
    fn test_constructor_sees_kwargs() {
        let class = FormClass::new("Dynamic", |kwargs| {
            let n = kwargs.extra.get("fields").and_then(Value::as_i64).unwrap_or(0);
            BaseForm::new(
                (0..n)
                    .map(|i| FormFieldDef::new(format!("f{i}"), FormFieldType::text()))
                    .collect(),
            )
        });
        assert!(class.field_names().is_empty());
        let curried = class.curry(HashMap::from([("fields".to_string(), Value::Int(2))]));
        assert_eq!(curried.field_names(), vec!["f0", "f1"]);
    }
}
