//! Declarative formset factories.
//!
//! A factory is an immutable configuration value. [`FormSetFactory::formset_factory`]
//! turns it into a formset class ([`FormSetClass`]), and
//! [`FormSetFactory::get_formset`] instantiates that class for one request.
//! Three variants share the contract:
//!
//! - [`FormSetConfig`]: a plain form class repeated N times
//! - [`ModelFormSetConfig`]: rows are stored instances of a model
//! - [`InlineFormSetConfig`]: rows are the children of one parent instance
//!
//! When a factory declares [`extra_form_kwargs`](FormSetFactory::extra_form_kwargs),
//! `get_formset` derives a fresh form class that passes them to every form
//! it builds. The class returned by `formset_factory` is never modified.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use vanilla_ext_core::settings::SETTINGS;
use vanilla_ext_core::{VanillaError, VanillaResult};
use vanilla_ext_db::fields::{FieldDef, FieldType};
use vanilla_ext_db::model::{Model, ModelMeta};
use vanilla_ext_db::store::ModelStore;
use vanilla_ext_db::value::Value;
use vanilla_ext_http::{FileDict, QueryDict};

use crate::form::FormClass;
use crate::formset::{BaseFormSet, FormSetKwargs, FormSetOptions, RuntimeFormSet};
use crate::model_form::{model_form_class, FormFieldCallback, ModelFormConfig, ModelFormFields};
use crate::model_formset::{InlineFormSet, ModelFormSet};

/// Returns the configured default formset prefix (`"form"` unless changed
/// in settings).
pub fn default_prefix() -> String {
    SETTINGS
        .get()
        .map_or_else(|| "form".to_string(), |s| s.formsets.default_prefix.clone())
}

/// A formset class: a form class plus row options, able to produce runtime
/// formsets.
#[async_trait]
pub trait FormSetClass: Send + Sync {
    /// The runtime formset this class produces.
    type FormSet: RuntimeFormSet + 'static;

    /// Returns the form class rows are built from.
    fn form(&self) -> &FormClass;

    /// Returns a copy of this class that builds rows from `form`.
    #[must_use]
    fn with_form(&self, form: FormClass) -> Self
    where
        Self: Sized;

    /// Returns the row options.
    fn options(&self) -> &FormSetOptions;

    /// Returns the prefix used when the caller does not pass one.
    fn default_prefix(&self) -> String;

    /// Builds a runtime formset, bound when `data` is given.
    async fn instantiate(
        &self,
        data: Option<&QueryDict>,
        files: Option<&FileDict>,
        kwargs: FormSetKwargs,
    ) -> VanillaResult<Self::FormSet>;
}

/// The declarative formset contract.
///
/// Implementors supply [`formset_factory`](Self::formset_factory); the
/// per-request plumbing comes for free.
#[async_trait]
pub trait FormSetFactory: Send + Sync {
    /// The formset class this factory produces.
    type Class: FormSetClass;

    /// Builds the formset class from the configuration.
    fn formset_factory(&self) -> VanillaResult<Self::Class>;

    /// Keyword arguments passed to every form the formset constructs.
    fn extra_form_kwargs(&self) -> HashMap<String, Value> {
        HashMap::new()
    }

    /// Builds a runtime formset for one request.
    async fn get_formset(
        &self,
        data: Option<&QueryDict>,
        files: Option<&FileDict>,
        kwargs: FormSetKwargs,
    ) -> VanillaResult<<Self::Class as FormSetClass>::FormSet> {
        let mut class = self.formset_factory()?;
        let extra = self.extra_form_kwargs();
        if !extra.is_empty() {
            class = class.with_form(class.form().curry(extra));
        }
        class.instantiate(data, files, kwargs).await
    }
}

/// The object-safe face of [`FormSetFactory`], for holding factories of
/// different types in one collection.
#[async_trait]
pub trait FormSetProvider: Send + Sync {
    /// Builds a boxed runtime formset for one request.
    async fn build(
        &self,
        data: Option<&QueryDict>,
        files: Option<&FileDict>,
        kwargs: FormSetKwargs,
    ) -> VanillaResult<Box<dyn RuntimeFormSet>>;
}

#[async_trait]
impl<T: FormSetFactory> FormSetProvider for T {
    async fn build(
        &self,
        data: Option<&QueryDict>,
        files: Option<&FileDict>,
        kwargs: FormSetKwargs,
    ) -> VanillaResult<Box<dyn RuntimeFormSet>> {
        let formset = self.get_formset(data, files, kwargs).await?;
        Ok(Box::new(formset))
    }
}

fn resolve_prefix(kwargs: &mut FormSetKwargs, default: String) -> String {
    kwargs.prefix.take().unwrap_or(default)
}

// ---------------------------------------------------------------------------
// Plain
// ---------------------------------------------------------------------------

/// The class produced by [`FormSetConfig`].
#[derive(Debug, Clone)]
pub struct PlainFormSetClass {
    form: FormClass,
    options: FormSetOptions,
    prefix: Option<String>,
}

#[async_trait]
impl FormSetClass for PlainFormSetClass {
    type FormSet = BaseFormSet;

    fn form(&self) -> &FormClass {
        &self.form
    }

    fn with_form(&self, form: FormClass) -> Self {
        Self {
            form,
            ..self.clone()
        }
    }

    fn options(&self) -> &FormSetOptions {
        &self.options
    }

    fn default_prefix(&self) -> String {
        self.prefix.clone().unwrap_or_else(default_prefix)
    }

    async fn instantiate(
        &self,
        data: Option<&QueryDict>,
        files: Option<&FileDict>,
        mut kwargs: FormSetKwargs,
    ) -> VanillaResult<BaseFormSet> {
        let prefix = resolve_prefix(&mut kwargs, self.default_prefix());
        let formset = BaseFormSet::new(self.form.clone(), self.options.clone(), prefix)
            .with_initial(kwargs.initial);
        Ok(match data {
            Some(data) => formset.bind(data, files.unwrap_or(&FileDict::new())),
            None => formset,
        })
    }
}

/// Configuration for a plain formset.
///
/// # Examples
///
/// ```
/// use vanilla_ext_forms::factory::{FormSetConfig, FormSetFactory};
/// use vanilla_ext_forms::fields::{FormFieldDef, FormFieldType};
/// use vanilla_ext_forms::form::FormClass;
///
/// let config = FormSetConfig::new(FormClass::from_fields(
///     "ContactForm",
///     vec![FormFieldDef::new("email", FormFieldType::Email)],
/// ));
/// assert!(config.formset_factory().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct FormSetConfig {
    /// The form class rows are built from.
    pub form_class: FormClass,
    /// Row options.
    pub options: FormSetOptions,
    /// Prefix override.
    pub prefix: Option<String>,
    /// Keyword arguments passed to every form.
    pub extra_form_kwargs: HashMap<String, Value>,
}

impl FormSetConfig {
    /// Creates a config with default options.
    pub fn new(form_class: FormClass) -> Self {
        Self {
            form_class,
            options: FormSetOptions::default(),
            prefix: None,
            extra_form_kwargs: HashMap::new(),
        }
    }

    /// Sets the row options.
    #[must_use]
    pub fn with_options(mut self, options: FormSetOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Adds a keyword argument passed to every form.
    #[must_use]
    pub fn with_extra_form_kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra_form_kwargs.insert(key.into(), value.into());
        self
    }
}

impl FormSetFactory for FormSetConfig {
    type Class = PlainFormSetClass;

    fn formset_factory(&self) -> VanillaResult<PlainFormSetClass> {
        self.options.validate()?;
        Ok(PlainFormSetClass {
            form: self.form_class.clone(),
            options: self.options.clone(),
            prefix: self.prefix.clone(),
        })
    }

    fn extra_form_kwargs(&self) -> HashMap<String, Value> {
        self.extra_form_kwargs.clone()
    }
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// The class produced by [`ModelFormSetConfig`].
pub struct ModelFormSetClass<M: Model> {
    form: FormClass,
    options: FormSetOptions,
    prefix: Option<String>,
    store: Arc<dyn ModelStore<M>>,
}

impl<M: Model> Clone for ModelFormSetClass<M> {
    fn clone(&self) -> Self {
        Self {
            form: self.form.clone(),
            options: self.options.clone(),
            prefix: self.prefix.clone(),
            store: Arc::clone(&self.store),
        }
    }
}

impl<M: Model> fmt::Debug for ModelFormSetClass<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelFormSetClass")
            .field("model", &M::meta().label())
            .field("form", &self.form)
            .field("options", &self.options)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<M: Model> FormSetClass for ModelFormSetClass<M> {
    type FormSet = ModelFormSet<M>;

    fn form(&self) -> &FormClass {
        &self.form
    }

    fn with_form(&self, form: FormClass) -> Self {
        Self {
            form,
            ..self.clone()
        }
    }

    fn options(&self) -> &FormSetOptions {
        &self.options
    }

    fn default_prefix(&self) -> String {
        self.prefix.clone().unwrap_or_else(default_prefix)
    }

    async fn instantiate(
        &self,
        data: Option<&QueryDict>,
        files: Option<&FileDict>,
        mut kwargs: FormSetKwargs,
    ) -> VanillaResult<ModelFormSet<M>> {
        let prefix = resolve_prefix(&mut kwargs, self.default_prefix());
        ModelFormSet::load(
            self.form.clone(),
            self.options.clone(),
            prefix,
            Arc::clone(&self.store),
            kwargs,
            data,
            files,
        )
        .await
    }
}

/// Configuration for a formset over the stored instances of `M`.
pub struct ModelFormSetConfig<M: Model> {
    /// Where rows are read from and written to.
    pub store: Arc<dyn ModelStore<M>>,
    /// An explicit form class. When unset, one is generated from the model
    /// and `fields`.
    pub form_class: Option<FormClass>,
    /// Which model fields the generated form includes.
    pub fields: Option<ModelFormFields>,
    /// Per-field construction override for the generated form.
    pub formfield_callback: Option<FormFieldCallback>,
    /// Row options.
    pub options: FormSetOptions,
    /// Prefix override.
    pub prefix: Option<String>,
    /// Keyword arguments passed to every form.
    pub extra_form_kwargs: HashMap<String, Value>,
}

impl<M: Model> Clone for ModelFormSetConfig<M> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            form_class: self.form_class.clone(),
            fields: self.fields.clone(),
            formfield_callback: self.formfield_callback.clone(),
            options: self.options.clone(),
            prefix: self.prefix.clone(),
            extra_form_kwargs: self.extra_form_kwargs.clone(),
        }
    }
}

impl<M: Model> fmt::Debug for ModelFormSetConfig<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelFormSetConfig")
            .field("model", &M::meta().label())
            .field("form_class", &self.form_class)
            .field("fields", &self.fields)
            .field("options", &self.options)
            .field("prefix", &self.prefix)
            .field("extra_form_kwargs", &self.extra_form_kwargs)
            .finish_non_exhaustive()
    }
}

impl<M: Model> ModelFormSetConfig<M> {
    /// Creates a config over `store` with default options and no field rules.
    pub fn new(store: Arc<dyn ModelStore<M>>) -> Self {
        Self {
            store,
            form_class: None,
            fields: None,
            formfield_callback: None,
            options: FormSetOptions::default(),
            prefix: None,
            extra_form_kwargs: HashMap::new(),
        }
    }

    /// Uses an explicit form class.
    #[must_use]
    pub fn with_form_class(mut self, form_class: FormClass) -> Self {
        self.form_class = Some(form_class);
        self
    }

    /// Sets the field rules for the generated form.
    #[must_use]
    pub fn with_fields(mut self, fields: ModelFormFields) -> Self {
        self.fields = Some(fields);
        self
    }

    /// Installs a per-field construction override.
    #[must_use]
    pub fn with_formfield_callback(mut self, callback: FormFieldCallback) -> Self {
        self.formfield_callback = Some(callback);
        self
    }

    /// Sets the row options.
    #[must_use]
    pub fn with_options(mut self, options: FormSetOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Adds a keyword argument passed to every form.
    #[must_use]
    pub fn with_extra_form_kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra_form_kwargs.insert(key.into(), value.into());
        self
    }

    /// Returns the explicit form class, or generates one from the model with
    /// `fk_name` left out.
    fn resolve_form_class(&self, fk_name: Option<&str>) -> VanillaResult<FormClass> {
        if let Some(form_class) = &self.form_class {
            return Ok(form_class.clone());
        }
        let Some(fields) = self.fields.clone() else {
            return Err(VanillaError::ImproperlyConfigured(
                "Calling modelformset_factory without defining 'fields' or 'exclude' \
                 explicitly is prohibited."
                    .to_string(),
            ));
        };
        let fields = match fk_name {
            Some(fk) => fields.without(fk),
            None => fields,
        };
        let config = ModelFormConfig {
            fields,
            formfield_callback: self.formfield_callback.clone(),
            ..ModelFormConfig::new(M::meta())
        };
        model_form_class(&config)
    }
}

impl<M: Model> FormSetFactory for ModelFormSetConfig<M> {
    type Class = ModelFormSetClass<M>;

    fn formset_factory(&self) -> VanillaResult<ModelFormSetClass<M>> {
        self.options.validate()?;
        Ok(ModelFormSetClass {
            form: self.resolve_form_class(None)?,
            options: self.options.clone(),
            prefix: self.prefix.clone(),
            store: Arc::clone(&self.store),
        })
    }

    fn extra_form_kwargs(&self) -> HashMap<String, Value> {
        self.extra_form_kwargs.clone()
    }
}

// ---------------------------------------------------------------------------
// Inline
// ---------------------------------------------------------------------------

/// Finds the foreign key on `child` that points at `parent`.
///
/// An explicit `fk_name` must name such a key. Without one, the child must
/// have exactly one foreign key to the parent.
pub fn resolve_foreign_key(
    parent: &ModelMeta,
    child: &'static ModelMeta,
    fk_name: Option<&str>,
) -> VanillaResult<&'static FieldDef> {
    if let Some(name) = fk_name {
        let field = child.get_field(name)?;
        if field
            .related_model()
            .is_some_and(|to| parent.is_referenced_by(to))
        {
            return Ok(field);
        }
        return Err(VanillaError::ImproperlyConfigured(format!(
            "fk_name '{name}' is not a ForeignKey to '{}'.",
            parent.label()
        )));
    }

    match child.foreign_keys_to(parent).as_slice() {
        [field] => Ok(*field),
        [] => Err(VanillaError::ImproperlyConfigured(format!(
            "'{}' has no ForeignKey to '{}'.",
            child.label(),
            parent.label()
        ))),
        _ => Err(VanillaError::ImproperlyConfigured(format!(
            "'{}' has more than one ForeignKey to '{}'. You must specify a 'fk_name' attribute.",
            child.label(),
            parent.label()
        ))),
    }
}

/// The default prefix of an inline formset: the foreign key's
/// `related_name`, or `{model_name}_set`.
pub fn inline_prefix(child: &ModelMeta, fk: &FieldDef) -> String {
    match &fk.field_type {
        FieldType::ForeignKey {
            related_name: Some(name),
            ..
        } => name.trim_end_matches('+').to_string(),
        _ => format!("{}_set", child.model_name),
    }
}

/// The class produced by [`InlineFormSetConfig`].
pub struct InlineFormSetClass<P: Model, M: Model> {
    form: FormClass,
    options: FormSetOptions,
    prefix: String,
    store: Arc<dyn ModelStore<M>>,
    fk_name: &'static str,
    _parent: PhantomData<fn() -> P>,
}

impl<P: Model, M: Model> Clone for InlineFormSetClass<P, M> {
    fn clone(&self) -> Self {
        Self {
            form: self.form.clone(),
            options: self.options.clone(),
            prefix: self.prefix.clone(),
            store: Arc::clone(&self.store),
            fk_name: self.fk_name,
            _parent: PhantomData,
        }
    }
}

impl<P: Model, M: Model> fmt::Debug for InlineFormSetClass<P, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InlineFormSetClass")
            .field("parent", &P::meta().label())
            .field("model", &M::meta().label())
            .field("fk_name", &self.fk_name)
            .field("form", &self.form)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl<P: Model, M: Model> InlineFormSetClass<P, M> {
    /// Returns the resolved foreign key field name.
    pub const fn fk_name(&self) -> &'static str {
        self.fk_name
    }
}

#[async_trait]
impl<P: Model, M: Model> FormSetClass for InlineFormSetClass<P, M> {
    type FormSet = InlineFormSet<P, M>;

    fn form(&self) -> &FormClass {
        &self.form
    }

    fn with_form(&self, form: FormClass) -> Self {
        Self {
            form,
            ..self.clone()
        }
    }

    fn options(&self) -> &FormSetOptions {
        &self.options
    }

    fn default_prefix(&self) -> String {
        self.prefix.clone()
    }

    async fn instantiate(
        &self,
        data: Option<&QueryDict>,
        files: Option<&FileDict>,
        mut kwargs: FormSetKwargs,
    ) -> VanillaResult<InlineFormSet<P, M>> {
        let prefix = resolve_prefix(&mut kwargs, self.default_prefix());
        InlineFormSet::load(
            self.form.clone(),
            self.options.clone(),
            prefix,
            Arc::clone(&self.store),
            self.fk_name,
            kwargs,
            data,
            files,
        )
        .await
    }
}

/// Configuration for a formset over the `M` children of a `P` instance.
///
/// Inline formsets default to three extra rows and deletion enabled.
pub struct InlineFormSetConfig<P: Model, M: Model> {
    /// Model formset configuration for the child rows.
    pub model: ModelFormSetConfig<M>,
    /// The foreign key on `M` pointing at `P`. Resolved automatically when
    /// there is exactly one.
    pub fk_name: Option<String>,
    _parent: PhantomData<fn() -> P>,
}

impl<P: Model, M: Model> Clone for InlineFormSetConfig<P, M> {
    fn clone(&self) -> Self {
        Self {
            model: self.model.clone(),
            fk_name: self.fk_name.clone(),
            _parent: PhantomData,
        }
    }
}

impl<P: Model, M: Model> fmt::Debug for InlineFormSetConfig<P, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InlineFormSetConfig")
            .field("parent", &P::meta().label())
            .field("model", &self.model)
            .field("fk_name", &self.fk_name)
            .finish()
    }
}

impl<P: Model, M: Model> InlineFormSetConfig<P, M> {
    /// Creates a config over `store`.
    pub fn new(store: Arc<dyn ModelStore<M>>) -> Self {
        let options = FormSetOptions::default()
            .with_extra(3)
            .with_can_delete(true);
        Self {
            model: ModelFormSetConfig::new(store).with_options(options),
            fk_name: None,
            _parent: PhantomData,
        }
    }

    /// Names the foreign key explicitly.
    #[must_use]
    pub fn with_fk_name(mut self, fk_name: impl Into<String>) -> Self {
        self.fk_name = Some(fk_name.into());
        self
    }

    /// Uses an explicit form class.
    #[must_use]
    pub fn with_form_class(mut self, form_class: FormClass) -> Self {
        self.model = self.model.with_form_class(form_class);
        self
    }

    /// Sets the field rules for the generated form.
    #[must_use]
    pub fn with_fields(mut self, fields: ModelFormFields) -> Self {
        self.model = self.model.with_fields(fields);
        self
    }

    /// Installs a per-field construction override for the generated form.
    #[must_use]
    pub fn with_formfield_callback(mut self, callback: FormFieldCallback) -> Self {
        self.model = self.model.with_formfield_callback(callback);
        self
    }

    /// Sets the row options.
    #[must_use]
    pub fn with_options(mut self, options: FormSetOptions) -> Self {
        self.model = self.model.with_options(options);
        self
    }

    /// Sets the prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.model = self.model.with_prefix(prefix);
        self
    }

    /// Adds a keyword argument passed to every form.
    #[must_use]
    pub fn with_extra_form_kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.model = self.model.with_extra_form_kwarg(key, value);
        self
    }
}

impl<P: Model, M: Model> FormSetFactory for InlineFormSetConfig<P, M> {
    type Class = InlineFormSetClass<P, M>;

    fn formset_factory(&self) -> VanillaResult<InlineFormSetClass<P, M>> {
        self.model.options.validate()?;
        let fk = resolve_foreign_key(P::meta(), M::meta(), self.fk_name.as_deref())?;
        let form = self.model.resolve_form_class(Some(fk.name))?;
        tracing::debug!(
            parent = %P::meta().label(),
            model = %M::meta().label(),
            fk = fk.name,
            "built inline formset class"
        );
        Ok(InlineFormSetClass {
            form,
            options: self.model.options.clone(),
            prefix: self
                .model
                .prefix
                .clone()
                .unwrap_or_else(|| inline_prefix(M::meta(), fk)),
            store: Arc::clone(&self.model.store),
            fk_name: fk.name,
            _parent: PhantomData,
        })
    }

    fn extra_form_kwargs(&self) -> HashMap<String, Value> {
        self.model.extra_form_kwargs.clone()
    }
}
