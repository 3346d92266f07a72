//! Views that edit one model instance together with several inline formsets.
//!
//! [`InlinesView`] holds the shared machinery: building the primary form and
//! the inline formsets, all-or-nothing validation, saving in order, and
//! rendering. [`CreateWithInlinesView`] and [`UpdateWithInlinesView`] wire it
//! to GET and POST for a new and an existing instance respectively.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use vanilla_ext_core::context::{Context, ContextValue};
use vanilla_ext_core::settings::SETTINGS;
use vanilla_ext_core::{VanillaError, VanillaResult};
use vanilla_ext_db::model::Model;
use vanilla_ext_db::store::ModelStore;
use vanilla_ext_db::value::Value;
use vanilla_ext_forms::factory::FormSetProvider;
use vanilla_ext_forms::form::{Form, FormClass, FormKwargs};
use vanilla_ext_forms::formset::{FormSetKwargs, RuntimeFormSet};
use vanilla_ext_forms::model_form::{model_form_class, ModelForm, ModelFormConfig, ModelFormFields};
use vanilla_ext_http::{FileDict, HttpRequest, HttpResponse, HttpResponseRedirect, QueryDict};

use crate::formset_view::error_response;
use crate::template::{render_to_response, TemplateRenderer};
use crate::view::View;

/// Configuration for an [`InlinesView`].
pub struct InlinesViewConfig<M: Model> {
    store: Arc<dyn ModelStore<M>>,
    form_class: Option<FormClass>,
    fields: Option<ModelFormFields>,
    inlines: Vec<Arc<dyn FormSetProvider>>,
    inline_context_names: Vec<String>,
    template_name: Option<String>,
    template_name_suffix: String,
    success_url: Option<String>,
    pk_url_kwarg: String,
}

impl<M: Model> Clone for InlinesViewConfig<M> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            form_class: self.form_class.clone(),
            fields: self.fields.clone(),
            inlines: self.inlines.clone(),
            inline_context_names: self.inline_context_names.clone(),
            template_name: self.template_name.clone(),
            template_name_suffix: self.template_name_suffix.clone(),
            success_url: self.success_url.clone(),
            pk_url_kwarg: self.pk_url_kwarg.clone(),
        }
    }
}

impl<M: Model> fmt::Debug for InlinesViewConfig<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InlinesViewConfig")
            .field("model", &M::meta().label())
            .field("form_class", &self.form_class)
            .field("fields", &self.fields)
            .field("inlines", &self.inlines.len())
            .field("inline_context_names", &self.inline_context_names)
            .field("template_name", &self.template_name)
            .field("template_name_suffix", &self.template_name_suffix)
            .field("success_url", &self.success_url)
            .field("pk_url_kwarg", &self.pk_url_kwarg)
            .finish()
    }
}

impl<M: Model> InlinesViewConfig<M> {
    /// Creates a configuration for instances kept in `store`.
    ///
    /// The template suffix comes from settings (`"_form"` by default) and the
    /// primary key URL kwarg is `"pk"`.
    pub fn new(store: Arc<dyn ModelStore<M>>) -> Self {
        let template_name_suffix = SETTINGS
            .get()
            .map_or_else(|| "_form".to_string(), |s| s.template_name_suffix.clone());
        Self {
            store,
            form_class: None,
            fields: None,
            inlines: Vec::new(),
            inline_context_names: Vec::new(),
            template_name: None,
            template_name_suffix,
            success_url: None,
            pk_url_kwarg: "pk".to_string(),
        }
    }

    /// Uses an explicit form class for the primary form.
    #[must_use]
    pub fn with_form_class(mut self, form_class: FormClass) -> Self {
        self.form_class = Some(form_class);
        self
    }

    /// Derives the primary form from these model fields.
    #[must_use]
    pub fn with_fields(mut self, fields: ModelFormFields) -> Self {
        self.fields = Some(fields);
        self
    }

    /// Appends an inline formset factory. Inlines are built, validated and
    /// saved in the order they are added.
    #[must_use]
    pub fn with_inline(mut self, inline: impl FormSetProvider + 'static) -> Self {
        self.inlines.push(Arc::new(inline));
        self
    }

    /// Appends an already shared inline formset factory.
    #[must_use]
    pub fn with_shared_inline(mut self, inline: Arc<dyn FormSetProvider>) -> Self {
        self.inlines.push(inline);
        self
    }

    /// Names under which each inline formset is also placed in the context.
    #[must_use]
    pub fn with_inline_context_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inline_context_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Renders this template instead of the derived one.
    #[must_use]
    pub fn with_template_name(mut self, name: impl Into<String>) -> Self {
        self.template_name = Some(name.into());
        self
    }

    /// Sets the suffix of the derived template name.
    #[must_use]
    pub fn with_template_name_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.template_name_suffix = suffix.into();
        self
    }

    /// Sets the redirect target after a successful save.
    #[must_use]
    pub fn with_success_url(mut self, url: impl Into<String>) -> Self {
        self.success_url = Some(url.into());
        self
    }

    /// Sets the URL kwarg holding the primary key.
    #[must_use]
    pub fn with_pk_url_kwarg(mut self, kwarg: impl Into<String>) -> Self {
        self.pk_url_kwarg = kwarg.into();
        self
    }
}

/// Coordinates one primary model form and its inline formsets.
pub struct InlinesView<M: Model> {
    config: InlinesViewConfig<M>,
    form_class: FormClass,
    renderer: Arc<dyn TemplateRenderer>,
}

impl<M: Model> fmt::Debug for InlinesView<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InlinesView")
            .field("config", &self.config)
            .field("form_class", &self.form_class)
            .finish_non_exhaustive()
    }
}

impl<M: Model> InlinesView<M> {
    /// Builds the view, resolving the primary form class.
    ///
    /// Fails when neither a form class nor fields are configured, or when
    /// inline context names are given but their count differs from the
    /// number of inlines.
    pub fn new(
        config: InlinesViewConfig<M>,
        renderer: Arc<dyn TemplateRenderer>,
    ) -> VanillaResult<Self> {
        let names = config.inline_context_names.len();
        if names != 0 && names != config.inlines.len() {
            return Err(VanillaError::ImproperlyConfigured(format!(
                "{} declares {names} inline context name(s) for {} inline(s).",
                M::meta().label(),
                config.inlines.len()
            )));
        }

        let form_class = match (&config.form_class, &config.fields) {
            (Some(form_class), _) => form_class.clone(),
            (None, Some(fields)) => {
                model_form_class(&ModelFormConfig::new(M::meta()).with_fields(fields.clone()))?
            }
            (None, None) => {
                return Err(VanillaError::ImproperlyConfigured(format!(
                    "Using InlinesView for {} without a form class or 'fields' is prohibited.",
                    M::meta().label()
                )))
            }
        };

        Ok(Self {
            config,
            form_class,
            renderer,
        })
    }

    /// Returns the configuration.
    pub const fn config(&self) -> &InlinesViewConfig<M> {
        &self.config
    }

    /// Returns the resolved primary form class.
    pub const fn form_class(&self) -> &FormClass {
        &self.form_class
    }

    /// Returns the template names to try, in order.
    pub fn get_template_names(&self) -> Vec<String> {
        if let Some(name) = &self.config.template_name {
            return vec![name.clone()];
        }
        let meta = M::meta();
        vec![format!(
            "{}/{}{}.html",
            meta.app_label, meta.model_name, self.config.template_name_suffix
        )]
    }

    /// Builds the primary form for `instance`, bound when `data` is given.
    pub fn get_form(
        &self,
        instance: M,
        data: Option<&QueryDict>,
        files: Option<&FileDict>,
    ) -> ModelForm<M> {
        let mut form = ModelForm::new(&self.form_class, instance, FormKwargs::default());
        if let Some(data) = data {
            let empty = FileDict::new();
            form.bind(data, files.unwrap_or(&empty));
        }
        form
    }

    /// Builds every inline formset in declaration order, tied to `instance`
    /// when it has been saved.
    pub async fn get_inlines(
        &self,
        data: Option<&QueryDict>,
        files: Option<&FileDict>,
        instance: Option<&M>,
    ) -> VanillaResult<Vec<Box<dyn RuntimeFormSet>>> {
        let kwargs = FormSetKwargs::default().with_instance(instance.and_then(|m| m.pk()));
        let mut inlines = Vec::with_capacity(self.config.inlines.len());
        for provider in &self.config.inlines {
            inlines.push(provider.build(data, files, kwargs.clone()).await?);
        }
        Ok(inlines)
    }

    /// Validates the form and every formset. Every one is validated, even
    /// after a failure, so all errors are available for display.
    pub async fn validate(
        &self,
        form: &mut ModelForm<M>,
        inlines: &mut [Box<dyn RuntimeFormSet>],
    ) -> bool {
        let mut valid = form.is_valid().await;
        for formset in inlines.iter_mut() {
            valid &= formset.is_valid().await;
        }
        valid
    }

    /// Saves the primary object, then each formset in order, then redirects.
    pub async fn forms_valid(
        &self,
        request: &HttpRequest,
        form: &mut ModelForm<M>,
        inlines: &mut [Box<dyn RuntimeFormSet>],
    ) -> VanillaResult<HttpResponse> {
        let object = form.save(self.config.store.as_ref()).await?;
        let pk = object.pk().ok_or_else(|| {
            VanillaError::IntegrityError(format!(
                "{} was saved without a primary key",
                M::meta().label()
            ))
        })?;
        for formset in inlines.iter_mut() {
            formset.set_instance(pk.clone());
            let summary = formset.save().await?;
            tracing::debug!(
                prefix = formset.prefix(),
                created = summary.created,
                changed = summary.changed,
                deleted = summary.deleted,
                "saved inline formset"
            );
        }
        tracing::info!(model = %M::meta().label(), pk = %pk, "saved object with inlines");
        Ok(HttpResponseRedirect::new(&self.get_success_url(request)))
    }

    /// Re-renders the page with the bound form, formsets and their errors.
    pub fn forms_invalid(
        &self,
        form: &ModelForm<M>,
        inlines: &[Box<dyn RuntimeFormSet>],
        object: Option<&M>,
    ) -> HttpResponse {
        tracing::debug!(model = %M::meta().label(), "forms invalid");
        self.render(form, inlines, object)
    }

    /// Builds the render context.
    ///
    /// Holds `form`, `inlines`, `object` when editing an existing instance,
    /// and each inline under its configured context name.
    pub fn get_context_data(
        &self,
        form: &ModelForm<M>,
        inlines: &[Box<dyn RuntimeFormSet>],
        object: Option<&M>,
    ) -> Context {
        let mut context = Context::new();
        context.set("form", ContextValue::Dict(form.as_context()));

        let inline_values: Vec<ContextValue> = inlines.iter().map(|f| f.as_context()).collect();
        for (name, value) in self.config.inline_context_names.iter().zip(&inline_values) {
            context.set(name.clone(), value.clone());
        }
        context.set("inlines", ContextValue::List(inline_values));

        if let Some(object) = object {
            context.set("object", object_context(object));
        }
        context
    }

    /// Returns the configured success URL, or the request's full path.
    pub fn get_success_url(&self, request: &HttpRequest) -> String {
        self.config
            .success_url
            .clone()
            .unwrap_or_else(|| request.get_full_path())
    }

    /// Loads the instance named by the primary key URL kwarg.
    pub async fn get_object(&self, request: &HttpRequest) -> VanillaResult<M> {
        let pk = request.path_param(&self.config.pk_url_kwarg).ok_or_else(|| {
            VanillaError::NotFound(format!(
                "URL kwarg '{}' is missing for {}",
                self.config.pk_url_kwarg,
                M::meta().label()
            ))
        })?;
        let lookup = match M::meta().pk_field() {
            Some(field) => field.value_from_str(pk),
            None => Some(Value::String(pk.to_string())),
        };
        let lookup = lookup.ok_or_else(|| {
            VanillaError::NotFound(format!("{} matching pk={pk}", M::meta().label()))
        })?;
        self.config.store.get(&lookup).await
    }

    fn render(
        &self,
        form: &ModelForm<M>,
        inlines: &[Box<dyn RuntimeFormSet>],
        object: Option<&M>,
    ) -> HttpResponse {
        let context = self.get_context_data(form, inlines, object);
        render_to_response(self.renderer.as_ref(), &self.get_template_names(), &context)
    }

    async fn render_unbound(&self, object: Option<M>) -> HttpResponse {
        let instance = object.clone().unwrap_or_default();
        let form = self.get_form(instance, None, None);
        match self.get_inlines(None, None, object.as_ref()).await {
            Ok(inlines) => self.render(&form, &inlines, object.as_ref()),
            Err(err) => error_response(&err),
        }
    }

    async fn process(&self, request: &HttpRequest, object: Option<M>) -> HttpResponse {
        let instance = object.clone().unwrap_or_default();
        let mut form = self.get_form(instance, Some(request.post()), Some(request.files()));
        let mut inlines = match self
            .get_inlines(Some(request.post()), Some(request.files()), object.as_ref())
            .await
        {
            Ok(inlines) => inlines,
            Err(err) => return error_response(&err),
        };

        if self.validate(&mut form, &mut inlines).await {
            match self.forms_valid(request, &mut form, &mut inlines).await {
                Ok(response) => response,
                Err(err) => {
                    tracing::error!(
                        model = %M::meta().label(),
                        error = %err,
                        "saving object with inlines failed"
                    );
                    HttpResponse::server_error(format!("Server Error: {err}"))
                }
            }
        } else {
            self.forms_invalid(&form, &inlines, object.as_ref())
        }
    }
}

fn object_context<M: Model>(object: &M) -> ContextValue {
    let fields: HashMap<String, ContextValue> = object
        .field_values()
        .into_iter()
        .map(|(name, value)| (name.to_string(), ContextValue::from(value.to_json())))
        .collect();
    ContextValue::Dict(fields)
}

/// Creates a new instance together with its inline rows.
#[derive(Debug)]
pub struct CreateWithInlinesView<M: Model> {
    inner: InlinesView<M>,
}

impl<M: Model> CreateWithInlinesView<M> {
    /// Builds the view. See [`InlinesView::new`] for the failure cases.
    pub fn new(
        config: InlinesViewConfig<M>,
        renderer: Arc<dyn TemplateRenderer>,
    ) -> VanillaResult<Self> {
        Ok(Self {
            inner: InlinesView::new(config, renderer)?,
        })
    }

    /// Returns the shared inline machinery.
    pub const fn inlines_view(&self) -> &InlinesView<M> {
        &self.inner
    }
}

#[async_trait]
impl<M: Model> View for CreateWithInlinesView<M> {
    async fn get(&self, _request: HttpRequest) -> HttpResponse {
        self.inner.render_unbound(None).await
    }

    async fn post(&self, request: HttpRequest) -> HttpResponse {
        self.inner.process(&request, None).await
    }
}

/// Edits an existing instance together with its inline rows.
#[derive(Debug)]
pub struct UpdateWithInlinesView<M: Model> {
    inner: InlinesView<M>,
}

impl<M: Model> UpdateWithInlinesView<M> {
    /// Builds the view. See [`InlinesView::new`] for the failure cases.
    pub fn new(
        config: InlinesViewConfig<M>,
        renderer: Arc<dyn TemplateRenderer>,
    ) -> VanillaResult<Self> {
        Ok(Self {
            inner: InlinesView::new(config, renderer)?,
        })
    }

    /// Returns the shared inline machinery.
    pub const fn inlines_view(&self) -> &InlinesView<M> {
        &self.inner
    }

    async fn load(&self, request: &HttpRequest) -> Result<M, HttpResponse> {
        match self.inner.get_object(request).await {
            Ok(object) => Ok(object),
            Err(VanillaError::NotFound(msg) | VanillaError::DoesNotExist(msg)) => {
                tracing::warn!(path = request.path(), "{msg}");
                Err(HttpResponse::not_found(format!("Not Found: {msg}")))
            }
            Err(err) => Err(error_response(&err)),
        }
    }
}

#[async_trait]
impl<M: Model> View for UpdateWithInlinesView<M> {
    async fn get(&self, request: HttpRequest) -> HttpResponse {
        match self.load(&request).await {
            Ok(object) => self.inner.render_unbound(Some(object)).await,
            Err(response) => response,
        }
    }

    async fn post(&self, request: HttpRequest) -> HttpResponse {
        match self.load(&request).await {
            Ok(object) => self.inner.process(&request, Some(object)).await,
            Err(response) => response,
        }
    }
}
