//! A view that displays and processes one formset.
//!
//! The formset is placed in the context as `formset` and, when a
//! `formset_context_name` is configured, under that name as well.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use vanilla_ext_core::context::Context;
use vanilla_ext_core::{VanillaError, VanillaResult};
use vanilla_ext_db::value::Value;
use vanilla_ext_forms::factory::FormSetFactory;
use vanilla_ext_forms::formset::{FormSetKwargs, RuntimeFormSet};
use vanilla_ext_http::{HttpRequest, HttpResponse, HttpResponseRedirect};

use crate::template::{render_to_response, TemplateRenderer};
use crate::view::View;

/// Displays a formset on GET and validates and saves it on POST.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use vanilla_ext_forms::{FormClass, FormFieldDef, FormFieldType, FormSetConfig};
/// use vanilla_ext_views::formset_view::FormSetView;
/// use vanilla_ext_views::template::JsonRenderer;
///
/// let class = FormClass::from_fields(
///     "ContactForm",
///     vec![FormFieldDef::new("email", FormFieldType::Email)],
/// );
/// let view = FormSetView::new(FormSetConfig::new(class), Arc::new(JsonRenderer), "contacts.html")
///     .with_formset_context_name("contacts")
///     .with_success_url("/done/");
/// assert_eq!(view.template_name(), "contacts.html");
/// ```
pub struct FormSetView<F: FormSetFactory> {
    factory: F,
    renderer: Arc<dyn TemplateRenderer>,
    template_name: String,
    formset_context_name: Option<String>,
    success_url: Option<String>,
    initial: Vec<HashMap<String, Value>>,
}

impl<F: FormSetFactory> FormSetView<F> {
    /// Creates a view around a formset factory.
    pub fn new(
        factory: F,
        renderer: Arc<dyn TemplateRenderer>,
        template_name: impl Into<String>,
    ) -> Self {
        Self {
            factory,
            renderer,
            template_name: template_name.into(),
            formset_context_name: None,
            success_url: None,
            initial: Vec::new(),
        }
    }

    /// Also exposes the formset under this context name.
    #[must_use]
    pub fn with_formset_context_name(mut self, name: impl Into<String>) -> Self {
        self.formset_context_name = Some(name.into());
        self
    }

    /// Sets the redirect target after a successful save.
    #[must_use]
    pub fn with_success_url(mut self, url: impl Into<String>) -> Self {
        self.success_url = Some(url.into());
        self
    }

    /// Sets the initial rows for unbound formsets.
    #[must_use]
    pub fn with_initial(mut self, initial: Vec<HashMap<String, Value>>) -> Self {
        self.initial = initial;
        self
    }

    /// Returns the template name.
    pub fn template_name(&self) -> &str {
        &self.template_name
    }

    /// Returns the factory.
    pub const fn factory(&self) -> &F {
        &self.factory
    }

    fn formset_kwargs(&self) -> FormSetKwargs {
        FormSetKwargs::default().with_initial(self.initial.clone())
    }

    /// Builds the render context for a formset.
    pub fn get_context_data(&self, formset: &dyn RuntimeFormSet) -> Context {
        let value = formset.as_context();
        let mut context = Context::new();
        if let Some(name) = &self.formset_context_name {
            context.set(name.clone(), value.clone());
        }
        context.set("formset", value);
        context
    }

    /// Returns the configured success URL, or the request's full path.
    pub fn get_success_url(&self, request: &HttpRequest) -> String {
        self.success_url
            .clone()
            .unwrap_or_else(|| request.get_full_path())
    }

    /// Saves the formset and redirects.
    pub async fn formset_valid(
        &self,
        request: &HttpRequest,
        formset: &mut dyn RuntimeFormSet,
    ) -> VanillaResult<HttpResponse> {
        let summary = formset.save().await?;
        tracing::info!(
            prefix = formset.prefix(),
            created = summary.created,
            changed = summary.changed,
            deleted = summary.deleted,
            "formset saved"
        );
        Ok(HttpResponseRedirect::new(&self.get_success_url(request)))
    }

    /// Re-renders the page with the bound formset and its errors.
    pub fn formset_invalid(&self, formset: &dyn RuntimeFormSet) -> HttpResponse {
        tracing::debug!(prefix = formset.prefix(), "formset invalid");
        self.render(formset)
    }

    fn render(&self, formset: &dyn RuntimeFormSet) -> HttpResponse {
        let context = self.get_context_data(formset);
        render_to_response(
            self.renderer.as_ref(),
            &[self.template_name.clone()],
            &context,
        )
    }
}

#[async_trait]
impl<F: FormSetFactory> View for FormSetView<F> {
    async fn get(&self, _request: HttpRequest) -> HttpResponse {
        match self.factory.get_formset(None, None, self.formset_kwargs()).await {
            Ok(formset) => self.render(&formset),
            Err(err) => error_response(&err),
        }
    }

    async fn post(&self, request: HttpRequest) -> HttpResponse {
        let formset = self
            .factory
            .get_formset(Some(request.post()), Some(request.files()), self.formset_kwargs())
            .await;
        let mut formset = match formset {
            Ok(formset) => formset,
            Err(err) => return error_response(&err),
        };
        if formset.is_valid().await {
            match self.formset_valid(&request, &mut formset).await {
                Ok(response) => response,
                Err(err) => error_response(&err),
            }
        } else {
            self.formset_invalid(&formset)
        }
    }
}

pub(crate) fn error_response(err: &VanillaError) -> HttpResponse {
    tracing::error!(error = %err, "request failed");
    let status = http::StatusCode::from_u16(err.status_code())
        .unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR);
    HttpResponse::new(status, err.to_string())
}
