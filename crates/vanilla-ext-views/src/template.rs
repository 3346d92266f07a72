//! Template rendering for views.
//!
//! Views hand a [`Context`] and a list of candidate template names to a
//! [`TemplateRenderer`]. [`TeraRenderer`] renders through the Tera engine;
//! [`JsonRenderer`] dumps the context as JSON, which is handy in tests and
//! while templates are still being written.

use std::path::Path;

use http::StatusCode;
use vanilla_ext_core::context::Context;
use vanilla_ext_core::settings::SETTINGS;
use vanilla_ext_core::{VanillaError, VanillaResult};
use vanilla_ext_http::HttpResponse;

/// Renders a context with the first matching template name.
pub trait TemplateRenderer: Send + Sync {
    /// Renders `context` with the first name in `template_names` that this
    /// renderer knows about.
    fn render(&self, template_names: &[String], context: &Context) -> VanillaResult<String>;
}

/// A renderer that serializes the context as pretty JSON inside a minimal page.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRenderer;

impl TemplateRenderer for JsonRenderer {
    fn render(&self, template_names: &[String], context: &Context) -> VanillaResult<String> {
        let template_name = template_names.first().map_or("", String::as_str);
        let body = serde_json::to_string_pretty(&context.to_json())?;
        Ok(format!(
            "<!-- Template: {template_name} -->\n<html><body><pre>{body}</pre></body></html>"
        ))
    }
}

/// A renderer backed by a [`tera::Tera`] instance.
///
/// # Examples
///
/// ```
/// use vanilla_ext_core::context::Context;
/// use vanilla_ext_views::template::{TemplateRenderer, TeraRenderer};
///
/// let renderer = TeraRenderer::from_templates([("shop/order_form.html", "{{ title }}")]).unwrap();
/// let mut context = Context::new();
/// context.set("title", "New order");
/// let html = renderer.render(&["shop/order_form.html".to_string()], &context).unwrap();
/// assert_eq!(html, "New order");
/// ```
#[derive(Debug)]
pub struct TeraRenderer {
    tera: tera::Tera,
}

impl TeraRenderer {
    /// Wraps an already configured Tera instance.
    pub const fn new(tera: tera::Tera) -> Self {
        Self { tera }
    }

    /// Loads every template matching a glob such as `templates/**/*.html`.
    pub fn from_glob(glob: &str) -> VanillaResult<Self> {
        let tera = tera::Tera::new(glob).map_err(template_error)?;
        Ok(Self { tera })
    }

    /// Loads templates from each directory in `Settings::template_dirs`.
    ///
    /// Names are relative to their directory, e.g. `shop/order_form.html`.
    /// Without configured settings the renderer starts empty.
    pub fn from_settings() -> VanillaResult<Self> {
        let mut tera = tera::Tera::default();
        if let Some(settings) = SETTINGS.get() {
            for dir in &settings.template_dirs {
                tera.extend(&load_dir(dir)?).map_err(template_error)?;
            }
        }
        tracing::debug!(count = tera.get_template_names().count(), "loaded templates");
        Ok(Self { tera })
    }

    /// Builds a renderer from in-memory `(name, source)` pairs.
    pub fn from_templates<'a>(
        templates: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> VanillaResult<Self> {
        let mut tera = tera::Tera::default();
        tera.add_raw_templates(templates).map_err(template_error)?;
        Ok(Self { tera })
    }

    /// Returns whether a template with this name is loaded.
    pub fn has_template(&self, name: &str) -> bool {
        self.tera.get_template_names().any(|loaded| loaded == name)
    }
}

impl TemplateRenderer for TeraRenderer {
    fn render(&self, template_names: &[String], context: &Context) -> VanillaResult<String> {
        let name = template_names
            .iter()
            .find(|name| self.has_template(name))
            .ok_or_else(|| {
                VanillaError::TemplateError(format!(
                    "None of the templates {template_names:?} could be found"
                ))
            })?;
        let tera_context = tera::Context::from_value(context.to_json()).map_err(template_error)?;
        self.tera.render(name, &tera_context).map_err(template_error)
    }
}

fn load_dir(dir: &Path) -> VanillaResult<tera::Tera> {
    let glob = format!("{}/**/*", dir.display());
    tera::Tera::new(&glob).map_err(template_error)
}

fn template_error(err: tera::Error) -> VanillaError {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(&err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    VanillaError::TemplateError(message)
}

/// Renders a page, turning renderer failures into a logged 500 response.
pub fn render_to_response(
    renderer: &dyn TemplateRenderer,
    template_names: &[String],
    context: &Context,
) -> HttpResponse {
    match renderer.render(template_names, context) {
        Ok(html) => {
            let mut response = HttpResponse::ok(html);
            response.set_content_type("text/html");
            response
        }
        Err(err) => {
            tracing::error!(error = %err, templates = ?template_names, "template rendering failed");
            HttpResponse::new(StatusCode::INTERNAL_SERVER_ERROR, format!("Template error: {err}"))
        }
    }
}
