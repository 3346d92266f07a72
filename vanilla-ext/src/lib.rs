//! # vanilla-ext
//!
//! Declarative formsets and multi-formset views.
//!
//! This is the meta-crate that re-exports the sub-crates. Depend on
//! `vanilla-ext` for everything, or on individual crates for finer-grained
//! control.

/// Errors, settings, logging, and template context values.
pub use vanilla_ext_core as core;

/// Model metadata, values, and the model store.
#[cfg(feature = "db")]
pub use vanilla_ext_db as db;

/// Requests, responses, and query dictionaries.
#[cfg(feature = "http")]
pub use vanilla_ext_http as http;

/// Forms, model forms, formsets, and formset factories.
#[cfg(feature = "forms")]
pub use vanilla_ext_forms as forms;

/// Formset views and create/update-with-inlines views.
#[cfg(feature = "views")]
pub use vanilla_ext_views as views;

/// Third-party crates re-exported for convenience.
pub use async_trait;
pub use axum;
pub use serde;
pub use serde_json;
pub use tokio;
pub use tracing;
pub use tracing_subscriber;

/// The names most applications need.
pub mod prelude {
    pub use vanilla_ext_core::{Settings, VanillaError, VanillaResult, SETTINGS};

    #[cfg(feature = "db")]
    pub use vanilla_ext_db::{
        fields::{FieldDef, FieldType},
        model::{Model, ModelMeta},
        store::{MemoryStore, ModelStore},
        value::Value,
    };

    #[cfg(feature = "http")]
    pub use vanilla_ext_http::{HttpRequest, HttpResponse, HttpResponseRedirect, QueryDict};

    #[cfg(feature = "forms")]
    pub use vanilla_ext_forms::{
        Form, FormClass, FormFieldDef, FormFieldType, FormSetConfig, FormSetFactory,
        FormSetKwargs, FormSetOptions, FormSetProvider, InlineFormSetConfig, ModelFormFields,
        ModelFormSetConfig, RuntimeFormSet,
    };

    #[cfg(feature = "views")]
    pub use vanilla_ext_views::{
        CreateWithInlinesView, FormSetView, InlinesViewConfig, JsonRenderer, TeraRenderer,
        UpdateWithInlinesView, View,
    };
}
