//! # vanilla-ext-views
//!
//! Class-based views for formsets. [`FormSetView`] shows and saves a single
//! formset; [`CreateWithInlinesView`] and [`UpdateWithInlinesView`] edit a
//! model instance together with any number of inline formsets, validating
//! everything at once and saving the instance before its inline rows.
//!
//! ## Modules
//!
//! - [`view`] - The [`View`] trait and method dispatch
//! - [`template`] - Template renderers (Tera and a JSON debug renderer)
//! - [`formset_view`] - A view around one formset factory
//! - [`inlines`] - Multi-formset create and update views

pub mod formset_view;
pub mod inlines;
pub mod template;
pub mod view;

pub use formset_view::FormSetView;
pub use inlines::{CreateWithInlinesView, InlinesView, InlinesViewConfig, UpdateWithInlinesView};
pub use template::{JsonRenderer, TemplateRenderer, TeraRenderer};
pub use view::{View, ViewFunction};
