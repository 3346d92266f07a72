//! # vanilla-ext-forms
//!
//! Forms and declarative formsets for vanilla-ext. A formset is a group of
//! repeated forms on one page, optionally backed by the stored rows of a
//! model or by the children of one parent instance.
//!
//! ## Modules
//!
//! - [`fields`] - Form field definitions and value cleaning
//! - [`validation`] - The field validation pipeline
//! - [`form`] - The [`Form`] trait, [`BaseForm`], and curried [`FormClass`]es
//! - [`model_form`] - Forms generated from model metadata
//! - [`formset`] - [`BaseFormSet`], the management form, and [`RuntimeFormSet`]
//! - [`model_formset`] - Model and inline formsets
//! - [`factory`] - The [`FormSetFactory`] contract and its three variants

pub mod factory;
pub mod fields;
pub mod form;
pub mod formset;
pub mod model_form;
pub mod model_formset;
pub mod validation;

pub use factory::{
    FormSetClass, FormSetConfig, FormSetFactory, FormSetProvider, InlineFormSetConfig,
    ModelFormSetConfig,
};
pub use fields::{FormFieldDef, FormFieldType};
pub use form::{BaseForm, Form, FormClass, FormErrors, FormKwargs};
pub use formset::{
    BaseFormSet, FormSet, FormSetKwargs, FormSetOptions, RuntimeFormSet, SaveSummary,
};
pub use model_form::{ModelForm, ModelFormConfig, ModelFormFields};
pub use model_formset::{InlineFormSet, ModelFormSet};
