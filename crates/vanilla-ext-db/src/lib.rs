//! # vanilla-ext-db
//!
//! The persistence seam of vanilla-ext. Model formsets never talk to a
//! database directly; they read and write rows through a [`ModelStore`]
//! implementation supplied by the application.
//!
//! ## Modules
//!
//! - [`value`] - Backend-agnostic field values
//! - [`fields`] - Model field metadata
//! - [`model`] - The [`Model`] trait and [`ModelMeta`]
//! - [`store`] - The [`ModelStore`] trait and an in-memory implementation

pub mod fields;
pub mod model;
pub mod store;
pub mod value;

pub use fields::{FieldDef, FieldType};
pub use model::{Model, ModelMeta};
pub use store::{MemoryStore, ModelStore};
pub use value::Value;
