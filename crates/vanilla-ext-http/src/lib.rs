//! # vanilla-ext-http
//!
//! HTTP types for vanilla-ext: the request a formset view reads submitted
//! data and uploads from, and the responses it produces.
//!
//! ## Modules
//!
//! - [`querydict`] - Immutable-by-default multi-value form data
//! - [`upload`] - Uploaded files
//! - [`request`] - [`HttpRequest`] and its builder
//! - [`response`] - [`HttpResponse`] and redirect/JSON helpers

pub mod querydict;
pub mod request;
pub mod response;
pub mod upload;

pub use querydict::QueryDict;
pub use request::{HttpRequest, HttpRequestBuilder};
pub use response::{HttpResponse, HttpResponseRedirect, JsonResponse};
pub use upload::{FileDict, UploadedFile};
