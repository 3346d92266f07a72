//! The class-based [`View`] trait.
//!
//! A view receives an [`HttpRequest`], dispatches on its method, and returns
//! an [`HttpResponse`]. Handlers default to 405 Method Not Allowed, so a view
//! only overrides the methods it serves.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::Instrument;

use vanilla_ext_core::logging::request_span;
use vanilla_ext_http::{HttpRequest, HttpResponse};

/// A boxed async request handler, as produced by [`View::as_view`].
pub type ViewFunction = Box<
    dyn Fn(HttpRequest) -> Pin<Box<dyn Future<Output = HttpResponse> + Send>> + Send + Sync,
>;

/// The base trait for class-based views.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use vanilla_ext_http::{HttpRequest, HttpResponse};
/// use vanilla_ext_views::view::View;
///
/// struct Ping;
///
/// #[async_trait]
/// impl View for Ping {
///     async fn get(&self, _request: HttpRequest) -> HttpResponse {
///         HttpResponse::ok("pong")
///     }
/// }
/// ```
#[async_trait]
pub trait View: Send + Sync {
    /// Returns the HTTP methods this view serves.
    fn allowed_methods(&self) -> Vec<http::Method> {
        vec![http::Method::GET, http::Method::POST, http::Method::HEAD, http::Method::OPTIONS]
    }

    /// Dispatches the request to the handler for its method, inside a
    /// request span.
    async fn dispatch(&self, request: HttpRequest) -> HttpResponse {
        let span = request_span(request.method().as_str(), request.path());
        async move {
            let method = request.method().clone();
            if !self.allowed_methods().contains(&method) {
                return self.http_method_not_allowed(request).await;
            }
            match method {
                http::Method::GET => self.get(request).await,
                http::Method::POST => self.post(request).await,
                http::Method::HEAD => self.head(request).await,
                http::Method::OPTIONS => self.options(request).await,
                _ => self.http_method_not_allowed(request).await,
            }
        }
        .instrument(span)
        .await
    }

    /// Handles GET requests. Returns 405 by default.
    async fn get(&self, request: HttpRequest) -> HttpResponse {
        self.http_method_not_allowed(request).await
    }

    /// Handles POST requests. Returns 405 by default.
    async fn post(&self, request: HttpRequest) -> HttpResponse {
        self.http_method_not_allowed(request).await
    }

    /// Handles HEAD requests. Delegates to `get` by default.
    async fn head(&self, request: HttpRequest) -> HttpResponse {
        self.get(request).await
    }

    /// Handles OPTIONS requests. Returns the list of allowed methods.
    async fn options(&self, _request: HttpRequest) -> HttpResponse {
        let methods = self.allowed_methods();
        let method_strs: Vec<&str> = methods.iter().map(http::Method::as_str).collect();
        let mut response = HttpResponse::ok("");
        if let Ok(value) = http::header::HeaderValue::from_str(&method_strs.join(", ")) {
            response.headers_mut().insert(http::header::ALLOW, value);
        }
        response
    }

    /// Returns a 405 Method Not Allowed response with the allowed methods header.
    async fn http_method_not_allowed(&self, request: HttpRequest) -> HttpResponse {
        tracing::warn!(method = %request.method(), path = request.path(), "method not allowed");
        let methods = self.allowed_methods();
        let method_strs: Vec<&str> = methods.iter().map(http::Method::as_str).collect();
        HttpResponse::not_allowed(&method_strs)
    }

    /// Converts this view into a boxed handler function.
    #[allow(clippy::wrong_self_convention)]
    fn as_view(self) -> ViewFunction
    where
        Self: Sized + 'static,
    {
        let view = Arc::new(self);
        Box::new(move |request: HttpRequest| -> Pin<Box<dyn Future<Output = HttpResponse> + Send>> {
            let view = Arc::clone(&view);
            Box::pin(async move { view.dispatch(request).await })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct GetOnly;

    #[async_trait]
    impl View for GetOnly {
        fn allowed_methods(&self) -> Vec<http::Method> {
            vec![http::Method::GET, http::Method::HEAD]
        }

        async fn get(&self, _request: HttpRequest) -> HttpResponse {
            HttpResponse::ok("hello")
        }
    }

    struct Nothing;

    #[async_trait]
    impl View for Nothing {}

    fn request(method: http::Method) -> HttpRequest {
        HttpRequest::builder().method(method).path("/x/").build()
    }

    #[tokio::test]
    async fn test_dispatch_get() {
        let resp = GetOnly.dispatch(request(http::Method::GET)).await;
        assert_eq!(resp.status(), http::StatusCode::OK);
        assert_eq!(resp.text(), "hello");
    }

    #[tokio::test]
    async fn test_head_delegates_to_get() {
        let resp = GetOnly.dispatch(request(http::Method::HEAD)).await;
        assert_eq!(resp.status(), http::StatusCode::OK);
    }

    #[tokio::test]
    async fn test_disallowed_method() {
        let resp = GetOnly.dispatch(request(http::Method::POST)).await;
        assert_eq!(resp.status(), http::StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            resp.headers().get(http::header::ALLOW).unwrap(),
            "GET, HEAD"
        );
    }

    #[tokio::test]
    async fn test_default_handlers_are_405() {
        let resp = Nothing.dispatch(request(http::Method::GET)).await;
        assert_eq!(resp.status(), http::StatusCode::METHOD_NOT_ALLOWED);
        let resp = Nothing.dispatch(request(http::Method::DELETE)).await;
        assert_eq!(resp.status(), http::StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_options_lists_methods() {
        let resp = Nothing.dispatch(request(http::Method::OPTIONS)).await;
        assert_eq!(resp.status(), http::StatusCode::OK);
        assert_eq!(
            resp.headers().get(http::header::ALLOW).unwrap(),
            "GET, POST, HEAD, OPTIONS"
        );
    }

    #[tokio::test]
    async fn test_as_view() {
        let handler = GetOnly.as_view();
        let resp = handler(request(http::Method::GET)).await;
        assert_eq!(resp.text(), "hello");
    }
}
