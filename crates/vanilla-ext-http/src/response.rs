//! HTTP response types.
//!
//! [`HttpResponse`] is what views return: a rendered page, a redirect after
//! a successful save, or an error status. It converts into an axum response
//! through [`IntoResponse`].

use axum::response::IntoResponse;
use http::{HeaderMap, HeaderValue, StatusCode};

/// An HTTP response.
///
/// # Examples
///
/// ```
/// use vanilla_ext_http::HttpResponse;
///
/// let response = HttpResponse::ok("<p>saved</p>");
/// assert_eq!(response.status(), http::StatusCode::OK);
/// assert_eq!(response.text(), "<p>saved</p>");
/// ```
#[derive(Debug, Clone)]
pub struct HttpResponse {
    status: StatusCode,
    headers: HeaderMap,
    content: Vec<u8>,
    content_type: String,
}

impl HttpResponse {
    /// Creates a new `HttpResponse` with the given status code and text body.
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            content: body.into().into_bytes(),
            content_type: "text/html".to_string(),
        }
    }

    /// Creates a 200 OK response with the given body.
    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(StatusCode::OK, body)
    }

    /// Creates a 404 Not Found response.
    pub fn not_found(body: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, body)
    }

    /// Creates a 500 Internal Server Error response.
    pub fn server_error(body: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, body)
    }

    /// Creates a 405 Method Not Allowed response with the list of permitted methods.
    pub fn not_allowed(permitted_methods: &[&str]) -> Self {
        let allowed = permitted_methods.join(", ");
        let mut response = Self::new(
            StatusCode::METHOD_NOT_ALLOWED,
            format!("Method Not Allowed. Permitted: {allowed}"),
        );
        if let Ok(value) = HeaderValue::from_str(&allowed) {
            response.headers.insert(http::header::ALLOW, value);
        }
        response
    }

    /// Returns the status code.
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns a reference to the headers.
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns a mutable reference to the headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Returns the content type (without charset).
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Sets the content type.
    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.content_type = content_type.into();
    }

    /// Returns the raw body.
    pub fn content_bytes(&self) -> &[u8] {
        &self.content
    }

    /// Returns the body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.content).into_owned()
    }

    /// Returns the `Location` header, if this is a redirect.
    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(http::header::LOCATION)
            .and_then(|v| v.to_str().ok())
    }

    fn full_content_type(&self) -> String {
        if self.content_type.starts_with("text/") || self.content_type.contains("json") {
            format!("{}; charset=utf-8", self.content_type)
        } else {
            self.content_type.clone()
        }
    }
}

impl IntoResponse for HttpResponse {
    fn into_response(self) -> axum::response::Response {
        let mut headers = self.headers.clone();
        if let Ok(ct) = HeaderValue::from_str(&self.full_content_type()) {
            headers.insert(http::header::CONTENT_TYPE, ct);
        }
        (self.status, headers, self.content).into_response()
    }
}

/// A JSON response.
pub struct JsonResponse;

impl JsonResponse {
    /// Serializes `data` into a 200 response with `application/json`.
    ///
    /// A serialization failure produces a 500 response instead.
    pub fn new<T: serde::Serialize>(data: &T) -> HttpResponse {
        Self::with_status(StatusCode::OK, data)
    }

    /// Serializes `data` into a response with the given status.
    pub fn with_status<T: serde::Serialize>(status: StatusCode, data: &T) -> HttpResponse {
        match serde_json::to_string(data) {
            Ok(json) => {
                let mut response = HttpResponse::new(status, json);
                response.set_content_type("application/json");
                response
            }
            Err(e) => HttpResponse::server_error(format!("JSON serialization error: {e}")),
        }
    }
}

/// A 302 Found redirect.
pub struct HttpResponseRedirect;

impl HttpResponseRedirect {
    /// Creates a 302 Found redirect to the given URL.
    pub fn new(url: &str) -> HttpResponse {
        let mut response = HttpResponse::new(StatusCode::FOUND, "");
        if let Ok(value) = HeaderValue::from_str(url) {
            response.headers.insert(http::header::LOCATION, value);
        }
        response
    }
}
