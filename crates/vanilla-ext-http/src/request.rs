//! HTTP request type.
//!
//! [`HttpRequest`] carries what a formset view reads: the method, the path
//! (for the default success URL), submitted form data, uploaded files, and
//! the keyword arguments captured from the URL pattern.

use std::collections::HashMap;

use http::{HeaderMap, Method};

use crate::querydict::QueryDict;
use crate::upload::{FileDict, UploadedFile};

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// An incoming HTTP request.
///
/// # Examples
///
/// ```
/// use vanilla_ext_http::HttpRequest;
///
/// let request = HttpRequest::builder()
///     .method(http::Method::POST)
///     .path("/orders/7/")
///     .query_string("next=list")
///     .form_body("customer=Ada")
///     .path_param("pk", "7")
///     .build();
///
/// assert_eq!(request.post().get("customer"), Some("Ada"));
/// assert_eq!(request.get_full_path(), "/orders/7/?next=list");
/// assert_eq!(request.path_param("pk"), Some("7"));
/// ```
#[derive(Debug)]
pub struct HttpRequest {
    method: Method,
    path: String,
    query_string: String,
    content_type: Option<String>,
    get: QueryDict,
    post: QueryDict,
    files: FileDict,
    headers: HeaderMap,
    body: Vec<u8>,
    path_params: HashMap<String, String>,
}

impl HttpRequest {
    /// Creates a new [`HttpRequestBuilder`].
    pub fn builder() -> HttpRequestBuilder {
        HttpRequestBuilder::default()
    }

    /// Creates an `HttpRequest` from axum/hyper request parts and body bytes.
    ///
    /// URL-encoded bodies are parsed into [`post`](Self::post). Route
    /// parameters are attached afterwards with
    /// [`set_path_params`](Self::set_path_params).
    pub fn from_parts(parts: http::request::Parts, body: Vec<u8>) -> Self {
        let query_string = parts.uri.query().unwrap_or("").to_string();
        let content_type = parts
            .headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let post = parse_body(content_type.as_deref(), &body);

        Self {
            method: parts.method,
            path: parts.uri.path().to_string(),
            get: QueryDict::parse(&query_string),
            query_string,
            content_type,
            post,
            files: FileDict::new(),
            headers: parts.headers,
            body,
            path_params: HashMap::new(),
        }
    }

    /// Returns the HTTP method.
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request path (without query string).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the raw query string (without the leading `?`).
    pub fn query_string(&self) -> &str {
        &self.query_string
    }

    /// Returns the content type of the request body, if set.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Returns the query parameters.
    pub const fn get(&self) -> &QueryDict {
        &self.get
    }

    /// Returns the submitted form data.
    pub const fn post(&self) -> &QueryDict {
        &self.post
    }

    /// Returns the uploaded files.
    pub const fn files(&self) -> &FileDict {
        &self.files
    }

    /// Replaces the uploaded files, typically after a multipart decode.
    pub fn set_files(&mut self, files: FileDict) {
        self.files = files;
    }

    /// Returns the request headers.
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the raw request body.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Returns the keyword arguments captured from the URL pattern.
    pub const fn kwargs(&self) -> &HashMap<String, String> {
        &self.path_params
    }

    /// Returns one captured URL keyword argument.
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(String::as_str)
    }

    /// Replaces the captured URL keyword arguments.
    pub fn set_path_params(&mut self, params: HashMap<String, String>) {
        self.path_params = params;
    }

    /// Returns the path plus the query string, if any.
    ///
    /// ```
    /// use vanilla_ext_http::HttpRequest;
    ///
    /// let request = HttpRequest::builder()
    ///     .path("/orders/")
    ///     .query_string("page=2")
    ///     .build();
    /// assert_eq!(request.get_full_path(), "/orders/?page=2");
    /// ```
    pub fn get_full_path(&self) -> String {
        if self.query_string.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.query_string)
        }
    }
}

fn parse_body(content_type: Option<&str>, body: &[u8]) -> QueryDict {
    if content_type.is_some_and(|ct| ct.starts_with(FORM_URLENCODED)) {
        QueryDict::parse(&String::from_utf8_lossy(body))
    } else {
        QueryDict::new()
    }
}

/// A builder for [`HttpRequest`], mostly used in tests.
#[derive(Debug)]
pub struct HttpRequestBuilder {
    method: Method,
    path: String,
    query_string: String,
    content_type: Option<String>,
    headers: HeaderMap,
    body: Vec<u8>,
    files: FileDict,
    path_params: HashMap<String, String>,
}

impl Default for HttpRequestBuilder {
    fn default() -> Self {
        Self {
            method: Method::GET,
            path: "/".to_string(),
            query_string: String::new(),
            content_type: None,
            headers: HeaderMap::new(),
            body: Vec::new(),
            files: FileDict::new(),
            path_params: HashMap::new(),
        }
    }
}

impl HttpRequestBuilder {
    /// Sets the HTTP method.
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Sets the request path.
    #[must_use]
    pub fn path(mut self, path: &str) -> Self {
        self.path = path.to_string();
        self
    }

    /// Sets the query string (without leading `?`).
    #[must_use]
    pub fn query_string(mut self, qs: &str) -> Self {
        self.query_string = qs.to_string();
        self
    }

    /// Sets the content type.
    #[must_use]
    pub fn content_type(mut self, ct: &str) -> Self {
        self.content_type = Some(ct.to_string());
        self
    }

    /// Adds a header. Invalid names or values are ignored.
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            http::header::HeaderName::from_bytes(name.as_bytes()),
            http::header::HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Sets the request body.
    #[must_use]
    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Sets a URL-encoded form body and its content type.
    #[must_use]
    pub fn form_body(self, encoded: &str) -> Self {
        self.content_type(FORM_URLENCODED)
            .body(encoded.as_bytes().to_vec())
    }

    /// Attaches an uploaded file under the given input name.
    #[must_use]
    pub fn file(mut self, name: &str, file: UploadedFile) -> Self {
        self.files.append(name.to_string(), file);
        self
    }

    /// Adds a captured URL keyword argument.
    #[must_use]
    pub fn path_param(mut self, name: &str, value: &str) -> Self {
        self.path_params.insert(name.to_string(), value.to_string());
        self
    }

    /// Builds the [`HttpRequest`].
    pub fn build(self) -> HttpRequest {
        HttpRequest {
            get: QueryDict::parse(&self.query_string),
            post: parse_body(self.content_type.as_deref(), &self.body),
            method: self.method,
            path: self.path,
            query_string: self.query_string,
            content_type: self.content_type,
            files: self.files,
            headers: self.headers,
            body: self.body,
            path_params: self.path_params,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let req = HttpRequest::builder().build();
        assert_eq!(req.method(), &Method::GET);
        assert_eq!(req.path(), "/");
        assert_eq!(req.query_string(), "");
        assert!(req.content_type().is_none());
        assert!(req.body().is_empty());
        assert!(req.post().is_empty());
        assert!(req.files().is_empty());
        assert!(req.kwargs().is_empty());
    }

    #[test]
    fn test_get_full_path() {
        let req = HttpRequest::builder().path("/orders/").build();
        assert_eq!(req.get_full_path(), "/orders/");
        let req = HttpRequest::builder()
            .path("/orders/")
            .query_string("page=2")
            .build();
        assert_eq!(req.get_full_path(), "/orders/?page=2");
    }

    #[test]
    fn test_urlencoded_body_parsed() {
        let req = HttpRequest::builder()
            .method(Method::POST)
            .form_body("lines-TOTAL_FORMS=1&lines-0-sku=A%201")
            .build();
        assert_eq!(req.post().get("lines-TOTAL_FORMS"), Some("1"));
        assert_eq!(req.post().get("lines-0-sku"), Some("A 1"));
    }

    #[test]
    fn test_other_body_not_parsed() {
        let req = HttpRequest::builder()
            .content_type("application/json")
            .body(b"{\"a\":1}".to_vec())
            .build();
        assert!(req.post().is_empty());
        assert_eq!(req.body(), b"{\"a\":1}");
    }

    #[test]
    fn test_header_and_invalid_header() {
        let req = HttpRequest::builder()
            .header("x-requested-with", "XMLHttpRequest")
            .header("bad header", "x")
            .build();
        assert_eq!(req.headers().len(), 1);
    }

    #[test]
    fn test_files_and_path_params() {
        let mut req = HttpRequest::builder()
            .file("photos-0-image", UploadedFile::new("a.png", "image/png", vec![1]))
            .path_param("pk", "3")
            .build();
        assert_eq!(req.files().len(), 1);
        assert_eq!(req.path_param("pk"), Some("3"));
        assert_eq!(req.path_param("slug"), None);

        req.set_path_params(HashMap::from([("pk".to_string(), "4".to_string())]));
        assert_eq!(req.path_param("pk"), Some("4"));
        req.set_files(FileDict::new());
        assert!(req.files().is_empty());
    }

    #[test]
    fn test_from_parts() {
        let (parts, ()) = http::Request::builder()
            .method(Method::POST)
            .uri("/orders/new/?x=1")
            .header(http::header::CONTENT_TYPE, FORM_URLENCODED)
            .body(())
            .unwrap()
            .into_parts();
        let req = HttpRequest::from_parts(parts, b"customer=Ada".to_vec());
        assert_eq!(req.method(), &Method::POST);
        assert_eq!(req.path(), "/orders/new/");
        assert_eq!(req.get().get("x"), Some("1"));
        assert_eq!(req.post().get("customer"), Some("Ada"));
    }
}
