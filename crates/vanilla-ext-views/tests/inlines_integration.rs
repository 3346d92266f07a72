//! Integration tests for the create/update-with-inlines views.
//!
//! These tests exercise:
//! 1. All-or-nothing validation across the form and every formset
//! 2. Save order (parent first, then inlines in declaration order)
//! 3. Redirect targets and render context contents
//! 4. Error responses for missing objects and failing stores

use std::sync::{Arc, LazyLock, Mutex};

use async_trait::async_trait;

use vanilla_ext_core::context::{Context, ContextValue};
use vanilla_ext_core::{VanillaError, VanillaResult};
use vanilla_ext_db::fields::{FieldDef, FieldType};
use vanilla_ext_db::model::{Model, ModelMeta};
use vanilla_ext_db::store::{MemoryStore, ModelStore};
use vanilla_ext_db::value::Value;
use vanilla_ext_forms::{InlineFormSetConfig, ModelFormFields};
use vanilla_ext_http::HttpRequest;
use vanilla_ext_views::template::TemplateRenderer;
use vanilla_ext_views::{
    CreateWithInlinesView, InlinesViewConfig, UpdateWithInlinesView, View,
};

// ============================================================================
// Models
// ============================================================================

#[derive(Debug, Clone, Default)]
struct Author {
    id: Option<i64>,
    name: String,
}

#[derive(Debug, Clone, Default)]
struct Book {
    id: Option<i64>,
    author: Option<i64>,
    title: String,
}

#[derive(Debug, Clone, Default)]
struct Award {
    id: Option<i64>,
    author: Option<i64>,
    name: String,
}

static AUTHOR: LazyLock<ModelMeta> = LazyLock::new(|| {
    ModelMeta::new(
        "library",
        "author",
        vec![
            FieldDef::new("id", FieldType::BigAutoField).primary_key(),
            FieldDef::new("name", FieldType::CharField).max_length(60),
        ],
    )
});

static BOOK: LazyLock<ModelMeta> = LazyLock::new(|| {
    ModelMeta::new(
        "library",
        "book",
        vec![
            FieldDef::new("id", FieldType::BigAutoField).primary_key(),
            FieldDef::new(
                "author",
                FieldType::ForeignKey {
                    to: "library.author".to_string(),
                    related_name: Some("books".to_string()),
                },
            ),
            FieldDef::new("title", FieldType::CharField).max_length(20),
        ],
    )
});

static AWARD: LazyLock<ModelMeta> = LazyLock::new(|| {
    ModelMeta::new(
        "library",
        "award",
        vec![
            FieldDef::new("id", FieldType::BigAutoField).primary_key(),
            FieldDef::foreign_key("author", "library.author"),
            FieldDef::new("name", FieldType::CharField).max_length(40),
        ],
    )
});

impl Model for Author {
    fn meta() -> &'static ModelMeta {
        &AUTHOR
    }

    fn pk(&self) -> Option<Value> {
        self.id.map(Value::Int)
    }

    fn set_pk(&mut self, value: Value) {
        self.id = value.as_i64();
    }

    fn field_values(&self) -> Vec<(&'static str, Value)> {
        vec![("id", self.id.into()), ("name", self.name.clone().into())]
    }

    fn set_field_value(&mut self, name: &str, value: Value) -> VanillaResult<()> {
        match name {
            "name" => self.name = value.to_form_string(),
            other => return Err(VanillaError::DatabaseError(format!("no field {other}"))),
        }
        Ok(())
    }
}

impl Model for Book {
    fn meta() -> &'static ModelMeta {
        &BOOK
    }

    fn pk(&self) -> Option<Value> {
        self.id.map(Value::Int)
    }

    fn set_pk(&mut self, value: Value) {
        self.id = value.as_i64();
    }

    fn field_values(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", self.id.into()),
            ("author", self.author.into()),
            ("title", self.title.clone().into()),
        ]
    }

    fn set_field_value(&mut self, name: &str, value: Value) -> VanillaResult<()> {
        match name {
            "author" => self.author = value.as_i64(),
            "title" => self.title = value.to_form_string(),
            other => return Err(VanillaError::DatabaseError(format!("no field {other}"))),
        }
        Ok(())
    }
}

impl Model for Award {
    fn meta() -> &'static ModelMeta {
        &AWARD
    }

    fn pk(&self) -> Option<Value> {
        self.id.map(Value::Int)
    }

    fn set_pk(&mut self, value: Value) {
        self.id = value.as_i64();
    }

    fn field_values(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", self.id.into()),
            ("author", self.author.into()),
            ("name", self.name.clone().into()),
        ]
    }

    fn set_field_value(&mut self, name: &str, value: Value) -> VanillaResult<()> {
        match name {
            "author" => self.author = value.as_i64(),
            "name" => self.name = value.to_form_string(),
            other => return Err(VanillaError::DatabaseError(format!("no field {other}"))),
        }
        Ok(())
    }
}

// ============================================================================
// Test doubles
// ============================================================================

type SaveLog = Arc<Mutex<Vec<String>>>;

/// Wraps a memory store and records every save by model name.
struct RecordingStore<M: Model> {
    inner: MemoryStore<M>,
    log: SaveLog,
    fail_saves: bool,
}

impl<M: Model> RecordingStore<M> {
    fn new(log: &SaveLog) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::new(),
            log: Arc::clone(log),
            fail_saves: false,
        })
    }

    fn failing(log: &SaveLog) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::new(),
            log: Arc::clone(log),
            fail_saves: true,
        })
    }
}

#[async_trait]
impl<M: Model> ModelStore<M> for RecordingStore<M> {
    async fn get(&self, pk: &Value) -> VanillaResult<M> {
        self.inner.get(pk).await
    }

    async fn all(&self) -> VanillaResult<Vec<M>> {
        self.inner.all().await
    }

    async fn filter(&self, field: &str, value: &Value) -> VanillaResult<Vec<M>> {
        self.inner.filter(field, value).await
    }

    async fn save(&self, instance: &mut M) -> VanillaResult<()> {
        if self.fail_saves {
            return Err(VanillaError::DatabaseError("disk full".to_string()));
        }
        self.inner.save(instance).await?;
        self.log
            .lock()
            .unwrap()
            .push(M::meta().model_name.to_string());
        Ok(())
    }

    async fn delete(&self, instance: &M) -> VanillaResult<()> {
        self.inner.delete(instance).await
    }
}

/// Keeps the last rendered context for inspection.
#[derive(Default)]
struct CapturingRenderer {
    last: Mutex<Option<(Vec<String>, Context)>>,
}

impl CapturingRenderer {
    fn context(&self) -> Context {
        self.last.lock().unwrap().clone().unwrap().1
    }

    fn template_names(&self) -> Vec<String> {
        self.last.lock().unwrap().clone().unwrap().0
    }
}

impl TemplateRenderer for CapturingRenderer {
    fn render(&self, template_names: &[String], context: &Context) -> VanillaResult<String> {
        *self.last.lock().unwrap() = Some((template_names.to_vec(), context.clone()));
        Ok("rendered".to_string())
    }
}

struct Fixture {
    log: SaveLog,
    authors: Arc<RecordingStore<Author>>,
    books: Arc<RecordingStore<Book>>,
    awards: Arc<RecordingStore<Award>>,
    renderer: Arc<CapturingRenderer>,
}

impl Fixture {
    fn new() -> Self {
        let log = SaveLog::default();
        Self {
            authors: RecordingStore::new(&log),
            books: RecordingStore::new(&log),
            awards: RecordingStore::new(&log),
            renderer: Arc::new(CapturingRenderer::default()),
            log,
        }
    }

    fn config(&self) -> InlinesViewConfig<Author> {
        let authors: Arc<dyn ModelStore<Author>> = self.authors.clone();
        let books: Arc<dyn ModelStore<Book>> = self.books.clone();
        let awards: Arc<dyn ModelStore<Award>> = self.awards.clone();
        InlinesViewConfig::new(authors)
            .with_fields(ModelFormFields::include(["name"]))
            .with_inline(
                InlineFormSetConfig::<Author, Book>::new(books)
                    .with_fields(ModelFormFields::include(["title"])),
            )
            .with_inline(
                InlineFormSetConfig::<Author, Award>::new(awards)
                    .with_fields(ModelFormFields::include(["name"])),
            )
    }

    fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn clear_log(&self) {
        self.log.lock().unwrap().clear();
    }

    async fn seed(&self) -> i64 {
        let mut author = Author {
            name: "Ada".to_string(),
            ..Author::default()
        };
        self.authors.save(&mut author).await.unwrap();
        let author_id = author.id.unwrap();
        let mut book = Book {
            author: Some(author_id),
            title: "Notes".to_string(),
            ..Book::default()
        };
        self.books.save(&mut book).await.unwrap();
        self.clear_log();
        author_id
    }
}

fn post(path: &str, body: &str) -> HttpRequest {
    HttpRequest::builder()
        .method(http::Method::POST)
        .path(path)
        .form_body(body)
        .build()
}

fn errors_of<'a>(value: &'a ContextValue, field: &str) -> Option<&'a [ContextValue]> {
    value.get("errors")?.get(field)?.as_list()
}

const CREATE_BODY: &str = "name=Ada\
    &books-TOTAL_FORMS=2&books-INITIAL_FORMS=0\
    &books-0-title=Notes&books-1-title=\
    &award_set-TOTAL_FORMS=1&award_set-INITIAL_FORMS=0\
    &award_set-0-name=Medal";

// ============================================================================
// Create
// ============================================================================

#[tokio::test]
async fn test_create_saves_parent_before_inlines_in_order() {
    let fx = Fixture::new();
    let view = CreateWithInlinesView::new(
        fx.config().with_success_url("/authors/"),
        fx.renderer.clone(),
    )
    .unwrap();

    let resp = view.dispatch(post("/authors/new/", CREATE_BODY)).await;
    assert_eq!(resp.status(), http::StatusCode::FOUND);
    assert_eq!(resp.location(), Some("/authors/"));
    assert_eq!(fx.log(), vec!["author", "book", "award"]);

    let author = fx.authors.all().await.unwrap().remove(0);
    let books = fx.books.all().await.unwrap();
    assert_eq!(books.len(), 1);
    assert_eq!(books[0].author, author.id);
    assert_eq!(fx.awards.all().await.unwrap()[0].author, author.id);
}

#[tokio::test]
async fn test_invalid_form_saves_nothing_and_reports_all_errors() {
    let fx = Fixture::new();
    let view = CreateWithInlinesView::new(fx.config(), fx.renderer.clone()).unwrap();
    let body = "name=\
        &books-TOTAL_FORMS=1&books-INITIAL_FORMS=0\
        &books-0-title=A%20title%20that%20is%20far%20too%20long\
        &award_set-TOTAL_FORMS=1&award_set-INITIAL_FORMS=0&award_set-0-name=Medal";

    let resp = view.dispatch(post("/authors/new/", body)).await;
    assert_eq!(resp.status(), http::StatusCode::OK);
    assert!(fx.log().is_empty());

    let context = fx.renderer.context();
    let form = context.get("form").unwrap();
    assert_eq!(
        errors_of(form, "name").unwrap(),
        [ContextValue::String("This field is required.".to_string())]
    );

    let inlines = context.get("inlines").and_then(ContextValue::as_list).unwrap();
    assert_eq!(inlines.len(), 2);
    let book_row = &inlines[0].get("forms").and_then(ContextValue::as_list).unwrap()[0];
    assert_eq!(errors_of(book_row, "title").unwrap().len(), 1);
    assert!(!context.contains_key("object"));
}

#[tokio::test]
async fn test_invalid_inline_blocks_valid_form() {
    let fx = Fixture::new();
    let view = CreateWithInlinesView::new(fx.config(), fx.renderer.clone()).unwrap();
    let body = "name=Ada\
        &books-TOTAL_FORMS=1&books-INITIAL_FORMS=0&books-0-title=Notes\
        &award_set-INITIAL_FORMS=0";

    let resp = view.dispatch(post("/authors/new/", body)).await;
    assert_eq!(resp.status(), http::StatusCode::OK);
    assert!(fx.log().is_empty());

    let context = fx.renderer.context();
    let inlines = context.get("inlines").and_then(ContextValue::as_list).unwrap();
    let award_errors = inlines[1]
        .get("non_form_errors")
        .and_then(ContextValue::as_list)
        .unwrap();
    assert_eq!(
        award_errors,
        [ContextValue::String(
            "ManagementForm data is missing or has been tampered with".to_string()
        )]
    );
    assert_eq!(fx.renderer.template_names(), vec!["library/author_form.html"]);
}

#[tokio::test]
async fn test_failing_inline_store_is_500() {
    let fx = Fixture::new();
    let authors: Arc<dyn ModelStore<Author>> = fx.authors.clone();
    let books: Arc<dyn ModelStore<Book>> = RecordingStore::<Book>::failing(&fx.log);
    let config = InlinesViewConfig::new(authors)
        .with_fields(ModelFormFields::include(["name"]))
        .with_inline(
            InlineFormSetConfig::<Author, Book>::new(books)
                .with_fields(ModelFormFields::include(["title"])),
        );
    let view = CreateWithInlinesView::new(config, fx.renderer.clone()).unwrap();
    let body = "name=Ada&books-TOTAL_FORMS=1&books-INITIAL_FORMS=0&books-0-title=Notes";

    let resp = view.dispatch(post("/authors/new/", body)).await;
    assert_eq!(resp.status(), http::StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(fx.log(), vec!["author"]);
}

// ============================================================================
// Update
// ============================================================================

#[tokio::test]
async fn test_update_without_changes_redirects_to_success_url() {
    let fx = Fixture::new();
    let author_id = fx.seed().await;
    let view = UpdateWithInlinesView::new(
        fx.config().with_success_url("/authors/"),
        fx.renderer.clone(),
    )
    .unwrap();
    let body = "name=Ada\
        &books-TOTAL_FORMS=1&books-INITIAL_FORMS=1&books-0-id=1&books-0-title=Notes\
        &award_set-TOTAL_FORMS=0&award_set-INITIAL_FORMS=0";
    let request = HttpRequest::builder()
        .method(http::Method::POST)
        .path("/authors/1/edit/")
        .path_param("pk", &author_id.to_string())
        .form_body(body)
        .build();

    let resp = view.dispatch(request).await;
    assert_eq!(resp.status(), http::StatusCode::FOUND);
    assert_eq!(resp.location(), Some("/authors/"));
    assert_eq!(fx.log(), vec!["author"]);
}

#[tokio::test]
async fn test_update_redirects_to_full_path_by_default() {
    let fx = Fixture::new();
    let author_id = fx.seed().await;
    let view = UpdateWithInlinesView::new(fx.config(), fx.renderer.clone()).unwrap();
    let body = "name=Ada%20Lovelace\
        &books-TOTAL_FORMS=2&books-INITIAL_FORMS=1\
        &books-0-id=1&books-0-title=Notes\
        &books-1-title=Sketches\
        &award_set-TOTAL_FORMS=0&award_set-INITIAL_FORMS=0";
    let request = HttpRequest::builder()
        .method(http::Method::POST)
        .path("/authors/1/edit/")
        .query_string("tab=books")
        .path_param("pk", &author_id.to_string())
        .form_body(body)
        .build();

    let resp = view.dispatch(request).await;
    assert_eq!(resp.status(), http::StatusCode::FOUND);
    assert_eq!(resp.location(), Some("/authors/1/edit/?tab=books"));
    assert_eq!(fx.log(), vec!["author", "book"]);

    let author = fx.authors.get(&Value::Int(author_id)).await.unwrap();
    assert_eq!(author.name, "Ada Lovelace");
    let titles: Vec<String> = fx
        .books
        .filter("author", &Value::Int(author_id))
        .await
        .unwrap()
        .into_iter()
        .map(|b| b.title)
        .collect();
    assert_eq!(titles, vec!["Notes", "Sketches"]);
}

#[tokio::test]
async fn test_update_get_exposes_named_inline_and_object() {
    let fx = Fixture::new();
    let author_id = fx.seed().await;
    let authors: Arc<dyn ModelStore<Author>> = fx.authors.clone();
    let books: Arc<dyn ModelStore<Book>> = fx.books.clone();
    let config = InlinesViewConfig::new(authors)
        .with_fields(ModelFormFields::include(["name"]))
        .with_inline(
            InlineFormSetConfig::<Author, Book>::new(books)
                .with_fields(ModelFormFields::include(["title"])),
        )
        .with_inline_context_names(["photos"])
        .with_template_name("library/author_edit.html");
    let view = UpdateWithInlinesView::new(config, fx.renderer.clone()).unwrap();
    let request = HttpRequest::builder()
        .path("/authors/1/edit/")
        .path_param("pk", &author_id.to_string())
        .build();

    let resp = view.dispatch(request).await;
    assert_eq!(resp.status(), http::StatusCode::OK);
    assert_eq!(resp.text(), "rendered");
    assert_eq!(fx.renderer.template_names(), vec!["library/author_edit.html"]);

    let context = fx.renderer.context();
    let named = context.get("photos").unwrap();
    let inlines = context.get("inlines").and_then(ContextValue::as_list).unwrap();
    assert_eq!(named, &inlines[0]);
    assert_eq!(
        named.get("initial_form_count"),
        Some(&ContextValue::Integer(1))
    );
    assert_eq!(
        context.get("object").and_then(|o| o.get("name")),
        Some(&ContextValue::String("Ada".to_string()))
    );
}

#[tokio::test]
async fn test_update_missing_object_is_404() {
    let fx = Fixture::new();
    let view = UpdateWithInlinesView::new(fx.config(), fx.renderer.clone()).unwrap();
    let request = HttpRequest::builder()
        .method(http::Method::POST)
        .path("/authors/42/edit/")
        .path_param("pk", "42")
        .form_body("name=Ghost")
        .build();

    let resp = view.dispatch(request).await;
    assert_eq!(resp.status(), http::StatusCode::NOT_FOUND);
    assert!(fx.log().is_empty());
}

#[tokio::test]
async fn test_update_non_integer_pk_is_404() {
    let fx = Fixture::new();
    fx.seed().await;
    let view = UpdateWithInlinesView::new(fx.config(), fx.renderer.clone()).unwrap();
    let request = HttpRequest::builder()
        .path("/authors/abc/edit/")
        .path_param("pk", "abc")
        .build();

    let resp = view.dispatch(request).await;
    assert_eq!(resp.status(), http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_forms_valid_refuses_unvalidated_form() {
    let fx = Fixture::new();
    let view = CreateWithInlinesView::new(fx.config(), fx.renderer.clone()).unwrap();
    let inner = view.inlines_view();
    let request = HttpRequest::builder()
        .method(http::Method::POST)
        .path("/authors/new/")
        .form_body("name=Ada")
        .build();

    let mut form = inner.get_form(Author::default(), Some(request.post()), None);
    let mut inlines = inner.get_inlines(None, None, None).await.unwrap();
    let result = inner.forms_valid(&request, &mut form, &mut inlines).await;
    assert!(matches!(result, Err(VanillaError::ValidationError(_))));
    assert!(fx.log().is_empty());
}

#[test]
fn test_mismatched_context_names_rejected() {
    let fx = Fixture::new();
    let result = CreateWithInlinesView::new(
        fx.config().with_inline_context_names(["books"]),
        fx.renderer.clone(),
    );
    assert!(matches!(result, Err(VanillaError::ImproperlyConfigured(_))));
}

#[tokio::test]
async fn test_invalid_path_exposes_named_inline() {
    let fx = Fixture::new();
    let authors: Arc<dyn ModelStore<Author>> = fx.authors.clone();
    let books: Arc<dyn ModelStore<Book>> = fx.books.clone();
    let config = InlinesViewConfig::new(authors)
        .with_fields(ModelFormFields::include(["name"]))
        .with_inline(
            InlineFormSetConfig::<Author, Book>::new(books)
                .with_fields(ModelFormFields::include(["title"])),
        )
        .with_inline_context_names(["photos"]);
    let view = CreateWithInlinesView::new(config, fx.renderer.clone()).unwrap();
    let body = "name=Ada&books-TOTAL_FORMS=1&books-INITIAL_FORMS=0\
        &books-0-title=A%20title%20that%20is%20far%20too%20long";

    let resp = view.dispatch(post("/authors/new/", body)).await;
    assert_eq!(resp.status(), http::StatusCode::OK);
    assert!(fx.log().is_empty());

    let context = fx.renderer.context();
    let photos = context.get("photos").unwrap();
    assert_eq!(photos.get("prefix"), Some(&ContextValue::String("books".to_string())));
    let row = &photos.get("forms").and_then(ContextValue::as_list).unwrap()[0];
    assert_eq!(errors_of(row, "title").unwrap().len(), 1);
}
