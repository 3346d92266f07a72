//! Formsets: collections of the same form repeated on one page.
//!
//! A [`BaseFormSet`] builds one form per row from a [`FormClass`], keeps the
//! management form data (`TOTAL_FORMS`, `INITIAL_FORMS`, ...) that tells a
//! bound formset how many rows were submitted, and validates every row.
//!
//! [`RuntimeFormSet`] is the object-safe surface views use, so plain, model,
//! and inline formsets can live side by side in one collection.

use std::collections::HashMap;

use async_trait::async_trait;

use vanilla_ext_core::settings::{FormSetSettings, SETTINGS};
use vanilla_ext_core::{ContextValue, VanillaError, VanillaResult};
use vanilla_ext_db::value::Value;
use vanilla_ext_http::{FileDict, QueryDict};

use crate::fields::{parse_bool, FormFieldDef, FormFieldType};
use crate::form::{BaseForm, Form, FormClass, FormErrors, FormKwargs};

/// Management form field names.
pub const TOTAL_FORM_COUNT: &str = "TOTAL_FORMS";
pub const INITIAL_FORM_COUNT: &str = "INITIAL_FORMS";
pub const MIN_NUM_FORM_COUNT: &str = "MIN_NUM_FORMS";
pub const MAX_NUM_FORM_COUNT: &str = "MAX_NUM_FORMS";

/// The per-row field used to reorder rows when `can_order` is set.
pub const ORDERING_FIELD_NAME: &str = "ORDER";
/// The per-row field used to mark rows for deletion when `can_delete` is set.
pub const DELETION_FIELD_NAME: &str = "DELETE";

/// The non-form error reported when the management form is missing.
pub const MANAGEMENT_FORM_ERROR: &str = "ManagementForm data is missing or has been tampered with";

/// Row-count, ordering, and deletion options for a formset.
///
/// Defaults come from the configured [`FormSetSettings`]: two extra rows, no
/// ordering, no deletion, and no explicit `max_num`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormSetOptions {
    /// Number of blank extra rows shown.
    pub extra: usize,
    /// Whether rows carry an `ORDER` field.
    pub can_order: bool,
    /// Whether rows carry a `DELETE` field.
    pub can_delete: bool,
    /// Maximum number of rows displayed (and validated with `validate_max`).
    pub max_num: Option<usize>,
    /// Minimum number of rows displayed (and validated with `validate_min`).
    pub min_num: usize,
    /// Whether exceeding `max_num` is a validation error.
    pub validate_max: bool,
    /// Whether falling short of `min_num` is a validation error.
    pub validate_min: bool,
    /// Hard cap on submitted rows. Defaults to `max_num` plus the settings'
    /// headroom.
    pub absolute_max: Option<usize>,
    default_max_num: usize,
    absolute_max_headroom: usize,
}

impl Default for FormSetOptions {
    fn default() -> Self {
        SETTINGS.get().map_or_else(
            || Self::from_settings(&FormSetSettings::default()),
            |settings| Self::from_settings(&settings.formsets),
        )
    }
}

impl FormSetOptions {
    /// Creates options from explicit settings.
    pub const fn from_settings(settings: &FormSetSettings) -> Self {
        Self {
            extra: settings.extra,
            can_order: false,
            can_delete: false,
            max_num: None,
            min_num: 0,
            validate_max: false,
            validate_min: false,
            absolute_max: None,
            default_max_num: settings.default_max_num,
            absolute_max_headroom: settings.absolute_max_headroom,
        }
    }

    /// Sets the number of extra rows.
    #[must_use]
    pub const fn with_extra(mut self, extra: usize) -> Self {
        self.extra = extra;
        self
    }

    /// Enables row ordering.
    #[must_use]
    pub const fn with_can_order(mut self, can_order: bool) -> Self {
        self.can_order = can_order;
        self
    }

    /// Enables row deletion.
    #[must_use]
    pub const fn with_can_delete(mut self, can_delete: bool) -> Self {
        self.can_delete = can_delete;
        self
    }

    /// Sets the maximum number of rows.
    #[must_use]
    pub const fn with_max_num(mut self, max_num: usize) -> Self {
        self.max_num = Some(max_num);
        self
    }

    /// Sets the minimum number of rows.
    #[must_use]
    pub const fn with_min_num(mut self, min_num: usize) -> Self {
        self.min_num = min_num;
        self
    }

    /// Makes `max_num` a validation constraint.
    #[must_use]
    pub const fn with_validate_max(mut self, validate_max: bool) -> Self {
        self.validate_max = validate_max;
        self
    }

    /// Makes `min_num` a validation constraint.
    #[must_use]
    pub const fn with_validate_min(mut self, validate_min: bool) -> Self {
        self.validate_min = validate_min;
        self
    }

    /// Sets the hard cap on submitted rows.
    #[must_use]
    pub const fn with_absolute_max(mut self, absolute_max: usize) -> Self {
        self.absolute_max = Some(absolute_max);
        self
    }

    /// The `max_num` in force, falling back to the settings default.
    pub fn effective_max_num(&self) -> usize {
        self.max_num.unwrap_or(self.default_max_num)
    }

    /// The hard cap on submitted rows.
    pub fn effective_absolute_max(&self) -> usize {
        self.absolute_max
            .unwrap_or_else(|| self.effective_max_num() + self.absolute_max_headroom)
    }

    /// Checks that the options are coherent.
    pub fn validate(&self) -> VanillaResult<()> {
        if self.effective_absolute_max() < self.effective_max_num() {
            return Err(VanillaError::ImproperlyConfigured(
                "'absolute_max' must be greater or equal to 'max_num'.".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-request arguments for building a runtime formset.
#[derive(Debug, Clone, Default)]
pub struct FormSetKwargs {
    /// Overrides the configured or default prefix.
    pub prefix: Option<String>,
    /// Initial values, one map per row.
    pub initial: Vec<HashMap<String, Value>>,
    /// The parent instance's primary key, for inline formsets.
    pub instance: Option<Value>,
}

impl FormSetKwargs {
    /// Sets the prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Sets the initial rows.
    #[must_use]
    pub fn with_initial(mut self, initial: Vec<HashMap<String, Value>>) -> Self {
        self.initial = initial;
        self
    }

    /// Sets the parent instance's primary key.
    #[must_use]
    pub fn with_instance(mut self, pk: Option<Value>) -> Self {
        self.instance = pk;
        self
    }
}

/// The outcome of saving a formset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveSummary {
    /// Rows created from extra forms.
    pub created: usize,
    /// Existing rows updated.
    pub changed: usize,
    /// Existing rows deleted.
    pub deleted: usize,
}

impl SaveSummary {
    /// Returns `true` if nothing was written.
    pub const fn is_empty(&self) -> bool {
        self.created == 0 && self.changed == 0 && self.deleted == 0
    }
}

/// Counts read from a submitted management form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ManagementCounts {
    pub total: usize,
    pub initial: usize,
}

/// Reads `TOTAL_FORMS` and `INITIAL_FORMS` for `prefix`. Both must be
/// present and numeric.
pub(crate) fn management_counts(data: &QueryDict, prefix: &str) -> Option<ManagementCounts> {
    let read = |name: &str| -> Option<usize> {
        data.get(&format!("{prefix}-{name}"))
            .and_then(|v| v.trim().parse().ok())
    };
    Some(ManagementCounts {
        total: read(TOTAL_FORM_COUNT)?,
        initial: read(INITIAL_FORM_COUNT)?,
    })
}

/// Returns `true` if the row's `DELETE` box was ticked.
pub(crate) fn marked_for_deletion(form: &BaseForm) -> bool {
    parse_bool(form.raw_value(DELETION_FIELD_NAME))
}

fn count_value(n: usize) -> ContextValue {
    ContextValue::Integer(i64::try_from(n).unwrap_or(i64::MAX))
}

const fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

/// A collection of forms built from one form class.
///
/// # Examples
///
/// ```
/// use vanilla_ext_forms::fields::{FormFieldDef, FormFieldType};
/// use vanilla_ext_forms::form::{Form, FormClass};
/// use vanilla_ext_forms::formset::{BaseFormSet, FormSetOptions};
///
/// let class = FormClass::from_fields("Line", vec![FormFieldDef::new("sku", FormFieldType::text())]);
/// let formset = BaseFormSet::new(class, FormSetOptions::default().with_extra(3), "lines");
/// assert_eq!(formset.total_form_count(), 3);
/// assert_eq!(formset.forms()[1].prefix(), Some("lines-1"));
/// ```
#[derive(Debug)]
pub struct BaseFormSet {
    form_class: FormClass,
    options: FormSetOptions,
    prefix: String,
    initial: Vec<HashMap<String, Value>>,
    extra_initial: Vec<HashMap<String, Value>>,
    pk_field: Option<String>,
    data: Option<QueryDict>,
    files: FileDict,
    management: Option<ManagementCounts>,
    forms: Vec<BaseForm>,
    non_form_errors: Vec<String>,
}

impl BaseFormSet {
    /// Creates an unbound formset.
    pub fn new(form_class: FormClass, options: FormSetOptions, prefix: impl Into<String>) -> Self {
        let mut formset = Self {
            form_class,
            options,
            prefix: prefix.into(),
            initial: Vec::new(),
            extra_initial: Vec::new(),
            pk_field: None,
            data: None,
            files: FileDict::new(),
            management: None,
            forms: Vec::new(),
            non_form_errors: Vec::new(),
        };
        formset.construct_forms();
        formset
    }

    /// Sets the initial rows. Each becomes one pre-filled form.
    #[must_use]
    pub fn with_initial(mut self, initial: Vec<HashMap<String, Value>>) -> Self {
        self.initial = initial;
        self.construct_forms();
        self
    }

    /// Sets initial values for the extra rows, in order.
    #[must_use]
    pub fn with_extra_initial(mut self, extra_initial: Vec<HashMap<String, Value>>) -> Self {
        self.extra_initial = extra_initial;
        self.construct_forms();
        self
    }

    /// Adds a hidden primary key field to every row.
    #[must_use]
    pub fn with_pk_field(mut self, name: impl Into<String>) -> Self {
        self.pk_field = Some(name.into());
        self.construct_forms();
        self
    }

    /// Binds submitted data and uploads. The number of rows now comes from
    /// the management form.
    #[must_use]
    pub fn bind(mut self, data: &QueryDict, files: &FileDict) -> Self {
        self.management = management_counts(data, &self.prefix);
        self.data = Some(data.clone());
        self.files = files.clone();
        self.construct_forms();
        self
    }

    /// Returns the formset prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the options this formset was built with.
    pub const fn options(&self) -> &FormSetOptions {
        &self.options
    }

    /// Returns the form class rows are built from.
    pub const fn form_class(&self) -> &FormClass {
        &self.form_class
    }

    /// Returns `true` if the formset has been bound to data.
    pub const fn is_bound(&self) -> bool {
        self.data.is_some()
    }

    /// Returns the number of rows backed by existing data.
    pub fn initial_form_count(&self) -> usize {
        if self.is_bound() {
            self.management
                .map_or(0, |m| m.initial.min(self.total_form_count()))
        } else {
            self.initial.len()
        }
    }

    /// Returns the number of rows.
    ///
    /// Unbound: `max(initial, min_num) + extra`, capped at `max_num` unless
    /// the initial rows alone exceed it. Bound: the submitted `TOTAL_FORMS`,
    /// capped at `absolute_max`.
    pub fn total_form_count(&self) -> usize {
        if self.is_bound() {
            return self
                .management
                .map_or(0, |m| m.total.min(self.options.effective_absolute_max()));
        }
        let initial = self.initial.len();
        let max_num = self.options.effective_max_num();
        let total = initial.max(self.options.min_num) + self.options.extra;
        if initial > max_num {
            initial
        } else {
            total.min(max_num)
        }
    }

    /// Returns the prefix of row `index`.
    pub fn form_prefix(&self, index: usize) -> String {
        format!("{}-{index}", self.prefix)
    }

    fn construct_forms(&mut self) {
        self.forms = (0..self.total_form_count())
            .map(|i| self.construct_form(i))
            .collect();
        self.non_form_errors.clear();
    }

    fn construct_form(&self, index: usize) -> BaseForm {
        let initial_count = self.initial_form_count();
        let initial = if index < initial_count {
            self.initial.get(index)
        } else {
            self.extra_initial.get(index - initial_count)
        };
        let kwargs = FormKwargs {
            prefix: Some(self.form_prefix(index)),
            initial: initial.cloned().unwrap_or_default(),
            extra: HashMap::new(),
            empty_permitted: index >= initial_count && index >= self.options.min_num,
        };
        let mut form = self.form_class.construct(kwargs);
        self.add_fields(&mut form, Some(index));
        if let Some(data) = &self.data {
            form.bind(data, &self.files);
        }
        form
    }

    fn add_fields(&self, form: &mut BaseForm, index: Option<usize>) {
        if let Some(pk) = &self.pk_field {
            form.add_field(
                FormFieldDef::new(pk.as_str(), FormFieldType::text())
                    .required(false)
                    .hidden(),
            );
        }
        if self.options.can_order {
            let mut order = FormFieldDef::new(ORDERING_FIELD_NAME, FormFieldType::integer())
                .required(false)
                .label("Order");
            if let Some(i) = index.filter(|i| *i < self.initial_form_count()) {
                order = order.initial(i64::try_from(i + 1).unwrap_or(i64::MAX));
            }
            form.add_field(order);
        }
        if self.options.can_delete {
            form.add_field(
                FormFieldDef::new(DELETION_FIELD_NAME, FormFieldType::Boolean)
                    .required(false)
                    .label("Delete"),
            );
        }
    }

    /// Returns a blank, unbound row using `__prefix__` as its index, for
    /// client-side row cloning.
    pub fn empty_form(&self) -> BaseForm {
        let kwargs = FormKwargs {
            prefix: Some(format!("{}-__prefix__", self.prefix)),
            empty_permitted: true,
            ..FormKwargs::default()
        };
        let mut form = self.form_class.construct(kwargs);
        self.add_fields(&mut form, None);
        form
    }

    /// Returns the rows.
    pub fn forms(&self) -> &[BaseForm] {
        &self.forms
    }

    pub(crate) fn forms_mut(&mut self) -> &mut [BaseForm] {
        &mut self.forms
    }

    /// Returns `true` if `form` is marked for deletion and deletion is enabled.
    pub fn should_delete_form(&self, form: &BaseForm) -> bool {
        self.options.can_delete && marked_for_deletion(form)
    }

    /// Validates every row and the formset-level constraints.
    ///
    /// Every row is validated even after a failure so that all errors are
    /// available for display. Rows marked for deletion are not validated;
    /// unchanged extra rows pass without validation.
    pub async fn is_valid(&mut self) -> bool {
        if !self.is_bound() {
            return false;
        }

        self.non_form_errors.clear();
        if self.management.is_none() {
            self.non_form_errors.push(MANAGEMENT_FORM_ERROR.to_string());
        }

        let initial_count = self.initial_form_count();
        let can_delete = self.options.can_delete;
        let mut forms_valid = true;
        let mut empty_forms = 0;
        let mut deleted_forms = 0;

        for (i, form) in self.forms.iter_mut().enumerate() {
            if i >= initial_count && !form.has_changed() {
                empty_forms += 1;
            }
            if can_delete && marked_for_deletion(form) {
                deleted_forms += 1;
                continue;
            }
            if !form.is_valid().await {
                forms_valid = false;
            }
        }

        let active = self
            .total_form_count()
            .saturating_sub(deleted_forms + empty_forms);
        let max_num = self.options.effective_max_num();
        let submitted = self.management.map_or(0, |m| m.total);
        if (self.options.validate_max && active > max_num)
            || submitted > self.options.effective_absolute_max()
        {
            self.non_form_errors.push(format!(
                "Please submit at most {max_num} form{}.",
                plural(max_num)
            ));
        }
        let min_num = self.options.min_num;
        if self.options.validate_min && active < min_num {
            self.non_form_errors.push(format!(
                "Please submit at least {min_num} form{}.",
                plural(min_num)
            ));
        }

        let valid = forms_valid && self.non_form_errors.is_empty();
        tracing::debug!(
            prefix = %self.prefix,
            forms = self.forms.len(),
            deleted = deleted_forms,
            valid,
            "validated formset"
        );
        valid
    }

    /// Returns the errors of every row, in row order.
    pub fn errors(&self) -> Vec<FormErrors> {
        self.forms.iter().map(|f| f.errors().clone()).collect()
    }

    /// Returns the formset-level errors.
    pub fn non_form_errors(&self) -> &[String] {
        &self.non_form_errors
    }

    /// Returns the number of row and formset-level errors.
    pub fn total_error_count(&self) -> usize {
        self.non_form_errors.len()
            + self
                .forms
                .iter()
                .map(|f| f.errors().values().map(Vec::len).sum::<usize>())
                .sum::<usize>()
    }

    /// Returns `true` if any row differs from its initial data.
    pub fn has_changed(&self) -> bool {
        self.forms.iter().any(Form::has_changed)
    }

    /// Returns the rows marked for deletion.
    pub fn deleted_forms(&self) -> Vec<&BaseForm> {
        if !self.options.can_delete {
            return Vec::new();
        }
        let initial_count = self.initial_form_count();
        self.forms
            .iter()
            .enumerate()
            .filter(|(i, form)| *i < initial_count || form.has_changed())
            .filter(|(_, form)| marked_for_deletion(form))
            .map(|(_, form)| form)
            .collect()
    }

    /// Returns the live rows sorted by their `ORDER` value.
    ///
    /// Rows without an order sort last; ties keep row order. Without
    /// `can_order` this is the live rows in row order.
    pub fn ordered_forms(&self) -> Vec<&BaseForm> {
        let initial_count = self.initial_form_count();
        let mut rows: Vec<(usize, Option<i64>)> = self
            .forms
            .iter()
            .enumerate()
            .filter(|(i, form)| *i < initial_count || form.has_changed())
            .filter(|(_, form)| !self.should_delete_form(form))
            .map(|(i, form)| {
                let order = form
                    .raw_value(ORDERING_FIELD_NAME)
                    .and_then(|v| v.trim().parse::<i64>().ok())
                    .filter(|_| self.options.can_order);
                (i, order)
            })
            .collect();
        rows.sort_by_key(|(i, order)| (order.is_none(), *order, *i));
        rows.into_iter().map(|(i, _)| &self.forms[i]).collect()
    }

    /// Returns the cleaned data of each live, valid row.
    pub fn cleaned_data(&self) -> Vec<&HashMap<String, Value>> {
        self.forms
            .iter()
            .filter(|f| !self.should_delete_form(f) && f.errors().is_empty())
            .map(Form::cleaned_data)
            .filter(|data| !data.is_empty())
            .collect()
    }

    /// Returns the management form values keyed by their submitted names.
    pub fn management_form_data(&self) -> Vec<(String, String)> {
        let prefix = &self.prefix;
        vec![
            (
                format!("{prefix}-{TOTAL_FORM_COUNT}"),
                self.total_form_count().to_string(),
            ),
            (
                format!("{prefix}-{INITIAL_FORM_COUNT}"),
                self.initial_form_count().to_string(),
            ),
            (
                format!("{prefix}-{MIN_NUM_FORM_COUNT}"),
                self.options.min_num.to_string(),
            ),
            (
                format!("{prefix}-{MAX_NUM_FORM_COUNT}"),
                self.options.effective_max_num().to_string(),
            ),
        ]
    }

    /// Renders the management form as hidden inputs.
    pub fn management_form_html(&self) -> String {
        self.management_form_data()
            .iter()
            .map(|(name, value)| format!(r#"<input type="hidden" name="{name}" value="{value}">"#))
            .collect()
    }

    /// Describes the formset for a template.
    pub fn as_context(&self) -> HashMap<String, ContextValue> {
        let forms = self
            .forms
            .iter()
            .map(|f| ContextValue::Dict(f.as_context()))
            .collect();

        let mut management: HashMap<String, ContextValue> = self
            .management_form_data()
            .into_iter()
            .map(|(k, v)| (k, ContextValue::String(v)))
            .collect();
        management.insert(
            "html".to_string(),
            ContextValue::SafeString(self.management_form_html()),
        );

        let non_form_errors = self
            .non_form_errors
            .iter()
            .cloned()
            .map(ContextValue::String)
            .collect();

        HashMap::from([
            ("forms".to_string(), ContextValue::List(forms)),
            ("management_form".to_string(), ContextValue::Dict(management)),
            (
                "non_form_errors".to_string(),
                ContextValue::List(non_form_errors),
            ),
            (
                "total_form_count".to_string(),
                count_value(self.total_form_count()),
            ),
            (
                "initial_form_count".to_string(),
                count_value(self.initial_form_count()),
            ),
            ("prefix".to_string(), ContextValue::String(self.prefix.clone())),
            ("is_bound".to_string(), ContextValue::Bool(self.is_bound())),
            ("can_delete".to_string(), ContextValue::Bool(self.options.can_delete)),
            ("can_order".to_string(), ContextValue::Bool(self.options.can_order)),
            (
                "empty_form".to_string(),
                ContextValue::Dict(self.empty_form().as_context()),
            ),
        ])
    }
}

/// The request-bound surface shared by every formset variant.
#[async_trait]
pub trait RuntimeFormSet: Send + Sync {
    /// Returns the formset prefix.
    fn prefix(&self) -> &str;

    /// Returns `true` if the formset has been bound to data.
    fn is_bound(&self) -> bool;

    /// Returns the number of rows.
    fn total_form_count(&self) -> usize;

    /// Returns the number of rows backed by existing data.
    fn initial_form_count(&self) -> usize;

    /// Returns the rows.
    fn forms(&self) -> &[BaseForm];

    /// Validates every row and the formset-level constraints.
    async fn is_valid(&mut self) -> bool;

    /// Returns the errors of every row.
    fn errors(&self) -> Vec<FormErrors>;

    /// Returns the formset-level errors.
    fn non_form_errors(&self) -> &[String];

    /// Describes the formset for a template.
    fn as_context(&self) -> ContextValue;

    /// Points the formset at a (newly saved) parent instance. Only inline
    /// formsets have a parent; the default ignores the call.
    fn set_instance(&mut self, _parent_pk: Value) {}

    /// Persists the validated rows. Plain formsets have nothing to persist.
    async fn save(&mut self) -> VanillaResult<SaveSummary> {
        Ok(SaveSummary::default())
    }
}

/// A plain formset: rows backed by no model.
pub type FormSet = BaseFormSet;

#[async_trait]
impl RuntimeFormSet for BaseFormSet {
    fn prefix(&self) -> &str {
        Self::prefix(self)
    }

    fn is_bound(&self) -> bool {
        Self::is_bound(self)
    }

    fn total_form_count(&self) -> usize {
        Self::total_form_count(self)
    }

    fn initial_form_count(&self) -> usize {
        Self::initial_form_count(self)
    }

    fn forms(&self) -> &[BaseForm] {
        Self::forms(self)
    }

    async fn is_valid(&mut self) -> bool {
        Self::is_valid(self).await
    }

    fn errors(&self) -> Vec<FormErrors> {
        Self::errors(self)
    }

    fn non_form_errors(&self) -> &[String] {
        Self::non_form_errors(self)
    }

    fn as_context(&self) -> ContextValue {
        ContextValue::Dict(Self::as_context(self))
    }
}
