//! Formsets whose rows are model instances.
//!
//! A [`ModelFormSet`] pre-fills one form per stored row, adds a hidden
//! primary key field to every row, and on save updates the changed rows,
//! deletes the rows marked for deletion, and creates rows from the changed
//! extra forms.
//!
//! An [`InlineFormSet`] is a model formset restricted to the children of
//! one parent instance. It only loads rows whose foreign key points at the
//! parent and stamps the parent's primary key into every row it saves.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use vanilla_ext_core::{ContextValue, ValidationError, VanillaError, VanillaResult};
use vanilla_ext_db::model::Model;
use vanilla_ext_db::store::ModelStore;
use vanilla_ext_db::value::Value;
use vanilla_ext_http::{FileDict, QueryDict};

use crate::form::{BaseForm, Form, FormClass, FormErrors};
use crate::formset::{
    management_counts, marked_for_deletion, BaseFormSet, FormSetKwargs, FormSetOptions,
    RuntimeFormSet, SaveSummary,
};
use crate::model_form::{construct_instance, instance_initial};

/// The error attached to an existing row whose primary key no longer
/// matches a stored instance.
pub const INVALID_PK_MESSAGE: &str =
    "Select a valid choice. That choice is not one of the available choices.";

#[derive(Debug, Clone)]
struct InlineLink {
    fk_name: &'static str,
    parent_pk: Option<Value>,
}

/// A formset over the stored instances of `M`.
pub struct ModelFormSet<M: Model> {
    inner: BaseFormSet,
    store: Arc<dyn ModelStore<M>>,
    instances: Vec<Option<M>>,
    link: Option<InlineLink>,
    validated: Option<bool>,
}

impl<M: Model> fmt::Debug for ModelFormSet<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelFormSet")
            .field("model", &M::meta().label())
            .field("inner", &self.inner)
            .field("instances", &self.instances.len())
            .field("link", &self.link)
            .finish_non_exhaustive()
    }
}

impl<M: Model> ModelFormSet<M> {
    /// Builds a formset over every stored row.
    ///
    /// `kwargs.initial` pre-fills the extra forms. When `data` is given the
    /// formset is bound and each existing row is matched by the primary key
    /// submitted with it.
    pub async fn load(
        form_class: FormClass,
        options: FormSetOptions,
        prefix: String,
        store: Arc<dyn ModelStore<M>>,
        kwargs: FormSetKwargs,
        data: Option<&QueryDict>,
        files: Option<&FileDict>,
    ) -> VanillaResult<Self> {
        Self::load_with_link(form_class, options, prefix, store, kwargs, data, files, None).await
    }

    #[allow(clippy::too_many_arguments)]
    async fn load_with_link(
        form_class: FormClass,
        options: FormSetOptions,
        prefix: String,
        store: Arc<dyn ModelStore<M>>,
        kwargs: FormSetKwargs,
        data: Option<&QueryDict>,
        files: Option<&FileDict>,
        link: Option<InlineLink>,
    ) -> VanillaResult<Self> {
        let rows = match &link {
            None => store.all().await?,
            Some(InlineLink {
                fk_name,
                parent_pk: Some(pk),
            }) => store.filter(fk_name, pk).await?,
            Some(_) => Vec::new(),
        };

        let pk_name = M::pk_field_name();
        let instances: Vec<Option<M>> = match data {
            Some(data) => {
                let absolute_max = options.effective_absolute_max();
                let initial_count = management_counts(data, &prefix)
                    .map_or(0, |m| m.initial.min(m.total).min(absolute_max));
                (0..initial_count)
                    .map(|i| {
                        let submitted = data.get(&format!("{prefix}-{i}-{pk_name}"))?.trim();
                        rows.iter()
                            .find(|row| {
                                row.pk().is_some_and(|pk| pk.to_form_string() == submitted)
                            })
                            .cloned()
                    })
                    .collect()
            }
            None => rows.into_iter().map(Some).collect(),
        };

        let initial = instances
            .iter()
            .map(|instance| instance.as_ref().map(instance_initial).unwrap_or_default())
            .collect();

        let mut inner = BaseFormSet::new(form_class, options, prefix)
            .with_pk_field(pk_name)
            .with_initial(initial)
            .with_extra_initial(kwargs.initial);
        if let Some(data) = data {
            let no_files = FileDict::new();
            inner = inner.bind(data, files.unwrap_or(&no_files));
        }

        tracing::debug!(
            model = %M::meta().label(),
            prefix = inner.prefix(),
            rows = instances.len(),
            bound = inner.is_bound(),
            "loaded model formset"
        );

        Ok(Self {
            inner,
            store,
            instances,
            link,
            validated: None,
        })
    }

    /// Returns the underlying formset.
    pub const fn formset(&self) -> &BaseFormSet {
        &self.inner
    }

    /// Returns the instances behind the initial forms. A `None` entry is a
    /// submitted primary key that matched no stored row.
    pub fn instances(&self) -> &[Option<M>] {
        &self.instances
    }

    /// Validates the rows. An existing row whose submitted primary key
    /// matches no stored instance is invalid.
    pub async fn is_valid(&mut self) -> bool {
        let mut valid = self.inner.is_valid().await;
        if self.inner.is_bound() {
            let pk_name = M::pk_field_name();
            let initial_count = self.inner.initial_form_count();
            let can_delete = self.inner.options().can_delete;
            for (i, form) in self.inner.forms_mut().iter_mut().enumerate().take(initial_count) {
                let deleted = can_delete && marked_for_deletion(form);
                if self.instances.get(i).is_some_and(Option::is_none) && !deleted {
                    form.add_error(Some(pk_name), INVALID_PK_MESSAGE.to_string());
                    valid = false;
                }
            }
        }
        self.validated = Some(valid);
        valid
    }

    fn stamp(&self, instance: &mut M) -> VanillaResult<()> {
        if let Some(link) = &self.link {
            let parent_pk = link.parent_pk.clone().ok_or_else(|| {
                VanillaError::IntegrityError(format!(
                    "{} rows cannot be saved before their parent has a primary key",
                    M::meta().label()
                ))
            })?;
            instance.set_field_value(link.fk_name, parent_pk)?;
        }
        Ok(())
    }

    /// Persists the validated rows.
    ///
    /// Existing rows marked for deletion are deleted, changed existing rows
    /// are updated, and changed extra rows are created. Saving a formset
    /// that has not passed validation fails.
    pub async fn save(&mut self) -> VanillaResult<SaveSummary> {
        if self.validated != Some(true) {
            return Err(VanillaError::ValidationError(ValidationError::new(
                format!(
                    "The {} formset could not be saved because the data didn't validate.",
                    M::meta().model_name
                ),
                "invalid",
            )));
        }

        let exclude: Vec<&str> = self.link.iter().map(|link| link.fk_name).collect();
        let initial_count = self.inner.initial_form_count();
        let mut summary = SaveSummary::default();

        for (i, form) in self.inner.forms().iter().enumerate() {
            let delete = self.inner.should_delete_form(form);
            if i < initial_count {
                let Some(mut instance) = self.instances.get(i).cloned().flatten() else {
                    continue;
                };
                if delete {
                    self.store.delete(&instance).await?;
                    summary.deleted += 1;
                    continue;
                }
                if !form.has_changed() {
                    continue;
                }
                construct_instance(&mut instance, form.cleaned_data(), &exclude)?;
                self.stamp(&mut instance)?;
                self.store.save(&mut instance).await?;
                self.instances[i] = Some(instance);
                summary.changed += 1;
            } else {
                if delete || !form.has_changed() {
                    continue;
                }
                let mut instance = M::default();
                construct_instance(&mut instance, form.cleaned_data(), &exclude)?;
                self.stamp(&mut instance)?;
                self.store.save(&mut instance).await?;
                summary.created += 1;
            }
        }

        tracing::info!(
            model = %M::meta().label(),
            prefix = self.inner.prefix(),
            created = summary.created,
            changed = summary.changed,
            deleted = summary.deleted,
            "saved model formset"
        );
        Ok(summary)
    }
}

#[async_trait]
impl<M: Model> RuntimeFormSet for ModelFormSet<M> {
    fn prefix(&self) -> &str {
        self.inner.prefix()
    }

    fn is_bound(&self) -> bool {
        self.inner.is_bound()
    }

    fn total_form_count(&self) -> usize {
        self.inner.total_form_count()
    }

    fn initial_form_count(&self) -> usize {
        self.inner.initial_form_count()
    }

    fn forms(&self) -> &[BaseForm] {
        self.inner.forms()
    }

    async fn is_valid(&mut self) -> bool {
        Self::is_valid(self).await
    }

    fn errors(&self) -> Vec<FormErrors> {
        self.inner.errors()
    }

    fn non_form_errors(&self) -> &[String] {
        self.inner.non_form_errors()
    }

    fn as_context(&self) -> ContextValue {
        ContextValue::Dict(self.inner.as_context())
    }

    fn set_instance(&mut self, parent_pk: Value) {
        if let Some(link) = &mut self.link {
            link.parent_pk = Some(parent_pk);
        }
    }

    async fn save(&mut self) -> VanillaResult<SaveSummary> {
        Self::save(self).await
    }
}

/// A model formset over the children of one `P` instance.
pub struct InlineFormSet<P: Model, M: Model> {
    inner: ModelFormSet<M>,
    _parent: PhantomData<fn() -> P>,
}

impl<P: Model, M: Model> fmt::Debug for InlineFormSet<P, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InlineFormSet")
            .field("parent", &P::meta().label())
            .field("inner", &self.inner)
            .finish()
    }
}

impl<P: Model, M: Model> InlineFormSet<P, M> {
    /// Builds a formset over the rows whose `fk_name` equals `kwargs.instance`.
    /// Without a parent primary key the formset has no existing rows.
    #[allow(clippy::too_many_arguments)]
    pub async fn load(
        form_class: FormClass,
        options: FormSetOptions,
        prefix: String,
        store: Arc<dyn ModelStore<M>>,
        fk_name: &'static str,
        mut kwargs: FormSetKwargs,
        data: Option<&QueryDict>,
        files: Option<&FileDict>,
    ) -> VanillaResult<Self> {
        let link = InlineLink {
            fk_name,
            parent_pk: kwargs.instance.take().filter(|pk| !pk.is_blank()),
        };
        let inner = ModelFormSet::load_with_link(
            form_class,
            options,
            prefix,
            store,
            kwargs,
            data,
            files,
            Some(link),
        )
        .await?;
        Ok(Self {
            inner,
            _parent: PhantomData,
        })
    }

    /// Returns the foreign key field linking rows to the parent.
    pub fn fk_name(&self) -> &'static str {
        self.inner.link.as_ref().map_or("", |link| link.fk_name)
    }

    /// Returns the parent's primary key, if known.
    pub fn parent_pk(&self) -> Option<&Value> {
        self.inner.link.as_ref().and_then(|link| link.parent_pk.as_ref())
    }

    /// Returns the underlying model formset.
    pub const fn model_formset(&self) -> &ModelFormSet<M> {
        &self.inner
    }
}

#[async_trait]
impl<P: Model, M: Model> RuntimeFormSet for InlineFormSet<P, M> {
    fn prefix(&self) -> &str {
        RuntimeFormSet::prefix(&self.inner)
    }

    fn is_bound(&self) -> bool {
        RuntimeFormSet::is_bound(&self.inner)
    }

    fn total_form_count(&self) -> usize {
        RuntimeFormSet::total_form_count(&self.inner)
    }

    fn initial_form_count(&self) -> usize {
        RuntimeFormSet::initial_form_count(&self.inner)
    }

    fn forms(&self) -> &[BaseForm] {
        RuntimeFormSet::forms(&self.inner)
    }

    async fn is_valid(&mut self) -> bool {
        self.inner.is_valid().await
    }

    fn errors(&self) -> Vec<FormErrors> {
        RuntimeFormSet::errors(&self.inner)
    }

    fn non_form_errors(&self) -> &[String] {
        RuntimeFormSet::non_form_errors(&self.inner)
    }

    fn as_context(&self) -> ContextValue {
        RuntimeFormSet::as_context(&self.inner)
    }

    fn set_instance(&mut self, parent_pk: Value) {
        RuntimeFormSet::set_instance(&mut self.inner, parent_pk);
    }

    async fn save(&mut self) -> VanillaResult<SaveSummary> {
        self.inner.save().await
    }
}
