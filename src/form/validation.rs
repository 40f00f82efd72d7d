use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{Either, select};
use futures_timer::Delay;

use super::controller::{
    AsyncFieldValidatorEntry, AsyncFieldValidatorFn, AsyncTimeout, FieldKey, FormController,
    FormResult, SyncFieldValidatorFn, SyncFormValidatorFn, TimeoutErrorFn, Trigger,
    ValidationTicket, first_error_key, read_lock, write_lock,
};

pub trait ValidationError: Clone + Send + Sync + 'static {
    fn message(&self) -> String;

    /// Short machine-readable rule name, e.g. `required` or `pattern`.
    fn code(&self) -> &'static str {
        "validate"
    }
}

/// An async validator did not resolve within its configured bound.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ValidationTimeout {
    pub field: FieldKey,
    pub after: Duration,
}

pub trait FieldLens<T>: Copy + Send + Sync + 'static {
    type Value: Clone + PartialEq + Send + Sync + 'static;

    fn key(self) -> FieldKey;
    fn get<'a>(self, model: &'a T) -> &'a Self::Value;
    fn get_mut<'a>(self, model: &'a mut T) -> &'a mut Self::Value;

    fn set(self, model: &mut T, value: Self::Value) {
        *self.get_mut(model) = value;
    }

    /// Focuses `inner`, a lens over this lens' value, producing a lens over `T`
    /// whose key is the joined path (`social` + `twitter` = `social.twitter`).
    fn nested<I>(self, inner: I) -> NestedLens<Self, I>
    where
        I: FieldLens<Self::Value>,
    {
        NestedLens::new(self, inner)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NestedLens<O, I> {
    outer: O,
    inner: I,
}

impl<O, I> NestedLens<O, I> {
    pub const fn new(outer: O, inner: I) -> Self {
        Self { outer, inner }
    }
}

impl<T, O, I> FieldLens<T> for NestedLens<O, I>
where
    O: FieldLens<T>,
    I: FieldLens<<O as FieldLens<T>>::Value>,
{
    type Value = I::Value;

    fn key(self) -> FieldKey {
        self.outer.key().join(self.inner.key())
    }

    fn get<'a>(self, model: &'a T) -> &'a Self::Value {
        self.inner.get(self.outer.get(model))
    }

    fn get_mut<'a>(self, model: &'a mut T) -> &'a mut Self::Value {
        self.inner.get_mut(self.outer.get_mut(model))
    }
}

pub trait FormModel: Clone + Send + Sync + 'static {
    type Fields;

    fn fields() -> Self::Fields;
}

pub trait FieldValidator<T, L, E>: Send + Sync
where
    L: FieldLens<T>,
    E: ValidationError,
{
    fn validate(&self, model: &T, value: &L::Value) -> Result<(), E>;
}

impl<T, L, E, F> FieldValidator<T, L, E> for F
where
    L: FieldLens<T>,
    E: ValidationError,
    F: for<'a> Fn(&'a T, &'a L::Value) -> Result<(), E> + Send + Sync,
{
    fn validate(&self, model: &T, value: &L::Value) -> Result<(), E> {
        (self)(model, value)
    }
}

pub trait FormValidator<T, E>: Send + Sync
where
    E: ValidationError,
{
    fn validate(&self, model: &T) -> Vec<(FieldKey, E)>;
}

impl<T, E, F> FormValidator<T, E> for F
where
    E: ValidationError,
    F: Fn(&T) -> Vec<(FieldKey, E)> + Send + Sync,
{
    fn validate(&self, model: &T) -> Vec<(FieldKey, E)> {
        (self)(model)
    }
}

pub type BoxedValidationFuture<'a, E> = Pin<Box<dyn Future<Output = Result<(), E>> + Send + 'a>>;

pub trait AsyncFieldValidator<T, L, E>: Send + Sync
where
    L: FieldLens<T>,
    E: ValidationError,
{
    type Fut<'a>: Future<Output = Result<(), E>> + Send + 'a
    where
        Self: 'a,
        T: 'a,
        L::Value: 'a;

    fn validate<'a>(&'a self, model: &'a T, value: &'a L::Value) -> Self::Fut<'a>;
}

impl<T, L, E, F> AsyncFieldValidator<T, L, E> for F
where
    L: FieldLens<T>,
    E: ValidationError,
    F: for<'a> Fn(&'a T, &'a L::Value) -> BoxedValidationFuture<'a, E> + Send + Sync,
{
    type Fut<'a>
        = BoxedValidationFuture<'a, E>
    where
        Self: 'a,
        T: 'a,
        L::Value: 'a;

    fn validate<'a>(&'a self, model: &'a T, value: &'a L::Value) -> Self::Fut<'a> {
        (self)(model, value)
    }
}

impl<T, E> FormController<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: ValidationError,
{
    pub fn register_field_validator<L, V>(&self, lens: L, validator: V) -> FormResult<()>
    where
        L: FieldLens<T>,
        V: FieldValidator<T, L, E> + 'static,
    {
        let key = lens.key();
        let validator = Arc::new(validator);
        let wrapped: SyncFieldValidatorFn<T, E> =
            Arc::new(move |model: &T| validator.validate(model, lens.get(model)));
        let mut validators =
            write_lock(&self.sync_field_validators, "registering field validator")?;
        validators.entry(key).or_default().push(wrapped);
        Ok(())
    }

    /// Async validators of a field run only once all of its sync validators
    /// pass.
    pub fn register_async_field_validator<L, V>(&self, lens: L, validator: V) -> FormResult<()>
    where
        L: FieldLens<T>,
        V: AsyncFieldValidator<T, L, E> + 'static,
    {
        self.register_async_field_validator_with_debounce(lens, 0, validator)
    }

    pub fn register_async_field_validator_with_debounce<L, V>(
        &self,
        lens: L,
        debounce_ms: u64,
        validator: V,
    ) -> FormResult<()>
    where
        L: FieldLens<T>,
        V: AsyncFieldValidator<T, L, E> + 'static,
    {
        self.push_async_validator(lens, Duration::from_millis(debounce_ms), None, validator)
    }

    /// Like [`Self::register_async_field_validator_with_debounce`], but a run
    /// that outlives `timeout` fails the field with `E::from(ValidationTimeout)`.
    pub fn register_async_field_validator_with_timeout<L, V>(
        &self,
        lens: L,
        debounce_ms: u64,
        timeout: Duration,
        validator: V,
    ) -> FormResult<()>
    where
        L: FieldLens<T>,
        V: AsyncFieldValidator<T, L, E> + 'static,
        E: From<ValidationTimeout>,
    {
        let error: TimeoutErrorFn<E> = Arc::new(|timeout: ValidationTimeout| E::from(timeout));
        self.push_async_validator(
            lens,
            Duration::from_millis(debounce_ms),
            Some(AsyncTimeout {
                after: timeout,
                error,
            }),
            validator,
        )
    }

    fn push_async_validator<L, V>(
        &self,
        lens: L,
        debounce: Duration,
        timeout: Option<AsyncTimeout<E>>,
        validator: V,
    ) -> FormResult<()>
    where
        L: FieldLens<T>,
        V: AsyncFieldValidator<T, L, E> + 'static,
    {
        let key = lens.key();
        let validator = Arc::new(validator);
        let wrapped: AsyncFieldValidatorFn<T, E> = Arc::new(move |model: T| {
            let value = lens.get(&model).clone();
            let validator = validator.clone();
            Box::pin(async move { validator.validate(&model, &value).await })
        });
        let entry = AsyncFieldValidatorEntry {
            debounce,
            timeout,
            validator: wrapped,
        };
        let mut validators = write_lock(
            &self.async_field_validators,
            "registering async field validator",
        )?;
        validators.entry(key).or_default().push(entry);
        Ok(())
    }

    pub fn register_form_validator<V>(&self, validator: V) -> FormResult<()>
    where
        V: FormValidator<T, E> + 'static,
    {
        let validator = Arc::new(validator);
        let wrapped: SyncFormValidatorFn<T, E> =
            Arc::new(move |model: &T| validator.validate(model));
        let mut validators = write_lock(&self.form_validators, "registering form validator")?;
        validators.push(wrapped);
        Ok(())
    }

    /// Re-validates `dependent` whenever `source` changes, subject to the
    /// validation and revalidation modes.
    pub fn register_dependency<S, D>(&self, source: S, dependent: D) -> FormResult<()>
    where
        S: FieldLens<T>,
        D: FieldLens<T>,
    {
        let mut dependencies = write_lock(&self.dependencies, "registering dependency")?;
        dependencies
            .entry(source.key())
            .or_default()
            .insert(dependent.key());
        Ok(())
    }

    pub fn set<L>(&self, lens: L, value: L::Value) -> FormResult<()>
    where
        L: FieldLens<T>,
    {
        let key = lens.key();
        let has_async = read_lock(
            &self.async_field_validators,
            "reading registered async validators",
        )?
        .get(&key)
        .is_some_and(|entries| !entries.is_empty());
        let submitted = {
            let mut state = write_lock(&self.state, "writing form model")?;
            lens.set(&mut state.model, value);
            let is_dirty = lens.get(&state.model) != lens.get(&state.initial_model);
            if is_dirty {
                state.dirty_fields.insert(key);
            } else {
                state.dirty_fields.remove(&key);
            }
            state.bump_ticket(key);
            let meta = state.ensure_meta(key);
            meta.dirty = is_dirty;
            meta.validating = false;
            meta.unverified = has_async;
            state.record_edit();
            state.submit_count > 0
        };

        self.notify_watchers(key)?;
        self.clear_disabled_fields()?;
        if self.validates_on(Trigger::Change, submitted) {
            let _ = self.validate_field_by_key(key)?;
            self.revalidate_dependents(key)?;
        }
        Ok(())
    }

    pub fn touch<L>(&self, lens: L) -> FormResult<()>
    where
        L: FieldLens<T>,
    {
        let key = lens.key();
        let submitted = {
            let mut state = write_lock(&self.state, "touching field")?;
            state.ensure_meta(key).touched = true;
            state.touch_revision();
            state.submit_count > 0
        };

        if self.validates_on(Trigger::Blur, submitted) {
            let _ = self.validate_field_by_key(key)?;
            self.revalidate_dependents(key)?;
        }
        Ok(())
    }

    /// [`Self::set`] followed by the field's (and its dependents') async
    /// validators when the current mode validates on change.
    pub async fn set_async<L>(&self, lens: L, value: L::Value) -> FormResult<()>
    where
        L: FieldLens<T>,
    {
        let key = lens.key();
        self.set(lens, value)?;
        if self.validates_on(Trigger::Change, self.is_submitted()?) {
            let _ = self.validate_field_async_registered_by_key(key).await?;
            self.revalidate_dependents_async(key).await?;
        }
        Ok(())
    }

    pub async fn touch_async<L>(&self, lens: L) -> FormResult<()>
    where
        L: FieldLens<T>,
    {
        let key = lens.key();
        self.touch(lens)?;
        if self.validates_on(Trigger::Blur, self.is_submitted()?) {
            let _ = self.validate_field_async_registered_by_key(key).await?;
            self.revalidate_dependents_async(key).await?;
        }
        Ok(())
    }

    pub fn validate_field<L>(&self, lens: L) -> FormResult<bool>
    where
        L: FieldLens<T>,
    {
        self.validate_field_by_key(lens.key())
    }

    /// Runs an unregistered async validator against the field; the result is
    /// applied only if no newer validation of the field started meanwhile.
    pub async fn validate_field_async<L, V>(
        &self,
        lens: L,
        validator: &V,
    ) -> FormResult<ValidationTicket>
    where
        L: FieldLens<T>,
        V: AsyncFieldValidator<T, L, E>,
    {
        let key = lens.key();
        let (ticket, model, value) = {
            let mut state = write_lock(&self.state, "starting async validation")?;
            let ticket = state.bump_ticket(key);
            state.ensure_meta(key).validating = true;
            (ticket, state.model.clone(), lens.get(&state.model).clone())
        };

        let result = validator.validate(&model, &value).await;
        self.finish_async_validation(key, ticket, result)?;
        Ok(ticket)
    }

    pub async fn validate_field_async_registered<L>(
        &self,
        lens: L,
    ) -> FormResult<Vec<ValidationTicket>>
    where
        L: FieldLens<T>,
    {
        self.validate_field_async_registered_by_key(lens.key())
            .await
    }

    pub fn validate_form(&self) -> FormResult<bool> {
        let model = {
            read_lock(&self.state, "reading model for form validation")?
                .model
                .clone()
        };
        let field_validators = read_lock(
            &self.sync_field_validators,
            "reading field validators for form validation",
        )?
        .clone();
        let form_validators = read_lock(
            &self.form_validators,
            "reading form validators for form validation",
        )?
        .clone();

        let mut field_errors = BTreeMap::<FieldKey, Vec<E>>::new();
        for (key, validators) in field_validators {
            if !self.is_enabled_by_key(key, &model)? {
                field_errors.insert(key, Vec::new());
                continue;
            }
            field_errors.insert(key, self.run_sync_validators(&validators, &model));
        }

        for validator in form_validators {
            for (key, error) in validator(&model) {
                if self.is_enabled_by_key(key, &model)? {
                    field_errors.entry(key).or_default().push(error);
                }
            }
        }

        {
            let mut state = write_lock(&self.state, "applying form validation result")?;
            let mut keys = state
                .field_meta
                .keys()
                .copied()
                .collect::<BTreeSet<FieldKey>>();
            keys.extend(field_errors.keys().copied());
            for key in keys {
                let meta = state.ensure_meta(key);
                meta.validating = false;
                meta.errors = field_errors.remove(&key).unwrap_or_default();
            }
            state.first_error = first_error_key(&state.field_meta);
            state.touch_revision();
        }

        Ok(self.snapshot()?.is_valid)
    }

    /// Sync validation of every field, then the async validators of each
    /// field that passed, one at a time.
    pub async fn validate_form_async(&self) -> FormResult<bool> {
        let _ = self.validate_form()?;
        let keys = read_lock(
            &self.async_field_validators,
            "reading async validator keys for form validation",
        )?
        .keys()
        .copied()
        .collect::<Vec<_>>();

        for key in keys {
            let _ = self.validate_field_async_registered_by_key(key).await?;
        }

        Ok(self.snapshot()?.is_valid)
    }

    pub(super) fn validate_field_by_key(&self, key: FieldKey) -> FormResult<bool> {
        let model = {
            read_lock(&self.state, "reading model for field validation")?
                .model
                .clone()
        };
        let validators = if self.is_enabled_by_key(key, &model)? {
            read_lock(
                &self.sync_field_validators,
                "reading field validators for key validation",
            )?
            .get(&key)
            .cloned()
            .unwrap_or_default()
        } else {
            Vec::new()
        };

        let errors = self.run_sync_validators(&validators, &model);
        tracing::debug!(field = %key, error_count = errors.len(), "field validated");

        let mut state = write_lock(&self.state, "writing field validation result")?;
        let meta = state.ensure_meta(key);
        meta.validating = false;
        meta.errors = errors;
        state.first_error = first_error_key(&state.field_meta);
        state.touch_revision();
        Ok(state
            .field_meta
            .get(&key)
            .is_none_or(|m| m.errors.is_empty()))
    }

    fn run_sync_validators(&self, validators: &[SyncFieldValidatorFn<T, E>], model: &T) -> Vec<E> {
        let mut errors = Vec::new();
        for validator in validators {
            if let Err(error) = validator(model) {
                errors.push(error);
                if self.options.validate_first_error_only {
                    break;
                }
            }
        }
        errors
    }

    pub(super) fn revalidate_dependents(&self, source: FieldKey) -> FormResult<()> {
        for dependent in self.dependents_of(source)? {
            let _ = self.validate_field_by_key(dependent)?;
        }
        Ok(())
    }

    pub(super) async fn revalidate_dependents_async(&self, source: FieldKey) -> FormResult<()> {
        for dependent in self.dependents_of(source)? {
            let _ = self
                .validate_field_async_registered_by_key(dependent)
                .await?;
        }
        Ok(())
    }

    fn dependents_of(&self, source: FieldKey) -> FormResult<BTreeSet<FieldKey>> {
        Ok(read_lock(&self.dependencies, "reading field dependencies")?
            .get(&source)
            .cloned()
            .unwrap_or_default())
    }

    pub(super) async fn validate_field_async_registered_by_key(
        &self,
        key: FieldKey,
    ) -> FormResult<Vec<ValidationTicket>> {
        let (model, has_sync_errors) = {
            let state = read_lock(&self.state, "reading model for registered async validation")?;
            let has_sync_errors = state
                .field_meta
                .get(&key)
                .is_some_and(|meta| !meta.errors.is_empty());
            (state.model.clone(), has_sync_errors)
        };
        if has_sync_errors || !self.is_enabled_by_key(key, &model)? {
            return Ok(Vec::new());
        }
        let validators = {
            read_lock(
                &self.async_field_validators,
                "reading registered async validators",
            )?
            .get(&key)
            .cloned()
            .unwrap_or_default()
        };

        let mut tickets = Vec::with_capacity(validators.len());
        for entry in validators {
            let ticket = {
                let mut state = write_lock(&self.state, "starting registered async validation")?;
                let ticket = state.bump_ticket(key);
                state.ensure_meta(key).validating = true;
                state.touch_revision();
                ticket
            };

            if !entry.debounce.is_zero() {
                Delay::new(entry.debounce).await;
                if !self.is_latest_ticket(key, ticket)? {
                    break;
                }
            }

            let result = run_async_entry(&entry, key, model.clone()).await;
            let passed = self.finish_async_validation(key, ticket, result)?;
            tickets.push(ticket);
            if passed != Some(true) {
                break;
            }
        }
        Ok(tickets)
    }

    fn is_latest_ticket(&self, key: FieldKey, ticket: ValidationTicket) -> FormResult<bool> {
        Ok(read_lock(&self.state, "checking latest validation ticket")?
            .tickets
            .get(&key)
            .copied()
            == Some(ticket))
    }

    fn is_submitted(&self) -> FormResult<bool> {
        Ok(read_lock(&self.state, "reading submit count")?.submit_count > 0)
    }

    /// Applies an async result unless the ticket went stale. Returns `None`
    /// for a stale result, otherwise whether the field passed.
    fn finish_async_validation(
        &self,
        key: FieldKey,
        ticket: ValidationTicket,
        result: Result<(), E>,
    ) -> FormResult<Option<bool>> {
        let mut state = write_lock(&self.state, "finishing async validation")?;
        if state.tickets.get(&key).copied() != Some(ticket) {
            tracing::trace!(field = %key, ticket = ticket.0, "discarding stale async result");
            return Ok(None);
        }
        let passed = result.is_ok();
        let meta = state.ensure_meta(key);
        meta.validating = false;
        meta.unverified = false;
        meta.errors = match result {
            Ok(()) => Vec::new(),
            Err(error) => vec![error],
        };
        state.first_error = first_error_key(&state.field_meta);
        state.touch_revision();
        tracing::debug!(field = %key, passed, "async validation finished");
        Ok(Some(passed))
    }
}

async fn run_async_entry<T, E>(
    entry: &AsyncFieldValidatorEntry<T, E>,
    key: FieldKey,
    model: T,
) -> Result<(), E> {
    let validation = (entry.validator)(model);
    let Some(timeout) = entry.timeout.as_ref() else {
        return validation.await;
    };
    match select(validation, Delay::new(timeout.after)).await {
        Either::Left((result, _)) => result,
        Either::Right(((), _)) => {
            tracing::warn!(field = %key, after = ?timeout.after, "async validation timed out");
            Err((timeout.error)(ValidationTimeout {
                field: key,
                after: timeout.after,
            }))
        }
    }
}
