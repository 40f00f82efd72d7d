use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use thiserror::Error;

use super::errors::FieldErrors;
use super::validation::{FieldLens, ValidationError, ValidationTimeout};

static FORM_ID_ALLOCATOR: AtomicU64 = AtomicU64::new(1);

const MAX_PATH_DEPTH: usize = 4;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FormId(pub u64);

impl FormId {
    pub fn next() -> Self {
        Self(FORM_ID_ALLOCATOR.fetch_add(1, Ordering::SeqCst))
    }
}

impl Display for FormId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "form-{}", self.0)
    }
}

/// Dot-addressed location of a value inside a form model, e.g. `social.twitter`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FieldKey {
    segments: [&'static str; MAX_PATH_DEPTH],
    depth: usize,
}

impl FieldKey {
    pub const fn new(segment: &'static str) -> Self {
        let mut segments = [""; MAX_PATH_DEPTH];
        segments[0] = segment;
        Self { segments, depth: 1 }
    }

    /// Appends `child` beneath this key. Panics if the combined path is deeper
    /// than four segments.
    pub const fn join(self, child: FieldKey) -> Self {
        assert!(
            self.depth + child.depth <= MAX_PATH_DEPTH,
            "field path nesting is limited to four segments"
        );
        let mut segments = self.segments;
        let mut index = 0;
        while index < child.depth {
            segments[self.depth + index] = child.segments[index];
            index += 1;
        }
        Self {
            segments,
            depth: self.depth + child.depth,
        }
    }

    pub fn segments(&self) -> &[&'static str] {
        &self.segments[..self.depth]
    }

    pub fn path(&self) -> String {
        self.segments().join(".")
    }

    pub fn matches(&self, path: &str) -> bool {
        let mut parts = path.split('.');
        self.segments()
            .iter()
            .all(|segment| parts.next() == Some(*segment))
            && parts.next().is_none()
    }

    /// True when `other` equals this key or lies nested beneath it.
    pub fn contains(&self, other: &FieldKey) -> bool {
        other.depth >= self.depth && other.segments[..self.depth] == *self.segments()
    }
}

impl Display for FieldKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (index, segment) in self.segments().iter().enumerate() {
            if index > 0 {
                f.write_str(".")?;
            }
            f.write_str(segment)?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ValidationTicket(pub u64);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct WatchId(pub u64);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SubmitState {
    Idle,
    Validating,
    Submitting,
    Succeeded,
    Failed,
}

impl SubmitState {
    pub fn is_submitting(self) -> bool {
        matches!(self, SubmitState::Validating | SubmitState::Submitting)
    }
}

/// When fields validate before the first submit attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValidationMode {
    OnChange,
    OnBlur,
    OnSubmit,
}

/// When fields re-validate once a submit has been attempted.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RevalidateMode {
    OnChange,
    OnBlur,
    OnSubmit,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(super) enum Trigger {
    Change,
    Blur,
}

impl ValidationMode {
    fn fires_on(self, trigger: Trigger) -> bool {
        matches!(
            (self, trigger),
            (ValidationMode::OnChange, Trigger::Change) | (ValidationMode::OnBlur, Trigger::Blur)
        )
    }
}

impl RevalidateMode {
    fn fires_on(self, trigger: Trigger) -> bool {
        matches!(
            (self, trigger),
            (RevalidateMode::OnChange, Trigger::Change) | (RevalidateMode::OnBlur, Trigger::Blur)
        )
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FormOptions {
    pub validate_mode: ValidationMode,
    pub revalidate_mode: RevalidateMode,
    pub validate_first_error_only: bool,
    pub submit_requires_dirty: bool,
}

impl Default for FormOptions {
    fn default() -> Self {
        Self {
            validate_mode: ValidationMode::OnSubmit,
            revalidate_mode: RevalidateMode::OnChange,
            validate_first_error_only: false,
            submit_requires_dirty: false,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldMeta<E> {
    pub dirty: bool,
    pub touched: bool,
    pub validating: bool,
    /// The value changed after the field's async validators last completed.
    pub unverified: bool,
    pub errors: Vec<E>,
}

impl<E> Default for FieldMeta<E> {
    fn default() -> Self {
        Self {
            dirty: false,
            touched: false,
            validating: false,
            unverified: false,
            errors: Vec::new(),
        }
    }
}

/// Flags derived from the controller state, as consumed by a rendering layer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FormState {
    pub is_dirty: bool,
    pub is_submitted: bool,
    pub is_submitting: bool,
    pub is_valid: bool,
    pub submit_count: u32,
}

#[derive(Clone, Debug)]
pub struct FormSnapshot<T, E> {
    pub model: T,
    pub submit_state: SubmitState,
    pub submit_count: u32,
    pub is_dirty: bool,
    pub is_valid: bool,
    pub revision: u64,
    pub field_meta: BTreeMap<FieldKey, FieldMeta<E>>,
}

impl<T, E> FormSnapshot<T, E> {
    pub fn form_state(&self) -> FormState {
        FormState {
            is_dirty: self.is_dirty,
            is_submitted: self.submit_count > 0,
            is_submitting: self.submit_state.is_submitting(),
            is_valid: self.is_valid,
            submit_count: self.submit_count,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SubmitOutcome {
    Submitted,
    Invalid,
    /// The form was reset while the submit ran; no handler was called and
    /// the state left by the reset (or a later submit) is untouched.
    Cancelled,
}

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum FormError {
    #[error("form state lock poisoned while {0}")]
    StatePoisoned(&'static str),
    #[error("invalid submit state transition: {from:?} -> {to:?}")]
    InvalidStateTransition { from: SubmitState, to: SubmitState },
    #[error("form submit is already in progress")]
    AlreadySubmitting,
    #[error("form has no changes to submit")]
    NotDirty,
    #[error("unknown field path `{0}`")]
    UnknownField(String),
    #[error("field `{0}` is disabled")]
    FieldDisabled(String),
}

pub type FormResult<T> = Result<T, FormError>;

pub(super) type SyncFieldValidatorFn<T, E> = Arc<dyn Fn(&T) -> Result<(), E> + Send + Sync>;
pub(super) type SyncFormValidatorFn<T, E> = Arc<dyn Fn(&T) -> Vec<(FieldKey, E)> + Send + Sync>;
pub(super) type AsyncFieldValidatorFn<T, E> =
    Arc<dyn Fn(T) -> Pin<Box<dyn Future<Output = Result<(), E>> + Send + 'static>> + Send + Sync>;
pub(super) type EnablementFn<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;
pub(super) type WatchFn<T> = Arc<dyn Fn(&T) + Send + Sync>;
pub(super) type TimeoutErrorFn<E> = Arc<dyn Fn(ValidationTimeout) -> E + Send + Sync>;

#[derive(Clone)]
pub(super) struct AsyncTimeout<E> {
    pub(super) after: Duration,
    pub(super) error: TimeoutErrorFn<E>,
}

#[derive(Clone)]
pub(super) struct AsyncFieldValidatorEntry<T, E> {
    pub(super) debounce: Duration,
    pub(super) timeout: Option<AsyncTimeout<E>>,
    pub(super) validator: AsyncFieldValidatorFn<T, E>,
}

pub(super) struct FormStore<T, E> {
    pub(super) id: FormId,
    pub(super) initial_model: T,
    pub(super) model: T,
    pub(super) submit_state: SubmitState,
    pub(super) submit_count: u32,
    pub(super) dirty_fields: BTreeSet<FieldKey>,
    pub(super) field_meta: BTreeMap<FieldKey, FieldMeta<E>>,
    pub(super) tickets: BTreeMap<FieldKey, ValidationTicket>,
    pub(super) first_error: Option<FieldKey>,
    pub(super) revision: u64,
    /// Bumped by every model write.
    pub(super) edit_count: u64,
    /// Bumped by every submit start and every reset; a submit run only
    /// applies its result while the epoch it started with is current.
    pub(super) submit_epoch: u64,
}

impl<T, E> FormStore<T, E> {
    pub(super) fn ensure_meta(&mut self, key: FieldKey) -> &mut FieldMeta<E> {
        self.field_meta.entry(key).or_default()
    }

    /// Issues a new ticket for `key`; any async result holding an older ticket
    /// is discarded when it resolves.
    pub(super) fn bump_ticket(&mut self, key: FieldKey) -> ValidationTicket {
        let next = ValidationTicket(
            self.tickets
                .get(&key)
                .copied()
                .unwrap_or(ValidationTicket(0))
                .0
                + 1,
        );
        self.tickets.insert(key, next);
        next
    }

    pub(super) fn touch_revision(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    pub(super) fn record_edit(&mut self) {
        self.edit_count = self.edit_count.wrapping_add(1);
        self.touch_revision();
    }
}

/// Where a submit run stands once its validation pass returned.
enum Settled<T> {
    Valid(T),
    Invalid,
    /// Values changed while validators ran; validate again.
    Stale,
    /// A reset or a newer submit took over.
    Cancelled,
}

#[derive(Clone)]
pub struct FormController<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: ValidationError,
{
    pub(super) options: FormOptions,
    pub(super) state: Arc<RwLock<FormStore<T, E>>>,
    pub(super) sync_field_validators:
        Arc<RwLock<BTreeMap<FieldKey, Vec<SyncFieldValidatorFn<T, E>>>>>,
    pub(super) async_field_validators:
        Arc<RwLock<BTreeMap<FieldKey, Vec<AsyncFieldValidatorEntry<T, E>>>>>,
    pub(super) form_validators: Arc<RwLock<Vec<SyncFormValidatorFn<T, E>>>>,
    pub(super) dependencies: Arc<RwLock<BTreeMap<FieldKey, BTreeSet<FieldKey>>>>,
    pub(super) enablement: Arc<RwLock<BTreeMap<FieldKey, EnablementFn<T>>>>,
    pub(super) watchers: Arc<RwLock<BTreeMap<WatchId, (FieldKey, WatchFn<T>)>>>,
    pub(super) next_watch_id: Arc<AtomicU64>,
    pub(super) required_fields: Arc<RwLock<BTreeSet<FieldKey>>>,
    pub(super) field_labels: Arc<RwLock<BTreeMap<FieldKey, String>>>,
}

impl<T, E> FormController<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: ValidationError,
{
    pub fn new(initial: T, options: FormOptions) -> Self {
        Self {
            options,
            state: Arc::new(RwLock::new(FormStore {
                id: FormId::next(),
                initial_model: initial.clone(),
                model: initial,
                submit_state: SubmitState::Idle,
                submit_count: 0,
                dirty_fields: BTreeSet::new(),
                field_meta: BTreeMap::new(),
                tickets: BTreeMap::new(),
                first_error: None,
                revision: 0,
                edit_count: 0,
                submit_epoch: 0,
            })),
            sync_field_validators: Arc::new(RwLock::new(BTreeMap::new())),
            async_field_validators: Arc::new(RwLock::new(BTreeMap::new())),
            form_validators: Arc::new(RwLock::new(Vec::new())),
            dependencies: Arc::new(RwLock::new(BTreeMap::new())),
            enablement: Arc::new(RwLock::new(BTreeMap::new())),
            watchers: Arc::new(RwLock::new(BTreeMap::new())),
            next_watch_id: Arc::new(AtomicU64::new(1)),
            required_fields: Arc::new(RwLock::new(BTreeSet::new())),
            field_labels: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    pub fn options(&self) -> FormOptions {
        self.options
    }

    pub fn form_id(&self) -> FormResult<FormId> {
        Ok(read_lock(&self.state, "reading form id")?.id)
    }

    pub fn register_required_field<L>(&self, lens: L) -> FormResult<()>
    where
        L: FieldLens<T>,
    {
        let mut required = write_lock(&self.required_fields, "registering required field")?;
        required.insert(lens.key());
        Ok(())
    }

    pub fn unregister_required_field<L>(&self, lens: L) -> FormResult<()>
    where
        L: FieldLens<T>,
    {
        let mut required = write_lock(&self.required_fields, "unregistering required field")?;
        required.remove(&lens.key());
        Ok(())
    }

    pub fn register_field_label<L>(&self, lens: L, label: impl Into<String>) -> FormResult<()>
    where
        L: FieldLens<T>,
    {
        let mut labels = write_lock(&self.field_labels, "registering field label")?;
        labels.insert(lens.key(), label.into());
        Ok(())
    }

    /// Makes the field editable and validated only while `predicate` holds.
    pub fn register_enabled_when<L>(
        &self,
        lens: L,
        predicate: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) -> FormResult<()>
    where
        L: FieldLens<T>,
    {
        let mut enablement = write_lock(&self.enablement, "registering field enablement")?;
        enablement.insert(lens.key(), Arc::new(predicate));
        Ok(())
    }

    /// Calls `callback` with the current value after every change of the
    /// watched path, of any path nested beneath it, and after a reset.
    pub fn watch<L>(
        &self,
        lens: L,
        callback: impl Fn(&L::Value) + Send + Sync + 'static,
    ) -> FormResult<WatchId>
    where
        L: FieldLens<T>,
    {
        let id = WatchId(self.next_watch_id.fetch_add(1, Ordering::SeqCst));
        let wrapped: WatchFn<T> = Arc::new(move |model: &T| callback(lens.get(model)));
        let mut watchers = write_lock(&self.watchers, "registering watcher")?;
        watchers.insert(id, (lens.key(), wrapped));
        Ok(id)
    }

    pub fn unwatch(&self, id: WatchId) -> FormResult<bool> {
        let mut watchers = write_lock(&self.watchers, "removing watcher")?;
        Ok(watchers.remove(&id).is_some())
    }

    pub fn get<L>(&self, lens: L) -> FormResult<L::Value>
    where
        L: FieldLens<T>,
    {
        Ok(lens
            .get(&read_lock(&self.state, "reading field value")?.model)
            .clone())
    }

    pub fn values(&self) -> FormResult<T> {
        Ok(read_lock(&self.state, "reading form values")?.model.clone())
    }

    pub fn revision(&self) -> FormResult<u64> {
        Ok(read_lock(&self.state, "reading form revision")?.revision)
    }

    pub fn submit(
        &self,
        on_valid: impl FnOnce(T) -> FormResult<()>,
        on_invalid: impl FnOnce(FieldErrors<E>),
    ) -> FormResult<SubmitOutcome> {
        let epoch = self.begin_submit()?;
        loop {
            let edits = self.edit_count()?;
            let is_valid = match self.validate_form() {
                Ok(is_valid) => is_valid,
                Err(error) => {
                    self.finish_submit(epoch, SubmitState::Failed)?;
                    return Err(error);
                }
            };
            match self.settle_validation(epoch, edits, is_valid)? {
                Settled::Valid(model) => {
                    let submit_result = on_valid(model);
                    return self.complete_submit(epoch, submit_result);
                }
                Settled::Invalid => return self.reject_submit(epoch, on_invalid),
                Settled::Stale => continue,
                Settled::Cancelled => return Ok(SubmitOutcome::Cancelled),
            }
        }
    }

    pub async fn submit_async<V, Fut>(
        &self,
        on_valid: V,
        on_invalid: impl FnOnce(FieldErrors<E>),
    ) -> FormResult<SubmitOutcome>
    where
        V: FnOnce(T) -> Fut,
        Fut: Future<Output = FormResult<()>>,
    {
        let epoch = self.begin_submit()?;
        loop {
            let edits = self.edit_count()?;
            let is_valid = match self.validate_form_async().await {
                Ok(is_valid) => is_valid,
                Err(error) => {
                    self.finish_submit(epoch, SubmitState::Failed)?;
                    return Err(error);
                }
            };
            match self.settle_validation(epoch, edits, is_valid)? {
                Settled::Valid(model) => {
                    let submit_result = on_valid(model).await;
                    return self.complete_submit(epoch, submit_result);
                }
                Settled::Invalid => return self.reject_submit(epoch, on_invalid),
                Settled::Stale => continue,
                Settled::Cancelled => return Ok(SubmitOutcome::Cancelled),
            }
        }
    }

    pub fn can_submit(&self) -> FormResult<bool> {
        let state = read_lock(&self.state, "reading submit availability")?;
        let dirty_ok = !self.options.submit_requires_dirty || !state.dirty_fields.is_empty();
        Ok(dirty_ok && !state.submit_state.is_submitting())
    }

    fn begin_submit(&self) -> FormResult<u64> {
        let mut state = write_lock(&self.state, "preparing submit")?;
        if state.submit_state.is_submitting() {
            return Err(FormError::AlreadySubmitting);
        }
        if self.options.submit_requires_dirty && state.dirty_fields.is_empty() {
            return Err(FormError::NotDirty);
        }
        transition_submit_state(&mut state, SubmitState::Validating)?;
        state.submit_count = state.submit_count.saturating_add(1);
        state.submit_epoch = state.submit_epoch.wrapping_add(1);
        state.touch_revision();
        tracing::debug!(
            form_id = %state.id,
            submit_count = state.submit_count,
            epoch = state.submit_epoch,
            "submit started"
        );
        Ok(state.submit_epoch)
    }

    fn edit_count(&self) -> FormResult<u64> {
        Ok(read_lock(&self.state, "reading edit count")?.edit_count)
    }

    /// Hands out the validated model, moving to `Submitting`, only if no
    /// edit landed after validation began and the run is still current.
    fn settle_validation(
        &self,
        epoch: u64,
        edits: u64,
        is_valid: bool,
    ) -> FormResult<Settled<T>> {
        let mut state = write_lock(&self.state, "settling submit validation")?;
        if state.submit_epoch != epoch {
            tracing::debug!(form_id = %state.id, epoch, "submit superseded");
            return Ok(Settled::Cancelled);
        }
        if state.edit_count != edits {
            tracing::debug!(
                form_id = %state.id,
                epoch,
                "values changed during submit validation"
            );
            return Ok(Settled::Stale);
        }
        if !is_valid {
            return Ok(Settled::Invalid);
        }
        transition_submit_state(&mut state, SubmitState::Submitting)?;
        state.touch_revision();
        Ok(Settled::Valid(state.model.clone()))
    }

    fn reject_submit(
        &self,
        epoch: u64,
        on_invalid: impl FnOnce(FieldErrors<E>),
    ) -> FormResult<SubmitOutcome> {
        let errors = {
            let mut state = write_lock(&self.state, "rejecting submit")?;
            if state.submit_epoch != epoch {
                return Ok(SubmitOutcome::Cancelled);
            }
            transition_submit_state(&mut state, SubmitState::Failed)?;
            state.touch_revision();
            collect_errors(&state.field_meta)
        };
        tracing::debug!(error_count = errors.len(), "submit rejected by validation");
        on_invalid(errors);
        Ok(SubmitOutcome::Invalid)
    }

    fn complete_submit(
        &self,
        epoch: u64,
        submit_result: FormResult<()>,
    ) -> FormResult<SubmitOutcome> {
        match submit_result {
            Ok(()) => {
                self.finish_submit(epoch, SubmitState::Succeeded)?;
                Ok(SubmitOutcome::Submitted)
            }
            Err(error) => {
                self.finish_submit(epoch, SubmitState::Failed)?;
                Err(error)
            }
        }
    }

    fn finish_submit(&self, epoch: u64, next: SubmitState) -> FormResult<()> {
        let mut state = write_lock(&self.state, "completing submit")?;
        if state.submit_epoch != epoch {
            return Ok(());
        }
        transition_submit_state(&mut state, next)?;
        state.touch_revision();
        tracing::debug!(form_id = %state.id, state = ?next, "submit finished");
        Ok(())
    }

    /// Restores the initial model and clears dirty, submitted, error and
    /// in-flight validation state.
    pub fn reset_to_initial(&self) -> FormResult<()> {
        {
            let mut state = write_lock(&self.state, "resetting form")?;
            state.model = state.initial_model.clone();
            state.submit_state = SubmitState::Idle;
            state.submit_count = 0;
            state.submit_epoch = state.submit_epoch.wrapping_add(1);
            state.dirty_fields.clear();
            state.first_error = None;
            let keys = state
                .tickets
                .keys()
                .copied()
                .collect::<Vec<FieldKey>>();
            for key in keys {
                state.bump_ticket(key);
            }
            for meta in state.field_meta.values_mut() {
                meta.dirty = false;
                meta.touched = false;
                meta.validating = false;
                meta.unverified = false;
                meta.errors.clear();
            }
            state.record_edit();
            tracing::debug!(form_id = %state.id, "form reset");
        }
        self.notify_all_watchers()
    }

    pub fn reset_field<L>(&self, lens: L) -> FormResult<()>
    where
        L: FieldLens<T>,
    {
        let key = lens.key();
        {
            let mut state = write_lock(&self.state, "resetting field")?;
            let initial_value = lens.get(&state.initial_model).clone();
            lens.set(&mut state.model, initial_value);
            state.dirty_fields.remove(&key);
            state.bump_ticket(key);
            let meta = state.ensure_meta(key);
            meta.dirty = false;
            meta.touched = false;
            meta.validating = false;
            meta.unverified = false;
            meta.errors.clear();
            state.first_error = first_error_key(&state.field_meta);
            state.record_edit();
        }
        self.notify_watchers(key)
    }

    pub fn clear_errors(&self) -> FormResult<()> {
        let mut state = write_lock(&self.state, "clearing all field errors")?;
        for meta in state.field_meta.values_mut() {
            meta.errors.clear();
            meta.validating = false;
        }
        state.first_error = None;
        state.touch_revision();
        Ok(())
    }

    pub fn clear_field_errors<L>(&self, lens: L) -> FormResult<()>
    where
        L: FieldLens<T>,
    {
        let key = lens.key();
        let mut state = write_lock(&self.state, "clearing field errors")?;
        if let Some(meta) = state.field_meta.get_mut(&key) {
            meta.errors.clear();
            meta.validating = false;
        }
        state.first_error = first_error_key(&state.field_meta);
        state.touch_revision();
        Ok(())
    }

    pub fn snapshot(&self) -> FormResult<FormSnapshot<T, E>> {
        let state = read_lock(&self.state, "creating form snapshot")?;
        let is_valid = state.field_meta.values().all(|meta| meta.errors.is_empty());
        Ok(FormSnapshot {
            model: state.model.clone(),
            submit_state: state.submit_state,
            submit_count: state.submit_count,
            is_dirty: !state.dirty_fields.is_empty(),
            is_valid,
            revision: state.revision,
            field_meta: state.field_meta.clone(),
        })
    }

    pub fn form_state(&self) -> FormResult<FormState> {
        Ok(self.snapshot()?.form_state())
    }

    /// First error of every field that failed its most recent validation.
    pub fn errors(&self) -> FormResult<FieldErrors<E>> {
        let state = read_lock(&self.state, "collecting field errors")?;
        Ok(collect_errors(&state.field_meta))
    }

    pub fn first_error(&self) -> FormResult<Option<FieldKey>> {
        Ok(read_lock(&self.state, "reading first error key")?.first_error)
    }

    pub fn field_meta<L>(&self, lens: L) -> FormResult<Option<FieldMeta<E>>>
    where
        L: FieldLens<T>,
    {
        Ok(read_lock(&self.state, "reading field meta")?
            .field_meta
            .get(&lens.key())
            .cloned())
    }

    pub fn field_label<L>(&self, lens: L) -> FormResult<Option<String>>
    where
        L: FieldLens<T>,
    {
        Ok(read_lock(&self.field_labels, "reading field label")?
            .get(&lens.key())
            .cloned())
    }

    pub fn is_required<L>(&self, lens: L) -> FormResult<bool>
    where
        L: FieldLens<T>,
    {
        Ok(read_lock(&self.required_fields, "reading required fields")?.contains(&lens.key()))
    }

    pub fn is_enabled<L>(&self, lens: L) -> FormResult<bool>
    where
        L: FieldLens<T>,
    {
        let model = read_lock(&self.state, "reading model for enablement")?
            .model
            .clone();
        self.is_enabled_by_key(lens.key(), &model)
    }

    pub(super) fn is_enabled_by_key(&self, key: FieldKey, model: &T) -> FormResult<bool> {
        let enablement = read_lock(&self.enablement, "reading field enablement")?;
        Ok(enablement
            .iter()
            .filter(|(scope, _)| scope.contains(&key))
            .all(|(_, predicate)| predicate(model)))
    }

    /// Drops errors and in-flight async checks of fields whose enablement
    /// predicate no longer holds.
    pub(super) fn clear_disabled_fields(&self) -> FormResult<()> {
        let model = self.values()?;
        let disabled_scopes = read_lock(&self.enablement, "reading disabled scopes")?
            .iter()
            .filter(|(_, predicate)| !predicate(&model))
            .map(|(scope, _)| *scope)
            .collect::<Vec<FieldKey>>();
        if disabled_scopes.is_empty() {
            return Ok(());
        }

        let mut state = write_lock(&self.state, "clearing disabled field state")?;
        let stale = state
            .field_meta
            .iter()
            .filter(|(key, meta)| {
                (!meta.errors.is_empty() || meta.validating)
                    && disabled_scopes.iter().any(|scope| scope.contains(key))
            })
            .map(|(key, _)| *key)
            .collect::<Vec<FieldKey>>();
        if stale.is_empty() {
            return Ok(());
        }
        for key in stale {
            state.bump_ticket(key);
            let meta = state.ensure_meta(key);
            meta.errors.clear();
            meta.validating = false;
        }
        state.first_error = first_error_key(&state.field_meta);
        state.touch_revision();
        Ok(())
    }

    pub(super) fn validates_on(&self, trigger: Trigger, submitted: bool) -> bool {
        if submitted {
            self.options.revalidate_mode.fires_on(trigger)
        } else {
            self.options.validate_mode.fires_on(trigger)
        }
    }

    pub(super) fn notify_watchers(&self, changed: FieldKey) -> FormResult<()> {
        let callbacks = read_lock(&self.watchers, "reading watchers")?
            .values()
            .filter(|(key, _)| key.contains(&changed) || changed.contains(key))
            .map(|(_, callback)| callback.clone())
            .collect::<Vec<_>>();
        if callbacks.is_empty() {
            return Ok(());
        }
        let model = self.values()?;
        for callback in callbacks {
            callback(&model);
        }
        Ok(())
    }

    fn notify_all_watchers(&self) -> FormResult<()> {
        let callbacks = read_lock(&self.watchers, "reading watchers for reset")?
            .values()
            .map(|(_, callback)| callback.clone())
            .collect::<Vec<_>>();
        let model = self.values()?;
        for callback in callbacks {
            callback(&model);
        }
        Ok(())
    }
}

pub(super) fn transition_submit_state<T, E>(
    state: &mut FormStore<T, E>,
    next: SubmitState,
) -> FormResult<()> {
    let current = state.submit_state;
    if current == next {
        return Ok(());
    }

    let allowed = matches!(
        (current, next),
        (SubmitState::Idle, SubmitState::Validating)
            | (SubmitState::Validating, SubmitState::Submitting)
            | (SubmitState::Validating, SubmitState::Failed)
            | (SubmitState::Submitting, SubmitState::Succeeded)
            | (SubmitState::Submitting, SubmitState::Failed)
            | (SubmitState::Succeeded, SubmitState::Validating)
            | (SubmitState::Failed, SubmitState::Validating)
            | (_, SubmitState::Idle)
    );
    if !allowed {
        return Err(FormError::InvalidStateTransition {
            from: current,
            to: next,
        });
    }
    state.submit_state = next;
    Ok(())
}

fn collect_errors<E: Clone>(field_meta: &BTreeMap<FieldKey, FieldMeta<E>>) -> FieldErrors<E> {
    field_meta
        .iter()
        .filter_map(|(key, meta)| meta.errors.first().map(|error| (*key, error.clone())))
        .collect()
}

pub(super) fn first_error_key<E>(
    field_meta: &BTreeMap<FieldKey, FieldMeta<E>>,
) -> Option<FieldKey> {
    field_meta
        .iter()
        .find_map(|(key, meta)| (!meta.errors.is_empty()).then_some(*key))
}

pub(super) fn read_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockReadGuard<'a, T>> {
    lock.read().map_err(|_| FormError::StatePoisoned(context))
}

pub(super) fn write_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockWriteGuard<'a, T>> {
    lock.write().map_err(|_| FormError::StatePoisoned(context))
}
