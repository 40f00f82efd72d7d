use std::sync::atomic::{AtomicU64, Ordering};

use super::controller::{FieldKey, FormController, FormResult, read_lock};
use super::validation::{FieldLens, ValidationError};

/// Everything a rendering layer needs to draw one input.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldView<V> {
    pub key: FieldKey,
    pub label: Option<String>,
    pub value: V,
    pub error: Option<String>,
    pub required: bool,
    pub disabled: bool,
    pub dirty: bool,
    pub touched: bool,
    pub validating: bool,
    /// Edited since its async validators last completed, so only the sync
    /// rules have seen the current value.
    pub unverified: bool,
}

impl<T, E> FormController<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: ValidationError,
{
    pub fn field_error_for_display<L>(&self, lens: L) -> FormResult<Option<String>>
    where
        L: FieldLens<T>,
    {
        self.display_error_message(lens.key())
    }

    pub fn field_view<L>(&self, lens: L) -> FormResult<FieldView<L::Value>>
    where
        L: FieldLens<T>,
    {
        let key = lens.key();
        let (value, meta, model) = {
            let state = read_lock(&self.state, "reading field for view")?;
            (
                lens.get(&state.model).clone(),
                state.field_meta.get(&key).cloned().unwrap_or_default(),
                state.model.clone(),
            )
        };
        let disabled = !self.is_enabled_by_key(key, &model)?;
        let required = !disabled
            && read_lock(&self.required_fields, "reading required fields for view")?
                .contains(&key);
        let label = read_lock(&self.field_labels, "reading field label for view")?
            .get(&key)
            .cloned();

        Ok(FieldView {
            key,
            label,
            value,
            error: self.display_error_message(key)?,
            required,
            disabled,
            dirty: meta.dirty,
            touched: meta.touched,
            validating: meta.validating,
            unverified: meta.unverified,
        })
    }

    fn display_error_message(&self, key: FieldKey) -> FormResult<Option<String>> {
        let state = read_lock(&self.state, "reading display error message")?;
        let Some(meta) = state.field_meta.get(&key) else {
            return Ok(None);
        };
        if !meta.touched && state.submit_count == 0 {
            return Ok(None);
        }
        Ok(meta.errors.first().map(ValidationError::message))
    }
}

/// Counts produced views and remembers the form revision each was built
/// from, so repeated renders of an unchanged form are visible.
#[derive(Debug, Default)]
pub struct RenderCounter {
    renders: AtomicU64,
    redundant: AtomicU64,
    last_revision: AtomicU64,
}

impl RenderCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a render of `revision` and returns the total render count.
    pub fn record(&self, revision: u64) -> u64 {
        let renders = self.renders.fetch_add(1, Ordering::SeqCst) + 1;
        let previous = self.last_revision.swap(revision, Ordering::SeqCst);
        if renders > 1 && previous == revision {
            self.redundant.fetch_add(1, Ordering::SeqCst);
        }
        tracing::trace!(renders, revision, "form rendered");
        renders
    }

    pub fn renders(&self) -> u64 {
        self.renders.load(Ordering::SeqCst)
    }

    /// Renders that saw the same revision as the render before them.
    pub fn redundant_renders(&self) -> u64 {
        self.redundant.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.renders.store(0, Ordering::SeqCst);
        self.redundant.store(0, Ordering::SeqCst);
        self.last_revision.store(0, Ordering::SeqCst);
    }
}
