//! The registration form: six inputs, sync rules, an async email uniqueness
//! check, conditional social links and a dirty-gated submit.

mod errors;
mod fields;
mod lookup;

use std::future::Future;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use strum::IntoEnumIterator;

pub use errors::{ErrorKind, RegistrationError, SetupError, TransportError};
pub use fields::{RegistrationField, RegistrationValues, SocialLinks, lens};
pub use lookup::{
    EmailNotRegistered, HttpUserLookup, LookupFuture, StaticUserLookup, UserLookup, UserRecord,
};

use crate::config::RegistrationConfig;
use crate::form::{
    FieldErrors, FieldView, FormController, FormError, FormOptions, FormResult, FormState,
    RenderCounter, RevalidateMode, SubmitOutcome, ValidationMode, rules,
};
use fields::with_lens;

pub const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$";

static EMAIL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(EMAIL_PATTERN).expect("email pattern is a valid regex"));

pub type RegistrationController = FormController<RegistrationValues, RegistrationError>;

/// Input forwarded from a rendering layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FormEvent {
    InputChanged {
        field: RegistrationField,
        value: String,
    },
    Blurred {
        field: RegistrationField,
    },
    SubmitRequested,
    ResetRequested,
}

/// What a rendering layer draws for one frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistrationView {
    pub fields: Vec<FieldView<String>>,
    pub submit_enabled: bool,
    pub render_count: u64,
    pub revision: u64,
}

impl RegistrationView {
    pub fn field(&self, field: RegistrationField) -> Option<&FieldView<String>> {
        self.fields.iter().find(|view| view.key == field.key())
    }
}

pub fn registration_options() -> FormOptions {
    FormOptions {
        validate_mode: ValidationMode::OnSubmit,
        revalidate_mode: RevalidateMode::OnChange,
        validate_first_error_only: true,
        submit_requires_dirty: true,
    }
}

#[derive(Clone)]
pub struct RegistrationForm {
    controller: RegistrationController,
    config: RegistrationConfig,
    renders: Arc<RenderCounter>,
}

impl RegistrationForm {
    pub fn new(config: RegistrationConfig, lookup: Arc<dyn UserLookup>) -> FormResult<Self> {
        let initial = RegistrationValues::with_username(config.default_username.clone());
        let controller = FormController::new(initial, registration_options());

        for field in RegistrationField::iter() {
            with_lens!(field, |lens| {
                controller.register_field_label(lens, field.label())?;
                controller.register_required_field(lens)?;
                controller.register_field_validator(
                    lens,
                    rules::required::<RegistrationValues, _>(RegistrationError::Required(
                        field.label(),
                    )),
                )?;
            });
        }

        controller.register_field_validator(
            lens::email(),
            rules::pattern::<RegistrationValues, _>(
                EMAIL_REGEX.clone(),
                RegistrationError::InvalidEmail,
            ),
        )?;
        controller.register_async_field_validator_with_timeout(
            lens::email(),
            config.lookup.debounce_ms,
            config.lookup.timeout(),
            EmailNotRegistered::new(lookup, config.lookup.on_failure),
        )?;

        let min = config.password_min_length;
        controller.register_field_validator(
            lens::password(),
            rules::min_length::<RegistrationValues, _>(
                min,
                RegistrationError::PasswordTooShort(min),
            ),
        )?;

        controller.register_field_validator(
            lens::confirm_password(),
            rules::equals_field::<RegistrationValues, _, _>(
                lens::password(),
                RegistrationError::PasswordMismatch,
            ),
        )?;
        controller.register_dependency(lens::password(), lens::confirm_password())?;

        controller.register_enabled_when(lens::social(), |values: &RegistrationValues| {
            !values.email.is_empty()
        })?;
        controller.register_dependency(lens::email(), lens::twitter())?;
        controller.register_dependency(lens::email(), lens::facebook())?;

        tracing::debug!(
            form_id = %controller.form_id()?,
            lookup_timeout_ms = config.lookup.timeout_ms,
            on_failure = ?config.lookup.on_failure,
            "registration form ready"
        );

        Ok(Self {
            controller,
            config,
            renders: Arc::new(RenderCounter::new()),
        })
    }

    /// Builds the form against the HTTP user directory named in `config`.
    pub fn connect(config: RegistrationConfig) -> Result<Self, SetupError> {
        let lookup = HttpUserLookup::new(&config.lookup)?;
        Ok(Self::new(config, Arc::new(lookup))?)
    }

    pub fn config(&self) -> &RegistrationConfig {
        &self.config
    }

    pub fn controller(&self) -> &RegistrationController {
        &self.controller
    }

    pub fn get_value(&self, path: &str) -> FormResult<String> {
        let field = RegistrationField::parse(path)?;
        with_lens!(field, |lens| self.controller.get(lens))
    }

    /// Writes a field by path. Disabled fields reject edits.
    ///
    /// Only sync rules run here. Editing `email` drops any earlier lookup
    /// error and marks the field `unverified` in its view until
    /// [`Self::set_value_async`] or a submit checks the new address.
    pub fn set_value(&self, path: &str, value: impl Into<String>) -> FormResult<()> {
        let field = self.editable_field(path)?;
        let value = value.into();
        with_lens!(field, |lens| self.controller.set(lens, value))
    }

    /// [`Self::set_value`], then the email lookup if the mode validates on
    /// change.
    pub async fn set_value_async(&self, path: &str, value: impl Into<String>) -> FormResult<()> {
        let field = self.editable_field(path)?;
        let value = value.into();
        with_lens!(field, |lens| self.controller.set_async(lens, value).await)
    }

    pub fn touch(&self, path: &str) -> FormResult<()> {
        let field = RegistrationField::parse(path)?;
        with_lens!(field, |lens| self.controller.touch(lens))
    }

    pub async fn touch_async(&self, path: &str) -> FormResult<()> {
        let field = RegistrationField::parse(path)?;
        with_lens!(field, |lens| self.controller.touch_async(lens).await)
    }

    pub fn is_field_enabled(&self, path: &str) -> FormResult<bool> {
        let field = RegistrationField::parse(path)?;
        with_lens!(field, |lens| self.controller.is_enabled(lens))
    }

    /// Current error message of a field, whether or not it is displayed yet.
    pub fn error_message(&self, path: &str) -> FormResult<Option<String>> {
        let field = RegistrationField::parse(path)?;
        Ok(self.controller.errors()?.message(field.path()))
    }

    pub fn values(&self) -> FormResult<RegistrationValues> {
        self.controller.values()
    }

    pub fn form_state(&self) -> FormResult<FormState> {
        self.controller.form_state()
    }

    pub fn errors(&self) -> FormResult<FieldErrors<RegistrationError>> {
        self.controller.errors()
    }

    pub fn can_submit(&self) -> FormResult<bool> {
        self.controller.can_submit()
    }

    pub fn reset(&self) -> FormResult<()> {
        self.controller.reset_to_initial()
    }

    /// Validates everything, including the email lookup, and hands the
    /// values to `on_valid` or the errors to `on_invalid`.
    pub async fn submit<V, Fut>(
        &self,
        on_valid: V,
        on_invalid: impl FnOnce(FieldErrors<RegistrationError>),
    ) -> FormResult<SubmitOutcome>
    where
        V: FnOnce(RegistrationValues) -> Fut,
        Fut: Future<Output = FormResult<()>>,
    {
        self.controller.submit_async(on_valid, on_invalid).await
    }

    /// Submits with handlers that only log: the values with passwords
    /// masked, or the nested error object.
    pub async fn submit_and_log(&self) -> FormResult<SubmitOutcome> {
        self.submit(
            |values: RegistrationValues| async move {
                match serde_json::to_string(&values.redacted()) {
                    Ok(json) => tracing::info!(values = %json, "registration submitted"),
                    Err(error) => {
                        tracing::warn!(%error, "registration submitted, values not serializable")
                    }
                }
                Ok::<(), FormError>(())
            },
            |errors: FieldErrors<RegistrationError>| {
                tracing::info!(
                    error_count = errors.len(),
                    errors = %errors.to_json(),
                    "registration rejected"
                );
            },
        )
        .await
    }

    pub fn field_view(&self, field: RegistrationField) -> FormResult<FieldView<String>> {
        with_lens!(field, |lens| self.controller.field_view(lens))
    }

    /// Produces the view of every input and counts the render.
    pub fn render(&self) -> FormResult<RegistrationView> {
        let revision = self.controller.revision()?;
        let fields = RegistrationField::iter()
            .map(|field| self.field_view(field))
            .collect::<FormResult<Vec<_>>>()?;
        let submit_enabled = self.can_submit()?;
        let render_count = self.renders.record(revision);
        Ok(RegistrationView {
            fields,
            submit_enabled,
            render_count,
            revision,
        })
    }

    pub fn render_count(&self) -> u64 {
        self.renders.renders()
    }

    pub fn redundant_renders(&self) -> u64 {
        self.renders.redundant_renders()
    }

    /// Applies one presentation event. Returns the outcome for
    /// [`FormEvent::SubmitRequested`].
    pub async fn dispatch(&self, event: FormEvent) -> FormResult<Option<SubmitOutcome>> {
        match event {
            FormEvent::InputChanged { field, value } => {
                self.set_value_async(field.path(), value).await?;
                Ok(None)
            }
            FormEvent::Blurred { field } => {
                self.touch_async(field.path()).await?;
                Ok(None)
            }
            FormEvent::SubmitRequested => self.submit_and_log().await.map(Some),
            FormEvent::ResetRequested => {
                self.reset()?;
                Ok(None)
            }
        }
    }

    fn editable_field(&self, path: &str) -> FormResult<RegistrationField> {
        let field = RegistrationField::parse(path)?;
        let enabled = with_lens!(field, |lens| self.controller.is_enabled(lens))?;
        if enabled {
            Ok(field)
        } else {
            Err(FormError::FieldDisabled(path.to_string()))
        }
    }
}
