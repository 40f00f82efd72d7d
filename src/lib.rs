pub mod config;
pub mod form;
pub mod registration;

pub use config::{ConfigError, LookupConfig, LookupFailurePolicy, RegistrationConfig};
pub use form::{
    FieldErrors, FieldKey, FieldLens, FieldView, FormController, FormError, FormModel,
    FormOptions, FormResult, FormState, SubmitOutcome, SubmitState, ValidationError,
};
pub use registration::{
    FormEvent, HttpUserLookup, RegistrationError, RegistrationField, RegistrationForm,
    RegistrationValues, RegistrationView, StaticUserLookup, UserLookup,
};
