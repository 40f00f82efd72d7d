mod controller;
mod errors;
pub mod rules;
mod validation;
mod view;

#[cfg(test)]
mod tests;

pub use controller::{
    FieldKey, FieldMeta, FormController, FormError, FormId, FormOptions, FormResult, FormSnapshot,
    FormState, RevalidateMode, SubmitOutcome, SubmitState, ValidationMode, ValidationTicket,
    WatchId,
};
pub use errors::FieldErrors;
pub use regform_derive::FormModel;
pub use validation::{
    AsyncFieldValidator, BoxedValidationFuture, FieldLens, FieldValidator, FormModel,
    FormValidator, NestedLens, ValidationError, ValidationTimeout,
};
pub use view::{FieldView, RenderCounter};
