//! Validator constructors for text fields.
//!
//! Each function returns a closure usable with
//! [`FormController::register_field_validator`](super::FormController::register_field_validator).
//! `pattern` and `min_length` pass on an empty value so that a missing value
//! only reports the `required` error.

use regex::Regex;

use super::validation::{FieldLens, ValidationError};

pub fn required<T, E>(error: E) -> impl Fn(&T, &String) -> Result<(), E> + Send + Sync + 'static
where
    T: 'static,
    E: ValidationError,
{
    move |_model: &T, value: &String| {
        if value.is_empty() {
            Err(error.clone())
        } else {
            Ok(())
        }
    }
}

pub fn pattern<T, E>(
    regex: Regex,
    error: E,
) -> impl Fn(&T, &String) -> Result<(), E> + Send + Sync + 'static
where
    T: 'static,
    E: ValidationError,
{
    move |_model: &T, value: &String| {
        if value.is_empty() || regex.is_match(value) {
            Ok(())
        } else {
            Err(error.clone())
        }
    }
}

/// Counts characters, not bytes.
pub fn min_length<T, E>(
    min: usize,
    error: E,
) -> impl Fn(&T, &String) -> Result<(), E> + Send + Sync + 'static
where
    T: 'static,
    E: ValidationError,
{
    move |_model: &T, value: &String| {
        if value.is_empty() || value.chars().count() >= min {
            Ok(())
        } else {
            Err(error.clone())
        }
    }
}

/// Fails unless the value equals the current value of `other`. Pair with
/// [`FormController::register_dependency`](super::FormController::register_dependency)
/// so edits of `other` re-run it.
pub fn equals_field<T, L, E>(
    other: L,
    error: E,
) -> impl Fn(&T, &L::Value) -> Result<(), E> + Send + Sync + 'static
where
    T: 'static,
    L: FieldLens<T>,
    E: ValidationError,
{
    move |model: &T, value: &L::Value| {
        if other.get(model) == value {
            Ok(())
        } else {
            Err(error.clone())
        }
    }
}
