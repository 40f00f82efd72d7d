use std::time::Duration;

use thiserror::Error;

use crate::form::{FormError, ValidationError, ValidationTimeout};

/// The user lookup could not produce an answer.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum TransportError {
    #[error("user lookup request failed: {0}")]
    Request(String),
    #[error("user lookup returned HTTP {0}")]
    Status(u16),
    #[error("user lookup response could not be decoded: {0}")]
    Decode(String),
    #[error("user lookup timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// Correctable by editing the field.
    Validation,
    /// The check itself could not run; resubmitting may succeed.
    Transport,
}

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum RegistrationError {
    #[error("{0} is required")]
    Required(&'static str),
    #[error("Email is invalid")]
    InvalidEmail,
    #[error("Password should be atleast {0} characters long")]
    PasswordTooShort(usize),
    #[error("Passwords do not match")]
    PasswordMismatch,
    #[error("User is already registered")]
    AlreadyRegistered,
    #[error("Unable to verify email: {0}")]
    Transport(#[from] TransportError),
}

impl RegistrationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistrationError::Transport(_) => ErrorKind::Transport,
            _ => ErrorKind::Validation,
        }
    }
}

impl ValidationError for RegistrationError {
    fn message(&self) -> String {
        self.to_string()
    }

    fn code(&self) -> &'static str {
        match self {
            RegistrationError::Required(_) => "required",
            RegistrationError::InvalidEmail => "pattern",
            RegistrationError::PasswordTooShort(_) => "minLength",
            RegistrationError::PasswordMismatch | RegistrationError::AlreadyRegistered => {
                "validate"
            }
            RegistrationError::Transport(_) => "transport",
        }
    }
}

impl From<ValidationTimeout> for RegistrationError {
    fn from(timeout: ValidationTimeout) -> Self {
        RegistrationError::Transport(TransportError::Timeout(timeout.after))
    }
}

#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Form(#[from] FormError),
}
