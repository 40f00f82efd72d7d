use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::{RegistrationError, TransportError};
use super::fields::{RegistrationValues, lens};
use crate::config::{LookupConfig, LookupFailurePolicy};
use crate::form::{AsyncFieldValidator, BoxedValidationFuture};

pub type LookupFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<UserRecord>, TransportError>> + Send + 'a>>;

/// A user known to the directory. Only the length of a lookup result
/// matters to the form; the fields are kept for logging.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

/// Finds users registered under an email address.
pub trait UserLookup: Send + Sync {
    fn find_by_email<'a>(&'a self, email: &'a str) -> LookupFuture<'a>;
}

/// Queries `GET {base_url}/users?email=<email>`, expecting a JSON array.
#[derive(Clone, Debug)]
pub struct HttpUserLookup {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpUserLookup {
    pub fn new(config: &LookupConfig) -> Result<Self, TransportError> {
        let timeout = config.timeout();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| TransportError::Request(error.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/users", config.base_url.trim_end_matches('/')),
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn fetch(&self, email: &str) -> Result<Vec<UserRecord>, TransportError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("email", email)])
            .send()
            .await
            .map_err(|error| self.map_error(error))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        response
            .json::<Vec<UserRecord>>()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    TransportError::Timeout(self.timeout)
                } else {
                    TransportError::Decode(error.to_string())
                }
            })
    }

    fn map_error(&self, error: reqwest::Error) -> TransportError {
        if error.is_timeout() {
            TransportError::Timeout(self.timeout)
        } else {
            TransportError::Request(error.to_string())
        }
    }
}

impl UserLookup for HttpUserLookup {
    fn find_by_email<'a>(&'a self, email: &'a str) -> LookupFuture<'a> {
        Box::pin(self.fetch(email))
    }
}

/// In-memory directory, for offline use and tests.
#[derive(Clone, Debug, Default)]
pub struct StaticUserLookup {
    emails: BTreeSet<String>,
}

impl StaticUserLookup {
    pub fn new<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            emails: emails.into_iter().map(Into::into).collect(),
        }
    }
}

impl UserLookup for StaticUserLookup {
    fn find_by_email<'a>(&'a self, email: &'a str) -> LookupFuture<'a> {
        let records = self
            .emails
            .get(email)
            .map(|email| UserRecord {
                email: Some(email.clone()),
                ..UserRecord::default()
            })
            .into_iter()
            .collect();
        Box::pin(async move { Ok(records) })
    }
}

/// Async email check: passes when the lookup finds nobody.
#[derive(Clone)]
pub struct EmailNotRegistered {
    lookup: Arc<dyn UserLookup>,
    on_failure: LookupFailurePolicy,
}

impl EmailNotRegistered {
    pub fn new(lookup: Arc<dyn UserLookup>, on_failure: LookupFailurePolicy) -> Self {
        Self { lookup, on_failure }
    }

    pub async fn check(&self, email: &str) -> Result<(), RegistrationError> {
        match self.lookup.find_by_email(email).await {
            Ok(users) if users.is_empty() => {
                tracing::debug!(email, "email is available");
                Ok(())
            }
            Ok(users) => {
                tracing::debug!(email, matches = users.len(), "email already registered");
                Err(RegistrationError::AlreadyRegistered)
            }
            Err(error) => match self.on_failure {
                LookupFailurePolicy::FailClosed => {
                    tracing::warn!(email, %error, "user lookup failed, rejecting email");
                    Err(RegistrationError::Transport(error))
                }
                LookupFailurePolicy::FailOpen => {
                    tracing::warn!(email, %error, "user lookup failed, accepting email");
                    Ok(())
                }
            },
        }
    }
}

impl AsyncFieldValidator<RegistrationValues, lens::Email, RegistrationError>
    for EmailNotRegistered
{
    type Fut<'a>
        = BoxedValidationFuture<'a, RegistrationError>
    where
        Self: 'a;

    fn validate<'a>(&'a self, _model: &'a RegistrationValues, value: &'a String) -> Self::Fut<'a> {
        Box::pin(self.check(value))
    }
}
