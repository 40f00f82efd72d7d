use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::form::{FieldKey, FieldLens, FormError, FormModel, FormResult, NestedLens};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FormModel)]
#[serde(rename_all = "camelCase")]
#[form(rename_all = "camelCase")]
pub struct SocialLinks {
    pub twitter: String,
    pub facebook: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FormModel)]
#[serde(rename_all = "camelCase")]
#[form(rename_all = "camelCase")]
pub struct RegistrationValues {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub social: SocialLinks,
}

impl RegistrationValues {
    pub fn with_username(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Self::default()
        }
    }

    /// Copy safe to log: both passwords are masked.
    pub fn redacted(&self) -> Self {
        Self {
            password: mask(&self.password),
            confirm_password: mask(&self.confirm_password),
            ..self.clone()
        }
    }
}

fn mask(value: &str) -> String {
    if value.is_empty() {
        String::new()
    } else {
        "***".to_string()
    }
}

/// Lenses over [`RegistrationValues`], one per input.
pub mod lens {
    use super::*;

    pub type Username = RegistrationValuesUsernameLens;
    pub type Email = RegistrationValuesEmailLens;
    pub type Password = RegistrationValuesPasswordLens;
    pub type ConfirmPassword = RegistrationValuesConfirmPasswordLens;
    pub type Social = RegistrationValuesSocialLens;
    pub type Twitter = NestedLens<Social, SocialLinksTwitterLens>;
    pub type Facebook = NestedLens<Social, SocialLinksFacebookLens>;

    pub const fn username() -> Username {
        RegistrationValuesUsernameLens
    }

    pub const fn email() -> Email {
        RegistrationValuesEmailLens
    }

    pub const fn password() -> Password {
        RegistrationValuesPasswordLens
    }

    pub const fn confirm_password() -> ConfirmPassword {
        RegistrationValuesConfirmPasswordLens
    }

    pub const fn social() -> Social {
        RegistrationValuesSocialLens
    }

    pub const fn twitter() -> Twitter {
        NestedLens::new(RegistrationValuesSocialLens, SocialLinksTwitterLens)
    }

    pub const fn facebook() -> Facebook {
        NestedLens::new(RegistrationValuesSocialLens, SocialLinksFacebookLens)
    }
}

/// The six inputs of the form, addressed by their dotted path.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Display, AsRefStr, EnumString, EnumIter,
)]
pub enum RegistrationField {
    #[strum(serialize = "username")]
    Username,
    #[strum(serialize = "email")]
    Email,
    #[strum(serialize = "password")]
    Password,
    #[strum(serialize = "confirmPassword")]
    ConfirmPassword,
    #[strum(serialize = "social.twitter")]
    Twitter,
    #[strum(serialize = "social.facebook")]
    Facebook,
}

/// Runs `$body` with `$lens` bound to the lens of `$field`.
macro_rules! with_lens {
    ($field:expr, |$lens:ident| $body:expr) => {
        match $field {
            $crate::registration::RegistrationField::Username => {
                let $lens = $crate::registration::lens::username();
                $body
            }
            $crate::registration::RegistrationField::Email => {
                let $lens = $crate::registration::lens::email();
                $body
            }
            $crate::registration::RegistrationField::Password => {
                let $lens = $crate::registration::lens::password();
                $body
            }
            $crate::registration::RegistrationField::ConfirmPassword => {
                let $lens = $crate::registration::lens::confirm_password();
                $body
            }
            $crate::registration::RegistrationField::Twitter => {
                let $lens = $crate::registration::lens::twitter();
                $body
            }
            $crate::registration::RegistrationField::Facebook => {
                let $lens = $crate::registration::lens::facebook();
                $body
            }
        }
    };
}
pub(crate) use with_lens;

impl RegistrationField {
    pub fn parse(path: &str) -> FormResult<Self> {
        Self::from_str(path).map_err(|_| FormError::UnknownField(path.to_string()))
    }

    pub fn path(self) -> &'static str {
        match self {
            RegistrationField::Username => "username",
            RegistrationField::Email => "email",
            RegistrationField::Password => "password",
            RegistrationField::ConfirmPassword => "confirmPassword",
            RegistrationField::Twitter => "social.twitter",
            RegistrationField::Facebook => "social.facebook",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RegistrationField::Username => "Username",
            RegistrationField::Email => "Email",
            RegistrationField::Password => "Password",
            RegistrationField::ConfirmPassword => "Confirm Password",
            RegistrationField::Twitter => "Twitter",
            RegistrationField::Facebook => "Facebook",
        }
    }

    pub fn key(self) -> FieldKey {
        with_lens!(self, |lens| lens.key())
    }

    pub fn value(self, values: &RegistrationValues) -> &str {
        with_lens!(self, |lens| lens.get(values).as_str())
    }
}
