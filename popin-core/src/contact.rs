//! Contact details supplied at registration time.

use thiserror::Error;

const MIN_EMAIL_LEN: usize = 5;
const MIN_MOBILE_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContactError {
    #[error("invalid email address: {0}")]
    InvalidEmail(String),
    #[error("invalid mobile number: {0}")]
    InvalidMobile(String),
}

/// An email address or mobile number. Anything containing `@` is treated as
/// an email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactInfo {
    Email(String),
    Mobile(String),
}

impl ContactInfo {
    pub fn parse(raw: &str) -> Result<Self, ContactError> {
        let raw = raw.trim();
        if raw.contains('@') {
            if !raw.contains('.') || raw.chars().count() < MIN_EMAIL_LEN {
                return Err(ContactError::InvalidEmail(raw.to_string()));
            }
            Ok(Self::Email(raw.to_string()))
        } else {
            if raw.chars().count() < MIN_MOBILE_LEN {
                return Err(ContactError::InvalidMobile(raw.to_string()));
            }
            Ok(Self::Mobile(raw.to_string()))
        }
    }

    pub fn is_mobile(&self) -> bool {
        matches!(self, Self::Mobile(_))
    }

    /// Form field name the server expects for this contact kind.
    pub fn field_name(&self) -> &'static str {
        match self {
            Self::Email(_) => "email",
            Self::Mobile(_) => "mobile",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Self::Email(v) | Self::Mobile(v) => v,
        }
    }
}

impl std::str::FromStr for ContactInfo {
    type Err = ContactError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
