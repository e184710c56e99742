//! Session domain types and the backend envelope.
//!
//! The backend wraps every auth reply as `{ status, data?, message? }`.
//! [`Envelope`] turns that duck-typed shape into a tagged result so the
//! controller only ever sees validated payloads.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::api::ApiError;

// =============================================================================
// ROLE
// =============================================================================

/// Account role. Both super-admin spellings exist in the wild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "superadmin")]
    Superadmin,
    #[serde(rename = "super-admin")]
    SuperAdmin,
    #[serde(rename = "manager")]
    Manager,
    #[serde(rename = "technician")]
    Technician,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Superadmin => "superadmin",
            Self::SuperAdmin => "super-admin",
            Self::Manager => "manager",
            Self::Technician => "technician",
        }
    }

    #[must_use]
    pub fn is_super_admin(self) -> bool {
        matches!(self, Self::Superadmin | Self::SuperAdmin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct RoleParseError(pub String);

impl FromStr for Role {
    type Err = RoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "superadmin" => Ok(Self::Superadmin),
            "super-admin" => Ok(Self::SuperAdmin),
            "manager" => Ok(Self::Manager),
            "technician" => Ok(Self::Technician),
            _ => Err(RoleParseError(s.to_owned())),
        }
    }
}

// =============================================================================
// USER
// =============================================================================

/// The authenticated user as the backend reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(rename = "lastLogin", default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<String>,
}

/// Partial user fields for a local merge. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(rename = "lastLogin", default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<String>,
}

impl UserPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

impl User {
    /// Return a copy of `self` with every field present in `patch` replaced.
    #[must_use]
    pub fn merged(&self, patch: &UserPatch) -> Self {
        Self {
            id: patch.id.clone().unwrap_or_else(|| self.id.clone()),
            name: patch.name.clone().unwrap_or_else(|| self.name.clone()),
            email: patch.email.clone().unwrap_or_else(|| self.email.clone()),
            role: patch.role.unwrap_or(self.role),
            last_login: patch.last_login.clone().or_else(|| self.last_login.clone()),
        }
    }
}

// =============================================================================
// CREDENTIALS
// =============================================================================

/// Login request body. Construct through [`Credentials::new`] so the email
/// is always normalized before submission.
#[derive(Clone, Serialize)]
pub struct Credentials {
    email: String,
    password: String,
    role: Role,
}

impl Credentials {
    #[must_use]
    pub fn new(email: &str, password: &str, role: Role) -> Self {
        Self { email: normalize_email(email), password: password.to_owned(), role }
    }

    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("role", &self.role)
            .finish()
    }
}

#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

// =============================================================================
// PAYLOADS
// =============================================================================

/// `data` of a successful verification reply.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VerifyData {
    pub user: User,
}

/// `data` of a login reply before validation. Either field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LoginData {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user: Option<User>,
}

/// A login reply that carries both a token and a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginGrant {
    pub token: String,
    pub user: User,
}

impl TryFrom<LoginData> for LoginGrant {
    type Error = ApiError;

    fn try_from(data: LoginData) -> Result<Self, Self::Error> {
        let token = data.token.filter(|t| !t.is_empty()).ok_or(ApiError::MissingField("token"))?;
        let user = data.user.ok_or(ApiError::MissingField("user"))?;
        Ok(Self { token, user })
    }
}

// =============================================================================
// ENVELOPE
// =============================================================================

pub const SUCCESS_STATUS: &str = "success";

#[derive(Deserialize)]
struct RawEnvelope {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

/// Tagged backend reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope<T> {
    Success(T),
    Failure { status: String, message: Option<String> },
}

impl<T: DeserializeOwned> Envelope<T> {
    /// Parse and validate a reply body.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Malformed`] if the body is not an envelope, or if
    /// it claims success without a `data` payload of the expected shape.
    pub fn parse(body: &str) -> Result<Self, ApiError> {
        let raw: RawEnvelope =
            serde_json::from_str(body).map_err(|e| ApiError::Malformed(format!("not an envelope: {e}")))?;

        if raw.status != SUCCESS_STATUS {
            return Ok(Self::Failure { status: raw.status, message: raw.message });
        }

        let data = raw
            .data
            .ok_or_else(|| ApiError::Malformed("success reply without data".into()))?;
        let payload = serde_json::from_value(data).map_err(|e| ApiError::Malformed(format!("bad data: {e}")))?;
        Ok(Self::Success(payload))
    }

    /// Collapse into a `Result`, turning a failure envelope into
    /// [`ApiError::Rejected`].
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Rejected`] for failure envelopes.
    pub fn into_result(self) -> Result<T, ApiError> {
        match self {
            Self::Success(payload) => Ok(payload),
            Self::Failure { status, message } => Err(ApiError::Rejected { status, message }),
        }
    }
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
