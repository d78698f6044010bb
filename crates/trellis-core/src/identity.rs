//! Caller identity and authenticated contexts.
//!
//! Contexts that know who is calling implement [`CallerContext`]. The
//! authentication stage reads it and, when a user is present, replaces the
//! context with an [`Authenticated`] wrapper whose user is no longer optional.

use serde::{Deserialize, Serialize};
use std::ops::Deref;

/// The identity of whoever invoked a procedure.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallerIdentity {
    /// No credentials were presented.
    #[default]
    Anonymous,
    /// An end user.
    User(UserIdentity),
    /// An external integration holding an API key.
    ApiKey(ApiKeyIdentity),
    /// Another service, identified by its SPIFFE ID.
    Service(ServiceIdentity),
}

/// An authenticated end user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// Stable user identifier.
    pub id: String,
    /// Email address, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Roles granted to the user.
    #[serde(default)]
    pub roles: Vec<String>,
}

impl UserIdentity {
    /// Creates a user with no email and no roles.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
            roles: Vec::new(),
        }
    }

    /// Adds a role.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    /// Sets the email address.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Returns true if the user holds `role`.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// An API key holder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyIdentity {
    /// Key identifier (never the secret).
    pub key_id: String,
    /// Scopes granted to the key.
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// A workload identified by SPIFFE ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceIdentity {
    /// The SPIFFE ID, e.g. `spiffe://example.org/billing`.
    pub spiffe_id: String,
}

impl CallerIdentity {
    /// Creates a user identity.
    pub fn user(id: impl Into<String>) -> Self {
        Self::User(UserIdentity::new(id))
    }

    /// Returns the user, if this caller is one.
    #[must_use]
    pub const fn as_user(&self) -> Option<&UserIdentity> {
        match self {
            Self::User(user) => Some(user),
            _ => None,
        }
    }

    /// Returns true when no credentials were presented.
    #[must_use]
    pub const fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }

    /// Returns an identifier suitable for logs. Never contains secrets.
    #[must_use]
    pub fn log_id(&self) -> String {
        match self {
            Self::Anonymous => "anonymous".to_string(),
            Self::User(user) => format!("user:{}", user.id),
            Self::ApiKey(key) => format!("apikey:{}", key.key_id),
            Self::Service(service) => service.spiffe_id.clone(),
        }
    }
}

/// A context that knows who is calling.
pub trait CallerContext {
    /// Returns the caller.
    fn caller(&self) -> &CallerIdentity;

    /// Returns the caller's user identity, if the caller is a user.
    fn user(&self) -> Option<&UserIdentity> {
        self.caller().as_user()
    }
}

impl CallerContext for CallerIdentity {
    fn caller(&self) -> &CallerIdentity {
        self
    }
}

/// A context narrowed to callers that are known users.
///
/// Dereferences to the wrapped context.
#[derive(Debug, Clone, PartialEq)]
pub struct Authenticated<C> {
    user: UserIdentity,
    inner: C,
}

impl<C> Authenticated<C> {
    /// Wraps `inner` together with its authenticated user.
    pub const fn new(user: UserIdentity, inner: C) -> Self {
        Self { user, inner }
    }

    /// Returns the authenticated user.
    pub const fn user(&self) -> &UserIdentity {
        &self.user
    }

    /// Returns the wrapped context.
    pub const fn inner(&self) -> &C {
        &self.inner
    }

    /// Unwraps into the user and the original context.
    pub fn into_parts(self) -> (UserIdentity, C) {
        (self.user, self.inner)
    }
}

impl<C> Deref for Authenticated<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.inner
    }
}
