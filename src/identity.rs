//! The authenticated principal and its construction.
//!
//! An `Identity` is fully formed or does not exist: there is no partially
//! authenticated state. A profile change produces a replacement `Identity`,
//! never a mutation of a shared one.

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::token::ClaimSet;

/// Transport-shaped payload returned by the login endpoint. Transient;
/// never persisted as-is. Fields are optional so a short response surfaces
/// as `InvalidCredentialResponse` instead of a deserialize failure.
#[derive(Debug, Clone, Deserialize)]
pub struct RawCredentialResponse {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// The identity's attribute record: the persisted snapshot shape and the
/// request body of profile-update calls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IdentityData {
    pub id: Option<i64>,
    pub user_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: String,
    pub organization: Option<String>,
    pub description: Option<String>,
    pub avatar: Option<String>,
    /// Primary token issued by the authenticating service.
    pub access_token: String,
    /// Secondary token embedded in the primary token's claims, used to
    /// authorize calls to other backend services.
    pub api_access_token: Option<String>,
    pub roles: Vec<String>,
}

/// The authenticated principal. Constructed once per successful login or
/// profile update and treated as immutable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    data: IdentityData,
}

impl Identity {
    /// Build an identity from a login response plus the claims decoded out
    /// of its access token.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidCredentialResponse` if the response carries no
    /// username or no access token.
    pub fn from_response(raw: RawCredentialResponse, claims: ClaimSet) -> Result<Self, Error> {
        let email = raw
            .username
            .filter(|u| !u.is_empty())
            .ok_or(Error::InvalidCredentialResponse("username"))?;
        let access_token = raw
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or(Error::InvalidCredentialResponse("access_token"))?;

        Ok(Self {
            data: IdentityData {
                id: claims.id,
                user_name: claims.user_name,
                first_name: claims.first_name,
                last_name: claims.last_name,
                email,
                organization: claims.organization,
                description: claims.description,
                avatar: claims.avatar,
                access_token,
                api_access_token: claims.access_token,
                roles: raw.roles,
            },
        })
    }

    /// Revalidate a stored or caller-assembled attribute record.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidCredentialResponse` if the record has an empty
    /// email or primary token.
    pub fn from_data(data: IdentityData) -> Result<Self, Error> {
        if data.email.is_empty() {
            return Err(Error::InvalidCredentialResponse("username"));
        }
        if data.access_token.is_empty() {
            return Err(Error::InvalidCredentialResponse("access_token"));
        }
        Ok(Self { data })
    }

    /// The full attribute record, used for persistence and as the
    /// profile-update request body.
    #[must_use]
    pub fn data(&self) -> &IdentityData {
        &self.data
    }

    #[must_use]
    pub fn email(&self) -> &str {
        &self.data.email
    }

    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.data.access_token
    }

    #[must_use]
    pub fn api_access_token(&self) -> Option<&str> {
        self.data.api_access_token.as_deref()
    }

    #[must_use]
    pub fn roles(&self) -> &[String] {
        &self.data.roles
    }
}
