use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

use super::domain::OfficeId;
use super::repository::RepositoryError;

/// Header carrying the authenticated user id, set by the fronting auth proxy.
pub const USER_ID_HEADER: &str = "x-insurepath-uid";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    Hr,
    Employee,
}

impl UserRole {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Hr => "hr",
            Self::Employee => "employee",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub uid: String,
    pub display_name: String,
    pub role: UserRole,
    #[serde(default)]
    pub office_id: Option<OfficeId>,
}

/// Lookup of user profiles by id.
pub trait ProfileDirectory: Send + Sync {
    fn profile(&self, uid: &str) -> Result<Option<UserProfile>, RepositoryError>;
    fn upsert_profile(&self, profile: UserProfile) -> Result<(), RepositoryError>;
}

/// Profile of the caller for the duration of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    profile: UserProfile,
}

impl SessionContext {
    pub fn new(profile: UserProfile) -> Self {
        Self { profile }
    }

    pub fn from_headers(
        headers: &HeaderMap,
        directory: &dyn ProfileDirectory,
    ) -> Result<Self, SessionError> {
        let uid = headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(SessionError::MissingIdentity)?;

        let profile = directory
            .profile(uid)?
            .ok_or_else(|| SessionError::UnknownUser(uid.to_string()))?;
        Ok(Self::new(profile))
    }

    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    pub fn can_view(&self, office_id: &OfficeId) -> bool {
        match self.profile.role {
            UserRole::Admin => true,
            UserRole::Hr | UserRole::Employee => {
                self.profile.office_id.as_ref() == Some(office_id)
            }
        }
    }

    pub fn can_edit(&self, office_id: &OfficeId) -> bool {
        match self.profile.role {
            UserRole::Admin => true,
            UserRole::Hr => self.profile.office_id.as_ref() == Some(office_id),
            UserRole::Employee => false,
        }
    }

    pub fn require_view(&self, office_id: &OfficeId) -> Result<(), SessionError> {
        if self.can_view(office_id) {
            Ok(())
        } else {
            Err(SessionError::Forbidden(office_id.clone()))
        }
    }

    pub fn require_edit(&self, office_id: &OfficeId) -> Result<(), SessionError> {
        if self.can_edit(office_id) {
            Ok(())
        } else {
            Err(SessionError::Forbidden(office_id.clone()))
        }
    }

    /// Only platform administrators maintain the shared cloud catalog.
    pub fn require_admin(&self) -> Result<(), SessionError> {
        if self.profile.role == UserRole::Admin {
            Ok(())
        } else {
            Err(SessionError::AdminOnly)
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("request is missing the x-insurepath-uid header")]
    MissingIdentity,
    #[error("user '{0}' has no profile")]
    UnknownUser(String),
    #[error("not permitted for office '{0}'")]
    Forbidden(OfficeId),
    #[error("administrator role required")]
    AdminOnly,
    #[error(transparent)]
    Directory(#[from] RepositoryError),
}
