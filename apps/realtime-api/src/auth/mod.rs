//! Boundary to the session/access service.
//!
//! The hub asks two questions at connect time: who does this credential
//! belong to, and may that principal watch this file.

pub mod credential;
pub mod memory;
pub mod remote;

use async_trait::async_trait;

use crate::error::ApiError;

pub use credential::Credential;
pub use memory::MemoryAccess;
pub use remote::HttpAccess;

/// An authenticated user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
}

/// Session lookup and file access checks, backed by the storage backend.
#[async_trait]
pub trait AccessService: Send + Sync {
    /// Resolve a session credential. `Ok(None)` means absent or expired.
    async fn resolve(&self, credential: &str) -> Result<Option<Principal>, ApiError>;

    /// Whether `principal` may observe `file_id`.
    async fn can_observe(&self, principal: &Principal, file_id: &str) -> Result<bool, ApiError>;
}

/// Authenticate `credential` and authorize it for `file_id`.
pub async fn authorize(
    access: &dyn AccessService,
    credential: &str,
    file_id: &str,
) -> Result<Principal, ApiError> {
    let principal = access
        .resolve(credential)
        .await?
        .ok_or_else(|| ApiError::unauthorized("invalid or expired session"))?;

    if !access.can_observe(&principal, file_id).await? {
        return Err(ApiError::forbidden("access denied"));
    }

    Ok(principal)
}
