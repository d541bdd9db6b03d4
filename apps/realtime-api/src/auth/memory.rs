use std::collections::HashSet;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::ApiError;

use super::{AccessService, Principal};

// ---------------------------------------------------------------------------
// In-memory implementation (for local runs / tests)
// ---------------------------------------------------------------------------

/// DashMap-backed access service.
///
/// A user may observe a file they own or one that has been shared with them.
#[derive(Default)]
pub struct MemoryAccess {
    sessions: DashMap<String, String>,
    owners: DashMap<String, String>,
    shares: DashMap<String, HashSet<String>>,
}

impl MemoryAccess {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_session(&self, token: &str, user_id: &str) {
        self.sessions.insert(token.to_string(), user_id.to_string());
    }

    pub fn revoke_session(&self, token: &str) {
        self.sessions.remove(token);
    }

    pub fn set_owner(&self, file_id: &str, user_id: &str) {
        self.owners.insert(file_id.to_string(), user_id.to_string());
    }

    pub fn share(&self, file_id: &str, user_id: &str) {
        self.shares
            .entry(file_id.to_string())
            .or_default()
            .insert(user_id.to_string());
    }

    pub fn unshare(&self, file_id: &str, user_id: &str) {
        if let Some(mut users) = self.shares.get_mut(file_id) {
            users.remove(user_id);
        }
        self.shares.remove_if(file_id, |_, users| users.is_empty());
    }
}

#[async_trait]
impl AccessService for MemoryAccess {
    async fn resolve(&self, credential: &str) -> Result<Option<Principal>, ApiError> {
        Ok(self.sessions.get(credential).map(|user_id| Principal {
            user_id: user_id.value().clone(),
        }))
    }

    async fn can_observe(&self, principal: &Principal, file_id: &str) -> Result<bool, ApiError> {
        let owns = self
            .owners
            .get(file_id)
            .is_some_and(|owner| *owner == principal.user_id);
        if owns {
            return Ok(true);
        }
        Ok(self
            .shares
            .get(file_id)
            .is_some_and(|users| users.contains(&principal.user_id)))
    }
}
