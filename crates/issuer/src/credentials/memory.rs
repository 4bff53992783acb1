//! In-memory credential store.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use super::{Credential, CredentialError, CredentialStore};

/// Credential store backed by a concurrent map, keyed by `(scope, name)`.
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    entries: Arc<DashMap<(String, String), Credential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a credential
    pub fn insert(&self, scope: impl Into<String>, name: impl Into<String>, credential: Credential) {
        self.entries.insert((scope.into(), name.into()), credential);
    }

    pub fn remove(&self, scope: &str, name: &str) -> Option<Credential> {
        self.entries
            .remove(&(scope.to_string(), name.to_string()))
            .map(|(_, c)| c)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get(&self, scope: &str, name: &str) -> Result<Option<Credential>, CredentialError> {
        Ok(self
            .entries
            .get(&(scope.to_string(), name.to_string()))
            .map(|c| c.clone()))
    }
}
