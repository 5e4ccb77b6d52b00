// Identity lookup

use crate::Result;
use async_trait::async_trait;
use psylab_session::Role;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// An account as known to the user store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: Role,
}

impl Identity {
    pub fn new(
        id: impl Into<String>,
        username: impl Into<String>,
        email: impl Into<String>,
        role: Role,
    ) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            email: email.into(),
            role,
        }
    }
}

/// Loads identities by id. Backed by the user store in production.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// `Ok(None)` when no such identity exists.
    async fn find_by_id(&self, id: &str) -> Result<Option<Identity>>;
}

/// In-memory resolver.
#[derive(Debug, Default)]
pub struct MemoryIdentities {
    identities: RwLock<HashMap<String, Identity>>,
}

impl MemoryIdentities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, identity: Identity) {
        if let Ok(mut map) = self.identities.write() {
            map.insert(identity.id.clone(), identity);
        }
    }

    pub fn remove(&self, id: &str) -> Option<Identity> {
        self.identities.write().ok()?.remove(id)
    }
}

impl FromIterator<Identity> for MemoryIdentities {
    fn from_iter<I: IntoIterator<Item = Identity>>(iter: I) -> Self {
        let map = iter.into_iter().map(|i| (i.id.clone(), i)).collect();
        Self {
            identities: RwLock::new(map),
        }
    }
}

#[async_trait]
impl IdentityResolver for MemoryIdentities {
    async fn find_by_id(&self, id: &str) -> Result<Option<Identity>> {
        let map = self
            .identities
            .read()
            .map_err(|_| crate::AuthError::Resolver("identity map poisoned".to_string()))?;
        Ok(map.get(id).cloned())
    }
}
