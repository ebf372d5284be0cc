//! Counterpart profile lookups.

use crate::matching::MatchError;
use crate::store::{collections, DocumentStore, StoreResult};
use pawmatch_model::{CounterpartProfile, UserId};
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
pub struct ProfileDirectory {
    store: Arc<dyn DocumentStore>,
}

impl ProfileDirectory {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Fetch a profile, surfacing store errors. `Ok(None)` when it does not exist.
    pub async fn fetch(&self, id: &UserId) -> StoreResult<Option<CounterpartProfile>> {
        match self.store.get(collections::PETS, id.as_str()).await? {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }

    /// Like `fetch`, but a missing profile is an error.
    pub async fn require(&self, id: &UserId) -> crate::matching::Result<CounterpartProfile> {
        self.fetch(id)
            .await?
            .ok_or_else(|| MatchError::CounterpartNotFound(id.clone()))
    }

    /// Best-effort lookup for display. A missing or corrupt profile is `None`,
    /// never an error.
    pub async fn lookup(&self, id: &UserId) -> Option<CounterpartProfile> {
        match self.fetch(id).await {
            Ok(profile) => profile,
            Err(err) => {
                warn!(profile = %id, error = %err, "profile lookup failed");
                None
            }
        }
    }
}
