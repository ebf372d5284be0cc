//! Fixtures shared by the behavioural contract tests.

use pawmatch_model::{
    Match, MatchId, MatchOutcome, MatchStatus, SwipeDecision, SwipeVerdict, UserId,
};
use pawmatch_node::chat::{ConversationSynchronizer, MessageSynchronizer};
use pawmatch_node::matching::{MatchError, MatchEngine};
use pawmatch_node::store::{DocumentStore, Fields, MemoryStore, Query};
use pawmatch_node::subscriptions::BackoffPolicy;
use serde_json::Value;
use std::sync::Arc;

/// A store plus the engines wired to it, the way the node wires them.
pub struct Harness {
    pub store: MemoryStore,
    pub matches: MatchEngine,
    pub conversations: ConversationSynchronizer,
    pub messages: MessageSynchronizer,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    pub fn new() -> Self {
        let store = MemoryStore::new();
        let shared: Arc<dyn DocumentStore> = Arc::new(store.clone());
        Self {
            matches: MatchEngine::new(Arc::clone(&shared)),
            conversations: ConversationSynchronizer::new(Arc::clone(&shared), BackoffPolicy::default()),
            messages: MessageSynchronizer::new(shared, 50, BackoffPolicy::default()),
            store,
        }
    }

    /// Insert a swipeable profile.
    pub async fn seed_profile(&self, id: &str, name: &str) {
        self.store
            .create("pets", id, Fields::new().set("name", name))
            .await
            .expect("seed profile");
    }

    /// Write a pending like directly, bypassing the engine.
    pub async fn seed_like(&self, from: &str, to: &str) -> Match {
        let now = self.store.server_timestamp().await;
        let record = Match::new(
            MatchId::generate(),
            UserId::from(from),
            UserId::from(to),
            MatchStatus::Liked,
            now,
        );
        self.store
            .create(
                "matches",
                record.id.as_str(),
                Fields::from_record(&record).expect("encode match"),
            )
            .await
            .expect("seed like");
        record
    }

    pub async fn swipe(
        &self,
        actor: &str,
        counterpart: &str,
        verdict: SwipeVerdict,
    ) -> Result<MatchOutcome, MatchError> {
        self.matches
            .record_swipe(SwipeDecision::new(
                UserId::from(actor),
                UserId::from(counterpart),
                verdict,
            ))
            .await
    }

    /// Every stored document of `collection` whose `field` equals `value`.
    pub async fn where_eq(&self, collection: &str, field: &str, value: impl Into<Value>) -> usize {
        self.store
            .query(&Query::collection(collection).where_eq(field, value))
            .await
            .expect("query")
            .len()
    }

    /// Match records between the two ids, in either direction.
    pub async fn matches_between(&self, a: &str, b: &str) -> Vec<Match> {
        let mut found = Vec::new();
        for (user, counterpart) in [(a, b), (b, a)] {
            let docs = self
                .store
                .query(
                    &Query::collection("matches")
                        .where_eq("userId", user)
                        .where_eq("counterpartId", counterpart),
                )
                .await
                .expect("query matches");
            found.extend(docs.iter().map(|d| d.decode::<Match>().expect("decode match")));
        }
        found
    }
}
