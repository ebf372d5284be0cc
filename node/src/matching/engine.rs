//! Swipe recording and reciprocity detection.

use super::bootstrap::{ConversationBootstrap, MATCH_RATE_STEP};
use super::{MatchError, PairArbiter, Result};
use crate::profiles::ProfileDirectory;
use crate::store::{collections, Direction, DocumentStore, Fields, Query, WriteOp};
use pawmatch_model::{
    Conversation, ConversationId, CounterpartProfile, Match, MatchId, MatchOutcome, MatchStatus,
    MessageId, SwipeDecision, SwipeVerdict, UserId,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Records swipes. Swipes on the same pair through one engine are serialized;
/// across processes the check-then-write on a pair is not atomic.
#[derive(Clone)]
pub struct MatchEngine {
    store: Arc<dyn DocumentStore>,
    profiles: ProfileDirectory,
    arbiter: PairArbiter,
}

impl MatchEngine {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            profiles: ProfileDirectory::new(Arc::clone(&store)),
            store,
            arbiter: PairArbiter::new(),
        }
    }

    /// Record a swipe and report the resulting match, plus the pair's
    /// conversation when one exists.
    ///
    /// Replaying a swipe returns the stored match unchanged, except that a
    /// pending like is promoted to `matched` once the counterpart has liked
    /// back in the meantime.
    pub async fn record_swipe(&self, decision: SwipeDecision) -> Result<MatchOutcome> {
        let SwipeDecision {
            actor_id,
            counterpart_id,
            verdict,
        } = decision;

        if actor_id.as_str().is_empty() {
            return Err(MatchError::Unauthenticated);
        }
        if actor_id == counterpart_id {
            return Err(MatchError::SelfSwipe);
        }

        let _pair = self.arbiter.acquire(&actor_id, &counterpart_id).await;

        let profile = self.profiles.require(&counterpart_id).await?;

        if let Some(existing) = self.find_match(&actor_id, &counterpart_id).await? {
            if existing.is_awaiting_reciprocity()
                && verdict.is_positive()
                && self.has_reciprocal_like(&actor_id, &counterpart_id).await?
            {
                return self.complete(existing, false, &profile, None).await;
            }

            debug!(match_id = %existing.id, status = ?existing.status, "swipe replay, match unchanged");
            let conversation_id = self.find_conversation(&actor_id, &counterpart_id).await?;
            return Ok(MatchOutcome {
                record: existing,
                conversation_id,
            });
        }

        let now = self.store.server_timestamp().await;
        let id = MatchId::new(self.store.new_id());

        if verdict == SwipeVerdict::Passed {
            let record = Match::new(id, actor_id, counterpart_id, MatchStatus::Passed, now);
            self.store
                .create(
                    collections::MATCHES,
                    record.id.as_str(),
                    Fields::from_record(&record)?,
                )
                .await?;
            info!(match_id = %record.id, counterpart = %record.counterpart_id, "recorded pass");
            return Ok(MatchOutcome {
                record,
                conversation_id: None,
            });
        }

        let superlike = (verdict == SwipeVerdict::Superliked).then(|| superlike_op(&counterpart_id));
        let record = Match::new(
            id,
            actor_id.clone(),
            counterpart_id.clone(),
            MatchStatus::Liked,
            now,
        );

        if self.has_reciprocal_like(&actor_id, &counterpart_id).await? {
            return self.complete(record, true, &profile, superlike).await;
        }

        let mut ops = vec![WriteOp::create(
            collections::MATCHES,
            record.id.as_str(),
            Fields::from_record(&record)?,
        )];
        ops.extend(superlike);
        self.store.batch_write(ops).await?;
        info!(match_id = %record.id, counterpart = %record.counterpart_id, ?verdict, "recorded like");

        Ok(MatchOutcome {
            record,
            conversation_id: None,
        })
    }

    /// Promote `record` to `matched` and bootstrap the pair's conversation in
    /// the same batch, unless the pair already has one.
    async fn complete(
        &self,
        mut record: Match,
        is_new: bool,
        profile: &CounterpartProfile,
        extra: Option<WriteOp>,
    ) -> Result<MatchOutcome> {
        let now = self.store.server_timestamp().await;
        record.mark_matched(now);

        let match_write = if is_new {
            WriteOp::create(
                collections::MATCHES,
                record.id.as_str(),
                Fields::from_record(&record)?,
            )
        } else {
            WriteOp::update(
                collections::MATCHES,
                record.id.as_str(),
                Fields::new().set("status", "matched").set("matchedAt", now),
            )
        };

        let (mut ops, conversation_id) =
            match self.find_conversation(&record.user_id, &record.counterpart_id).await? {
                Some(existing) => {
                    debug!(conversation = %existing, "pair already has a conversation");
                    (vec![match_write], existing)
                }
                None => {
                    let bootstrap = ConversationBootstrap::new(
                        ConversationId::new(self.store.new_id()),
                        MessageId::new(self.store.new_id()),
                        record.user_id.clone(),
                        record.counterpart_id.clone(),
                        profile.display_name(),
                        now,
                    );
                    let conversation_id = bootstrap.conversation.id.clone();
                    (bootstrap.into_ops(match_write)?, conversation_id)
                }
            };
        ops.extend(extra);

        self.store.batch_write(ops).await?;
        info!(
            match_id = %record.id,
            counterpart = %record.counterpart_id,
            conversation = %conversation_id,
            "mutual match"
        );

        Ok(MatchOutcome {
            record,
            conversation_id: Some(conversation_id),
        })
    }

    /// The actor's own match toward the counterpart. The earliest wins if a
    /// race ever wrote two.
    pub async fn find_match(&self, actor: &UserId, counterpart: &UserId) -> Result<Option<Match>> {
        let query = Query::collection(collections::MATCHES)
            .where_eq("userId", actor.as_str())
            .where_eq("counterpartId", counterpart.as_str())
            .order_by("createdAt", Direction::Ascending)
            .limit(1);
        match self.store.query(&query).await?.first() {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }

    /// Whether the counterpart already has a pending like pointed at the actor.
    async fn has_reciprocal_like(&self, actor: &UserId, counterpart: &UserId) -> Result<bool> {
        let query = Query::collection(collections::MATCHES)
            .where_eq("userId", counterpart.as_str())
            .where_eq("counterpartId", actor.as_str())
            .where_eq("status", "liked")
            .limit(1);
        Ok(!self.store.query(&query).await?.is_empty())
    }

    /// Conversation shared by the two participants, in either orientation.
    pub async fn find_conversation(
        &self,
        actor: &UserId,
        counterpart: &UserId,
    ) -> Result<Option<ConversationId>> {
        let query = Query::collection(collections::CONVERSATIONS)
            .where_array_contains("participants", actor.as_str())
            .order_by("createdAt", Direction::Ascending);
        for doc in self.store.query(&query).await? {
            let conversation: Conversation = doc.decode()?;
            if conversation.is_participant(counterpart) {
                return Ok(Some(conversation.id));
            }
        }
        Ok(None)
    }

    /// Every counterpart the user already holds a match record for, whatever
    /// its status. Used to exclude candidates from discovery.
    pub async fn matched_counterparts(&self, user: &UserId) -> Result<Vec<UserId>> {
        let query = Query::collection(collections::MATCHES).where_eq("userId", user.as_str());
        let mut ids = Vec::new();
        for doc in self.store.query(&query).await? {
            let record: Match = doc.decode()?;
            if !ids.contains(&record.counterpart_id) {
                ids.push(record.counterpart_id);
            }
        }
        Ok(ids)
    }
}

fn superlike_op(counterpart: &UserId) -> WriteOp {
    WriteOp::update(
        collections::PETS,
        counterpart.as_str(),
        Fields::new()
            .increment("matchRate", MATCH_RATE_STEP)
            .increment("superLikes", 1.0),
    )
}
