//! Swipe decisions and the match records they produce.
//!
//! A match is one actor's durable disposition toward a counterpart. It starts
//! as `liked` or `passed` and becomes `matched` once the counterpart has liked
//! the actor back.

use serde::{Deserialize, Serialize};

use crate::{ConversationId, MatchId, Timestamp, UserId};

/// Verdict carried by a single swipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwipeVerdict {
    Liked,
    Passed,
    Superliked,
}

impl SwipeVerdict {
    /// Liked and superliked both count toward reciprocity.
    pub fn is_positive(self) -> bool {
        !matches!(self, SwipeVerdict::Passed)
    }
}

/// Transient input to the match engine. Never persisted on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwipeDecision {
    pub actor_id: UserId,
    pub counterpart_id: UserId,
    pub verdict: SwipeVerdict,
}

impl SwipeDecision {
    pub fn new(actor_id: UserId, counterpart_id: UserId, verdict: SwipeVerdict) -> Self {
        Self {
            actor_id,
            counterpart_id,
            verdict,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    /// One-sided like awaiting the counterpart.
    Liked,
    Passed,
    Matched,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub id: MatchId,
    pub user_id: UserId,
    pub counterpart_id: UserId,
    pub status: MatchStatus,
    pub created_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_at: Option<Timestamp>,
}

impl Match {
    pub fn new(
        id: MatchId,
        user_id: UserId,
        counterpart_id: UserId,
        status: MatchStatus,
        created_at: Timestamp,
    ) -> Self {
        let matched_at = (status == MatchStatus::Matched).then_some(created_at);
        Self {
            id,
            user_id,
            counterpart_id,
            status,
            created_at,
            matched_at,
        }
    }

    /// Passed and matched records never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, MatchStatus::Passed | MatchStatus::Matched)
    }

    pub fn is_awaiting_reciprocity(&self) -> bool {
        self.status == MatchStatus::Liked
    }

    /// Promote a pending like to a mutual match. No-op on terminal records.
    pub fn mark_matched(&mut self, at: Timestamp) {
        if self.is_awaiting_reciprocity() {
            self.status = MatchStatus::Matched;
            self.matched_at = Some(at);
        }
    }
}

/// Result of recording a swipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchOutcome {
    #[serde(rename = "match")]
    pub record: Match,
    /// Present only when a conversation exists for the pair.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,
}

/// Scripted opener the counterpart sends when a conversation is bootstrapped.
pub fn seed_greeting(counterpart_name: &str) -> String {
    format!("Woof! I'm {counterpart_name}! Thanks for matching with me! 🐾")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn liked() -> Match {
        Match::new(
            MatchId::from("m1"),
            UserId::from("u1"),
            UserId::from("p1"),
            MatchStatus::Liked,
            10,
        )
    }

    #[test]
    fn test_match_lifecycle() {
        let mut record = liked();
        assert!(record.is_awaiting_reciprocity());
        assert!(!record.is_terminal());
        assert_eq!(record.matched_at, None);

        record.mark_matched(42);
        assert_eq!(record.status, MatchStatus::Matched);
        assert_eq!(record.matched_at, Some(42));
        assert!(record.is_terminal());

        record.mark_matched(99);
        assert_eq!(record.matched_at, Some(42));
    }

    #[test]
    fn test_passed_match_is_never_promoted() {
        let mut record = liked();
        record.status = MatchStatus::Passed;
        record.mark_matched(5);
        assert_eq!(record.status, MatchStatus::Passed);
    }

    #[test]
    fn test_match_wire_shape() {
        let value = serde_json::to_value(liked()).unwrap();
        assert_eq!(value["userId"], "u1");
        assert_eq!(value["counterpartId"], "p1");
        assert_eq!(value["status"], "liked");
        assert!(value.get("matchedAt").is_none());
    }

    #[test]
    fn test_verdict_positivity() {
        assert!(SwipeVerdict::Liked.is_positive());
        assert!(SwipeVerdict::Superliked.is_positive());
        assert!(!SwipeVerdict::Passed.is_positive());
    }

    #[test]
    fn test_seed_greeting_names_the_counterpart() {
        assert_eq!(
            seed_greeting("Rex"),
            "Woof! I'm Rex! Thanks for matching with me! 🐾"
        );
    }
}
