//! Match engine: turns swipe decisions into durable match records and opens a
//! conversation exactly once per reciprocal pair.

mod arbiter;
mod bootstrap;
mod engine;

pub use arbiter::PairArbiter;
pub use bootstrap::ConversationBootstrap;
pub use engine::MatchEngine;

use crate::store::StoreError;
use pawmatch_model::UserId;

/// Errors that can occur while recording a swipe.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MatchError {
    #[error("no authenticated actor")]
    Unauthenticated,
    #[error("counterpart {0} not found")]
    CounterpartNotFound(UserId),
    #[error("cannot swipe on yourself")]
    SelfSwipe,
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, MatchError>;
