//! Persistence seam.
//!
//! Every state-changing operation opens one [`LadderTransaction`] with
//! [`LadderStore::begin`] and either commits it or drops it. Dropping a
//! transaction without calling `commit()` discards all of its writes.
//!
//! Backends must enforce these uniqueness rules themselves, not rely on
//! callers checking first:
//!
//! - one PENDING/ACCEPTED challenge per (creator, scheduled_at)
//! - one submission per (match, side)
//! - one PENDING dispute per match
//! - one ladder player per (owner, game, mode)
//!
//! Violations surface as [`LadderError::Conflict`].

pub mod memory;
#[cfg(feature = "sql")]
pub mod sql;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::challenge::{Challenge, ChallengeStatus};
use crate::consensus::MatchSubmission;
use crate::dispute::{Dispute, DisputeStatus};
use crate::error::LadderError;
use crate::matches::{Match, MatchStatus};
use crate::ranking::{LadderPlayer, StatsDelta};
use crate::types::{
    ChallengeId, Competitor, DisputeId, Game, GameMode, LadderPlayerId, MatchId, SubmissionId,
};

pub use memory::MemoryStore;
#[cfg(feature = "sql")]
pub use sql::PgStore;

/// Entry point to a storage backend.
#[async_trait]
pub trait LadderStore: Send + Sync {
    /// Begin a new transaction.
    async fn begin(&self) -> Result<Box<dyn LadderTransaction>, LadderError>;
}

/// Selects a ladder player's matches.
#[derive(Clone, Debug)]
pub struct MatchFilter {
    pub player: LadderPlayerId,
    pub status: Option<MatchStatus>,
}

/// What `count_matches` counts within one game mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchCount {
    /// Matches currently in this status.
    InStatus(MatchStatus),
    /// Matches created at or after the instant.
    CreatedSince(DateTime<Utc>),
    /// COMPLETED matches whose completion is at or after the instant.
    CompletedSince(DateTime<Utc>),
}

/// A unit of work against the store.
///
/// Conditional updates (`update_challenge`, `update_match`, `update_dispute`)
/// write the row only if its stored status still equals `expected`, and
/// report whether a row was written.
#[async_trait]
pub trait LadderTransaction: Send {
    // ========================================================================
    // Ladder players
    // ========================================================================

    /// Fetch the player for `(owner, game, mode)`, creating it if missing.
    async fn get_or_create_player(
        &mut self,
        owner: Competitor,
        game: &Game,
        mode: &GameMode,
        now: DateTime<Utc>,
    ) -> Result<LadderPlayer, LadderError>;

    async fn find_player(
        &mut self,
        owner: Competitor,
        game: &Game,
        mode: &GameMode,
    ) -> Result<Option<LadderPlayer>, LadderError>;

    async fn get_player(&mut self, id: LadderPlayerId)
        -> Result<Option<LadderPlayer>, LadderError>;

    /// Add `delta` to a player's counters.
    async fn apply_stats(
        &mut self,
        id: LadderPlayerId,
        delta: &StatsDelta,
    ) -> Result<(), LadderError>;

    /// All players of a game mode.
    async fn list_players(
        &mut self,
        game: &Game,
        mode: &GameMode,
    ) -> Result<Vec<LadderPlayer>, LadderError>;

    async fn set_rank(&mut self, id: LadderPlayerId, rank: Option<i32>)
        -> Result<(), LadderError>;

    /// Distinct `(game, mode)` pairs that have at least one player.
    async fn list_game_modes(&mut self) -> Result<Vec<(Game, GameMode)>, LadderError>;

    /// Players of a game mode, restricted to those whose last match is at or
    /// after `active_since` when given.
    async fn count_players(
        &mut self,
        game: &Game,
        mode: &GameMode,
        active_since: Option<DateTime<Utc>>,
    ) -> Result<u64, LadderError>;

    // ========================================================================
    // Challenges
    // ========================================================================

    async fn insert_challenge(&mut self, challenge: &Challenge) -> Result<(), LadderError>;

    async fn get_challenge(&mut self, id: ChallengeId)
        -> Result<Option<Challenge>, LadderError>;

    /// The creator's PENDING or ACCEPTED challenge at exactly `scheduled_at`.
    async fn find_active_challenge(
        &mut self,
        creator: LadderPlayerId,
        scheduled_at: DateTime<Utc>,
    ) -> Result<Option<Challenge>, LadderError>;

    /// PENDING challenges of a game mode expiring after `now`, soonest first.
    async fn list_open_challenges(
        &mut self,
        game: &Game,
        mode: &GameMode,
        now: DateTime<Utc>,
    ) -> Result<Vec<Challenge>, LadderError>;

    async fn update_challenge(
        &mut self,
        challenge: &Challenge,
        expected: ChallengeStatus,
    ) -> Result<bool, LadderError>;

    /// Move every PENDING challenge with `expires_at <= now` to EXPIRED.
    async fn expire_challenges(&mut self, now: DateTime<Utc>) -> Result<u64, LadderError>;

    /// Challenges of a game mode created at or after `since`, in any status.
    async fn count_challenges_since(
        &mut self,
        game: &Game,
        mode: &GameMode,
        since: DateTime<Utc>,
    ) -> Result<u64, LadderError>;

    /// Newest PENDING challenges across all modes that expire after `now`.
    async fn recent_open_challenges(
        &mut self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Challenge>, LadderError>;

    /// Delete EXPIRED, CANCELLED and COMPLETED challenges created at or before `cutoff`.
    async fn purge_challenges(&mut self, cutoff: DateTime<Utc>) -> Result<u64, LadderError>;

    // ========================================================================
    // Matches
    // ========================================================================

    async fn insert_match(&mut self, m: &Match) -> Result<(), LadderError>;

    async fn get_match(&mut self, id: MatchId) -> Result<Option<Match>, LadderError>;

    /// Like `get_match`, but holds the row until the transaction ends.
    async fn lock_match(&mut self, id: MatchId) -> Result<Option<Match>, LadderError>;

    async fn update_match(&mut self, m: &Match, expected: MatchStatus)
        -> Result<bool, LadderError>;

    /// A player's matches, latest scheduled first.
    async fn list_matches(&mut self, filter: &MatchFilter) -> Result<Vec<Match>, LadderError>;

    async fn count_matches(
        &mut self,
        game: &Game,
        mode: &GameMode,
        count: MatchCount,
    ) -> Result<u64, LadderError>;

    /// Latest COMPLETED matches across all modes, most recently completed first.
    async fn recent_completed_matches(&mut self, limit: usize) -> Result<Vec<Match>, LadderError>;

    /// IN_PROGRESS matches scheduled strictly before `cutoff` that have no submissions.
    async fn find_abandoned_matches(
        &mut self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<MatchId>, LadderError>;

    /// Delete CANCELLED matches created at or before `cutoff`, with their
    /// submissions and disputes.
    async fn purge_matches(&mut self, cutoff: DateTime<Utc>) -> Result<u64, LadderError>;

    async fn count_submissions(&mut self, match_id: MatchId) -> Result<u64, LadderError>;

    // ========================================================================
    // Submissions
    // ========================================================================

    async fn insert_submission(&mut self, submission: &MatchSubmission)
        -> Result<(), LadderError>;

    /// Submissions for a match in the order they were recorded.
    async fn list_submissions(
        &mut self,
        match_id: MatchId,
    ) -> Result<Vec<MatchSubmission>, LadderError>;

    async fn mark_submission_validated(&mut self, id: SubmissionId) -> Result<(), LadderError>;

    // ========================================================================
    // Disputes
    // ========================================================================

    async fn insert_dispute(&mut self, dispute: &Dispute) -> Result<(), LadderError>;

    async fn get_dispute(&mut self, id: DisputeId) -> Result<Option<Dispute>, LadderError>;

    /// Disputes of a match, oldest first, optionally restricted to one status.
    async fn list_disputes(
        &mut self,
        match_id: MatchId,
        status: Option<DisputeStatus>,
    ) -> Result<Vec<Dispute>, LadderError>;

    async fn update_dispute(
        &mut self,
        dispute: &Dispute,
        expected: DisputeStatus,
    ) -> Result<bool, LadderError>;

    // ========================================================================
    // Control
    // ========================================================================

    async fn commit(self: Box<Self>) -> Result<(), LadderError>;

    async fn rollback(self: Box<Self>) -> Result<(), LadderError>;
}
