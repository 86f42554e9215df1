//! Read-only counters and the public activity feed.
//!
//! Days are UTC days. Challenge creators stay anonymous in the feed, matching
//! the challenge listing.

use std::sync::Arc;

use chrono::{DateTime, NaiveTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::config::before;
use crate::engine::LadderContext;
use crate::error::LadderError;
use crate::matches::MatchStatus;
use crate::storage::MatchCount;
use crate::types::{ChallengeId, Competitor, Game, GameMode, MatchId};

/// Feed length used by [`LadderStats::recent_activity`] callers that have no preference.
pub const DEFAULT_ACTIVITY_LIMIT: usize = 10;

/// Players counted as active have completed a match within this window.
const ACTIVE_WINDOW: TimeDelta = TimeDelta::hours(24);

/// Headline numbers for one enabled game mode.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeSummary {
    pub game: Game,
    pub mode: GameMode,
    /// Ladder players registered in the mode.
    pub players: u64,
    /// IN_PROGRESS matches.
    pub ongoing_matches: u64,
}

/// Today's activity in one game mode.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeActivity {
    pub game: Game,
    pub mode: GameMode,
    /// Start of the UTC day the counters cover.
    pub day_start: DateTime<Utc>,
    pub total_players: u64,
    pub ongoing_matches: u64,
    pub challenges_created_today: u64,
    pub matches_created_today: u64,
    pub matches_completed_today: u64,
    /// Players whose last match is less than 24 hours old.
    pub active_players: u64,
}

/// One entry of the activity feed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Activity {
    MatchCompleted {
        match_id: MatchId,
        game: Game,
        mode: GameMode,
        winner: Competitor,
        loser: Competitor,
        score1: i32,
        score2: i32,
        at: DateTime<Utc>,
    },
    ChallengeCreated {
        challenge_id: ChallengeId,
        game: Game,
        mode: GameMode,
        scheduled_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
}

impl Activity {
    /// When the activity happened.
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Activity::MatchCompleted { at, .. } | Activity::ChallengeCreated { at, .. } => *at,
        }
    }
}

/// Ladder-wide statistics.
#[derive(Clone)]
pub struct LadderStats {
    ctx: Arc<LadderContext>,
}

impl LadderStats {
    pub(crate) fn new(ctx: Arc<LadderContext>) -> Self {
        Self { ctx }
    }

    /// Player and ongoing-match counts for every enabled game mode, in
    /// configuration order.
    #[instrument(skip_all)]
    pub async fn game_stats(&self) -> Result<Vec<ModeSummary>, LadderError> {
        let mut tx = self.ctx.store.begin().await?;
        let mut summaries = Vec::with_capacity(self.ctx.config.modes.len());
        for enabled in &self.ctx.config.modes {
            let players = tx.count_players(&enabled.game, &enabled.mode, None).await?;
            let ongoing_matches = tx
                .count_matches(
                    &enabled.game,
                    &enabled.mode,
                    MatchCount::InStatus(MatchStatus::InProgress),
                )
                .await?;
            summaries.push(ModeSummary {
                game: enabled.game.clone(),
                mode: enabled.mode.clone(),
                players,
                ongoing_matches,
            });
        }
        tx.commit().await?;
        Ok(summaries)
    }

    /// Counters for the current UTC day in one game mode.
    #[instrument(skip_all, fields(game = %game, mode = %mode))]
    pub async fn mode_activity(
        &self,
        game: &Game,
        mode: &GameMode,
    ) -> Result<ModeActivity, LadderError> {
        self.ctx.mode(game, mode)?;
        let now = self.ctx.now();
        let day_start = now.date_naive().and_time(NaiveTime::MIN).and_utc();
        let active_since = before(now, ACTIVE_WINDOW)?;

        let mut tx = self.ctx.store.begin().await?;
        let activity = ModeActivity {
            game: game.clone(),
            mode: mode.clone(),
            day_start,
            total_players: tx.count_players(game, mode, None).await?,
            ongoing_matches: tx
                .count_matches(game, mode, MatchCount::InStatus(MatchStatus::InProgress))
                .await?,
            challenges_created_today: tx.count_challenges_since(game, mode, day_start).await?,
            matches_created_today: tx
                .count_matches(game, mode, MatchCount::CreatedSince(day_start))
                .await?,
            matches_completed_today: tx
                .count_matches(game, mode, MatchCount::CompletedSince(day_start))
                .await?,
            active_players: tx.count_players(game, mode, Some(active_since)).await?,
        };
        tx.commit().await?;
        Ok(activity)
    }

    /// The newest completed matches and open challenges across all modes,
    /// merged newest first and cut to `limit` entries.
    #[instrument(skip_all, fields(limit = limit))]
    pub async fn recent_activity(&self, limit: usize) -> Result<Vec<Activity>, LadderError> {
        let now = self.ctx.now();
        let mut tx = self.ctx.store.begin().await?;
        let matches = tx.recent_completed_matches(limit).await?;
        let challenges = tx.recent_open_challenges(now, limit).await?;

        let mut feed = Vec::with_capacity(matches.len() + challenges.len());
        for m in matches {
            let (Some(winner), Some(completed_at), Some(score1), Some(score2)) =
                (m.winner, m.completed_at, m.score1, m.score2)
            else {
                tracing::warn!(match_id = %m.id, "completed match without an outcome");
                continue;
            };
            let sides = self.ctx.participants(tx.as_mut(), &m).await?;
            let (winner, loser) = if winner == sides.side1.id {
                (sides.side1.owner, sides.side2.owner)
            } else {
                (sides.side2.owner, sides.side1.owner)
            };
            feed.push(Activity::MatchCompleted {
                match_id: m.id,
                game: m.game,
                mode: m.mode,
                winner,
                loser,
                score1,
                score2,
                at: completed_at,
            });
        }
        tx.commit().await?;

        feed.extend(challenges.into_iter().map(|c| Activity::ChallengeCreated {
            challenge_id: c.id,
            game: c.game,
            mode: c.mode,
            scheduled_at: c.scheduled_at,
            at: c.created_at,
        }));
        feed.sort_by(|a, b| b.at().cmp(&a.at()));
        feed.truncate(limit);
        Ok(feed)
    }
}
