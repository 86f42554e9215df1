//! PostgreSQL storage backend.
//!
//! Uniqueness rules are enforced by the schema (see `migrations/`): a partial
//! unique index on active challenge slots, a unique (match, side) constraint
//! on submissions and a partial unique index on pending disputes. Violations
//! map to [`LadderError::Conflict`] through `From<sqlx::Error>`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use uuid::Uuid;

use super::{LadderStore, LadderTransaction, MatchCount, MatchFilter};
use crate::challenge::{Challenge, ChallengeStatus};
use crate::consensus::MatchSubmission;
use crate::dispute::{Dispute, DisputeResolution, DisputeStatus};
use crate::error::LadderError;
use crate::matches::{Match, MatchStatus};
use crate::ranking::{LadderPlayer, StatsDelta};
use crate::types::{
    ChallengeId, Competitor, DisputeId, EvidenceRef, Format, Game, GameMode, LadderPlayerId,
    MatchId, SubmissionId, UserId,
};

const PLAYER_COLUMNS: &str = "id, owner_kind, owner_id, game, game_mode, victories, defeats, \
     matches_played, last_match_at, rank, created_at";

const CHALLENGE_COLUMNS: &str = "id, creator_id, acceptor_id, game, game_mode, scheduled_at, \
     expires_at, message, status, match_id, created_at, updated_at";

const MATCH_COLUMNS: &str = "id, side1_id, side2_id, format, game, game_mode, scheduled_at, \
     status, winner_id, loser_id, score1, score2, completed_at, validation_deadline, \
     challenge_id, created_at, updated_at";

const SUBMISSION_COLUMNS: &str = "id, match_id, side_id, submitted_by, claimed_winner, score1, \
     score2, evidence, validated, submitted_at";

const DISPUTE_COLUMNS: &str = "id, match_id, disputed_by, side_id, reason, description, \
     evidence, status, resolution, resolution_winner, resolution_score1, resolution_score2, \
     resolved_by, resolution_note, created_at, resolved_at";

/// Storage backed by a PostgreSQL pool.
#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect with a small default pool.
    pub async fn connect(url: &str) -> Result<Self, LadderError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Apply the embedded schema migrations.
    pub async fn migrate(&self) -> Result<(), LadderError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| LadderError::Transient {
                reason: format!("migration failed: {e}"),
                source: Some(Box::new(e)),
            })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LadderStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn LadderTransaction>, LadderError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTransaction { tx }))
    }
}

/// Transaction over a [`PgStore`]. Rolled back by sqlx when dropped uncommitted.
pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn corrupt(what: &str, value: impl std::fmt::Display) -> LadderError {
    LadderError::internal(format!("invalid {what} '{value}' in storage"))
}

fn player_from_row(row: &PgRow) -> Result<LadderPlayer, LadderError> {
    let kind: String = row.try_get("owner_kind")?;
    let owner_id: Uuid = row.try_get("owner_id")?;
    let owner = Competitor::from_parts(&kind, owner_id).ok_or_else(|| corrupt("owner kind", &kind))?;
    Ok(LadderPlayer {
        id: LadderPlayerId(row.try_get("id")?),
        owner,
        game: Game(row.try_get("game")?),
        mode: GameMode(row.try_get("game_mode")?),
        victories: row.try_get("victories")?,
        defeats: row.try_get("defeats")?,
        matches_played: row.try_get("matches_played")?,
        last_match_at: row.try_get("last_match_at")?,
        rank: row.try_get("rank")?,
        created_at: row.try_get("created_at")?,
    })
}

fn challenge_from_row(row: &PgRow) -> Result<Challenge, LadderError> {
    let status: String = row.try_get("status")?;
    Ok(Challenge {
        id: ChallengeId(row.try_get("id")?),
        creator: LadderPlayerId(row.try_get("creator_id")?),
        acceptor: row.try_get::<Option<Uuid>, _>("acceptor_id")?.map(LadderPlayerId),
        game: Game(row.try_get("game")?),
        mode: GameMode(row.try_get("game_mode")?),
        scheduled_at: row.try_get("scheduled_at")?,
        expires_at: row.try_get("expires_at")?,
        message: row.try_get("message")?,
        status: status.parse()?,
        match_id: row.try_get::<Option<Uuid>, _>("match_id")?.map(MatchId),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn match_from_row(row: &PgRow) -> Result<Match, LadderError> {
    let status: String = row.try_get("status")?;
    let format: String = row.try_get("format")?;
    Ok(Match {
        id: MatchId(row.try_get("id")?),
        side1: LadderPlayerId(row.try_get("side1_id")?),
        side2: LadderPlayerId(row.try_get("side2_id")?),
        format: format.parse::<Format>().map_err(|_| corrupt("format", &format))?,
        game: Game(row.try_get("game")?),
        mode: GameMode(row.try_get("game_mode")?),
        scheduled_at: row.try_get("scheduled_at")?,
        status: status.parse()?,
        winner: row.try_get::<Option<Uuid>, _>("winner_id")?.map(LadderPlayerId),
        loser: row.try_get::<Option<Uuid>, _>("loser_id")?.map(LadderPlayerId),
        score1: row.try_get("score1")?,
        score2: row.try_get("score2")?,
        completed_at: row.try_get("completed_at")?,
        validation_deadline: row.try_get("validation_deadline")?,
        challenge_id: row.try_get::<Option<Uuid>, _>("challenge_id")?.map(ChallengeId),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn submission_from_row(row: &PgRow) -> Result<MatchSubmission, LadderError> {
    let evidence: Vec<String> = row.try_get("evidence")?;
    Ok(MatchSubmission {
        id: SubmissionId(row.try_get("id")?),
        match_id: MatchId(row.try_get("match_id")?),
        side: LadderPlayerId(row.try_get("side_id")?),
        submitted_by: UserId(row.try_get("submitted_by")?),
        claimed_winner: LadderPlayerId(row.try_get("claimed_winner")?),
        score1: row.try_get("score1")?,
        score2: row.try_get("score2")?,
        evidence: evidence.into_iter().map(EvidenceRef).collect(),
        validated: row.try_get("validated")?,
        submitted_at: row.try_get("submitted_at")?,
    })
}

fn dispute_from_row(row: &PgRow) -> Result<Dispute, LadderError> {
    let status: String = row.try_get("status")?;
    let evidence: Vec<String> = row.try_get("evidence")?;
    let resolution = match row.try_get::<Option<String>, _>("resolution")?.as_deref() {
        None => None,
        Some("UPHELD") => Some(DisputeResolution::Upheld),
        Some("OVERTURNED") => {
            let winner: Option<Uuid> = row.try_get("resolution_winner")?;
            let score1: Option<i32> = row.try_get("resolution_score1")?;
            let score2: Option<i32> = row.try_get("resolution_score2")?;
            match (winner, score1, score2) {
                (Some(w), Some(s1), Some(s2)) => Some(DisputeResolution::Overturned {
                    winner: LadderPlayerId(w),
                    score1: s1,
                    score2: s2,
                }),
                _ => return Err(corrupt("overturned resolution", "missing result")),
            }
        }
        Some(other) => return Err(corrupt("dispute resolution", other)),
    };
    Ok(Dispute {
        id: DisputeId(row.try_get("id")?),
        match_id: MatchId(row.try_get("match_id")?),
        disputed_by: UserId(row.try_get("disputed_by")?),
        side: LadderPlayerId(row.try_get("side_id")?),
        reason: row.try_get("reason")?,
        description: row.try_get("description")?,
        evidence: evidence.into_iter().map(EvidenceRef).collect(),
        status: status.parse()?,
        resolution,
        resolved_by: row.try_get::<Option<Uuid>, _>("resolved_by")?.map(UserId),
        resolution_note: row.try_get("resolution_note")?,
        created_at: row.try_get("created_at")?,
        resolved_at: row.try_get("resolved_at")?,
    })
}

fn evidence_strings(evidence: &[EvidenceRef]) -> Vec<String> {
    evidence.iter().map(|e| e.0.clone()).collect()
}

/// Resolution columns: (resolution, winner, score1, score2).
fn resolution_columns(
    resolution: Option<DisputeResolution>,
) -> (Option<&'static str>, Option<Uuid>, Option<i32>, Option<i32>) {
    match resolution {
        None => (None, None, None, None),
        Some(DisputeResolution::Upheld) => (Some("UPHELD"), None, None, None),
        Some(DisputeResolution::Overturned {
            winner,
            score1,
            score2,
        }) => (Some("OVERTURNED"), Some(winner.0), Some(score1), Some(score2)),
    }
}

#[async_trait]
impl LadderTransaction for PgTransaction {
    async fn get_or_create_player(
        &mut self,
        owner: Competitor,
        game: &Game,
        mode: &GameMode,
        now: DateTime<Utc>,
    ) -> Result<LadderPlayer, LadderError> {
        sqlx::query(
            "INSERT INTO ladder_players (id, owner_kind, owner_id, game, game_mode, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (owner_kind, owner_id, game, game_mode) DO NOTHING",
        )
        .bind(LadderPlayerId::new().0)
        .bind(owner.kind())
        .bind(owner.raw_id())
        .bind(game.as_str())
        .bind(mode.as_str())
        .bind(now)
        .execute(&mut *self.tx)
        .await?;

        self.find_player(owner, game, mode)
            .await?
            .ok_or_else(|| LadderError::internal("ladder player vanished after upsert"))
    }

    async fn find_player(
        &mut self,
        owner: Competitor,
        game: &Game,
        mode: &GameMode,
    ) -> Result<Option<LadderPlayer>, LadderError> {
        let row = sqlx::query(&format!(
            "SELECT {PLAYER_COLUMNS} FROM ladder_players
             WHERE owner_kind = $1 AND owner_id = $2 AND game = $3 AND game_mode = $4"
        ))
        .bind(owner.kind())
        .bind(owner.raw_id())
        .bind(game.as_str())
        .bind(mode.as_str())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(player_from_row).transpose()
    }

    async fn get_player(
        &mut self,
        id: LadderPlayerId,
    ) -> Result<Option<LadderPlayer>, LadderError> {
        let row = sqlx::query(&format!(
            "SELECT {PLAYER_COLUMNS} FROM ladder_players WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(player_from_row).transpose()
    }

    async fn apply_stats(
        &mut self,
        id: LadderPlayerId,
        delta: &StatsDelta,
    ) -> Result<(), LadderError> {
        let result = sqlx::query(
            "UPDATE ladder_players
             SET victories = victories + $2,
                 defeats = defeats + $3,
                 matches_played = matches_played + $4,
                 last_match_at = COALESCE($5, last_match_at)
             WHERE id = $1",
        )
        .bind(id.0)
        .bind(delta.victories)
        .bind(delta.defeats)
        .bind(delta.matches_played)
        .bind(delta.last_match_at)
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(LadderError::not_found("ladder player", id));
        }
        Ok(())
    }

    async fn list_players(
        &mut self,
        game: &Game,
        mode: &GameMode,
    ) -> Result<Vec<LadderPlayer>, LadderError> {
        let rows = sqlx::query(&format!(
            "SELECT {PLAYER_COLUMNS} FROM ladder_players WHERE game = $1 AND game_mode = $2"
        ))
        .bind(game.as_str())
        .bind(mode.as_str())
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(player_from_row).collect()
    }

    async fn set_rank(
        &mut self,
        id: LadderPlayerId,
        rank: Option<i32>,
    ) -> Result<(), LadderError> {
        sqlx::query("UPDATE ladder_players SET rank = $2 WHERE id = $1")
            .bind(id.0)
            .bind(rank)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn list_game_modes(&mut self) -> Result<Vec<(Game, GameMode)>, LadderError> {
        let rows = sqlx::query(
            "SELECT DISTINCT game, game_mode FROM ladder_players ORDER BY game, game_mode",
        )
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter()
            .map(|row| {
                Ok((
                    Game(row.try_get("game")?),
                    GameMode(row.try_get("game_mode")?),
                ))
            })
            .collect()
    }

    async fn count_players(
        &mut self,
        game: &Game,
        mode: &GameMode,
        active_since: Option<DateTime<Utc>>,
    ) -> Result<u64, LadderError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM ladder_players
             WHERE game = $1 AND game_mode = $2
               AND ($3::TIMESTAMPTZ IS NULL OR last_match_at >= $3)",
        )
        .bind(game.as_str())
        .bind(mode.as_str())
        .bind(active_since)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(count as u64)
    }

    async fn insert_challenge(&mut self, challenge: &Challenge) -> Result<(), LadderError> {
        sqlx::query(&format!(
            "INSERT INTO challenges ({CHALLENGE_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"
        ))
        .bind(challenge.id.0)
        .bind(challenge.creator.0)
        .bind(challenge.acceptor.map(|a| a.0))
        .bind(challenge.game.as_str())
        .bind(challenge.mode.as_str())
        .bind(challenge.scheduled_at)
        .bind(challenge.expires_at)
        .bind(challenge.message.as_deref())
        .bind(challenge.status.as_str())
        .bind(challenge.match_id.map(|m| m.0))
        .bind(challenge.created_at)
        .bind(challenge.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn get_challenge(
        &mut self,
        id: ChallengeId,
    ) -> Result<Option<Challenge>, LadderError> {
        let row = sqlx::query(&format!(
            "SELECT {CHALLENGE_COLUMNS} FROM challenges WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(challenge_from_row).transpose()
    }

    async fn find_active_challenge(
        &mut self,
        creator: LadderPlayerId,
        scheduled_at: DateTime<Utc>,
    ) -> Result<Option<Challenge>, LadderError> {
        let row = sqlx::query(&format!(
            "SELECT {CHALLENGE_COLUMNS} FROM challenges
             WHERE creator_id = $1 AND scheduled_at = $2 AND status IN ('PENDING', 'ACCEPTED')"
        ))
        .bind(creator.0)
        .bind(scheduled_at)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(challenge_from_row).transpose()
    }

    async fn list_open_challenges(
        &mut self,
        game: &Game,
        mode: &GameMode,
        now: DateTime<Utc>,
    ) -> Result<Vec<Challenge>, LadderError> {
        let rows = sqlx::query(&format!(
            "SELECT {CHALLENGE_COLUMNS} FROM challenges
             WHERE status = 'PENDING' AND game = $1 AND game_mode = $2 AND expires_at > $3
             ORDER BY scheduled_at, created_at, id"
        ))
        .bind(game.as_str())
        .bind(mode.as_str())
        .bind(now)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(challenge_from_row).collect()
    }

    async fn count_challenges_since(
        &mut self,
        game: &Game,
        mode: &GameMode,
        since: DateTime<Utc>,
    ) -> Result<u64, LadderError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM challenges
             WHERE game = $1 AND game_mode = $2 AND created_at >= $3",
        )
        .bind(game.as_str())
        .bind(mode.as_str())
        .bind(since)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(count as u64)
    }

    async fn recent_open_challenges(
        &mut self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Challenge>, LadderError> {
        let rows = sqlx::query(&format!(
            "SELECT {CHALLENGE_COLUMNS} FROM challenges
             WHERE status = 'PENDING' AND expires_at > $1
             ORDER BY created_at DESC, id
             LIMIT $2"
        ))
        .bind(now)
        .bind(sql_limit(limit))
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(challenge_from_row).collect()
    }

    async fn update_challenge(
        &mut self,
        challenge: &Challenge,
        expected: ChallengeStatus,
    ) -> Result<bool, LadderError> {
        let result = sqlx::query(
            "UPDATE challenges
             SET acceptor_id = $3, status = $4, match_id = $5, message = $6, updated_at = $7
             WHERE id = $1 AND status = $2",
        )
        .bind(challenge.id.0)
        .bind(expected.as_str())
        .bind(challenge.acceptor.map(|a| a.0))
        .bind(challenge.status.as_str())
        .bind(challenge.match_id.map(|m| m.0))
        .bind(challenge.message.as_deref())
        .bind(challenge.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn expire_challenges(&mut self, now: DateTime<Utc>) -> Result<u64, LadderError> {
        let result = sqlx::query(
            "UPDATE challenges SET status = 'EXPIRED', updated_at = $1
             WHERE status = 'PENDING' AND expires_at <= $1",
        )
        .bind(now)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn purge_challenges(&mut self, cutoff: DateTime<Utc>) -> Result<u64, LadderError> {
        let result = sqlx::query(
            "DELETE FROM challenges
             WHERE status IN ('EXPIRED', 'CANCELLED', 'COMPLETED') AND created_at <= $1",
        )
        .bind(cutoff)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn insert_match(&mut self, m: &Match) -> Result<(), LadderError> {
        sqlx::query(&format!(
            "INSERT INTO matches ({MATCH_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)"
        ))
        .bind(m.id.0)
        .bind(m.side1.0)
        .bind(m.side2.0)
        .bind(m.format.as_str())
        .bind(m.game.as_str())
        .bind(m.mode.as_str())
        .bind(m.scheduled_at)
        .bind(m.status.as_str())
        .bind(m.winner.map(|w| w.0))
        .bind(m.loser.map(|l| l.0))
        .bind(m.score1)
        .bind(m.score2)
        .bind(m.completed_at)
        .bind(m.validation_deadline)
        .bind(m.challenge_id.map(|c| c.0))
        .bind(m.created_at)
        .bind(m.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn get_match(&mut self, id: MatchId) -> Result<Option<Match>, LadderError> {
        let row = sqlx::query(&format!("SELECT {MATCH_COLUMNS} FROM matches WHERE id = $1"))
            .bind(id.0)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(match_from_row).transpose()
    }

    async fn lock_match(&mut self, id: MatchId) -> Result<Option<Match>, LadderError> {
        let row = sqlx::query(&format!(
            "SELECT {MATCH_COLUMNS} FROM matches WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.0)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(match_from_row).transpose()
    }

    async fn update_match(
        &mut self,
        m: &Match,
        expected: MatchStatus,
    ) -> Result<bool, LadderError> {
        let result = sqlx::query(
            "UPDATE matches
             SET status = $3, winner_id = $4, loser_id = $5, score1 = $6, score2 = $7,
                 completed_at = $8, validation_deadline = $9, updated_at = $10
             WHERE id = $1 AND status = $2",
        )
        .bind(m.id.0)
        .bind(expected.as_str())
        .bind(m.status.as_str())
        .bind(m.winner.map(|w| w.0))
        .bind(m.loser.map(|l| l.0))
        .bind(m.score1)
        .bind(m.score2)
        .bind(m.completed_at)
        .bind(m.validation_deadline)
        .bind(m.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_matches(&mut self, filter: &MatchFilter) -> Result<Vec<Match>, LadderError> {
        let rows = sqlx::query(&format!(
            "SELECT {MATCH_COLUMNS} FROM matches
             WHERE (side1_id = $1 OR side2_id = $1) AND ($2::TEXT IS NULL OR status = $2)
             ORDER BY scheduled_at DESC, id"
        ))
        .bind(filter.player.0)
        .bind(filter.status.map(|s| s.as_str()))
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(match_from_row).collect()
    }

    async fn count_matches(
        &mut self,
        game: &Game,
        mode: &GameMode,
        count: MatchCount,
    ) -> Result<u64, LadderError> {
        const BASE: &str = "SELECT COUNT(*) FROM matches WHERE game = $1 AND game_mode = $2";
        let sql = match count {
            MatchCount::InStatus(_) => format!("{BASE} AND status = $3"),
            MatchCount::CreatedSince(_) => format!("{BASE} AND created_at >= $3"),
            MatchCount::CompletedSince(_) => {
                format!("{BASE} AND status = 'COMPLETED' AND completed_at >= $3")
            }
        };
        let query = sqlx::query_scalar::<Postgres, i64>(&sql)
            .bind(game.as_str())
            .bind(mode.as_str());
        let query = match count {
            MatchCount::InStatus(status) => query.bind(status.as_str()),
            MatchCount::CreatedSince(since) | MatchCount::CompletedSince(since) => {
                query.bind(since)
            }
        };
        let count = query.fetch_one(&mut *self.tx).await?;
        Ok(count as u64)
    }

    async fn recent_completed_matches(&mut self, limit: usize) -> Result<Vec<Match>, LadderError> {
        let rows = sqlx::query(&format!(
            "SELECT {MATCH_COLUMNS} FROM matches
             WHERE status = 'COMPLETED'
             ORDER BY completed_at DESC NULLS LAST, id
             LIMIT $1"
        ))
        .bind(sql_limit(limit))
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(match_from_row).collect()
    }

    async fn find_abandoned_matches(
        &mut self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<MatchId>, LadderError> {
        let rows = sqlx::query(
            "SELECT m.id FROM matches m
             WHERE m.status = 'IN_PROGRESS' AND m.scheduled_at < $1
               AND NOT EXISTS (SELECT 1 FROM match_submissions s WHERE s.match_id = m.id)
             ORDER BY m.scheduled_at, m.id",
        )
        .bind(cutoff)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter()
            .map(|row| Ok(MatchId(row.try_get("id")?)))
            .collect()
    }

    async fn purge_matches(&mut self, cutoff: DateTime<Utc>) -> Result<u64, LadderError> {
        let result = sqlx::query(
            "DELETE FROM matches WHERE status = 'CANCELLED' AND created_at <= $1",
        )
        .bind(cutoff)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn count_submissions(&mut self, match_id: MatchId) -> Result<u64, LadderError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM match_submissions WHERE match_id = $1",
        )
        .bind(match_id.0)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(count as u64)
    }

    async fn insert_submission(
        &mut self,
        submission: &MatchSubmission,
    ) -> Result<(), LadderError> {
        sqlx::query(&format!(
            "INSERT INTO match_submissions ({SUBMISSION_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        ))
        .bind(submission.id.0)
        .bind(submission.match_id.0)
        .bind(submission.side.0)
        .bind(submission.submitted_by.0)
        .bind(submission.claimed_winner.0)
        .bind(submission.score1)
        .bind(submission.score2)
        .bind(evidence_strings(&submission.evidence))
        .bind(submission.validated)
        .bind(submission.submitted_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn list_submissions(
        &mut self,
        match_id: MatchId,
    ) -> Result<Vec<MatchSubmission>, LadderError> {
        let rows = sqlx::query(&format!(
            "SELECT {SUBMISSION_COLUMNS} FROM match_submissions
             WHERE match_id = $1 ORDER BY seq"
        ))
        .bind(match_id.0)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(submission_from_row).collect()
    }

    async fn mark_submission_validated(&mut self, id: SubmissionId) -> Result<(), LadderError> {
        sqlx::query("UPDATE match_submissions SET validated = TRUE WHERE id = $1")
            .bind(id.0)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn insert_dispute(&mut self, dispute: &Dispute) -> Result<(), LadderError> {
        let (resolution, winner, score1, score2) = resolution_columns(dispute.resolution);
        sqlx::query(&format!(
            "INSERT INTO disputes ({DISPUTE_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)"
        ))
        .bind(dispute.id.0)
        .bind(dispute.match_id.0)
        .bind(dispute.disputed_by.0)
        .bind(dispute.side.0)
        .bind(&dispute.reason)
        .bind(dispute.description.as_deref())
        .bind(evidence_strings(&dispute.evidence))
        .bind(dispute.status.as_str())
        .bind(resolution)
        .bind(winner)
        .bind(score1)
        .bind(score2)
        .bind(dispute.resolved_by.map(|u| u.0))
        .bind(dispute.resolution_note.as_deref())
        .bind(dispute.created_at)
        .bind(dispute.resolved_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn get_dispute(&mut self, id: DisputeId) -> Result<Option<Dispute>, LadderError> {
        let row = sqlx::query(&format!("SELECT {DISPUTE_COLUMNS} FROM disputes WHERE id = $1"))
            .bind(id.0)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(dispute_from_row).transpose()
    }

    async fn list_disputes(
        &mut self,
        match_id: MatchId,
        status: Option<DisputeStatus>,
    ) -> Result<Vec<Dispute>, LadderError> {
        let rows = sqlx::query(&format!(
            "SELECT {DISPUTE_COLUMNS} FROM disputes
             WHERE match_id = $1 AND ($2::TEXT IS NULL OR status = $2)
             ORDER BY seq"
        ))
        .bind(match_id.0)
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(dispute_from_row).collect()
    }

    async fn update_dispute(
        &mut self,
        dispute: &Dispute,
        expected: DisputeStatus,
    ) -> Result<bool, LadderError> {
        let (resolution, winner, score1, score2) = resolution_columns(dispute.resolution);
        let result = sqlx::query(
            "UPDATE disputes
             SET status = $3, resolution = $4, resolution_winner = $5, resolution_score1 = $6,
                 resolution_score2 = $7, resolved_by = $8, resolution_note = $9, resolved_at = $10
             WHERE id = $1 AND status = $2",
        )
        .bind(dispute.id.0)
        .bind(expected.as_str())
        .bind(dispute.status.as_str())
        .bind(resolution)
        .bind(winner)
        .bind(score1)
        .bind(score2)
        .bind(dispute.resolved_by.map(|u| u.0))
        .bind(dispute.resolution_note.as_deref())
        .bind(dispute.resolved_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn commit(self: Box<Self>) -> Result<(), LadderError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), LadderError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
