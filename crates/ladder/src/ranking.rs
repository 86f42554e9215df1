//! Ladder standings and rank computation.
//!
//! Ranks are ordinal positions among players that have played at least one
//! match, ordered by victories (desc), defeats (asc), last match (latest
//! first), then player id. The order is total, so recomputing without new
//! results never changes an assignment.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::engine::LadderContext;
use crate::error::LadderError;
use crate::types::{Caller, Competitor, Game, GameMode, LadderPlayerId};

/// A competitor's standing in one game mode.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LadderPlayer {
    pub id: LadderPlayerId,
    pub owner: Competitor,
    pub game: Game,
    pub mode: GameMode,
    pub victories: i32,
    pub defeats: i32,
    pub matches_played: i32,
    pub last_match_at: Option<DateTime<Utc>>,
    /// Position from the last rank pass; `None` until the first match.
    pub rank: Option<i32>,
    pub created_at: DateTime<Utc>,
}

impl LadderPlayer {
    pub fn new(owner: Competitor, game: Game, mode: GameMode, now: DateTime<Utc>) -> Self {
        Self {
            id: LadderPlayerId::new(),
            owner,
            game,
            mode,
            victories: 0,
            defeats: 0,
            matches_played: 0,
            last_match_at: None,
            rank: None,
            created_at: now,
        }
    }

    /// Add `delta` to this player's counters.
    pub fn apply(&mut self, delta: &StatsDelta) {
        self.victories += delta.victories;
        self.defeats += delta.defeats;
        self.matches_played += delta.matches_played;
        if let Some(at) = delta.last_match_at {
            self.last_match_at = Some(at);
        }
    }
}

/// A change to a player's counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsDelta {
    pub victories: i32,
    pub defeats: i32,
    pub matches_played: i32,
    pub last_match_at: Option<DateTime<Utc>>,
}

impl StatsDelta {
    pub fn win(at: DateTime<Utc>) -> Self {
        Self {
            victories: 1,
            matches_played: 1,
            last_match_at: Some(at),
            ..Default::default()
        }
    }

    pub fn loss(at: DateTime<Utc>) -> Self {
        Self {
            defeats: 1,
            matches_played: 1,
            last_match_at: Some(at),
            ..Default::default()
        }
    }

    /// A recorded loss that a moderator turned into a win.
    pub fn overturned_to_win() -> Self {
        Self {
            victories: 1,
            defeats: -1,
            ..Default::default()
        }
    }

    /// A recorded win that a moderator turned into a loss.
    pub fn overturned_to_loss() -> Self {
        Self {
            victories: -1,
            defeats: 1,
            ..Default::default()
        }
    }
}

/// Ladder order between two players.
pub fn rank_order(a: &LadderPlayer, b: &LadderPlayer) -> Ordering {
    b.victories
        .cmp(&a.victories)
        .then_with(|| a.defeats.cmp(&b.defeats))
        // `None` sorts before `Some`, so reversing puts players without a
        // recorded match last.
        .then_with(|| b.last_match_at.cmp(&a.last_match_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Assign ranks 1..n to players with at least one match played.
pub fn compute_ranks(players: &[LadderPlayer]) -> Vec<(LadderPlayerId, i32)> {
    let mut ranked: Vec<&LadderPlayer> = players.iter().filter(|p| p.matches_played > 0).collect();
    ranked.sort_by(|a, b| rank_order(a, b));
    ranked
        .into_iter()
        .zip(1..)
        .map(|(p, rank)| (p.id, rank))
        .collect()
}

/// A row of the live leaderboard.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Standing {
    pub position: i32,
    pub player: LadderPlayer,
}

/// A player with their live position.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerStats {
    pub player: LadderPlayer,
    /// `None` until the player has completed a match.
    pub position: Option<i32>,
}

/// Rank maintenance and leaderboard queries.
#[derive(Clone)]
pub struct RankingEngine {
    ctx: Arc<LadderContext>,
}

impl RankingEngine {
    pub(crate) fn new(ctx: Arc<LadderContext>) -> Self {
        Self { ctx }
    }

    /// Recompute stored ranks of one game mode. Returns how many players changed rank.
    #[instrument(skip_all, fields(game = %game, mode = %mode))]
    pub async fn recompute(&self, game: &Game, mode: &GameMode) -> Result<usize, LadderError> {
        let mut tx = self.ctx.store.begin().await?;
        let players = tx.list_players(game, mode).await?;
        let ranks: HashMap<LadderPlayerId, i32> = compute_ranks(&players).into_iter().collect();

        let mut changed = 0;
        for player in &players {
            let rank = ranks.get(&player.id).copied();
            if player.rank != rank {
                tx.set_rank(player.id, rank).await?;
                changed += 1;
            }
        }
        tx.commit().await?;

        tracing::debug!(players = players.len(), changed, "ranks recomputed");
        Ok(changed)
    }

    /// Recompute every game mode that has players. A failing mode is logged
    /// and skipped.
    pub async fn recompute_all(&self) -> Result<usize, LadderError> {
        let mut tx = self.ctx.store.begin().await?;
        let modes = tx.list_game_modes().await?;
        tx.commit().await?;

        let mut changed = 0;
        for (game, mode) in modes {
            match self.recompute(&game, &mode).await {
                Ok(n) => changed += n,
                Err(e) => {
                    tracing::warn!(game = %game, mode = %mode, error = %e, "rank recompute failed");
                }
            }
        }
        Ok(changed)
    }

    /// The top `limit` standings, computed from current counters.
    #[instrument(skip_all, fields(game = %game, mode = %mode))]
    pub async fn leaderboard(
        &self,
        game: &Game,
        mode: &GameMode,
        limit: usize,
    ) -> Result<Vec<Standing>, LadderError> {
        self.ctx.mode(game, mode)?;
        let mut tx = self.ctx.store.begin().await?;
        let mut players = tx.list_players(game, mode).await?;
        tx.commit().await?;

        players.retain(|p| p.matches_played > 0);
        players.sort_by(rank_order);
        Ok(players
            .into_iter()
            .take(limit)
            .zip(1..)
            .map(|(player, position)| Standing { position, player })
            .collect())
    }

    /// The caller's standing, creating it on first access.
    #[instrument(skip_all, fields(user = %caller.user, game = %game, mode = %mode))]
    pub async fn player_stats(
        &self,
        caller: &Caller,
        game: &Game,
        mode: &GameMode,
    ) -> Result<PlayerStats, LadderError> {
        let now = self.ctx.now();
        let mode_config = self.ctx.mode(game, mode)?;
        let owner = self.ctx.competitor_for(caller, mode_config).await?;

        let mut tx = self.ctx.store.begin().await?;
        let player = tx.get_or_create_player(owner, game, mode, now).await?;
        let players = tx.list_players(game, mode).await?;
        tx.commit().await?;

        let position = compute_ranks(&players)
            .into_iter()
            .find(|(id, _)| *id == player.id)
            .map(|(_, rank)| rank);
        Ok(PlayerStats { player, position })
    }
}
