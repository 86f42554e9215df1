//! Roster collaborator.
//!
//! Team game modes are played by rosters managed outside the engine. The
//! engine only asks which roster a user plays for and who is on it.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::LadderError;
use crate::types::{Game, GameMode, TeamId, UserId};

/// Read-only view of team rosters.
#[async_trait]
pub trait RosterService: Send + Sync {
    /// The roster `user` plays for in `(game, mode)`, if any.
    async fn roster_for(
        &self,
        user: UserId,
        game: &Game,
        mode: &GameMode,
    ) -> Result<Option<TeamId>, LadderError>;

    /// Whether `user` is currently on `team`.
    async fn is_member(&self, user: UserId, team: TeamId) -> Result<bool, LadderError>;

    /// Current members of `team`.
    async fn members(&self, team: TeamId) -> Result<Vec<UserId>, LadderError>;
}

/// Roster service for deployments without team modes.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoRosters;

#[async_trait]
impl RosterService for NoRosters {
    async fn roster_for(
        &self,
        _user: UserId,
        _game: &Game,
        _mode: &GameMode,
    ) -> Result<Option<TeamId>, LadderError> {
        Ok(None)
    }

    async fn is_member(&self, _user: UserId, _team: TeamId) -> Result<bool, LadderError> {
        Ok(false)
    }

    async fn members(&self, _team: TeamId) -> Result<Vec<UserId>, LadderError> {
        Ok(Vec::new())
    }
}

#[derive(Clone, Debug)]
struct Roster {
    game: Game,
    mode: GameMode,
    members: Vec<UserId>,
}

/// In-process roster table.
#[derive(Debug, Default)]
pub struct StaticRoster {
    teams: RwLock<HashMap<TeamId, Roster>>,
}

impl StaticRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a roster for `(game, mode)`, replacing any previous one with the same id.
    pub fn add_team(&self, team: TeamId, game: Game, mode: GameMode, members: Vec<UserId>) {
        self.teams.write().insert(
            team,
            Roster {
                game,
                mode,
                members,
            },
        );
    }

    pub fn remove_member(&self, team: TeamId, user: UserId) {
        if let Some(roster) = self.teams.write().get_mut(&team) {
            roster.members.retain(|m| *m != user);
        }
    }
}

#[async_trait]
impl RosterService for StaticRoster {
    async fn roster_for(
        &self,
        user: UserId,
        game: &Game,
        mode: &GameMode,
    ) -> Result<Option<TeamId>, LadderError> {
        let teams = self.teams.read();
        // Lowest team id first so the answer is stable across calls.
        let mut matching: Vec<TeamId> = teams
            .iter()
            .filter(|(_, r)| &r.game == game && &r.mode == mode && r.members.contains(&user))
            .map(|(id, _)| *id)
            .collect();
        matching.sort();
        Ok(matching.into_iter().next())
    }

    async fn is_member(&self, user: UserId, team: TeamId) -> Result<bool, LadderError> {
        Ok(self
            .teams
            .read()
            .get(&team)
            .is_some_and(|r| r.members.contains(&user)))
    }

    async fn members(&self, team: TeamId) -> Result<Vec<UserId>, LadderError> {
        Ok(self
            .teams
            .read()
            .get(&team)
            .map(|r| r.members.clone())
            .unwrap_or_default())
    }
}
