//! Engine assembly.
//!
//! [`Ladder`] wires a store and the external collaborators into the
//! component services:
//!
//! ```
//! # async fn demo() -> Result<(), ladder::error::LadderError> {
//! use std::sync::Arc;
//! use ladder::prelude::*;
//!
//! let ladder = Ladder::builder(Arc::new(MemoryStore::new())).build()?;
//! let board = ladder
//!     .ranking()
//!     .leaderboard(&Game::new("FC_26"), &GameMode::new("1v1"), 10)
//!     .await?;
//! assert!(board.is_empty());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::challenge::ChallengeManager;
use crate::clock::{Clock, SystemClock};
use crate::config::{GameModeConfig, LadderConfig};
use crate::consensus::ConsensusEngine;
use crate::dispute::DisputeManager;
use crate::error::LadderError;
use crate::matches::{Match, MatchManager};
use crate::notify::{NoopSink, NotificationSink, Notifier};
use crate::ranking::{LadderPlayer, RankingEngine};
use crate::roster::{NoRosters, RosterService};
use crate::stats::LadderStats;
use crate::storage::{LadderStore, LadderTransaction};
use crate::sweeper::Sweeper;
use crate::types::{Caller, Competitor, EvidenceRef, Format, Game, GameMode, LadderPlayerId};

/// Shared state behind every component service.
pub(crate) struct LadderContext {
    pub(crate) store: Arc<dyn LadderStore>,
    pub(crate) roster: Arc<dyn RosterService>,
    pub(crate) notifier: Notifier,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: LadderConfig,
}

/// The two ladder players of a match.
pub(crate) struct Participants {
    pub(crate) side1: LadderPlayer,
    pub(crate) side2: LadderPlayer,
}

impl Participants {
    pub(crate) fn owners(&self) -> [Competitor; 2] {
        [self.side1.owner, self.side2.owner]
    }
}

impl LadderContext {
    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// The configuration of an enabled game mode.
    pub(crate) fn mode(&self, game: &Game, mode: &GameMode) -> Result<&GameModeConfig, LadderError> {
        self.config.mode(game, mode).ok_or_else(|| {
            LadderError::validation(format!("game mode {game} {mode} is not enabled"))
        })
    }

    pub(crate) fn check_evidence(&self, evidence: &[EvidenceRef]) -> Result<(), LadderError> {
        if evidence.len() > self.config.max_evidence {
            return Err(LadderError::validation(format!(
                "at most {} evidence references are allowed",
                self.config.max_evidence
            )));
        }
        if evidence.iter().any(|e| e.as_str().trim().is_empty()) {
            return Err(LadderError::validation("evidence references cannot be empty"));
        }
        Ok(())
    }

    /// Who the caller competes as in `mode`: themselves in solo modes, their
    /// roster in team modes.
    pub(crate) async fn competitor_for(
        &self,
        caller: &Caller,
        mode: &GameModeConfig,
    ) -> Result<Competitor, LadderError> {
        match mode.format {
            Format::Solo => Ok(Competitor::User(caller.user)),
            Format::Team => self
                .roster
                .roster_for(caller.user, &mode.game, &mode.mode)
                .await?
                .map(Competitor::Team)
                .ok_or_else(|| {
                    LadderError::unauthorized(format!(
                        "you are not on a roster for {} {}",
                        mode.game, mode.mode
                    ))
                }),
        }
    }

    /// Whether the caller may act for `owner`.
    pub(crate) async fn acts_for(
        &self,
        caller: &Caller,
        owner: &Competitor,
    ) -> Result<bool, LadderError> {
        match owner {
            Competitor::User(user) => Ok(*user == caller.user),
            Competitor::Team(team) => self.roster.is_member(caller.user, *team).await,
        }
    }

    pub(crate) async fn participants(
        &self,
        tx: &mut dyn LadderTransaction,
        m: &Match,
    ) -> Result<Participants, LadderError> {
        let missing = |id: LadderPlayerId| {
            LadderError::internal(format!("match {} refers to missing player {id}", m.id))
        };
        let side1 = tx.get_player(m.side1).await?.ok_or_else(|| missing(m.side1))?;
        let side2 = tx.get_player(m.side2).await?.ok_or_else(|| missing(m.side2))?;
        Ok(Participants { side1, side2 })
    }

    /// The side the caller plays for, if any.
    pub(crate) async fn side_of(
        &self,
        caller: &Caller,
        sides: &Participants,
    ) -> Result<Option<LadderPlayerId>, LadderError> {
        for side in [&sides.side1, &sides.side2] {
            if self.acts_for(caller, &side.owner).await? {
                return Ok(Some(side.id));
            }
        }
        Ok(None)
    }
}

/// Builder for [`Ladder`].
pub struct LadderBuilder {
    store: Arc<dyn LadderStore>,
    roster: Arc<dyn RosterService>,
    sink: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    config: LadderConfig,
}

impl LadderBuilder {
    pub fn roster(mut self, roster: Arc<dyn RosterService>) -> Self {
        self.roster = roster;
        self
    }

    pub fn notifications(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(mut self, config: LadderConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate the configuration and assemble the engine.
    pub fn build(self) -> Result<Ladder, LadderError> {
        self.config.validate()?;
        let notifier = Notifier::new(self.sink, self.roster.clone());
        Ok(Ladder {
            ctx: Arc::new(LadderContext {
                store: self.store,
                roster: self.roster,
                notifier,
                clock: self.clock,
                config: self.config,
            }),
        })
    }
}

/// The ladder engine.
///
/// Cheap to clone; every clone shares the same store and collaborators.
#[derive(Clone)]
pub struct Ladder {
    ctx: Arc<LadderContext>,
}

impl Ladder {
    /// Start building an engine over `store`. Without further configuration it
    /// uses the wall clock, no rosters, discards notifications and runs with
    /// [`LadderConfig::default`].
    pub fn builder(store: Arc<dyn LadderStore>) -> LadderBuilder {
        LadderBuilder {
            store,
            roster: Arc::new(NoRosters),
            sink: Arc::new(NoopSink),
            clock: Arc::new(SystemClock),
            config: LadderConfig::default(),
        }
    }

    pub fn config(&self) -> &LadderConfig {
        &self.ctx.config
    }

    pub fn challenges(&self) -> ChallengeManager {
        ChallengeManager::new(self.ctx.clone())
    }

    pub fn matches(&self) -> MatchManager {
        MatchManager::new(self.ctx.clone())
    }

    pub fn results(&self) -> ConsensusEngine {
        ConsensusEngine::new(self.ctx.clone())
    }

    pub fn disputes(&self) -> DisputeManager {
        DisputeManager::new(self.ctx.clone())
    }

    pub fn ranking(&self) -> RankingEngine {
        RankingEngine::new(self.ctx.clone())
    }

    pub fn stats(&self) -> LadderStats {
        LadderStats::new(self.ctx.clone())
    }

    pub fn sweeper(&self) -> Sweeper {
        Sweeper::new(self.ctx.clone())
    }
}
