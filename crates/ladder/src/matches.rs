//! Matches and their lifecycle.
//!
//! Every status change of a [`Match`] goes through [`Match::apply`], which
//! consults a single transition table and returns the follow-up work the
//! change implies as [`MatchEffect`]s. Callers execute those effects in the
//! same transaction with [`apply_effects`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::challenge::{Challenge, ChallengeEvent, ChallengeStatus};
use crate::config::after;
use crate::consensus::MatchSubmission;
use crate::dispute::{Dispute, DisputeStatus};
use crate::engine::LadderContext;
use crate::error::LadderError;
use crate::notify::LadderEvent;
use crate::ranking::StatsDelta;
use crate::storage::{LadderTransaction, MatchFilter};
use crate::types::{
    Caller, ChallengeId, Format, Game, GameMode, LadderPlayerId, MatchId, MatchOutcome,
};

/// Lifecycle state of a [`Match`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    InProgress,
    /// Reserved for flows where both sides must report before confirmation.
    /// No transition enters it; it is accepted wherever IN_PROGRESS is.
    AwaitingResults,
    AwaitingConfirmation,
    Completed,
    Disputed,
    Cancelled,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::InProgress => "IN_PROGRESS",
            MatchStatus::AwaitingResults => "AWAITING_RESULTS",
            MatchStatus::AwaitingConfirmation => "AWAITING_CONFIRMATION",
            MatchStatus::Completed => "COMPLETED",
            MatchStatus::Disputed => "DISPUTED",
            MatchStatus::Cancelled => "CANCELLED",
        }
    }

    /// Whether result submissions are still being collected.
    pub fn accepts_submissions(&self) -> bool {
        matches!(
            self,
            MatchStatus::InProgress
                | MatchStatus::AwaitingResults
                | MatchStatus::AwaitingConfirmation
        )
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchStatus {
    type Err = LadderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN_PROGRESS" => Ok(MatchStatus::InProgress),
            "AWAITING_RESULTS" => Ok(MatchStatus::AwaitingResults),
            "AWAITING_CONFIRMATION" => Ok(MatchStatus::AwaitingConfirmation),
            "COMPLETED" => Ok(MatchStatus::Completed),
            "DISPUTED" => Ok(MatchStatus::Disputed),
            "CANCELLED" => Ok(MatchStatus::Cancelled),
            other => Err(LadderError::internal(format!("unknown match status '{other}'"))),
        }
    }
}

/// State changes a match can undergo.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchEvent {
    /// The first submission arrived; confirmation is due by `deadline`.
    ResultReported { deadline: DateTime<Utc> },
    /// Both sides submitted identical results.
    ResultsAgreed(MatchOutcome),
    /// Both sides submitted and disagree.
    ResultsConflicted,
    /// The opponent accepted the first submission.
    Confirmed(MatchOutcome),
    Disputed,
    /// A moderator settled the dispute with this outcome.
    DisputeResolved(MatchOutcome),
    /// Cancelled by a participant before kickoff.
    Cancelled,
    /// Nobody reported a result long after kickoff.
    Abandoned,
}

impl MatchEvent {
    fn name(&self) -> &'static str {
        match self {
            MatchEvent::ResultReported { .. } => "result_reported",
            MatchEvent::ResultsAgreed(_) => "results_agreed",
            MatchEvent::ResultsConflicted => "results_conflicted",
            MatchEvent::Confirmed(_) => "confirmed",
            MatchEvent::Disputed => "disputed",
            MatchEvent::DisputeResolved(_) => "dispute_resolved",
            MatchEvent::Cancelled => "cancelled",
            MatchEvent::Abandoned => "abandoned",
        }
    }
}

/// The match transition table.
fn next_status(from: MatchStatus, event: &MatchEvent) -> Option<MatchStatus> {
    use MatchStatus::*;
    match (from, event) {
        (InProgress | AwaitingResults, MatchEvent::ResultReported { .. }) => {
            Some(AwaitingConfirmation)
        }
        (InProgress | AwaitingResults | AwaitingConfirmation, MatchEvent::ResultsAgreed(_)) => {
            Some(Completed)
        }
        (InProgress | AwaitingResults | AwaitingConfirmation, MatchEvent::ResultsConflicted) => {
            Some(AwaitingConfirmation)
        }
        (AwaitingConfirmation, MatchEvent::Confirmed(_)) => Some(Completed),
        (Completed, MatchEvent::Disputed) => Some(Disputed),
        (Disputed, MatchEvent::DisputeResolved(_)) => Some(Completed),
        (InProgress, MatchEvent::Cancelled | MatchEvent::Abandoned) => Some(Cancelled),
        _ => None,
    }
}

/// Follow-up work implied by a match transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchEffect {
    /// Credit a win and a loss, once per completed match.
    Settle {
        winner: LadderPlayerId,
        loser: LadderPlayerId,
        at: DateTime<Utc>,
    },
    /// Swap a previously settled win and loss.
    ReverseSettlement {
        winner: LadderPlayerId,
        loser: LadderPlayerId,
    },
    ReopenChallenge(ChallengeId),
    CancelChallenge(ChallengeId),
    CompleteChallenge(ChallengeId),
}

/// Outcome of [`Match::apply`].
#[derive(Clone, Debug, PartialEq)]
pub struct MatchTransition {
    pub from: MatchStatus,
    pub next: Match,
    pub effects: Vec<MatchEffect>,
}

/// A scheduled bout between two ladder players.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    /// The challenge creator.
    pub side1: LadderPlayerId,
    /// The challenge acceptor.
    pub side2: LadderPlayerId,
    pub format: Format,
    pub game: Game,
    pub mode: GameMode,
    pub scheduled_at: DateTime<Utc>,
    pub status: MatchStatus,
    pub winner: Option<LadderPlayerId>,
    pub loser: Option<LadderPlayerId>,
    pub score1: Option<i32>,
    pub score2: Option<i32>,
    pub completed_at: Option<DateTime<Utc>>,
    pub validation_deadline: Option<DateTime<Utc>>,
    pub challenge_id: Option<ChallengeId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Match {
    /// The IN_PROGRESS match created when `acceptor` accepts `challenge`.
    pub fn from_challenge(
        challenge: &Challenge,
        acceptor: LadderPlayerId,
        format: Format,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MatchId::new(),
            side1: challenge.creator,
            side2: acceptor,
            format,
            game: challenge.game.clone(),
            mode: challenge.mode.clone(),
            scheduled_at: challenge.scheduled_at,
            status: MatchStatus::InProgress,
            winner: None,
            loser: None,
            score1: None,
            score2: None,
            completed_at: None,
            validation_deadline: None,
            challenge_id: Some(challenge.id),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_side(&self, player: LadderPlayerId) -> bool {
        self.side1 == player || self.side2 == player
    }

    /// The side facing `player`.
    pub fn opponent_of(&self, player: LadderPlayerId) -> Option<LadderPlayerId> {
        if player == self.side1 {
            Some(self.side2)
        } else if player == self.side2 {
            Some(self.side1)
        } else {
            None
        }
    }

    /// The recorded result, once the match has one.
    pub fn outcome(&self) -> Option<MatchOutcome> {
        Some(MatchOutcome {
            winner: self.winner?,
            score1: self.score1?,
            score2: self.score2?,
        })
    }

    /// Apply `event`, returning the updated match and its follow-up effects.
    pub fn apply(&self, event: MatchEvent, now: DateTime<Utc>) -> Result<MatchTransition, LadderError> {
        let status =
            next_status(self.status, &event).ok_or_else(|| LadderError::InvalidTransition {
                entity: "match",
                from: self.status.to_string(),
                event: event.name().to_string(),
            })?;

        let mut next = self.clone();
        next.status = status;
        next.updated_at = now;
        let mut effects = Vec::new();

        match event {
            MatchEvent::ResultReported { deadline } => {
                next.validation_deadline = Some(deadline);
            }
            MatchEvent::ResultsConflicted | MatchEvent::Disputed => {}
            MatchEvent::ResultsAgreed(outcome) | MatchEvent::Confirmed(outcome) => {
                let loser = next.record(outcome)?;
                next.completed_at = Some(now);
                effects.push(MatchEffect::Settle {
                    winner: outcome.winner,
                    loser,
                    at: now,
                });
                if let Some(challenge) = self.challenge_id {
                    effects.push(MatchEffect::CompleteChallenge(challenge));
                }
            }
            MatchEvent::DisputeResolved(outcome) => {
                let previous = self.winner;
                let loser = next.record(outcome)?;
                if previous.is_some_and(|w| w != outcome.winner) {
                    effects.push(MatchEffect::ReverseSettlement {
                        winner: outcome.winner,
                        loser,
                    });
                }
            }
            MatchEvent::Cancelled => {
                if let Some(challenge) = self.challenge_id {
                    effects.push(MatchEffect::ReopenChallenge(challenge));
                }
            }
            MatchEvent::Abandoned => {
                if let Some(challenge) = self.challenge_id {
                    effects.push(MatchEffect::CancelChallenge(challenge));
                }
            }
        }

        Ok(MatchTransition {
            from: self.status,
            next,
            effects,
        })
    }

    /// Copy `outcome` onto the match and return the losing side.
    fn record(&mut self, outcome: MatchOutcome) -> Result<LadderPlayerId, LadderError> {
        if outcome.score1 < 0 || outcome.score2 < 0 {
            return Err(LadderError::validation("scores cannot be negative"));
        }
        let loser = self.opponent_of(outcome.winner).ok_or_else(|| {
            LadderError::validation("winner must be one of the match participants")
        })?;
        self.winner = Some(outcome.winner);
        self.loser = Some(loser);
        self.score1 = Some(outcome.score1);
        self.score2 = Some(outcome.score2);
        Ok(loser)
    }
}

/// Write `transition` and run its effects inside `tx`.
///
/// Fails with a conflict if the match changed status since it was read.
pub(crate) async fn commit_transition(
    tx: &mut dyn LadderTransaction,
    transition: &MatchTransition,
    now: DateTime<Utc>,
) -> Result<(), LadderError> {
    if !tx.update_match(&transition.next, transition.from).await? {
        return Err(LadderError::conflict(format!(
            "match {} changed concurrently",
            transition.next.id
        )));
    }
    apply_effects(tx, &transition.effects, now).await
}

/// Execute match effects inside `tx`.
pub(crate) async fn apply_effects(
    tx: &mut dyn LadderTransaction,
    effects: &[MatchEffect],
    now: DateTime<Utc>,
) -> Result<(), LadderError> {
    for effect in effects {
        match *effect {
            MatchEffect::Settle { winner, loser, at } => {
                tx.apply_stats(winner, &StatsDelta::win(at)).await?;
                tx.apply_stats(loser, &StatsDelta::loss(at)).await?;
            }
            MatchEffect::ReverseSettlement { winner, loser } => {
                tx.apply_stats(winner, &StatsDelta::overturned_to_win()).await?;
                tx.apply_stats(loser, &StatsDelta::overturned_to_loss()).await?;
            }
            MatchEffect::ReopenChallenge(id) => {
                cascade_challenge(tx, id, ChallengeEvent::Reopen, now).await?;
            }
            MatchEffect::CancelChallenge(id) => {
                cascade_challenge(tx, id, ChallengeEvent::Cancel, now).await?;
            }
            MatchEffect::CompleteChallenge(id) => {
                cascade_challenge(tx, id, ChallengeEvent::Complete, now).await?;
            }
        }
    }
    Ok(())
}

async fn cascade_challenge(
    tx: &mut dyn LadderTransaction,
    id: ChallengeId,
    event: ChallengeEvent,
    now: DateTime<Utc>,
) -> Result<(), LadderError> {
    let Some(challenge) = tx.get_challenge(id).await? else {
        tracing::debug!(challenge_id = %id, "originating challenge no longer exists");
        return Ok(());
    };
    if challenge.status != ChallengeStatus::Accepted {
        tracing::warn!(
            challenge_id = %id,
            status = %challenge.status,
            "originating challenge is not ACCEPTED; leaving it unchanged"
        );
        return Ok(());
    }
    let next = challenge.apply(event, now)?;
    if !tx.update_challenge(&next, ChallengeStatus::Accepted).await? {
        return Err(LadderError::conflict(format!(
            "challenge {id} changed concurrently"
        )));
    }
    Ok(())
}

/// A match with everything a participant may see about it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchDetails {
    #[serde(rename = "match")]
    pub details: Match,
    pub submissions: Vec<MatchSubmission>,
    pub pending_disputes: Vec<Dispute>,
}

/// Participant-facing match operations: cancellation and read models.
#[derive(Clone)]
pub struct MatchManager {
    ctx: Arc<LadderContext>,
}

impl MatchManager {
    pub(crate) fn new(ctx: Arc<LadderContext>) -> Self {
        Self { ctx }
    }

    /// Cancel an IN_PROGRESS match more than the cancellation cutoff before
    /// kickoff. The originating challenge becomes PENDING again.
    #[instrument(skip_all, fields(user = %caller.user, match_id = %match_id))]
    pub async fn cancel_match(&self, caller: &Caller, match_id: MatchId) -> Result<Match, LadderError> {
        let now = self.ctx.now();
        let mut tx = self.ctx.store.begin().await?;
        let current = tx
            .lock_match(match_id)
            .await?
            .ok_or_else(|| LadderError::not_found("match", match_id))?;
        let sides = self.ctx.participants(tx.as_mut(), &current).await?;
        let side = self.ctx.side_of(caller, &sides).await?;
        if side.is_none() {
            return Err(LadderError::unauthorized("only participants can cancel a match"));
        }

        if current.status != MatchStatus::InProgress {
            return Err(LadderError::conflict(format!(
                "match is {} and can no longer be cancelled",
                current.status
            )));
        }
        if current.scheduled_at <= after(now, self.ctx.config.cutoff())? {
            return Err(LadderError::conflict(
                "matches can only be cancelled more than one hour before kickoff",
            ));
        }

        let transition = current.apply(MatchEvent::Cancelled, now)?;
        commit_transition(tx.as_mut(), &transition, now).await?;
        tx.commit().await?;

        tracing::info!("match cancelled");
        self.ctx
            .notifier
            .publish(
                &sides.owners(),
                LadderEvent::MatchCancelled { match_id },
            )
            .await;
        Ok(transition.next)
    }

    /// The match, its submissions and its pending disputes. Participants only.
    #[instrument(skip_all, fields(user = %caller.user, match_id = %match_id))]
    pub async fn get_match_details(
        &self,
        caller: &Caller,
        match_id: MatchId,
    ) -> Result<MatchDetails, LadderError> {
        let mut tx = self.ctx.store.begin().await?;
        let details = tx
            .get_match(match_id)
            .await?
            .ok_or_else(|| LadderError::not_found("match", match_id))?;
        let sides = self.ctx.participants(tx.as_mut(), &details).await?;
        if self.ctx.side_of(caller, &sides).await?.is_none() {
            return Err(LadderError::unauthorized("only participants can view this match"));
        }
        let submissions = tx.list_submissions(match_id).await?;
        let pending_disputes = tx
            .list_disputes(match_id, Some(DisputeStatus::Pending))
            .await?;
        tx.commit().await?;

        Ok(MatchDetails {
            details,
            submissions,
            pending_disputes,
        })
    }

    /// The caller's matches in a game mode, latest first.
    #[instrument(skip_all, fields(user = %caller.user, game = %game, mode = %mode))]
    pub async fn list_my_matches(
        &self,
        caller: &Caller,
        game: &Game,
        mode: &GameMode,
        status: Option<MatchStatus>,
    ) -> Result<Vec<Match>, LadderError> {
        let mode_config = self.ctx.mode(game, mode)?;
        let owner = self.ctx.competitor_for(caller, mode_config).await?;

        let mut tx = self.ctx.store.begin().await?;
        let Some(player) = tx.find_player(owner, game, mode).await? else {
            return Ok(Vec::new());
        };
        let matches = tx
            .list_matches(&MatchFilter {
                player: player.id,
                status,
            })
            .await?;
        tx.commit().await?;

        tracing::debug!(count = matches.len(), "listed matches");
        Ok(matches)
    }
}
