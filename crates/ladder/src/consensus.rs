//! Result consensus.
//!
//! Each side of a match reports the result once. Two identical reports
//! complete the match immediately; a single report waits for the opponent to
//! either confirm it or report their own; two differing reports leave the
//! match in AWAITING_CONFIRMATION for a moderator. Confirmation always accepts
//! the *first* recorded report verbatim.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::config::after;
use crate::engine::LadderContext;
use crate::error::LadderError;
use crate::matches::{commit_transition, Match, MatchEvent, MatchStatus};
use crate::notify::LadderEvent;
use crate::types::{
    Caller, EvidenceRef, LadderPlayerId, MatchId, MatchOutcome, SubmissionId, UserId,
};

/// One side's claim about a match result. Immutable apart from `validated`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchSubmission {
    pub id: SubmissionId,
    pub match_id: MatchId,
    /// The reporting side. At most one submission per side.
    pub side: LadderPlayerId,
    pub submitted_by: UserId,
    pub claimed_winner: LadderPlayerId,
    pub score1: i32,
    pub score2: i32,
    pub evidence: Vec<EvidenceRef>,
    /// Set once the claim became the match's recorded result.
    pub validated: bool,
    pub submitted_at: DateTime<Utc>,
}

impl MatchSubmission {
    pub fn outcome(&self) -> MatchOutcome {
        MatchOutcome {
            winner: self.claimed_winner,
            score1: self.score1,
            score2: self.score2,
        }
    }
}

/// A result as reported by a participant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResultClaim {
    pub winner: LadderPlayerId,
    pub score1: i32,
    pub score2: i32,
    #[serde(default)]
    pub evidence: Vec<EvidenceRef>,
}

/// What the recorded submissions say about a match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    /// Zero or one side has reported.
    AwaitingOpponent,
    /// Both sides reported the same winner and scores.
    Agreed { outcome: MatchOutcome },
    /// Both sides reported and disagree on at least one field.
    Conflicting,
}

/// Compare the submissions of both sides of `m`.
pub fn evaluate(m: &Match, submissions: &[MatchSubmission]) -> Verdict {
    let first = submissions.iter().find(|s| s.side == m.side1);
    let second = submissions.iter().find(|s| s.side == m.side2);
    match (first, second) {
        (Some(a), Some(b)) if a.outcome() == b.outcome() => Verdict::Agreed {
            outcome: a.outcome(),
        },
        (Some(_), Some(_)) => Verdict::Conflicting,
        _ => Verdict::AwaitingOpponent,
    }
}

/// Returned by [`ConsensusEngine::submit_result`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub submission: MatchSubmission,
    pub status: MatchStatus,
    pub verdict: Verdict,
}

/// Records result submissions and settles matches.
#[derive(Clone)]
pub struct ConsensusEngine {
    ctx: Arc<LadderContext>,
}

impl ConsensusEngine {
    pub(crate) fn new(ctx: Arc<LadderContext>) -> Self {
        Self { ctx }
    }

    /// Record the caller's side's claim and evaluate consensus.
    #[instrument(skip_all, fields(user = %caller.user, match_id = %match_id))]
    pub async fn submit_result(
        &self,
        caller: &Caller,
        match_id: MatchId,
        claim: ResultClaim,
    ) -> Result<SubmissionReceipt, LadderError> {
        if claim.score1 < 0 || claim.score2 < 0 {
            return Err(LadderError::validation("scores cannot be negative"));
        }
        self.ctx.check_evidence(&claim.evidence)?;

        let now = self.ctx.now();
        let mut tx = self.ctx.store.begin().await?;
        let current = tx
            .lock_match(match_id)
            .await?
            .ok_or_else(|| LadderError::not_found("match", match_id))?;
        let sides = self.ctx.participants(tx.as_mut(), &current).await?;
        let side = self
            .ctx
            .side_of(caller, &sides)
            .await?
            .ok_or_else(|| LadderError::unauthorized("only participants can submit a result"))?;

        if !current.status.accepts_submissions() {
            return Err(LadderError::conflict(format!(
                "match is {} and no longer accepts results",
                current.status
            )));
        }
        if !current.has_side(claim.winner) {
            return Err(LadderError::validation(
                "winner must be one of the match participants",
            ));
        }

        let mut submission = MatchSubmission {
            id: SubmissionId::new(),
            match_id,
            side,
            submitted_by: caller.user,
            claimed_winner: claim.winner,
            score1: claim.score1,
            score2: claim.score2,
            evidence: claim.evidence,
            validated: false,
            submitted_at: now,
        };
        tx.insert_submission(&submission).await?;

        let submissions = tx.list_submissions(match_id).await?;
        let verdict = evaluate(&current, &submissions);
        let event = match verdict {
            Verdict::Agreed { outcome } => Some(MatchEvent::ResultsAgreed(outcome)),
            Verdict::Conflicting => Some(MatchEvent::ResultsConflicted),
            Verdict::AwaitingOpponent if current.status == MatchStatus::AwaitingConfirmation => {
                None
            }
            Verdict::AwaitingOpponent => Some(MatchEvent::ResultReported {
                deadline: after(now, self.ctx.config.validation())?,
            }),
        };

        let updated = match event {
            Some(event) => {
                let transition = current.apply(event, now)?;
                commit_transition(tx.as_mut(), &transition, now).await?;
                transition.next
            }
            None => current,
        };
        if matches!(verdict, Verdict::Agreed { .. }) {
            for s in &submissions {
                tx.mark_submission_validated(s.id).await?;
            }
            submission.validated = true;
        }
        tx.commit().await?;

        tracing::info!(
            side = %side,
            status = %updated.status,
            verdict = ?verdict,
            "match result submitted"
        );
        let owners = sides.owners();
        self.ctx
            .notifier
            .publish(
                &owners,
                LadderEvent::ResultSubmitted {
                    match_id,
                    side,
                    status: updated.status,
                },
            )
            .await;
        if let Verdict::Agreed { outcome } = verdict {
            self.ctx
                .notifier
                .publish(&owners, completed_event(match_id, outcome))
                .await;
        }

        Ok(SubmissionReceipt {
            submission,
            status: updated.status,
            verdict,
        })
    }

    /// Accept the first recorded submission as the final result.
    ///
    /// Only the side that did not make that submission may confirm it.
    #[instrument(skip_all, fields(user = %caller.user, match_id = %match_id))]
    pub async fn confirm_result(
        &self,
        caller: &Caller,
        match_id: MatchId,
    ) -> Result<Match, LadderError> {
        let now = self.ctx.now();
        let mut tx = self.ctx.store.begin().await?;
        let current = tx
            .lock_match(match_id)
            .await?
            .ok_or_else(|| LadderError::not_found("match", match_id))?;
        let sides = self.ctx.participants(tx.as_mut(), &current).await?;
        let side = self
            .ctx
            .side_of(caller, &sides)
            .await?
            .ok_or_else(|| LadderError::unauthorized("only participants can confirm a result"))?;

        if current.status != MatchStatus::AwaitingConfirmation {
            return Err(LadderError::conflict(format!(
                "match is {} and has no result awaiting confirmation",
                current.status
            )));
        }
        let submissions = tx.list_submissions(match_id).await?;
        let first = submissions
            .first()
            .ok_or_else(|| LadderError::conflict("no result has been submitted"))?;
        if first.side == side {
            return Err(LadderError::validation(
                "you cannot confirm your own submission",
            ));
        }

        let outcome = first.outcome();
        let transition = current.apply(MatchEvent::Confirmed(outcome), now)?;
        commit_transition(tx.as_mut(), &transition, now).await?;
        tx.mark_submission_validated(first.id).await?;
        tx.commit().await?;

        tracing::info!(winner = %outcome.winner, score = %outcome.score_line(), "match result confirmed");
        self.ctx
            .notifier
            .publish(&sides.owners(), completed_event(match_id, outcome))
            .await;
        Ok(transition.next)
    }
}

fn completed_event(match_id: MatchId, outcome: MatchOutcome) -> LadderEvent {
    LadderEvent::MatchCompleted {
        match_id,
        winner: outcome.winner,
        score1: outcome.score1,
        score2: outcome.score2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::Challenge;
    use crate::types::{Format, Game, GameMode};

    fn fixture() -> Match {
        let now = Utc::now();
        let challenge = Challenge::new(
            LadderPlayerId::new(),
            Game::new("FC_26"),
            GameMode::new("1v1"),
            now,
            None,
            now,
        );
        Match::from_challenge(&challenge, LadderPlayerId::new(), Format::Solo, now)
    }

    fn claim(m: &Match, side: LadderPlayerId, winner: LadderPlayerId, s1: i32, s2: i32) -> MatchSubmission {
        MatchSubmission {
            id: SubmissionId::new(),
            match_id: m.id,
            side,
            submitted_by: UserId::new(),
            claimed_winner: winner,
            score1: s1,
            score2: s2,
            evidence: Vec::new(),
            validated: false,
            submitted_at: m.created_at,
        }
    }

    #[test]
    fn single_submission_awaits_opponent() {
        let m = fixture();
        assert_eq!(evaluate(&m, &[]), Verdict::AwaitingOpponent);
        let a = claim(&m, m.side1, m.side1, 3, 1);
        assert_eq!(evaluate(&m, &[a]), Verdict::AwaitingOpponent);
    }

    #[test]
    fn identical_claims_agree() {
        let m = fixture();
        let a = claim(&m, m.side1, m.side1, 3, 1);
        let b = claim(&m, m.side2, m.side1, 3, 1);
        assert_eq!(
            evaluate(&m, &[a, b]),
            Verdict::Agreed {
                outcome: MatchOutcome {
                    winner: m.side1,
                    score1: 3,
                    score2: 1
                }
            }
        );
    }

    #[test]
    fn any_difference_conflicts() {
        let m = fixture();
        let a = claim(&m, m.side1, m.side1, 3, 1);
        for b in [
            claim(&m, m.side2, m.side2, 1, 3),
            claim(&m, m.side2, m.side1, 3, 2),
            claim(&m, m.side2, m.side1, 2, 1),
        ] {
            assert_eq!(evaluate(&m, &[a.clone(), b]), Verdict::Conflicting);
        }
    }

    #[test]
    fn verdict_serializes_tagged() {
        let json = serde_json::to_value(Verdict::Conflicting).unwrap();
        assert_eq!(json["verdict"], "conflicting");
    }
}
