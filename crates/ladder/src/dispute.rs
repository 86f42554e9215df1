//! Disputes against completed matches.
//!
//! A participant who did not submit the recorded result may contest it once
//! the match is COMPLETED. The match moves to DISPUTED until a moderator
//! resolves the dispute, which returns it to COMPLETED with either the same
//! or a corrected result.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::engine::LadderContext;
use crate::error::LadderError;
use crate::matches::{commit_transition, MatchEvent, MatchStatus};
use crate::notify::LadderEvent;
use crate::types::{
    Caller, DisputeId, EvidenceRef, LadderPlayerId, MatchId, MatchOutcome, UserId,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisputeStatus {
    Pending,
    Resolved,
}

impl DisputeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisputeStatus::Pending => "PENDING",
            DisputeStatus::Resolved => "RESOLVED",
        }
    }
}

impl fmt::Display for DisputeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DisputeStatus {
    type Err = LadderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(DisputeStatus::Pending),
            "RESOLVED" => Ok(DisputeStatus::Resolved),
            other => Err(LadderError::internal(format!(
                "unknown dispute status '{other}'"
            ))),
        }
    }
}

/// A moderator's decision on a dispute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum DisputeResolution {
    /// The recorded result stands.
    Upheld,
    /// The recorded result is replaced.
    Overturned {
        winner: LadderPlayerId,
        score1: i32,
        score2: i32,
    },
}

/// A formal challenge to a completed match's result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dispute {
    pub id: DisputeId,
    pub match_id: MatchId,
    pub disputed_by: UserId,
    /// The side the disputer plays for.
    pub side: LadderPlayerId,
    pub reason: String,
    pub description: Option<String>,
    pub evidence: Vec<EvidenceRef>,
    pub status: DisputeStatus,
    pub resolution: Option<DisputeResolution>,
    pub resolved_by: Option<UserId>,
    pub resolution_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Parameters of [`DisputeManager::raise_dispute`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DisputeClaim {
    pub reason: String,
    pub description: Option<String>,
    #[serde(default)]
    pub evidence: Vec<EvidenceRef>,
}

#[derive(Clone)]
pub struct DisputeManager {
    ctx: Arc<LadderContext>,
}

impl DisputeManager {
    pub(crate) fn new(ctx: Arc<LadderContext>) -> Self {
        Self { ctx }
    }

    /// Contest the recorded result of a COMPLETED match.
    #[instrument(skip_all, fields(user = %caller.user, match_id = %match_id))]
    pub async fn raise_dispute(
        &self,
        caller: &Caller,
        match_id: MatchId,
        claim: DisputeClaim,
    ) -> Result<Dispute, LadderError> {
        let reason = claim.reason.trim();
        if reason.is_empty() {
            return Err(LadderError::validation("a dispute needs a reason"));
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
            .ok_or_else(|| LadderError::unauthorized("only participants can dispute a match"))?;

        if current.status != MatchStatus::Completed {
            return Err(LadderError::conflict("only completed matches can be disputed"));
        }
        if !tx
            .list_disputes(match_id, Some(DisputeStatus::Pending))
            .await?
            .is_empty()
        {
            return Err(LadderError::conflict(
                "a dispute is already pending for this match",
            ));
        }
        let submitter = tx.list_submissions(match_id).await?.first().map(|s| s.side);
        if submitter == Some(side) {
            return Err(LadderError::conflict(
                "you cannot dispute a result you submitted",
            ));
        }

        let dispute = Dispute {
            id: DisputeId::new(),
            match_id,
            disputed_by: caller.user,
            side,
            reason: reason.to_string(),
            description: claim
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            evidence: claim.evidence,
            status: DisputeStatus::Pending,
            resolution: None,
            resolved_by: None,
            resolution_note: None,
            created_at: now,
            resolved_at: None,
        };
        tx.insert_dispute(&dispute).await?;
        let transition = current.apply(MatchEvent::Disputed, now)?;
        commit_transition(tx.as_mut(), &transition, now).await?;
        tx.commit().await?;

        tracing::info!(dispute_id = %dispute.id, "match disputed");
        self.ctx
            .notifier
            .publish(
                &sides.owners(),
                LadderEvent::MatchDisputed {
                    match_id,
                    dispute_id: dispute.id,
                },
            )
            .await;
        Ok(dispute)
    }

    /// PENDING disputes of a match. Visible to participants and moderators.
    #[instrument(skip_all, fields(user = %caller.user, match_id = %match_id))]
    pub async fn pending_disputes(
        &self,
        caller: &Caller,
        match_id: MatchId,
    ) -> Result<Vec<Dispute>, LadderError> {
        let mut tx = self.ctx.store.begin().await?;
        let current = tx
            .get_match(match_id)
            .await?
            .ok_or_else(|| LadderError::not_found("match", match_id))?;
        if !caller.is_moderator() {
            let sides = self.ctx.participants(tx.as_mut(), &current).await?;
            if self.ctx.side_of(caller, &sides).await?.is_none() {
                return Err(LadderError::unauthorized(
                    "only participants can view disputes for this match",
                ));
            }
        }
        let disputes = tx
            .list_disputes(match_id, Some(DisputeStatus::Pending))
            .await?;
        tx.commit().await?;
        Ok(disputes)
    }

    /// Close a PENDING dispute. Moderators only.
    #[instrument(skip_all, fields(user = %caller.user, dispute_id = %dispute_id))]
    pub async fn resolve_dispute(
        &self,
        caller: &Caller,
        dispute_id: DisputeId,
        resolution: DisputeResolution,
        note: Option<String>,
    ) -> Result<Dispute, LadderError> {
        if !caller.is_moderator() {
            return Err(LadderError::unauthorized("only moderators can resolve disputes"));
        }

        let now = self.ctx.now();
        let mut tx = self.ctx.store.begin().await?;
        let dispute = tx
            .get_dispute(dispute_id)
            .await?
            .ok_or_else(|| LadderError::not_found("dispute", dispute_id))?;
        if dispute.status != DisputeStatus::Pending {
            return Err(LadderError::conflict("dispute is already resolved"));
        }
        let current = tx.lock_match(dispute.match_id).await?.ok_or_else(|| {
            LadderError::internal(format!("dispute {dispute_id} refers to a missing match"))
        })?;

        let outcome = match resolution {
            DisputeResolution::Upheld => current.outcome().ok_or_else(|| {
                LadderError::internal(format!("disputed match {} has no result", current.id))
            })?,
            DisputeResolution::Overturned {
                winner,
                score1,
                score2,
            } => MatchOutcome {
                winner,
                score1,
                score2,
            },
        };
        let sides = self.ctx.participants(tx.as_mut(), &current).await?;
        let transition = current.apply(MatchEvent::DisputeResolved(outcome), now)?;
        commit_transition(tx.as_mut(), &transition, now).await?;

        let resolved = Dispute {
            status: DisputeStatus::Resolved,
            resolution: Some(resolution),
            resolved_by: Some(caller.user),
            resolution_note: note,
            resolved_at: Some(now),
            ..dispute
        };
        if !tx.update_dispute(&resolved, DisputeStatus::Pending).await? {
            return Err(LadderError::conflict("dispute is already resolved"));
        }
        tx.commit().await?;

        let overturned = matches!(resolution, DisputeResolution::Overturned { .. });
        tracing::info!(match_id = %resolved.match_id, overturned, "dispute resolved");
        self.ctx
            .notifier
            .publish(
                &sides.owners(),
                LadderEvent::DisputeResolved {
                    match_id: resolved.match_id,
                    dispute_id,
                    overturned,
                },
            )
            .await;
        Ok(resolved)
    }
}
