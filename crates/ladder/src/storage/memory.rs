//! In-memory storage backend.
//!
//! A transaction holds the store-wide lock from `begin()` until it is
//! committed or dropped and works on a private copy of the tables, so
//! transactions are fully serialised and uncommitted writes are never
//! visible. Suitable for tests and single-process deployments.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{LadderStore, LadderTransaction, MatchCount, MatchFilter};
use crate::challenge::{Challenge, ChallengeStatus};
use crate::consensus::MatchSubmission;
use crate::dispute::{Dispute, DisputeStatus};
use crate::error::LadderError;
use crate::matches::{Match, MatchStatus};
use crate::ranking::{LadderPlayer, StatsDelta};
use crate::types::{
    ChallengeId, Competitor, DisputeId, Game, GameMode, LadderPlayerId, MatchId, SubmissionId,
};

#[derive(Clone, Debug, Default)]
struct Tables {
    players: HashMap<LadderPlayerId, LadderPlayer>,
    challenges: HashMap<ChallengeId, Challenge>,
    matches: HashMap<MatchId, Match>,
    /// In recording order.
    submissions: Vec<MatchSubmission>,
    /// In creation order.
    disputes: Vec<Dispute>,
}

impl Tables {
    fn slot_taken(&self, challenge: &Challenge) -> bool {
        challenge.status.is_active()
            && self.challenges.values().any(|c| {
                c.id != challenge.id
                    && c.creator == challenge.creator
                    && c.scheduled_at == challenge.scheduled_at
                    && c.status.is_active()
            })
    }
}

/// Storage backed by process memory.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    lock_faults: Arc<parking_lot::Mutex<HashSet<MatchId>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `lock_match(id)` fail with a transient error in every transaction
    /// begun from now on.
    pub fn fail_lock_match(&self, id: MatchId) {
        self.lock_faults.lock().insert(id);
    }
}

#[async_trait]
impl LadderStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn LadderTransaction>, LadderError> {
        let guard = self.tables.clone().lock_owned().await;
        let staged = guard.clone();
        let lock_faults = self.lock_faults.lock().clone();
        Ok(Box::new(MemoryTransaction {
            guard,
            staged,
            lock_faults,
        }))
    }
}

/// Transaction over a [`MemoryStore`].
pub struct MemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    staged: Tables,
    lock_faults: HashSet<MatchId>,
}

#[async_trait]
impl LadderTransaction for MemoryTransaction {
    async fn get_or_create_player(
        &mut self,
        owner: Competitor,
        game: &Game,
        mode: &GameMode,
        now: DateTime<Utc>,
    ) -> Result<LadderPlayer, LadderError> {
        if let Some(existing) = self.find_player(owner, game, mode).await? {
            return Ok(existing);
        }
        let player = LadderPlayer::new(owner, game.clone(), mode.clone(), now);
        self.staged.players.insert(player.id, player.clone());
        Ok(player)
    }

    async fn find_player(
        &mut self,
        owner: Competitor,
        game: &Game,
        mode: &GameMode,
    ) -> Result<Option<LadderPlayer>, LadderError> {
        Ok(self
            .staged
            .players
            .values()
            .find(|p| p.owner == owner && &p.game == game && &p.mode == mode)
            .cloned())
    }

    async fn get_player(
        &mut self,
        id: LadderPlayerId,
    ) -> Result<Option<LadderPlayer>, LadderError> {
        Ok(self.staged.players.get(&id).cloned())
    }

    async fn apply_stats(
        &mut self,
        id: LadderPlayerId,
        delta: &StatsDelta,
    ) -> Result<(), LadderError> {
        let player = self
            .staged
            .players
            .get_mut(&id)
            .ok_or_else(|| LadderError::not_found("ladder player", id))?;
        player.apply(delta);
        Ok(())
    }

    async fn list_players(
        &mut self,
        game: &Game,
        mode: &GameMode,
    ) -> Result<Vec<LadderPlayer>, LadderError> {
        Ok(self
            .staged
            .players
            .values()
            .filter(|p| &p.game == game && &p.mode == mode)
            .cloned()
            .collect())
    }

    async fn set_rank(
        &mut self,
        id: LadderPlayerId,
        rank: Option<i32>,
    ) -> Result<(), LadderError> {
        let player = self
            .staged
            .players
            .get_mut(&id)
            .ok_or_else(|| LadderError::not_found("ladder player", id))?;
        player.rank = rank;
        Ok(())
    }

    async fn list_game_modes(&mut self) -> Result<Vec<(Game, GameMode)>, LadderError> {
        let modes: BTreeSet<(Game, GameMode)> = self
            .staged
            .players
            .values()
            .map(|p| (p.game.clone(), p.mode.clone()))
            .collect();
        Ok(modes.into_iter().collect())
    }

    async fn count_players(
        &mut self,
        game: &Game,
        mode: &GameMode,
        active_since: Option<DateTime<Utc>>,
    ) -> Result<u64, LadderError> {
        Ok(self
            .staged
            .players
            .values()
            .filter(|p| &p.game == game && &p.mode == mode)
            .filter(|p| match active_since {
                Some(since) => p.last_match_at.is_some_and(|at| at >= since),
                None => true,
            })
            .count() as u64)
    }

    async fn insert_challenge(&mut self, challenge: &Challenge) -> Result<(), LadderError> {
        if self.staged.challenges.contains_key(&challenge.id) {
            return Err(LadderError::conflict(format!(
                "challenge {} already exists",
                challenge.id
            )));
        }
        if self.staged.slot_taken(challenge) {
            return Err(LadderError::conflict(
                "creator already has an active challenge at this slot",
            ));
        }
        self.staged
            .challenges
            .insert(challenge.id, challenge.clone());
        Ok(())
    }

    async fn get_challenge(
        &mut self,
        id: ChallengeId,
    ) -> Result<Option<Challenge>, LadderError> {
        Ok(self.staged.challenges.get(&id).cloned())
    }

    async fn find_active_challenge(
        &mut self,
        creator: LadderPlayerId,
        scheduled_at: DateTime<Utc>,
    ) -> Result<Option<Challenge>, LadderError> {
        Ok(self
            .staged
            .challenges
            .values()
            .find(|c| c.creator == creator && c.scheduled_at == scheduled_at && c.status.is_active())
            .cloned())
    }

    async fn list_open_challenges(
        &mut self,
        game: &Game,
        mode: &GameMode,
        now: DateTime<Utc>,
    ) -> Result<Vec<Challenge>, LadderError> {
        let mut open: Vec<Challenge> = self
            .staged
            .challenges
            .values()
            .filter(|c| {
                c.status == ChallengeStatus::Pending
                    && &c.game == game
                    && &c.mode == mode
                    && c.expires_at > now
            })
            .cloned()
            .collect();
        open.sort_by_key(|c| (c.scheduled_at, c.created_at, c.id));
        Ok(open)
    }

    async fn update_challenge(
        &mut self,
        challenge: &Challenge,
        expected: ChallengeStatus,
    ) -> Result<bool, LadderError> {
        match self.staged.challenges.get(&challenge.id) {
            Some(stored) if stored.status == expected => {}
            _ => return Ok(false),
        }
        if self.staged.slot_taken(challenge) {
            return Err(LadderError::conflict(
                "creator already has an active challenge at this slot",
            ));
        }
        self.staged
            .challenges
            .insert(challenge.id, challenge.clone());
        Ok(true)
    }

    async fn expire_challenges(&mut self, now: DateTime<Utc>) -> Result<u64, LadderError> {
        let mut expired = 0;
        for c in self.staged.challenges.values_mut() {
            if c.status == ChallengeStatus::Pending && c.expires_at <= now {
                c.status = ChallengeStatus::Expired;
                c.updated_at = now;
                expired += 1;
            }
        }
        Ok(expired)
    }

    async fn count_challenges_since(
        &mut self,
        game: &Game,
        mode: &GameMode,
        since: DateTime<Utc>,
    ) -> Result<u64, LadderError> {
        Ok(self
            .staged
            .challenges
            .values()
            .filter(|c| &c.game == game && &c.mode == mode && c.created_at >= since)
            .count() as u64)
    }

    async fn recent_open_challenges(
        &mut self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Challenge>, LadderError> {
        let mut open: Vec<Challenge> = self
            .staged
            .challenges
            .values()
            .filter(|c| c.status == ChallengeStatus::Pending && c.expires_at > now)
            .cloned()
            .collect();
        open.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        open.truncate(limit);
        Ok(open)
    }

    async fn purge_challenges(&mut self, cutoff: DateTime<Utc>) -> Result<u64, LadderError> {
        let before = self.staged.challenges.len();
        self.staged
            .challenges
            .retain(|_, c| !(c.status.is_terminal() && c.created_at <= cutoff));
        Ok((before - self.staged.challenges.len()) as u64)
    }

    async fn insert_match(&mut self, m: &Match) -> Result<(), LadderError> {
        if self.staged.matches.contains_key(&m.id) {
            return Err(LadderError::conflict(format!("match {} already exists", m.id)));
        }
        self.staged.matches.insert(m.id, m.clone());
        Ok(())
    }

    async fn get_match(&mut self, id: MatchId) -> Result<Option<Match>, LadderError> {
        Ok(self.staged.matches.get(&id).cloned())
    }

    async fn lock_match(&mut self, id: MatchId) -> Result<Option<Match>, LadderError> {
        if self.lock_faults.contains(&id) {
            return Err(LadderError::Transient {
                reason: format!("lock on match {id} timed out"),
                source: None,
            });
        }
        // The store-wide lock is already held.
        self.get_match(id).await
    }

    async fn update_match(
        &mut self,
        m: &Match,
        expected: MatchStatus,
    ) -> Result<bool, LadderError> {
        match self.staged.matches.get_mut(&m.id) {
            Some(stored) if stored.status == expected => {
                *stored = m.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn count_matches(
        &mut self,
        game: &Game,
        mode: &GameMode,
        count: MatchCount,
    ) -> Result<u64, LadderError> {
        Ok(self
            .staged
            .matches
            .values()
            .filter(|m| &m.game == game && &m.mode == mode)
            .filter(|m| match count {
                MatchCount::InStatus(status) => m.status == status,
                MatchCount::CreatedSince(since) => m.created_at >= since,
                MatchCount::CompletedSince(since) => {
                    m.status == MatchStatus::Completed
                        && m.completed_at.is_some_and(|at| at >= since)
                }
            })
            .count() as u64)
    }

    async fn recent_completed_matches(&mut self, limit: usize) -> Result<Vec<Match>, LadderError> {
        let mut completed: Vec<Match> = self
            .staged
            .matches
            .values()
            .filter(|m| m.status == MatchStatus::Completed)
            .cloned()
            .collect();
        completed.sort_by(|a, b| {
            b.completed_at
                .cmp(&a.completed_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        completed.truncate(limit);
        Ok(completed)
    }

    async fn list_matches(&mut self, filter: &MatchFilter) -> Result<Vec<Match>, LadderError> {
        let mut matches: Vec<Match> = self
            .staged
            .matches
            .values()
            .filter(|m| m.has_side(filter.player))
            .filter(|m| filter.status.map_or(true, |s| m.status == s))
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.scheduled_at.cmp(&a.scheduled_at).then(a.id.cmp(&b.id)));
        Ok(matches)
    }

    async fn find_abandoned_matches(
        &mut self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<MatchId>, LadderError> {
        let submissions = &self.staged.submissions;
        let mut abandoned: Vec<&Match> = self
            .staged
            .matches
            .values()
            .filter(|m| {
                m.status == MatchStatus::InProgress
                    && m.scheduled_at < cutoff
                    && !submissions.iter().any(|s| s.match_id == m.id)
            })
            .collect();
        abandoned.sort_by_key(|m| (m.scheduled_at, m.id));
        Ok(abandoned.into_iter().map(|m| m.id).collect())
    }

    async fn purge_matches(&mut self, cutoff: DateTime<Utc>) -> Result<u64, LadderError> {
        let doomed: Vec<MatchId> = self
            .staged
            .matches
            .values()
            .filter(|m| m.status == MatchStatus::Cancelled && m.created_at <= cutoff)
            .map(|m| m.id)
            .collect();
        for id in &doomed {
            self.staged.matches.remove(id);
            self.staged.submissions.retain(|s| s.match_id != *id);
            self.staged.disputes.retain(|d| d.match_id != *id);
            for c in self.staged.challenges.values_mut() {
                if c.match_id == Some(*id) {
                    c.match_id = None;
                }
            }
        }
        Ok(doomed.len() as u64)
    }

    async fn count_submissions(&mut self, match_id: MatchId) -> Result<u64, LadderError> {
        Ok(self
            .staged
            .submissions
            .iter()
            .filter(|s| s.match_id == match_id)
            .count() as u64)
    }

    async fn insert_submission(
        &mut self,
        submission: &MatchSubmission,
    ) -> Result<(), LadderError> {
        if self
            .staged
            .submissions
            .iter()
            .any(|s| s.match_id == submission.match_id && s.side == submission.side)
        {
            return Err(LadderError::conflict(
                "a result has already been submitted for this side",
            ));
        }
        self.staged.submissions.push(submission.clone());
        Ok(())
    }

    async fn list_submissions(
        &mut self,
        match_id: MatchId,
    ) -> Result<Vec<MatchSubmission>, LadderError> {
        Ok(self
            .staged
            .submissions
            .iter()
            .filter(|s| s.match_id == match_id)
            .cloned()
            .collect())
    }

    async fn mark_submission_validated(&mut self, id: SubmissionId) -> Result<(), LadderError> {
        let submission = self
            .staged
            .submissions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| LadderError::not_found("submission", id))?;
        submission.validated = true;
        Ok(())
    }

    async fn insert_dispute(&mut self, dispute: &Dispute) -> Result<(), LadderError> {
        if dispute.status == DisputeStatus::Pending
            && self
                .staged
                .disputes
                .iter()
                .any(|d| d.match_id == dispute.match_id && d.status == DisputeStatus::Pending)
        {
            return Err(LadderError::conflict(
                "a dispute is already pending for this match",
            ));
        }
        self.staged.disputes.push(dispute.clone());
        Ok(())
    }

    async fn get_dispute(&mut self, id: DisputeId) -> Result<Option<Dispute>, LadderError> {
        Ok(self.staged.disputes.iter().find(|d| d.id == id).cloned())
    }

    async fn list_disputes(
        &mut self,
        match_id: MatchId,
        status: Option<DisputeStatus>,
    ) -> Result<Vec<Dispute>, LadderError> {
        Ok(self
            .staged
            .disputes
            .iter()
            .filter(|d| d.match_id == match_id && status.map_or(true, |s| d.status == s))
            .cloned()
            .collect())
    }

    async fn update_dispute(
        &mut self,
        dispute: &Dispute,
        expected: DisputeStatus,
    ) -> Result<bool, LadderError> {
        match self.staged.disputes.iter_mut().find(|d| d.id == dispute.id) {
            Some(stored) if stored.status == expected => {
                *stored = dispute.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), LadderError> {
        let MemoryTransaction {
            mut guard, staged, ..
        } = *self;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), LadderError> {
        Ok(())
    }
}
