//! Ladder challenge and match lifecycle engine.
//!
//! Players propose matches at quarter-hour slots ([`challenge`]), opponents
//! accept them into [`matches`], both sides report results that are settled
//! by [`consensus`], contested results go through [`dispute`], and the
//! [`sweeper`] periodically expires, cancels, purges and re-ranks. Counters
//! and the activity feed live in [`stats`].
//!
//! Persistence is behind [`storage::LadderStore`]; identity, rosters and
//! notification delivery are external collaborators injected through
//! [`engine::Ladder::builder`].

pub mod challenge;
pub mod clock;
pub mod config;
pub mod consensus;
pub mod dispute;
pub mod engine;
pub mod error;
pub mod matches;
pub mod notify;
pub mod ranking;
pub mod roster;
pub mod stats;
pub mod storage;
pub mod sweeper;
pub mod telemetry;
pub mod testing;
pub mod types;

/// Commonly used items.
///
/// ```
/// use ladder::prelude::*;
/// ```
pub mod prelude {
    pub use crate::challenge::{AcceptedChallenge, Challenge, ChallengeListing, ChallengeStatus, NewChallenge};
    pub use crate::clock::{Clock, SystemClock};
    pub use crate::config::{GameModeConfig, LadderConfig};
    pub use crate::consensus::{MatchSubmission, ResultClaim, SubmissionReceipt, Verdict};
    pub use crate::dispute::{Dispute, DisputeClaim, DisputeResolution, DisputeStatus};
    pub use crate::engine::{Ladder, LadderBuilder};
    pub use crate::error::{ErrorKind, LadderError};
    pub use crate::matches::{Match, MatchDetails, MatchStatus};
    pub use crate::notify::{ChannelSink, LadderEvent, NoopSink, NotificationSink};
    pub use crate::ranking::{LadderPlayer, PlayerStats, Standing};
    pub use crate::roster::{NoRosters, RosterService, StaticRoster};
    pub use crate::stats::{Activity, LadderStats, ModeActivity, ModeSummary};
    pub use crate::storage::{LadderStore, MemoryStore};
    #[cfg(feature = "sql")]
    pub use crate::storage::PgStore;
    pub use crate::sweeper::{SweepReport, Sweeper};
    pub use crate::types::{
        Caller, ChallengeId, Competitor, DisputeId, EvidenceRef, Format, Game, GameMode,
        LadderPlayerId, MatchId, MatchOutcome, Role, SubmissionId, TeamId, UserId,
    };
}
