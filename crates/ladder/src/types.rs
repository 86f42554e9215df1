//! Identifiers and small value types shared across the engine.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh random id.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

uuid_id!(
    /// An authenticated user, as supplied by the identity provider.
    UserId
);
uuid_id!(
    /// A roster owned by the roster service.
    TeamId
);
uuid_id!(
    /// A ladder standing row, one per (competitor, game, mode).
    LadderPlayerId
);
uuid_id!(ChallengeId);
uuid_id!(MatchId);
uuid_id!(SubmissionId);
uuid_id!(DisputeId);

/// A game offered on the ladder, e.g. `FC_26`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Game(pub String);

impl Game {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A mode of a game, e.g. `1v1` or `2v2`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameMode(pub String);

impl GameMode {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether a game mode is played by individual users or by rosters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    Solo,
    Team,
}

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Solo => "solo",
            Format::Team => "team",
        }
    }
}

impl std::str::FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "solo" => Ok(Format::Solo),
            "team" => Ok(Format::Team),
            other => Err(format!("unknown format '{other}'")),
        }
    }
}

/// Who owns a ladder standing: a single user in solo modes, a roster in team modes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Competitor {
    User(UserId),
    Team(TeamId),
}

impl Competitor {
    pub fn kind(&self) -> &'static str {
        match self {
            Competitor::User(_) => "user",
            Competitor::Team(_) => "team",
        }
    }

    pub fn raw_id(&self) -> Uuid {
        match self {
            Competitor::User(id) => id.0,
            Competitor::Team(id) => id.0,
        }
    }

    /// Rebuild from the `(kind, id)` pair used by storage backends.
    pub fn from_parts(kind: &str, id: Uuid) -> Option<Self> {
        match kind {
            "user" => Some(Competitor::User(UserId(id))),
            "team" => Some(Competitor::Team(TeamId(id))),
            _ => None,
        }
    }
}

/// Role granted to a caller by the authorization provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Player,
    Moderator,
}

/// The authenticated identity behind a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub user: UserId,
    pub role: Role,
}

impl Caller {
    pub fn player(user: UserId) -> Self {
        Self {
            user,
            role: Role::Player,
        }
    }

    pub fn moderator(user: UserId) -> Self {
        Self {
            user,
            role: Role::Moderator,
        }
    }

    pub fn is_moderator(&self) -> bool {
        self.role == Role::Moderator
    }
}

/// Opaque reference to a proof file held by the evidence store.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvidenceRef(pub String);

impl EvidenceRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A settled result: who won and the score of each side.
///
/// `score1` belongs to the match's first side (the challenge creator) and
/// `score2` to the second side (the acceptor).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub winner: LadderPlayerId,
    pub score1: i32,
    pub score2: i32,
}

impl MatchOutcome {
    /// Score line as shown to players, e.g. `3-1`.
    pub fn score_line(&self) -> String {
        format!("{}-{}", self.score1, self.score2)
    }
}
