//! Engine configuration.
//!
//! Build a [`LadderConfig`] with struct-update syntax over the defaults:
//!
//! ```
//! use std::time::Duration;
//! use ladder::config::LadderConfig;
//!
//! let config = LadderConfig {
//!     sweep_interval: Duration::from_secs(60),
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::error::LadderError;
use crate::types::{Format, Game, GameMode};

/// Upper bound for every configured duration: ten years.
pub const MAX_DURATION: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// A game mode open for challenges.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GameModeConfig {
    pub game: Game,
    pub mode: GameMode,
    pub format: Format,
}

impl GameModeConfig {
    pub fn new(game: impl Into<String>, mode: impl Into<String>, format: Format) -> Self {
        Self {
            game: Game::new(game),
            mode: GameMode::new(mode),
            format,
        }
    }
}

/// Configuration for the ladder engine and its sweeper.
#[derive(Clone, Debug)]
pub struct LadderConfig {
    /// Game modes that accept challenges. Default: `FC_26 / 1v1 / solo`.
    pub modes: Vec<GameModeConfig>,
    /// Challenge slots must start on a multiple of this many minutes. Default: 15.
    pub slot_minutes: u32,
    /// How far ahead a challenge may be scheduled. Default: 24h.
    pub scheduling_horizon: Duration,
    /// Matches can be cancelled only while more than this remains before kickoff. Default: 1h.
    pub cancellation_cutoff: Duration,
    /// Advisory deadline stamped after the first result submission. Default: 24h.
    pub validation_window: Duration,
    /// IN_PROGRESS matches with no submissions are cancelled this long after kickoff. Default: 2h.
    pub abandonment_grace: Duration,
    /// Terminal challenges and cancelled matches are purged after this. Default: 7 days.
    pub retention: Duration,
    /// Sweeper period. Default: 10 minutes.
    pub sweep_interval: Duration,
    /// Maximum length of a challenge message, in characters. Default: 280.
    pub max_message_len: usize,
    /// Maximum evidence references per submission or dispute. Default: 10.
    pub max_evidence: usize,
}

impl Default for LadderConfig {
    fn default() -> Self {
        Self {
            modes: vec![GameModeConfig::new("FC_26", "1v1", Format::Solo)],
            slot_minutes: 15,
            scheduling_horizon: Duration::from_secs(24 * 60 * 60),
            cancellation_cutoff: Duration::from_secs(60 * 60),
            validation_window: Duration::from_secs(24 * 60 * 60),
            abandonment_grace: Duration::from_secs(2 * 60 * 60),
            retention: Duration::from_secs(7 * 24 * 60 * 60),
            sweep_interval: Duration::from_secs(10 * 60),
            max_message_len: 280,
            max_evidence: 10,
        }
    }
}

impl LadderConfig {
    /// Defaults overridden by `LADDER_*` environment variables.
    ///
    /// Recognised variables: `LADDER_MODES` (`game:mode:format` entries separated
    /// by commas), `LADDER_SLOT_MINUTES`, `LADDER_HORIZON_SECS`,
    /// `LADDER_CANCELLATION_CUTOFF_SECS`, `LADDER_VALIDATION_WINDOW_SECS`,
    /// `LADDER_ABANDONMENT_GRACE_SECS`, `LADDER_RETENTION_DAYS`,
    /// `LADDER_SWEEP_INTERVAL_SECS`.
    pub fn from_env() -> Result<Self, LadderError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, LadderError> {
        let mut config = Self::default();

        if let Some(modes) = lookup("LADDER_MODES") {
            config.modes = parse_modes(&modes)?;
        }
        if let Some(v) = lookup("LADDER_SLOT_MINUTES") {
            config.slot_minutes = u32::try_from(parse_number("LADDER_SLOT_MINUTES", &v)?)
                .map_err(|_| LadderError::validation(format!("LADDER_SLOT_MINUTES: {v} is out of range")))?;
        }

        let secs = |key: &str, target: &mut Duration| -> Result<(), LadderError> {
            if let Some(v) = lookup(key) {
                *target = Duration::from_secs(parse_number(key, &v)?);
            }
            Ok(())
        };
        secs("LADDER_HORIZON_SECS", &mut config.scheduling_horizon)?;
        secs(
            "LADDER_CANCELLATION_CUTOFF_SECS",
            &mut config.cancellation_cutoff,
        )?;
        secs(
            "LADDER_VALIDATION_WINDOW_SECS",
            &mut config.validation_window,
        )?;
        secs(
            "LADDER_ABANDONMENT_GRACE_SECS",
            &mut config.abandonment_grace,
        )?;
        secs("LADDER_SWEEP_INTERVAL_SECS", &mut config.sweep_interval)?;

        if let Some(v) = lookup("LADDER_RETENTION_DAYS") {
            let days = parse_number("LADDER_RETENTION_DAYS", &v)?;
            let secs = days.checked_mul(24 * 60 * 60).ok_or_else(|| {
                LadderError::validation(format!("LADDER_RETENTION_DAYS: {v} is out of range"))
            })?;
            config.retention = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), LadderError> {
        if self.modes.is_empty() {
            return Err(LadderError::validation("at least one game mode must be enabled"));
        }
        if self.slot_minutes == 0 || 60 % self.slot_minutes != 0 {
            return Err(LadderError::validation(format!(
                "slot size of {} minutes does not divide an hour",
                self.slot_minutes
            )));
        }
        if self.sweep_interval.is_zero() {
            return Err(LadderError::validation("sweep interval must be positive"));
        }
        if self.scheduling_horizon.is_zero() {
            return Err(LadderError::validation("scheduling horizon must be positive"));
        }
        for (name, value) in [
            ("scheduling horizon", self.scheduling_horizon),
            ("cancellation cutoff", self.cancellation_cutoff),
            ("validation window", self.validation_window),
            ("abandonment grace", self.abandonment_grace),
            ("retention", self.retention),
            ("sweep interval", self.sweep_interval),
        ] {
            if value > MAX_DURATION {
                return Err(LadderError::validation(format!(
                    "{name} of {}s exceeds the {}s limit",
                    value.as_secs(),
                    MAX_DURATION.as_secs()
                )));
            }
        }
        Ok(())
    }

    /// Look up an enabled game mode.
    pub fn mode(&self, game: &Game, mode: &GameMode) -> Option<&GameModeConfig> {
        self.modes
            .iter()
            .find(|m| &m.game == game && &m.mode == mode)
    }

    pub(crate) fn horizon(&self) -> TimeDelta {
        delta(self.scheduling_horizon)
    }

    pub(crate) fn cutoff(&self) -> TimeDelta {
        delta(self.cancellation_cutoff)
    }

    pub(crate) fn validation(&self) -> TimeDelta {
        delta(self.validation_window)
    }

    pub(crate) fn grace(&self) -> TimeDelta {
        delta(self.abandonment_grace)
    }

    pub(crate) fn retention_window(&self) -> TimeDelta {
        delta(self.retention)
    }
}

fn delta(d: Duration) -> TimeDelta {
    TimeDelta::from_std(d).unwrap_or(TimeDelta::MAX)
}

/// `at + by`, or a validation error when the result is out of range.
pub(crate) fn after(at: DateTime<Utc>, by: TimeDelta) -> Result<DateTime<Utc>, LadderError> {
    at.checked_add_signed(by)
        .ok_or_else(|| LadderError::validation(format!("{at} + {by} is out of range")))
}

/// `at - by`, or a validation error when the result is out of range.
pub(crate) fn before(at: DateTime<Utc>, by: TimeDelta) -> Result<DateTime<Utc>, LadderError> {
    at.checked_sub_signed(by)
        .ok_or_else(|| LadderError::validation(format!("{at} - {by} is out of range")))
}

fn parse_number(key: &str, value: &str) -> Result<u64, LadderError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|e| LadderError::validation(format!("{key}: {e}")))
}

/// Parse `game:mode:format` entries separated by commas.
pub fn parse_modes(spec: &str) -> Result<Vec<GameModeConfig>, LadderError> {
    spec.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let parts: Vec<&str> = entry.split(':').map(str::trim).collect();
            match parts.as_slice() {
                [game, mode, format] if !game.is_empty() && !mode.is_empty() => {
                    let format = format.parse::<Format>().map_err(LadderError::validation)?;
                    Ok(GameModeConfig::new(*game, *mode, format))
                }
                _ => Err(LadderError::validation(format!(
                    "invalid mode entry '{entry}', expected game:mode:format"
                ))),
            }
        })
        .collect()
}
