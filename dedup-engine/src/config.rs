//! Engine configuration
//!
//! Configuration is validated up front: a bad strategy name, an
//! out-of-range threshold, or a `custom` strategy without a resolver is a
//! configuration error at construction/`configure` time, never a match-time
//! surprise. Partial updates are all-or-nothing: if any field in an update
//! is invalid, the engine's current configuration is left untouched.

use std::str::FromStr;

use dedup_common::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::MatchCriteria;

/// Strategy for picking a winner when multiple candidates qualify for the
/// same transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// Most recent order date wins.
    LastTouch,
    /// Earliest order date wins.
    FirstTouch,
    /// Largest order amount wins.
    HighestValue,
    /// Highest confidence wins; promo-source priority breaks ties.
    #[default]
    SourcePriority,
    /// Caller-supplied resolver function picks the winner.
    Custom,
    /// Strict mode: any multi-candidate situation aborts the run so the
    /// conflict can be reviewed manually instead of silently tie-broken.
    Error,
}

impl ConflictStrategy {
    /// All strategies, in stats-reporting order.
    pub const ALL: [ConflictStrategy; 6] = [
        ConflictStrategy::LastTouch,
        ConflictStrategy::FirstTouch,
        ConflictStrategy::HighestValue,
        ConflictStrategy::SourcePriority,
        ConflictStrategy::Custom,
        ConflictStrategy::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictStrategy::LastTouch => "last_touch",
            ConflictStrategy::FirstTouch => "first_touch",
            ConflictStrategy::HighestValue => "highest_value",
            ConflictStrategy::SourcePriority => "source_priority",
            ConflictStrategy::Custom => "custom",
            ConflictStrategy::Error => "error",
        }
    }
}

impl FromStr for ConflictStrategy {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        ConflictStrategy::ALL
            .iter()
            .find(|strategy| strategy.as_str() == raw)
            .copied()
            .ok_or_else(|| Error::Config(format!("Unknown conflict strategy: {raw}")))
    }
}

/// Deduplication engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Minimum confidence for a fuzzy candidate to qualify, in [0, 1].
    pub fuzzy_matching_threshold: f64,
    /// Time window for the exact-path diagnostic, in hours (> 0).
    pub time_window_hours: f64,
    pub conflict_strategy: ConflictStrategy,
    /// Which fuzzy indices are probed beyond the verbatim identifier
    /// lookup. Empty means exact-only matching.
    pub additional_match_criteria: Vec<MatchCriteria>,
    /// Enable the same-order aggregation post-pass.
    pub use_transactional_attrs: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fuzzy_matching_threshold: 0.9,
            time_window_hours: 24.0,
            conflict_strategy: ConflictStrategy::SourcePriority,
            additional_match_criteria: vec![
                MatchCriteria::Date,
                MatchCriteria::IdPrefix,
                MatchCriteria::Amount,
                MatchCriteria::Phone,
            ],
            use_transactional_attrs: false,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.fuzzy_matching_threshold)
            || self.fuzzy_matching_threshold.is_nan()
        {
            return Err(Error::Config(format!(
                "fuzzy_matching_threshold must be in [0, 1], got {}",
                self.fuzzy_matching_threshold
            )));
        }
        if !(self.time_window_hours > 0.0) {
            return Err(Error::Config(format!(
                "time_window_hours must be positive, got {}",
                self.time_window_hours
            )));
        }
        Ok(())
    }

    /// Apply a partial update, validating the combined result first so a
    /// rejected update leaves this configuration unchanged.
    pub fn apply(&mut self, update: &ConfigUpdate) -> Result<()> {
        let mut candidate = self.clone();
        if let Some(threshold) = update.fuzzy_matching_threshold {
            candidate.fuzzy_matching_threshold = threshold;
        }
        if let Some(hours) = update.time_window_hours {
            candidate.time_window_hours = hours;
        }
        // Minutes take precedence over hours when both are supplied.
        if let Some(minutes) = update.time_window_minutes {
            candidate.time_window_hours = minutes / 60.0;
        }
        if let Some(strategy) = update.conflict_strategy {
            candidate.conflict_strategy = strategy;
        }
        if let Some(criteria) = &update.additional_match_criteria {
            candidate.additional_match_criteria = criteria.clone();
        }
        if let Some(use_attrs) = update.use_transactional_attrs {
            candidate.use_transactional_attrs = use_attrs;
        }

        candidate.validate()?;
        info!(config = ?candidate, "Deduplicator reconfigured");
        *self = candidate;
        Ok(())
    }
}

/// Partial configuration update; unset fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigUpdate {
    pub fuzzy_matching_threshold: Option<f64>,
    pub time_window_hours: Option<f64>,
    /// Convenience alternative to hours; wins when both are present.
    pub time_window_minutes: Option<f64>,
    pub conflict_strategy: Option<ConflictStrategy>,
    pub additional_match_criteria: Option<Vec<MatchCriteria>>,
    pub use_transactional_attrs: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let mut config = EngineConfig::default();
        config.fuzzy_matching_threshold = 1.5;
        assert!(config.validate().is_err());
        config.fuzzy_matching_threshold = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_time_window_must_be_positive() {
        let mut config = EngineConfig::default();
        config.time_window_hours = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_apply_is_all_or_nothing() {
        let mut config = EngineConfig::default();
        let update = ConfigUpdate {
            fuzzy_matching_threshold: Some(0.8),
            time_window_hours: Some(-5.0),
            ..ConfigUpdate::default()
        };

        assert!(config.apply(&update).is_err());
        // The valid threshold change must not leak through.
        assert_eq!(config.fuzzy_matching_threshold, 0.9);
        assert_eq!(config.time_window_hours, 24.0);
    }

    #[test]
    fn test_apply_partial_update() {
        let mut config = EngineConfig::default();
        let update = ConfigUpdate {
            fuzzy_matching_threshold: Some(0.95),
            conflict_strategy: Some(ConflictStrategy::LastTouch),
            ..ConfigUpdate::default()
        };

        config.apply(&update).unwrap();
        assert_eq!(config.fuzzy_matching_threshold, 0.95);
        assert_eq!(config.conflict_strategy, ConflictStrategy::LastTouch);
        assert_eq!(config.time_window_hours, 24.0);
    }

    #[test]
    fn test_minutes_take_precedence_over_hours() {
        let mut config = EngineConfig::default();
        let update = ConfigUpdate {
            time_window_hours: Some(48.0),
            time_window_minutes: Some(90.0),
            ..ConfigUpdate::default()
        };

        config.apply(&update).unwrap();
        assert_eq!(config.time_window_hours, 1.5);
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!(
            "source_priority".parse::<ConflictStrategy>().unwrap(),
            ConflictStrategy::SourcePriority
        );
        assert_eq!(
            "error".parse::<ConflictStrategy>().unwrap(),
            ConflictStrategy::Error
        );
        assert!("nonsense".parse::<ConflictStrategy>().is_err());
    }
}
