//! Conflict resolution over multi-candidate fuzzy matches
//!
//! When more than one promo order qualifies for the same transaction, the
//! configured strategy picks exactly one winner. Every strategy is
//! deterministic: equal keys are broken by candidate gathering order,
//! which is itself stable across runs.

use dedup_common::{Error, Result};
use tracing::{debug, warn};

use crate::config::ConflictStrategy;
use crate::types::Candidate;

/// Caller-supplied resolver for `ConflictStrategy::Custom`. Receives the
/// qualified candidates (confidence-sorted, descending) and returns the
/// index of the winner.
pub type ResolveFn = Box<dyn Fn(&[Candidate]) -> usize + Send + Sync>;

/// Rank of a promo source for `source_priority` tie-breaking; lower wins.
/// Unrecognized sources rank last.
fn promo_source_priority(promo_source: &str) -> u32 {
    match promo_source {
        "facebook_ads" => 0,
        "instagram_ads" => 1,
        "google_ads" => 2,
        "email_campaign" => 3,
        "push_notification" => 4,
        "offline" => 5,
        _ => 999,
    }
}

/// Picks one winning candidate out of a qualified set.
pub struct ConflictResolver<'a> {
    strategy: ConflictStrategy,
    custom: Option<&'a ResolveFn>,
}

impl<'a> ConflictResolver<'a> {
    /// A `custom` strategy without a resolver function is a configuration
    /// error, reported here rather than at match time.
    pub fn new(strategy: ConflictStrategy, custom: Option<&'a ResolveFn>) -> Result<Self> {
        if strategy == ConflictStrategy::Custom && custom.is_none() {
            return Err(Error::Config(
                "conflict strategy 'custom' requires a resolver function".to_string(),
            ));
        }
        Ok(Self { strategy, custom })
    }

    pub fn strategy(&self) -> ConflictStrategy {
        self.strategy
    }

    /// Resolve a qualified candidate set down to one winner.
    ///
    /// A single candidate is returned as-is without counting as a
    /// conflict. `Error` strategy aborts on any multi-candidate set.
    pub fn resolve<'c>(&self, candidates: &'c [Candidate]) -> Result<&'c Candidate> {
        let first = candidates
            .first()
            .ok_or_else(|| Error::Internal("resolve called with no candidates".to_string()))?;
        if candidates.len() == 1 {
            return Ok(first);
        }

        debug!(
            candidates = candidates.len(),
            strategy = self.strategy.as_str(),
            "Resolving match conflict"
        );

        match self.strategy {
            ConflictStrategy::LastTouch => Ok(self.by_touch(candidates, true)),
            ConflictStrategy::FirstTouch => Ok(self.by_touch(candidates, false)),
            ConflictStrategy::HighestValue => Ok(highest_value(candidates)),
            ConflictStrategy::SourcePriority => Ok(by_source_priority(candidates)),
            ConflictStrategy::Custom => self.by_custom(candidates),
            ConflictStrategy::Error => Err(Error::Conflict(format!(
                "{} candidates matched (ids: {}); strict mode refuses to tie-break",
                candidates.len(),
                candidate_ids(candidates).join(", ")
            ))),
        }
    }

    /// Latest (or earliest) order date wins. Candidates without a date are
    /// ignored; if no candidate has a date the source-priority ordering
    /// decides instead.
    fn by_touch<'c>(&self, candidates: &'c [Candidate], latest: bool) -> &'c Candidate {
        let dated = candidates.iter().filter(|c| c.order.order_date.is_some());
        let winner = if latest {
            dated.max_by_key(|c| c.order.order_date)
        } else {
            dated.min_by_key(|c| c.order.order_date)
        };

        match winner {
            Some(candidate) => candidate,
            None => {
                warn!(
                    strategy = self.strategy.as_str(),
                    "No candidate carries an order date; falling back to source priority"
                );
                by_source_priority(candidates)
            }
        }
    }

    fn by_custom<'c>(&self, candidates: &'c [Candidate]) -> Result<&'c Candidate> {
        let resolve = self.custom.ok_or_else(|| {
            Error::Config("conflict strategy 'custom' requires a resolver function".to_string())
        })?;

        let index = resolve(candidates);
        candidates.get(index).ok_or_else(|| {
            Error::Conflict(format!(
                "custom resolver returned index {index} for {} candidates",
                candidates.len()
            ))
        })
    }
}

/// Highest confidence wins; equal confidences are broken by promo-source
/// rank, then by position.
fn by_source_priority(candidates: &[Candidate]) -> &Candidate {
    let mut best = &candidates[0];
    for candidate in &candidates[1..] {
        let better = candidate.confidence > best.confidence
            || (candidate.confidence == best.confidence
                && promo_source_priority(&candidate.order.promo_source)
                    < promo_source_priority(&best.order.promo_source));
        if better {
            best = candidate;
        }
    }
    best
}

/// Largest order amount wins; first such candidate on a tie.
fn highest_value(candidates: &[Candidate]) -> &Candidate {
    let mut best = &candidates[0];
    for candidate in &candidates[1..] {
        if candidate.order.order_amount > best.order.order_amount {
            best = candidate;
        }
    }
    best
}

fn candidate_ids(candidates: &[Candidate]) -> Vec<String> {
    candidates
        .iter()
        .map(|c| c.order.transaction_id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MatchCriteria, PromoOrder};
    use dedup_common::dates::parse_lenient;

    fn candidate(
        id: &str,
        date: Option<&str>,
        amount: f64,
        promo_source: &str,
        confidence: f64,
    ) -> Candidate {
        Candidate {
            order: PromoOrder {
                promo_code: "CODE".to_string(),
                order_id: format!("ORD-{id}"),
                transaction_id: id.to_string(),
                order_date: date.and_then(parse_lenient),
                order_amount: amount,
                restaurant: String::new(),
                country: String::new(),
                promo_source: promo_source.to_string(),
                customer_phone: None,
            },
            criteria: MatchCriteria::Date,
            base_confidence: 0.5,
            confidence,
        }
    }

    #[test]
    fn test_single_candidate_needs_no_strategy() {
        let candidates = [candidate("A", None, 100.0, "offline", 0.91)];
        let resolver = ConflictResolver::new(ConflictStrategy::Error, None).unwrap();
        // Even strict mode accepts a singleton.
        let winner = resolver.resolve(&candidates).unwrap();
        assert_eq!(winner.order.transaction_id, "A");
    }

    #[test]
    fn test_last_touch_picks_latest_date() {
        let candidates = [
            candidate("A", Some("2025-01-03"), 100.0, "offline", 0.95),
            candidate("B", Some("2025-01-05"), 100.0, "offline", 0.91),
            candidate("C", Some("2025-01-01"), 100.0, "offline", 0.99),
        ];
        let resolver = ConflictResolver::new(ConflictStrategy::LastTouch, None).unwrap();
        assert_eq!(
            resolver.resolve(&candidates).unwrap().order.transaction_id,
            "B"
        );
    }

    #[test]
    fn test_first_touch_picks_earliest_date() {
        let candidates = [
            candidate("A", Some("2025-01-03"), 100.0, "offline", 0.95),
            candidate("B", Some("2025-01-01"), 100.0, "offline", 0.91),
        ];
        let resolver = ConflictResolver::new(ConflictStrategy::FirstTouch, None).unwrap();
        assert_eq!(
            resolver.resolve(&candidates).unwrap().order.transaction_id,
            "B"
        );
    }

    #[test]
    fn test_touch_strategies_fall_back_without_dates() {
        let candidates = [
            candidate("A", None, 100.0, "google_ads", 0.91),
            candidate("B", None, 100.0, "facebook_ads", 0.91),
        ];
        let resolver = ConflictResolver::new(ConflictStrategy::LastTouch, None).unwrap();
        // No dates anywhere, so source priority decides: facebook_ads
        // outranks google_ads.
        assert_eq!(
            resolver.resolve(&candidates).unwrap().order.transaction_id,
            "B"
        );
    }

    #[test]
    fn test_highest_value_picks_largest_amount() {
        let candidates = [
            candidate("A", None, 500.0, "offline", 0.99),
            candidate("B", None, 1500.0, "offline", 0.91),
        ];
        let resolver = ConflictResolver::new(ConflictStrategy::HighestValue, None).unwrap();
        assert_eq!(
            resolver.resolve(&candidates).unwrap().order.transaction_id,
            "B"
        );
    }

    #[test]
    fn test_source_priority_prefers_confidence_first() {
        let candidates = [
            candidate("A", None, 100.0, "offline", 0.98),
            candidate("B", None, 100.0, "facebook_ads", 0.92),
        ];
        let resolver = ConflictResolver::new(ConflictStrategy::SourcePriority, None).unwrap();
        // Confidence dominates; promo-source rank only breaks ties.
        assert_eq!(
            resolver.resolve(&candidates).unwrap().order.transaction_id,
            "A"
        );
    }

    #[test]
    fn test_source_priority_breaks_confidence_ties_by_source_rank() {
        let candidates = [
            candidate("A", None, 100.0, "offline", 0.95),
            candidate("B", None, 100.0, "instagram_ads", 0.95),
            candidate("C", None, 100.0, "unheard_of", 0.95),
        ];
        let resolver = ConflictResolver::new(ConflictStrategy::SourcePriority, None).unwrap();
        assert_eq!(
            resolver.resolve(&candidates).unwrap().order.transaction_id,
            "B"
        );
    }

    #[test]
    fn test_source_priority_full_tie_keeps_first() {
        let candidates = [
            candidate("A", None, 100.0, "offline", 0.95),
            candidate("B", None, 100.0, "offline", 0.95),
        ];
        let resolver = ConflictResolver::new(ConflictStrategy::SourcePriority, None).unwrap();
        assert_eq!(
            resolver.resolve(&candidates).unwrap().order.transaction_id,
            "A"
        );
    }

    #[test]
    fn test_error_strategy_refuses_multi_candidate() {
        let candidates = [
            candidate("A", None, 100.0, "offline", 0.95),
            candidate("B", None, 100.0, "offline", 0.95),
        ];
        let resolver = ConflictResolver::new(ConflictStrategy::Error, None).unwrap();
        assert!(matches!(
            resolver.resolve(&candidates),
            Err(Error::Conflict(_))
        ));
    }

    #[test]
    fn test_custom_strategy_requires_function() {
        assert!(ConflictResolver::new(ConflictStrategy::Custom, None).is_err());
    }

    #[test]
    fn test_custom_strategy_calls_function() {
        let pick_last: ResolveFn = Box::new(|candidates| candidates.len() - 1);
        let candidates = [
            candidate("A", None, 100.0, "offline", 0.95),
            candidate("B", None, 100.0, "offline", 0.91),
        ];
        let resolver = ConflictResolver::new(ConflictStrategy::Custom, Some(&pick_last)).unwrap();
        assert_eq!(
            resolver.resolve(&candidates).unwrap().order.transaction_id,
            "B"
        );
    }

    #[test]
    fn test_custom_strategy_out_of_bounds_is_an_error() {
        let broken: ResolveFn = Box::new(|candidates| candidates.len());
        let candidates = [
            candidate("A", None, 100.0, "offline", 0.95),
            candidate("B", None, 100.0, "offline", 0.91),
        ];
        let resolver = ConflictResolver::new(ConflictStrategy::Custom, Some(&broken)).unwrap();
        assert!(matches!(
            resolver.resolve(&candidates),
            Err(Error::Conflict(_))
        ));
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let candidates = [
            candidate("A", Some("2025-01-02"), 100.0, "google_ads", 0.95),
            candidate("B", Some("2025-01-02"), 100.0, "facebook_ads", 0.95),
        ];
        let resolver = ConflictResolver::new(ConflictStrategy::SourcePriority, None).unwrap();
        let first = resolver.resolve(&candidates).unwrap().order.transaction_id.clone();
        for _ in 0..10 {
            assert_eq!(
                resolver.resolve(&candidates).unwrap().order.transaction_id,
                first
            );
        }
    }
}
