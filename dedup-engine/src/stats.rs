//! Run statistics for the deduplication engine
//!
//! Stats are an explicit per-run value, never a hidden singleton: each run
//! starts from `RunStats::default()`, accumulates counters, and is frozen
//! by `finalize` before being returned. Shards produced by parallel
//! scoring workers can be reduced with `merge` and finalized once. All
//! histogram maps are `BTreeMap` so serialized stats are byte-stable
//! across identical runs.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::attribution::{AttributionModel, AttributionSource};
use crate::config::ConflictStrategy;
use crate::types::MatchCriteria;

/// Divide, returning 0 on a zero denominator.
pub fn safe_div(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Exact-path time-window diagnostics. Whether an exact pair falls inside
/// the configured window never affects the match decision.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimeWindowMetrics {
    pub within_window: u64,
    pub outside_window: u64,
    pub within_window_rate: f64,
    pub outside_window_rate: f64,
}

impl TimeWindowMetrics {
    fn merge(&mut self, other: &TimeWindowMetrics) {
        self.within_window += other.within_window;
        self.outside_window += other.outside_window;
    }

    fn finalize(&mut self) {
        let total = self.within_window + self.outside_window;
        self.within_window_rate = safe_div(self.within_window, total);
        self.outside_window_rate = safe_div(self.outside_window, total);
    }
}

/// Source/model histogram kept by the attribution assigner.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AttributionStats {
    pub processed: u64,
    pub sources: BTreeMap<String, u64>,
    pub models_used: BTreeMap<String, u64>,
}

impl AttributionStats {
    pub fn record(&mut self, source: &AttributionSource, model: AttributionModel) {
        *self.sources.entry(source.as_str().to_string()).or_insert(0) += 1;
        *self
            .models_used
            .entry(model.as_str().to_string())
            .or_insert(0) += 1;
    }

    pub fn merge(&mut self, other: &AttributionStats) {
        self.processed += other.processed;
        for (source, count) in &other.sources {
            *self.sources.entry(source.clone()).or_insert(0) += count;
        }
        for (model, count) in &other.models_used {
            *self.models_used.entry(model.clone()).or_insert(0) += count;
        }
    }
}

/// Statistics for a single deduplication run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStats {
    pub total_ga4_transactions: u64,
    pub total_promo_transactions: u64,
    pub exact_matches: u64,
    /// Fuzzy matches, including conflict-resolved ones.
    pub fuzzy_matches: u64,
    pub unmatched: u64,
    pub conflicts_resolved: u64,
    pub conflicts_by_strategy: BTreeMap<String, u64>,
    pub match_by_criteria: BTreeMap<String, u64>,
    pub attribution_sources: BTreeMap<String, u64>,
    pub time_window_metrics: TimeWindowMetrics,
    /// Histogram snapshot from the attribution assigner.
    pub attribution_details: AttributionStats,
    // Derived rates, filled by `finalize`.
    pub match_rate: f64,
    pub exact_match_rate: f64,
    pub fuzzy_match_rate: f64,
    pub promo_coverage: f64,
}

impl Default for RunStats {
    fn default() -> Self {
        // Seed the histogram keys so every run reports the same stats shape
        // even when a counter stays at zero.
        let conflicts_by_strategy = ConflictStrategy::ALL
            .iter()
            .map(|strategy| (strategy.as_str().to_string(), 0))
            .collect();
        let match_by_criteria = MatchCriteria::ALL
            .iter()
            .map(|criteria| (criteria.as_str().to_string(), 0))
            .collect();
        let attribution_sources = [
            (AttributionSource::PromoCode.as_str().to_string(), 0),
            (AttributionSource::UtmSource.as_str().to_string(), 0),
        ]
        .into_iter()
        .collect();

        Self {
            total_ga4_transactions: 0,
            total_promo_transactions: 0,
            exact_matches: 0,
            fuzzy_matches: 0,
            unmatched: 0,
            conflicts_resolved: 0,
            conflicts_by_strategy,
            match_by_criteria,
            attribution_sources,
            time_window_metrics: TimeWindowMetrics::default(),
            attribution_details: AttributionStats::default(),
            match_rate: 0.0,
            exact_match_rate: 0.0,
            fuzzy_match_rate: 0.0,
            promo_coverage: 0.0,
        }
    }
}

impl RunStats {
    pub fn record_criteria(&mut self, criteria: MatchCriteria) {
        *self
            .match_by_criteria
            .entry(criteria.as_str().to_string())
            .or_insert(0) += 1;
    }

    pub fn record_attribution(&mut self, source: &AttributionSource) {
        *self
            .attribution_sources
            .entry(source.as_str().to_string())
            .or_insert(0) += 1;
    }

    pub fn record_conflict(&mut self, strategy: ConflictStrategy) {
        self.conflicts_resolved += 1;
        *self
            .conflicts_by_strategy
            .entry(strategy.as_str().to_string())
            .or_insert(0) += 1;
    }

    pub fn record_time_window(&mut self, within_window: bool) {
        if within_window {
            self.time_window_metrics.within_window += 1;
        } else {
            self.time_window_metrics.outside_window += 1;
        }
    }

    /// Sum another shard into this one. Derived rates are not merged;
    /// call `finalize` after all shards are reduced.
    pub fn merge(&mut self, other: &RunStats) {
        self.total_ga4_transactions += other.total_ga4_transactions;
        self.total_promo_transactions += other.total_promo_transactions;
        self.exact_matches += other.exact_matches;
        self.fuzzy_matches += other.fuzzy_matches;
        self.unmatched += other.unmatched;
        self.conflicts_resolved += other.conflicts_resolved;
        for (key, count) in &other.conflicts_by_strategy {
            *self.conflicts_by_strategy.entry(key.clone()).or_insert(0) += count;
        }
        for (key, count) in &other.match_by_criteria {
            *self.match_by_criteria.entry(key.clone()).or_insert(0) += count;
        }
        for (key, count) in &other.attribution_sources {
            *self.attribution_sources.entry(key.clone()).or_insert(0) += count;
        }
        self.time_window_metrics.merge(&other.time_window_metrics);
        self.attribution_details.merge(&other.attribution_details);
    }

    /// Compute the derived rates. All divisions are zero-safe.
    pub fn finalize(&mut self) {
        let total_matched = self.exact_matches + self.fuzzy_matches;
        let total_processed = total_matched + self.unmatched;

        self.match_rate = safe_div(total_matched, total_processed);
        self.exact_match_rate = safe_div(self.exact_matches, total_processed);
        self.fuzzy_match_rate = safe_div(self.fuzzy_matches, total_processed);
        self.promo_coverage = safe_div(total_matched, self.total_promo_transactions);
        self.time_window_metrics.finalize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_div_zero_denominator() {
        assert_eq!(safe_div(5, 0), 0.0);
        assert_eq!(safe_div(0, 0), 0.0);
        assert_eq!(safe_div(1, 2), 0.5);
    }

    #[test]
    fn test_default_seeds_histogram_keys() {
        let stats = RunStats::default();
        assert_eq!(stats.match_by_criteria.len(), 5);
        assert_eq!(stats.conflicts_by_strategy.len(), 6);
        assert_eq!(stats.match_by_criteria.get("id_prefix"), Some(&0));
        assert_eq!(stats.conflicts_by_strategy.get("source_priority"), Some(&0));
        assert_eq!(stats.attribution_sources.get("promo_code"), Some(&0));
    }

    #[test]
    fn test_finalize_rates() {
        let mut stats = RunStats::default();
        stats.total_ga4_transactions = 10;
        stats.total_promo_transactions = 8;
        stats.exact_matches = 4;
        stats.fuzzy_matches = 2;
        stats.unmatched = 4;
        stats.finalize();

        assert_eq!(stats.match_rate, 0.6);
        assert_eq!(stats.exact_match_rate, 0.4);
        assert_eq!(stats.fuzzy_match_rate, 0.2);
        assert_eq!(stats.promo_coverage, 0.75);
    }

    #[test]
    fn test_finalize_with_no_promo_orders() {
        let mut stats = RunStats::default();
        stats.total_ga4_transactions = 3;
        stats.unmatched = 3;
        stats.finalize();

        assert_eq!(stats.match_rate, 0.0);
        assert_eq!(stats.promo_coverage, 0.0);
    }

    #[test]
    fn test_merge_shards_equals_single_accumulation() {
        let mut shard_a = RunStats::default();
        shard_a.exact_matches = 2;
        shard_a.unmatched = 1;
        shard_a.record_criteria(MatchCriteria::Date);
        shard_a.record_time_window(true);
        shard_a.record_attribution(&AttributionSource::PromoCode);

        let mut shard_b = RunStats::default();
        shard_b.fuzzy_matches = 3;
        shard_b.total_promo_transactions = 5;
        shard_b.record_criteria(MatchCriteria::Date);
        shard_b.record_criteria(MatchCriteria::Phone);
        shard_b.record_conflict(ConflictStrategy::SourcePriority);
        shard_b.record_time_window(false);

        let mut reduced = RunStats::default();
        reduced.merge(&shard_a);
        reduced.merge(&shard_b);
        reduced.finalize();

        assert_eq!(reduced.exact_matches, 2);
        assert_eq!(reduced.fuzzy_matches, 3);
        assert_eq!(reduced.unmatched, 1);
        assert_eq!(reduced.conflicts_resolved, 1);
        assert_eq!(reduced.match_by_criteria.get("date"), Some(&2));
        assert_eq!(reduced.match_by_criteria.get("phone"), Some(&1));
        assert_eq!(reduced.time_window_metrics.within_window, 1);
        assert_eq!(reduced.time_window_metrics.outside_window, 1);
        assert_eq!(reduced.time_window_metrics.within_window_rate, 0.5);
        assert_eq!(reduced.match_rate, 5.0 / 6.0);
        assert_eq!(reduced.promo_coverage, 1.0);
    }

    #[test]
    fn test_stats_serialization_is_deterministic() {
        let mut stats = RunStats::default();
        stats.record_attribution(&AttributionSource::Other("tiktok".to_string()));
        stats.record_attribution(&AttributionSource::GoogleAds);
        stats.finalize();

        let first = serde_json::to_string(&stats).unwrap();
        let second = serde_json::to_string(&stats.clone()).unwrap();
        assert_eq!(first, second);
    }
}
