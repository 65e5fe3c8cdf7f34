//! Deduplication engine orchestration
//!
//! One `deduplicate` call is one run: build the candidate index, walk the
//! transactions through scoring, conflict resolution, and attribution,
//! and return fresh annotations plus the run's statistics. The engine
//! holds no state between runs, so the same inputs and configuration
//! always produce the same output.

use dedup_common::Result;
use tracing::{info, warn};

use crate::attribution::{AttributionRules, AttributionSourceAssigner};
use crate::config::{ConfigUpdate, EngineConfig};
use crate::index::CandidateIndex;
use crate::resolver::{ConflictResolver, ResolveFn};
use crate::scorer::{MatchOutcome, MatchScorer};
use crate::stats::RunStats;
use crate::types::{AnnotatedTransaction, MatchCriteria, MatchType, PromoOrder, Transaction};

/// Reconciles web-analytics transactions with promo-code orders and
/// credits each purchase with one attribution source.
pub struct Deduplicator {
    config: EngineConfig,
    rules: AttributionRules,
    custom_resolver: Option<ResolveFn>,
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new()
    }
}

impl Deduplicator {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            rules: AttributionRules::default(),
            custom_resolver: None,
        }
    }

    pub fn with_config(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            rules: AttributionRules::default(),
            custom_resolver: None,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Apply a partial configuration update. All-or-nothing: an invalid
    /// update leaves the current configuration untouched.
    pub fn configure(&mut self, update: &ConfigUpdate) -> Result<()> {
        self.config.apply(update)
    }

    pub fn set_attribution_rules(&mut self, rules: AttributionRules) {
        self.rules = rules;
    }

    /// Install the resolver used by `ConflictStrategy::Custom`.
    pub fn set_custom_resolver(&mut self, resolver: ResolveFn) {
        self.custom_resolver = Some(resolver);
    }

    /// Run the engine over one batch of transactions and promo orders.
    ///
    /// Inputs are never mutated. Under `ConflictStrategy::Error` the
    /// first multi-candidate transaction aborts the whole run.
    pub fn deduplicate(
        &self,
        transactions: &[Transaction],
        promo_orders: &[PromoOrder],
    ) -> Result<(Vec<AnnotatedTransaction>, RunStats)> {
        self.config.validate()?;
        let resolver =
            ConflictResolver::new(self.config.conflict_strategy, self.custom_resolver.as_ref())?;

        let index = CandidateIndex::build(promo_orders);
        let scorer = MatchScorer::from_config(&self.config);
        let mut assigner = AttributionSourceAssigner::new(self.rules.clone());

        let mut stats = RunStats::default();
        stats.total_ga4_transactions = transactions.len() as u64;
        stats.total_promo_transactions = promo_orders.len() as u64;

        let mut annotated = Vec::with_capacity(transactions.len());
        for transaction in transactions {
            let mut record = AnnotatedTransaction::new(transaction.clone());

            match scorer.score(transaction, &index) {
                MatchOutcome::MissingId => {
                    warn!(
                        source_medium = %transaction.source_medium,
                        "Transaction without identifier; attributing from UTM only"
                    );
                    stats.unmatched += 1;
                }
                MatchOutcome::NoMatch => {
                    stats.unmatched += 1;
                }
                MatchOutcome::Exact {
                    order,
                    within_window,
                } => {
                    record.attach_order(&order);
                    record.match_type = MatchType::Exact;
                    record.match_confidence = 1.0;
                    record.match_criteria = Some(MatchCriteria::TransactionId);
                    stats.exact_matches += 1;
                    stats.record_time_window(within_window);
                }
                MatchOutcome::Qualified {
                    candidates,
                    best_confidence,
                } => {
                    let winner = if candidates.len() == 1 {
                        record.match_type = MatchType::Fuzzy;
                        &candidates[0]
                    } else {
                        let winner = resolver.resolve(&candidates)?;
                        record.match_type = MatchType::FuzzyResolved;
                        record.conflict_resolution =
                            Some(resolver.strategy().as_str().to_string());
                        stats.record_conflict(resolver.strategy());
                        winner
                    };

                    record.attach_order(&winner.order);
                    // The run-level confidence is the best candidate's,
                    // even when a strategy picked a different winner.
                    record.match_confidence = if candidates.len() == 1 {
                        winner.confidence
                    } else {
                        best_confidence
                    };
                    record.fuzzy_matched_id = Some(winner.order.transaction_id.clone());
                    record.match_criteria = Some(winner.criteria);
                    stats.record_criteria(winner.criteria);
                    stats.fuzzy_matches += 1;
                }
            }

            assigner.assign(&mut record);
            stats.record_attribution(&record.attribution_source);
            annotated.push(record);
        }

        if self.config.use_transactional_attrs {
            annotated = aggregate_by_order(annotated);
        }

        stats.attribution_details = assigner.stats().clone();
        stats.finalize();

        info!(
            transactions = stats.total_ga4_transactions,
            promo_orders = stats.total_promo_transactions,
            exact = stats.exact_matches,
            fuzzy = stats.fuzzy_matches,
            unmatched = stats.unmatched,
            conflicts = stats.conflicts_resolved,
            match_rate = stats.match_rate,
            "Deduplication run complete"
        );

        Ok((annotated, stats))
    }
}

/// Merge annotated records that matched the same promo order into one
/// record per order. The grouped records are duplicate reports of the
/// same purchase, so the promo-attributed record (or the first, when
/// none is) represents the group with its fields intact; the group's
/// codes, sources, and match types are retained alongside. Records
/// without an order id pass through unchanged, after the grouped ones.
fn aggregate_by_order(records: Vec<AnnotatedTransaction>) -> Vec<AnnotatedTransaction> {
    let mut group_order: Vec<String> = Vec::new();
    let mut groups: std::collections::HashMap<String, Vec<AnnotatedTransaction>> =
        std::collections::HashMap::new();
    let mut keyless: Vec<AnnotatedTransaction> = Vec::new();

    for record in records {
        match record.order_id.clone() {
            Some(order_id) => {
                if !groups.contains_key(&order_id) {
                    group_order.push(order_id.clone());
                }
                groups.entry(order_id).or_default().push(record);
            }
            None => keyless.push(record),
        }
    }

    let mut aggregated = Vec::with_capacity(group_order.len() + keyless.len());
    for order_id in &group_order {
        let Some(group) = groups.remove(order_id) else {
            continue;
        };
        if group.len() == 1 {
            aggregated.extend(group);
            continue;
        }

        let representative = group
            .iter()
            .position(|record| record.is_promo_order)
            .unwrap_or(0);

        let mut merged = group[representative].clone();
        merged.is_aggregated = true;
        merged.aggregated_from_count = Some(group.len());

        for record in &group {
            if let Some(code) = &record.promo_code {
                if !merged.all_promo_codes.contains(code) {
                    merged.all_promo_codes.push(code.clone());
                }
            }
            if let Some(source) = &record.promo_source {
                if !merged.all_promo_sources.contains(source) {
                    merged.all_promo_sources.push(source.clone());
                }
            }
            if !merged
                .all_attribution_sources
                .contains(&record.attribution_source)
            {
                merged
                    .all_attribution_sources
                    .push(record.attribution_source.clone());
            }
            if !merged.all_match_types.contains(&record.match_type) {
                merged.all_match_types.push(record.match_type);
            }
        }

        info!(
            order_id = %order_id,
            merged_records = group.len(),
            "Aggregated same-order transactions"
        );
        aggregated.push(merged);
    }

    aggregated.extend(keyless);
    aggregated
}
