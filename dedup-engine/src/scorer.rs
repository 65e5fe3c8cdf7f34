//! Fuzzy-confidence scoring of transactions against indexed promo orders
//!
//! Each transaction takes one terminal path: an exact identifier hit, a
//! qualifying fuzzy candidate set, or no match. Candidate confidence
//! blends the surfacing index's base weight with identifier similarity,
//! then adds small bonuses for agreeing amounts and near dates.

use chrono::NaiveDate;
use dedup_common::dates::days_apart;
use tracing::debug;

use crate::config::EngineConfig;
use crate::index::{amount_bucket, id_prefix, normalize_phone, CandidateIndex};
use crate::types::{Candidate, MatchCriteria, PromoOrder, Transaction};

/// Ceiling for fuzzy confidence. A confidence of 1.0 always denotes an
/// exact identifier match, so bonus stacking on a fuzzy candidate is
/// capped just below certainty.
pub const MAX_FUZZY_CONFIDENCE: f64 = 0.99;

/// Bonus when amounts agree within `AMOUNT_EPSILON`.
const AMOUNT_BONUS: f64 = 0.2;
const AMOUNT_EPSILON: f64 = 0.01;

/// Bonus when purchase and order dates are at most one day apart.
const DATE_BONUS: f64 = 0.1;

/// Normalized identifier similarity in [0, 1]; symmetric and
/// deterministic (Sorensen-Dice over character bigrams).
pub fn token_similarity(a: &str, b: &str) -> f64 {
    strsim::sorensen_dice(a, b)
}

/// Terminal scoring outcome for one transaction.
#[derive(Debug)]
pub enum MatchOutcome {
    /// The transaction carried no identifier; counted as unmatched.
    MissingId,
    /// Verbatim identifier hit. `within_window` is diagnostic only.
    Exact {
        order: PromoOrder,
        within_window: bool,
    },
    /// No candidate reached the fuzzy threshold.
    NoMatch,
    /// One or more candidates qualified, sorted by confidence descending.
    Qualified {
        candidates: Vec<Candidate>,
        best_confidence: f64,
    },
}

/// Scores a transaction against the candidate index.
#[derive(Debug, Clone)]
pub struct MatchScorer {
    fuzzy_matching_threshold: f64,
    time_window_hours: f64,
    criteria: Vec<MatchCriteria>,
}

impl MatchScorer {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            fuzzy_matching_threshold: config.fuzzy_matching_threshold,
            time_window_hours: config.time_window_hours,
            criteria: config.additional_match_criteria.clone(),
        }
    }

    /// Score one transaction. The state machine is
    /// `START -> EXACT | FUZZY-QUALIFIED | NONE`, all terminal.
    pub fn score(&self, transaction: &Transaction, index: &CandidateIndex) -> MatchOutcome {
        let transaction_id = transaction.transaction_id.trim();
        if transaction_id.is_empty() {
            return MatchOutcome::MissingId;
        }

        if let Some(order) = index.exact(transaction_id) {
            let within_window = self.within_time_window(transaction.date, order.order_date);
            return MatchOutcome::Exact {
                order: order.clone(),
                within_window,
            };
        }

        let mut candidates = self.gather_candidates(transaction, transaction_id, index);
        if candidates.is_empty() {
            return MatchOutcome::NoMatch;
        }

        let mut qualified: Vec<Candidate> = Vec::new();
        for candidate in candidates.iter_mut() {
            candidate.confidence =
                self.score_candidate(transaction, transaction_id, candidate);
            if candidate.confidence >= self.fuzzy_matching_threshold {
                qualified.push(candidate.clone());
            }
        }

        if qualified.is_empty() {
            return MatchOutcome::NoMatch;
        }

        // Stable sort keeps gathering order among equal confidences, so
        // repeated runs pick the same winner.
        qualified.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let best_confidence = qualified[0].confidence;

        debug!(
            transaction_id = %transaction_id,
            qualified = qualified.len(),
            best_confidence,
            "Fuzzy candidates qualified"
        );

        MatchOutcome::Qualified {
            candidates: qualified,
            best_confidence,
        }
    }

    /// Probe the enabled indices and collect unique candidates. A
    /// candidate is deduplicated by its promo-side transaction id; the
    /// first index to surface it wins the criteria tag.
    fn gather_candidates(
        &self,
        transaction: &Transaction,
        transaction_id: &str,
        index: &CandidateIndex,
    ) -> Vec<Candidate> {
        let mut candidates: Vec<Candidate> = Vec::new();
        let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();

        let mut push_unique = |order: &PromoOrder, criteria: MatchCriteria| {
            let candidate_id = order.transaction_id.trim();
            if candidate_id.is_empty() || seen.contains(candidate_id) {
                return;
            }
            seen.insert(candidate_id.to_string());
            candidates.push(Candidate {
                order: order.clone(),
                criteria,
                base_confidence: criteria.base_confidence(),
                confidence: 0.0,
            });
        };

        if self.criteria.contains(&MatchCriteria::Date) {
            if let Some(date) = transaction.date {
                // Current and neighboring days.
                for offset in -1..=1 {
                    if let Some(probe) = date.checked_add_signed(chrono::Duration::days(offset)) {
                        for order in index.on_date(probe) {
                            push_unique(order, MatchCriteria::Date);
                        }
                    }
                }
            }
        }

        if self.criteria.contains(&MatchCriteria::IdPrefix) {
            for order in index.with_id_prefix(id_prefix(transaction_id)) {
                push_unique(order, MatchCriteria::IdPrefix);
            }
        }

        if self.criteria.contains(&MatchCriteria::Amount) && transaction.purchase_revenue != 0.0 {
            let bucket = amount_bucket(transaction.purchase_revenue);
            for probe in [bucket - 10, bucket, bucket + 10] {
                for order in index.in_amount_bucket(probe) {
                    push_unique(order, MatchCriteria::Amount);
                }
            }
        }

        if self.criteria.contains(&MatchCriteria::Phone) {
            if let Some(phone) = &transaction.customer_phone {
                let normalized = normalize_phone(phone);
                if !normalized.is_empty() {
                    for order in index.with_phone(&normalized) {
                        push_unique(order, MatchCriteria::Phone);
                    }
                }
            }
        }

        candidates
    }

    /// Blend base weight with identifier similarity, add the amount and
    /// date bonuses, and clamp.
    fn score_candidate(
        &self,
        transaction: &Transaction,
        transaction_id: &str,
        candidate: &Candidate,
    ) -> f64 {
        let candidate_id = candidate.order.transaction_id.trim();
        let similarity = token_similarity(transaction_id, candidate_id);
        let mut confidence = (candidate.base_confidence + similarity) / 2.0;

        if (transaction.purchase_revenue - candidate.order.order_amount).abs() < AMOUNT_EPSILON {
            confidence += AMOUNT_BONUS;
        }

        if let (Some(tx_date), Some(order_date)) = (transaction.date, candidate.order.order_date) {
            if days_apart(tx_date, order_date) <= 1 {
                confidence += DATE_BONUS;
            }
        }

        confidence.clamp(0.0, MAX_FUZZY_CONFIDENCE)
    }

    /// Exact-path diagnostic: are the two dates within the configured
    /// window? Missing dates count as outside.
    fn within_time_window(&self, tx_date: Option<NaiveDate>, order_date: Option<NaiveDate>) -> bool {
        match (tx_date, order_date) {
            (Some(a), Some(b)) => days_apart(a, b) as f64 * 24.0 <= self.time_window_hours,
            _ => false,
        }
    }
}
