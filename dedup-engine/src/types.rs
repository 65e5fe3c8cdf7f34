//! Record types for the deduplication engine
//!
//! Input records arrive from two independent collaborators: the analytics
//! provider reports `Transaction`s, the promo-code provider reports
//! `PromoOrder`s. The engine never mutates its inputs; each run produces a
//! fresh `AnnotatedTransaction` per input transaction.

use chrono::NaiveDate;
use dedup_common::dates::lenient_date;
use serde::{Deserialize, Serialize};

use crate::attribution::{AttributionDetails, AttributionSource};

/// Purchase transaction reported by the web-analytics collaborator.
///
/// `transaction_id` is untrusted: it may be empty, truncated, or carry a
/// system-specific suffix relative to the promo-side identifier for the
/// same purchase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default)]
    pub transaction_id: String,

    /// Purchase date; `None` when missing or unparsable.
    #[serde(default, with = "lenient_date")]
    pub date: Option<NaiveDate>,

    /// Raw `"source / medium"` string from the analytics export.
    #[serde(default)]
    pub source_medium: String,

    #[serde(default)]
    pub campaign: String,

    #[serde(default)]
    pub purchase_revenue: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_phone: Option<String>,
}

/// Order reported by the promotional-code collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromoOrder {
    #[serde(default)]
    pub promo_code: String,

    #[serde(default)]
    pub order_id: String,

    #[serde(default)]
    pub transaction_id: String,

    #[serde(default, with = "lenient_date")]
    pub order_date: Option<NaiveDate>,

    #[serde(default)]
    pub order_amount: f64,

    #[serde(default)]
    pub restaurant: String,

    #[serde(default)]
    pub country: String,

    #[serde(default)]
    pub promo_source: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_phone: Option<String>,
}

/// Terminal match outcome for a transaction. Every transaction ends in
/// exactly one of these states; there is no re-entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// Identifier matched a promo order verbatim.
    Exact,
    /// Single candidate qualified above the fuzzy threshold.
    Fuzzy,
    /// Multiple candidates qualified; a conflict strategy picked the winner.
    FuzzyResolved,
    /// No candidate qualified (or the transaction had no identifier).
    None,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Exact => "exact",
            MatchType::Fuzzy => "fuzzy",
            MatchType::FuzzyResolved => "fuzzy_resolved",
            MatchType::None => "none",
        }
    }
}

/// Which index surfaced a candidate (or, for exact matches, the verbatim
/// identifier lookup).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchCriteria {
    TransactionId,
    Date,
    Amount,
    IdPrefix,
    Phone,
}

impl MatchCriteria {
    /// All criteria, in stats-reporting order.
    pub const ALL: [MatchCriteria; 5] = [
        MatchCriteria::TransactionId,
        MatchCriteria::Date,
        MatchCriteria::Amount,
        MatchCriteria::IdPrefix,
        MatchCriteria::Phone,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchCriteria::TransactionId => "transaction_id",
            MatchCriteria::Date => "date",
            MatchCriteria::Amount => "amount",
            MatchCriteria::IdPrefix => "id_prefix",
            MatchCriteria::Phone => "phone",
        }
    }

    /// Base confidence contributed by this criteria before identifier
    /// similarity is blended in. Phone agreement is the strongest signal,
    /// a shared date the weakest.
    pub fn base_confidence(&self) -> f64 {
        match self {
            MatchCriteria::TransactionId => 1.0,
            MatchCriteria::Date => 0.5,
            MatchCriteria::Amount => 0.6,
            MatchCriteria::IdPrefix => 0.7,
            MatchCriteria::Phone => 0.8,
        }
    }
}

/// A promo order surfaced by one or more indices as a plausible match for
/// a transaction. Scoring-time only; discarded once the transaction is
/// resolved.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub order: PromoOrder,
    /// Index that surfaced this candidate (first hit wins the tag).
    pub criteria: MatchCriteria,
    pub base_confidence: f64,
    /// Final blended confidence in [0, 1]; filled during scoring.
    pub confidence: f64,
}

/// A transaction annotated with its match outcome and attribution.
///
/// Invariants: `is_promo_order` implies `match_type != none` and
/// `promo_code` is set; `match_confidence == 1.0` only for exact matches
/// (fuzzy confidences are capped just below certainty).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotatedTransaction {
    #[serde(flatten)]
    pub transaction: Transaction,

    pub is_promo_order: bool,
    pub match_type: MatchType,
    pub match_confidence: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub promo_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promo_source: Option<String>,
    /// Promo-side identifier a fuzzy match paired with.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fuzzy_matched_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_criteria: Option<MatchCriteria>,
    /// Strategy name recorded when a conflict had to be resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict_resolution: Option<String>,
    /// Order id carried over from the matched promo order; drives the
    /// optional same-order aggregation post-pass.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,

    pub attribution_source: AttributionSource,
    pub attribution_details: AttributionDetails,

    // Aggregation post-pass output (use_transactional_attrs only).
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_aggregated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregated_from_count: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub all_promo_codes: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub all_promo_sources: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub all_attribution_sources: Vec<AttributionSource>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub all_match_types: Vec<MatchType>,
}

impl AnnotatedTransaction {
    /// Fresh annotation with no match and no attribution assigned yet.
    pub fn new(transaction: Transaction) -> Self {
        Self {
            transaction,
            is_promo_order: false,
            match_type: MatchType::None,
            match_confidence: 0.0,
            promo_code: None,
            promo_source: None,
            fuzzy_matched_id: None,
            match_criteria: None,
            conflict_resolution: None,
            order_id: None,
            attribution_source: AttributionSource::UtmSource,
            attribution_details: AttributionDetails::default(),
            is_aggregated: false,
            aggregated_from_count: None,
            all_promo_codes: Vec::new(),
            all_promo_sources: Vec::new(),
            all_attribution_sources: Vec::new(),
            all_match_types: Vec::new(),
        }
    }

    /// Copy the promo-side fields of a matched order onto this annotation.
    pub(crate) fn attach_order(&mut self, order: &PromoOrder) {
        self.is_promo_order = true;
        self.promo_code = Some(order.promo_code.clone());
        self.promo_source = Some(order.promo_source.clone());
        if !order.order_id.is_empty() {
            self.order_id = Some(order.order_id.clone());
        }
    }
}
