//! Attribution source assignment
//!
//! Maps raw `"source / medium"` UTM strings to canonical marketing
//! channels and credits every purchase with exactly one attribution
//! source. Promo-code attribution dominates all other signals: a
//! transaction matched to a promo order is always credited to
//! `promo_code` regardless of its UTM data.

use std::collections::HashMap;
use std::fmt;

use serde::{Serialize, Serializer};
use tracing::{debug, info};

use crate::stats::AttributionStats;
use crate::types::AnnotatedTransaction;

/// Canonical attribution source for a purchase.
///
/// `Other` carries a raw `utm_source` value that has no standardized
/// mapping; it is passed through unchanged, as downstream reporting
/// prefers an unmapped-but-real source name over `unknown`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributionSource {
    PromoCode,
    UtmSource,
    Referral,
    Direct,
    Organic,
    GoogleAds,
    GoogleOrganic,
    Facebook,
    Instagram,
    Email,
    Push,
    Qr,
    Other(String),
}

impl AttributionSource {
    pub fn as_str(&self) -> &str {
        match self {
            AttributionSource::PromoCode => "promo_code",
            AttributionSource::UtmSource => "utm_source",
            AttributionSource::Referral => "referral",
            AttributionSource::Direct => "direct",
            AttributionSource::Organic => "organic",
            AttributionSource::GoogleAds => "google_ads",
            AttributionSource::GoogleOrganic => "google_organic",
            AttributionSource::Facebook => "facebook",
            AttributionSource::Instagram => "instagram",
            AttributionSource::Email => "email",
            AttributionSource::Push => "push",
            AttributionSource::Qr => "qr",
            AttributionSource::Other(raw) => raw,
        }
    }

    /// Map a raw source name onto a canonical variant, falling back to
    /// `Other` for anything unrecognized.
    pub fn from_raw(raw: &str) -> Self {
        match raw {
            "promo_code" => AttributionSource::PromoCode,
            "utm_source" => AttributionSource::UtmSource,
            "referral" => AttributionSource::Referral,
            "direct" => AttributionSource::Direct,
            "organic" => AttributionSource::Organic,
            "google_ads" => AttributionSource::GoogleAds,
            "google_organic" => AttributionSource::GoogleOrganic,
            "facebook" => AttributionSource::Facebook,
            "instagram" => AttributionSource::Instagram,
            "email" => AttributionSource::Email,
            "push" => AttributionSource::Push,
            "qr" => AttributionSource::Qr,
            other => AttributionSource::Other(other.to_string()),
        }
    }
}

impl fmt::Display for AttributionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for AttributionSource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Attribution model credited for a conversion. Only last-click is
/// exercised by the engine today; the remaining models are part of the
/// reporting vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributionModel {
    #[default]
    LastClick,
    FirstClick,
    Linear,
    TimeDecay,
    PositionBased,
}

impl AttributionModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributionModel::LastClick => "last_click",
            AttributionModel::FirstClick => "first_click",
            AttributionModel::Linear => "linear",
            AttributionModel::TimeDecay => "time_decay",
            AttributionModel::PositionBased => "position_based",
        }
    }
}

/// Diagnostic detail attached to every attributed transaction.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AttributionDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<AttributionSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promo_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promo_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_medium: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_campaign: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_paid: Option<bool>,
    pub model_used: AttributionModel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_priority: Option<usize>,
}

/// Static priority ordering of attribution sources plus the
/// source-standardization table.
#[derive(Debug, Clone)]
pub struct AttributionRules {
    priority_list: Vec<AttributionSource>,
    /// Lowercased `"source / medium"` keys to canonical sources.
    source_mapping: HashMap<String, AttributionSource>,
    default_source: AttributionSource,
    attribution_model: AttributionModel,
}

impl Default for AttributionRules {
    fn default() -> Self {
        let priority_list = vec![
            AttributionSource::PromoCode,
            AttributionSource::UtmSource,
            AttributionSource::Referral,
            AttributionSource::Direct,
            AttributionSource::Organic,
        ];

        let source_mapping: HashMap<String, AttributionSource> = [
            ("google / cpc", AttributionSource::GoogleAds),
            ("google / organic", AttributionSource::GoogleOrganic),
            ("facebook / paid", AttributionSource::Facebook),
            ("instagram / paid", AttributionSource::Instagram),
            ("facebook / referral", AttributionSource::Facebook),
            ("instagram / referral", AttributionSource::Instagram),
            ("email / email", AttributionSource::Email),
            ("push / notification", AttributionSource::Push),
            ("(direct) / (none)", AttributionSource::Direct),
            ("qr / offline", AttributionSource::Qr),
        ]
        .into_iter()
        .map(|(key, source)| (key.to_string(), source))
        .collect();

        Self {
            priority_list,
            source_mapping,
            default_source: AttributionSource::UtmSource,
            attribution_model: AttributionModel::LastClick,
        }
    }
}

impl AttributionRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the priority ordering (highest priority first).
    pub fn with_priority_list(mut self, priority_list: Vec<AttributionSource>) -> Self {
        self.priority_list = priority_list;
        self
    }

    /// Replace the standardization table; keys are matched lowercased.
    pub fn with_source_mapping(mut self, mapping: HashMap<String, AttributionSource>) -> Self {
        self.source_mapping = mapping
            .into_iter()
            .map(|(key, source)| (key.to_lowercase(), source))
            .collect();
        self
    }

    pub fn with_default_source(mut self, default_source: AttributionSource) -> Self {
        self.default_source = default_source;
        self
    }

    pub fn model(&self) -> AttributionModel {
        self.attribution_model
    }

    /// Rank of a source in the priority list; lower is higher priority.
    /// Sources not in the list rank below everything listed.
    pub fn priority(&self, source: &AttributionSource) -> usize {
        self.priority_list
            .iter()
            .position(|listed| listed == source)
            .unwrap_or(self.priority_list.len())
    }

    /// Standardize a raw UTM source/medium pair into a canonical source.
    ///
    /// The lookup key is `"{source} / {medium}"` (case-insensitive). On a
    /// miss the raw `utm_source` passes through; an empty source yields
    /// the configured default.
    pub fn standardize(&self, utm_source: &str, utm_medium: Option<&str>) -> AttributionSource {
        if utm_source.is_empty() {
            return self.default_source.clone();
        }

        let key = match utm_medium {
            Some(medium) => format!("{} / {}", utm_source, medium),
            None => utm_source.to_string(),
        };

        self.source_mapping
            .get(&key.to_lowercase())
            .cloned()
            .unwrap_or_else(|| AttributionSource::from_raw(utm_source))
    }
}

/// Media classified as paid placements.
const PAID_MEDIA: [&str; 6] = ["cpc", "ppc", "cpm", "paid", "paidsocial", "display"];

/// Assigns an attribution source to each annotated transaction and keeps
/// a per-run histogram of sources and models for diagnostics.
#[derive(Debug, Clone, Default)]
pub struct AttributionSourceAssigner {
    rules: AttributionRules,
    stats: AttributionStats,
}

impl AttributionSourceAssigner {
    pub fn new(rules: AttributionRules) -> Self {
        Self {
            rules,
            stats: AttributionStats::default(),
        }
    }

    pub fn rules(&self) -> &AttributionRules {
        &self.rules
    }

    /// Histogram of sources/models assigned since the last reset.
    pub fn stats(&self) -> &AttributionStats {
        &self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = AttributionStats::default();
    }

    /// Assign an attribution source to a single transaction.
    ///
    /// Promo-matched transactions short-circuit to `promo_code` with the
    /// last-click model; everything else is standardized from the raw
    /// `"source / medium"` string.
    pub fn assign(&mut self, tx: &mut AnnotatedTransaction) {
        self.stats.processed += 1;

        let has_promo_code = tx
            .promo_code
            .as_deref()
            .is_some_and(|code| !code.is_empty());
        if tx.is_promo_order && has_promo_code {
            tx.attribution_source = AttributionSource::PromoCode;
            tx.attribution_details = AttributionDetails {
                source: Some(AttributionSource::PromoCode),
                promo_code: tx.promo_code.clone(),
                promo_source: tx.promo_source.clone(),
                model_used: AttributionModel::LastClick,
                source_priority: Some(self.rules.priority(&AttributionSource::PromoCode)),
                ..AttributionDetails::default()
            };
            self.stats
                .record(&AttributionSource::PromoCode, AttributionModel::LastClick);
            return;
        }

        let mut parts = tx.transaction.source_medium.splitn(2, " / ");
        let utm_source = parts.next().unwrap_or("").trim().to_string();
        let utm_medium = parts.next().map(|medium| medium.trim().to_string());

        let std_source = self.rules.standardize(&utm_source, utm_medium.as_deref());
        let is_paid = is_paid_source(&utm_source, utm_medium.as_deref());
        let model = self.rules.model();

        debug!(
            transaction_id = %tx.transaction.transaction_id,
            source = %std_source,
            is_paid,
            "Assigned UTM attribution"
        );

        tx.attribution_details = AttributionDetails {
            source: Some(std_source.clone()),
            utm_source: (!utm_source.is_empty()).then_some(utm_source),
            utm_medium,
            utm_campaign: (!tx.transaction.campaign.is_empty())
                .then(|| tx.transaction.campaign.clone()),
            is_paid: Some(is_paid),
            model_used: model,
            source_priority: Some(self.rules.priority(&std_source)),
            ..AttributionDetails::default()
        };
        tx.attribution_source = std_source.clone();

        self.stats.record(&std_source, model);
    }

    /// Assign attribution to a batch, resetting the histogram first.
    pub fn assign_all(&mut self, transactions: &mut [AnnotatedTransaction]) {
        self.reset_stats();
        for tx in transactions.iter_mut() {
            self.assign(tx);
        }
    }

    /// Resolve attribution conflicts among records sharing a key: group by
    /// the extracted key and keep the record with the best (lowest) source
    /// priority in each group. Records without a key are dropped, as they
    /// cannot participate in per-key resolution.
    pub fn resolve_priority_conflict<F>(
        &self,
        records: &[AnnotatedTransaction],
        key: F,
    ) -> Vec<AnnotatedTransaction>
    where
        F: Fn(&AnnotatedTransaction) -> Option<&str>,
    {
        let mut group_order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<&AnnotatedTransaction>> = HashMap::new();

        for record in records {
            let Some(group_key) = key(record) else {
                continue;
            };
            if !groups.contains_key(group_key) {
                group_order.push(group_key.to_string());
            }
            groups.entry(group_key.to_string()).or_default().push(record);
        }

        let mut resolved = Vec::with_capacity(group_order.len());
        for group_key in &group_order {
            let group = &groups[group_key];
            if group.len() == 1 {
                resolved.push(group[0].clone());
                continue;
            }

            let Some(winner) = group.iter().min_by_key(|record| {
                record
                    .attribution_details
                    .source_priority
                    .unwrap_or(usize::MAX)
            }) else {
                continue;
            };

            let sources: Vec<&str> = group
                .iter()
                .map(|record| record.attribution_source.as_str())
                .collect();
            info!(
                key = %group_key,
                sources = ?sources,
                selected = %winner.attribution_source,
                "Resolved attribution priority conflict"
            );

            resolved.push((*winner).clone());
        }

        resolved
    }
}

fn is_paid_source(utm_source: &str, utm_medium: Option<&str>) -> bool {
    let Some(medium) = utm_medium else {
        return false;
    };
    if utm_source.is_empty() || medium.is_empty() {
        return false;
    }
    PAID_MEDIA.contains(&medium.to_lowercase().as_str())
}
