//! Multi-criteria candidate index over the promo-order set
//!
//! Transaction identifiers frequently differ between the two sources by
//! truncation, casing, or system-specific suffixes, so a single exact
//! index would miss true duplicates. Five cheap independent indices are
//! built once per run and probed per transaction; the union of hits
//! becomes the candidate set, avoiding an O(T x P) full comparison.
//!
//! Once built the index is read-only and can be shared across concurrent
//! scoring workers.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::types::PromoOrder;

/// Lookup structures over one run's promo orders.
#[derive(Debug, Default)]
pub struct CandidateIndex {
    /// Verbatim identifier lookup for the exact path. When two promo
    /// orders share an identifier the later one wins the slot.
    by_transaction_id: HashMap<String, PromoOrder>,
    by_date: HashMap<NaiveDate, Vec<PromoOrder>>,
    by_amount_bucket: HashMap<i64, Vec<PromoOrder>>,
    by_id_prefix: HashMap<String, Vec<PromoOrder>>,
    by_promo_code: HashMap<String, Vec<PromoOrder>>,
    by_normalized_phone: HashMap<String, Vec<PromoOrder>>,
}

impl CandidateIndex {
    /// Build the index from the promo-order collection. Records missing a
    /// field simply do not enter that field's index.
    pub fn build(orders: &[PromoOrder]) -> Self {
        let mut index = CandidateIndex::default();

        for order in orders {
            let transaction_id = order.transaction_id.trim();

            if !transaction_id.is_empty() {
                index
                    .by_transaction_id
                    .insert(transaction_id.to_string(), order.clone());
                index
                    .by_id_prefix
                    .entry(id_prefix(transaction_id).to_string())
                    .or_default()
                    .push(order.clone());
            }

            if let Some(date) = order.order_date {
                index.by_date.entry(date).or_default().push(order.clone());
            }

            if order.order_amount != 0.0 {
                index
                    .by_amount_bucket
                    .entry(amount_bucket(order.order_amount))
                    .or_default()
                    .push(order.clone());
            }

            if !order.promo_code.is_empty() {
                index
                    .by_promo_code
                    .entry(order.promo_code.clone())
                    .or_default()
                    .push(order.clone());
            }

            if let Some(phone) = &order.customer_phone {
                let normalized = normalize_phone(phone);
                if !normalized.is_empty() {
                    index
                        .by_normalized_phone
                        .entry(normalized)
                        .or_default()
                        .push(order.clone());
                }
            }
        }

        tracing::debug!(
            orders = orders.len(),
            exact_ids = index.by_transaction_id.len(),
            dates = index.by_date.len(),
            amount_buckets = index.by_amount_bucket.len(),
            id_prefixes = index.by_id_prefix.len(),
            promo_codes = index.by_promo_code.len(),
            phones = index.by_normalized_phone.len(),
            "Built candidate index"
        );

        index
    }

    /// Verbatim identifier lookup (the exact-match path).
    pub fn exact(&self, transaction_id: &str) -> Option<&PromoOrder> {
        self.by_transaction_id.get(transaction_id)
    }

    pub fn on_date(&self, date: NaiveDate) -> &[PromoOrder] {
        self.by_date.get(&date).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn in_amount_bucket(&self, bucket: i64) -> &[PromoOrder] {
        self.by_amount_bucket
            .get(&bucket)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn with_id_prefix(&self, prefix: &str) -> &[PromoOrder] {
        self.by_id_prefix
            .get(prefix)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn with_promo_code(&self, promo_code: &str) -> &[PromoOrder] {
        self.by_promo_code
            .get(promo_code)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn with_phone(&self, normalized_phone: &str) -> &[PromoOrder] {
        self.by_normalized_phone
            .get(normalized_phone)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Bucket an amount to the nearest 10 for range probing.
pub fn amount_bucket(amount: f64) -> i64 {
    (amount / 10.0).round() as i64 * 10
}

/// First five characters of an identifier, grouping similar ids.
pub fn id_prefix(transaction_id: &str) -> &str {
    match transaction_id.char_indices().nth(5) {
        Some((byte_offset, _)) => &transaction_id[..byte_offset],
        None => transaction_id,
    }
}

/// Strip everything but digits so formatting differences don't hide a
/// shared phone number.
pub fn normalize_phone(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}
