//! Deduplication and attribution resolution engine
//!
//! Reconciles purchase transactions reported by a web-analytics provider
//! with orders reported by a promo-code provider, then credits every
//! purchase with exactly one marketing channel.
//!
//! The pipeline per run:
//!
//! 1. [`index`] builds multi-criteria lookup structures over the promo
//!    orders (exact id, date, amount bucket, id prefix, phone).
//! 2. [`scorer`] walks each transaction to a terminal outcome: exact
//!    match, qualified fuzzy candidate set, or no match.
//! 3. [`resolver`] picks one winner when several candidates qualify,
//!    using the configured [`config::ConflictStrategy`].
//! 4. [`attribution`] assigns the marketing channel; promo-code
//!    attribution dominates UTM signals.
//! 5. [`stats`] accumulates the run's counters and derived rates.
//!
//! [`Deduplicator`] ties the stages together. It holds no state between
//! runs: identical inputs and configuration produce identical output.

pub mod attribution;
pub mod config;
pub mod dedup;
pub mod index;
pub mod resolver;
pub mod scorer;
pub mod stats;
pub mod types;

pub use attribution::{
    AttributionDetails, AttributionModel, AttributionRules, AttributionSource,
    AttributionSourceAssigner,
};
pub use config::{ConfigUpdate, ConflictStrategy, EngineConfig};
pub use dedup::Deduplicator;
pub use index::CandidateIndex;
pub use resolver::{ConflictResolver, ResolveFn};
pub use scorer::{MatchOutcome, MatchScorer};
pub use stats::{AttributionStats, RunStats, TimeWindowMetrics};
pub use types::{
    AnnotatedTransaction, Candidate, MatchCriteria, MatchType, PromoOrder, Transaction,
};
