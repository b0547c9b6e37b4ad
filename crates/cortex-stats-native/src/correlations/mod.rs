//! Correlation result tables
//!
//! This module provides access to stored prediction/response correlations:
//! - [`record`]: Row type, lenient CSV parsing, atomic table writes
//! - [`selection`]: Query filters and the DNN/STRF row filters
//! - [`store`]: Queries, significance filtering and per-layer aggregation
//! - [`enrich`]: Normalizer enrichment and write-back

pub mod enrich;
pub mod record;
pub mod selection;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

pub use enrich::{EnrichmentReport, StatsKey};
pub use record::{CorrelationRecord, Metric};
pub use selection::{DistributionQuery, DnnFilter, ResultFilter, Selection, StrfFilter, DEFAULT_N_SENTS};
pub use store::{
    add_layer_types, layer_distributions, peak_median_layer, CorrelationStore, Correlations,
    LayerDistributions, StrfCorrelations, SupersetSignificance,
};
