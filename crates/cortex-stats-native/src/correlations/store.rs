//! Correlation result store
//!
//! A [`CorrelationStore`] owns one result table and answers every query over
//! it: row selection, significance filtering, per-layer distributions, peak
//! layers and superset aggregation. Normalizer enrichment and write-back
//! live in [`super::enrich`].
//!
//! # Example
//!
//! ```rust,ignore
//! use cortex_stats_native::correlations::{Correlations, DistributionQuery};
//! use cortex_stats_native::significance::SignificancePolicy;
//!
//! let store = Correlations::open_default(&config, Box::new(metadata))?;
//! let query = DistributionQuery::new("core", 20).policy(SignificancePolicy::threshold(3.0));
//! let per_layer = store.get_corr_all_layers_for_bin_width(&query, &mut calculator)?;
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use cortex_stats_core::math::{self, Summary};
use cortex_stats_core::{BinWidthMs, ChannelId, LayerId, LayerType, NullMethod, SessionId, StimulusSet};
use tracing::{debug, info};

use super::record::{self, CorrelationRecord, Metric};
use super::selection::{DistributionQuery, DnnFilter, ResultFilter, Selection, StrfFilter};
use crate::architecture::LayerArchitecture;
use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, AnalysisResult};
use crate::metadata::NeuralMetadata;
use crate::neural::NormalizerSource;
use crate::significance::{self, SignificanceMap, SignificancePolicy};

/// Store over a DNN result table.
pub type Correlations = CorrelationStore<DnnFilter>;

/// Store over an STRF baseline table.
pub type StrfCorrelations = CorrelationStore<StrfFilter>;

/// Per-layer value distributions, ascending by layer.
pub type LayerDistributions = BTreeMap<LayerId, Vec<f64>>;

/// Significant channels at every bin width and their union.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SupersetSignificance {
    /// Each bin width's own significant set
    pub per_bin_width: BTreeMap<BinWidthMs, SignificanceMap>,
    /// Union over bin widths
    pub superset: SignificanceMap,
}

// ============================================================================
// Store
// ============================================================================

/// A loaded correlation result table.
pub struct CorrelationStore<F: ResultFilter> {
    identifier: String,
    model_name: Option<String>,
    path: PathBuf,
    aux_dir: PathBuf,
    valid_model_names: Vec<String>,
    threshold_percentile: f64,
    pub(super) rows: Vec<CorrelationRecord>,
    filter: F,
    metadata: Box<dyn NeuralMetadata>,
}

impl Correlations {
    /// Results identifier opened by [`Correlations::open_default`].
    pub const DEFAULT_IDENTIFIER: &'static str = "wav2letter_modified_trained_all_bins";

    /// Open the default DNN table.
    ///
    /// # Errors
    ///
    /// See [`CorrelationStore::open`].
    pub fn open_default(
        config: &AnalysisConfig,
        metadata: Box<dyn NeuralMetadata>,
    ) -> AnalysisResult<Self> {
        Self::open(config, Self::DEFAULT_IDENTIFIER, DnnFilter, metadata)
    }
}

impl StrfCorrelations {
    /// Results identifier opened by [`StrfCorrelations::open_default`].
    pub const DEFAULT_IDENTIFIER: &'static str = "STRF_freqs80_all_lags";

    /// Open the default STRF table.
    ///
    /// # Errors
    ///
    /// See [`CorrelationStore::open`].
    pub fn open_default(
        config: &AnalysisConfig,
        metadata: Box<dyn NeuralMetadata>,
    ) -> AnalysisResult<Self> {
        Self::open(config, Self::DEFAULT_IDENTIFIER, StrfFilter, metadata)
    }
}

impl<F: ResultFilter> CorrelationStore<F> {
    /// Open `{saved_corr_dir}/{identifier}_corr_results.csv`.
    ///
    /// # Errors
    ///
    /// [`AnalysisError::TableRead`] if the table is missing or malformed.
    pub fn open(
        config: &AnalysisConfig,
        identifier: &str,
        filter: F,
        metadata: Box<dyn NeuralMetadata>,
    ) -> AnalysisResult<Self> {
        let path = config.corr_file_path(identifier);
        let rows = record::read_table(&path)?;
        info!(path = %path.display(), rows = rows.len(), "Correlation table loaded");
        Ok(Self::from_records(config, identifier, rows, filter, metadata))
    }

    /// Build a store from rows already in memory.
    pub fn from_records(
        config: &AnalysisConfig,
        identifier: &str,
        mut rows: Vec<CorrelationRecord>,
        filter: F,
        metadata: Box<dyn NeuralMetadata>,
    ) -> Self {
        filter.prepare(&mut rows);
        Self {
            identifier: identifier.to_string(),
            model_name: config.model_name_for(identifier).map(ToString::to_string),
            path: config.corr_file_path(identifier),
            aux_dir: config.aux_dir.clone(),
            valid_model_names: config.valid_model_names.clone(),
            threshold_percentile: config.threshold_percentile,
            rows,
            filter,
            metadata,
        }
    }

    /// Results identifier.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Recognized model name, if the identifier names a configured model.
    pub fn model_name(&self) -> Option<&str> {
        self.model_name.as_deref()
    }

    /// Table path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All rows.
    pub fn rows(&self) -> &[CorrelationRecord] {
        &self.rows
    }

    /// Metadata provider.
    pub fn metadata(&self) -> &dyn NeuralMetadata {
        self.metadata.as_ref()
    }

    // ------------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------------

    /// Rows matching a selection.
    pub fn get_selected_data(&self, selection: &Selection) -> Vec<&CorrelationRecord> {
        self.filter.select_rows(&self.rows, selection)
    }

    /// Sessions of a neural area.
    ///
    /// # Errors
    ///
    /// [`AnalysisError::UnknownArea`].
    pub fn area_sessions(&self, area: &str) -> AnalysisResult<Vec<SessionId>> {
        self.metadata.get_all_sessions(area)
    }

    /// Rows of channels admitted by statistical inclusion at the selection's
    /// bin width, grouped by session then ascending channel.
    ///
    /// Sessions come from the selection when given, otherwise from the
    /// significant set. The selection's threshold is not applied.
    ///
    /// # Errors
    ///
    /// Missing bin width, invalid `p_threshold` and normalizer errors.
    pub fn get_significant_data_using_statistical_inclusion(
        &self,
        selection: &Selection,
        p_threshold: f64,
        null_method: NullMethod,
        norm: &mut dyn NormalizerSource,
    ) -> AnalysisResult<Vec<&CorrelationRecord>> {
        let bin_width = selection.bin_width.ok_or_else(|| {
            AnalysisError::invalid("bin_width", "statistical inclusion needs a bin width")
        })?;
        self.included_rows(selection, bin_width, p_threshold, null_method, norm)
    }

    /// Rows of a selection filtered by an optional significance policy.
    ///
    /// # Errors
    ///
    /// See [`CorrelationStore::get_significant_data_using_statistical_inclusion`].
    pub fn select_with_policy(
        &self,
        selection: &Selection,
        policy: Option<SignificancePolicy>,
        norm: &mut dyn NormalizerSource,
    ) -> AnalysisResult<Vec<&CorrelationRecord>> {
        match policy {
            None => Ok(self.get_selected_data(selection)),
            Some(SignificancePolicy::Threshold { multiplier }) => {
                Ok(self.get_selected_data(&selection.clone().threshold(multiplier)))
            }
            Some(SignificancePolicy::StatisticalInclusion { p_threshold, null_method }) => self
                .get_significant_data_using_statistical_inclusion(
                    selection,
                    p_threshold,
                    null_method,
                    norm,
                ),
        }
    }

    /// Statistical inclusion with significance decided at `bin_width`, which
    /// may differ from the selection's.
    fn included_rows(
        &self,
        selection: &Selection,
        bin_width: BinWidthMs,
        p_threshold: f64,
        null_method: NullMethod,
        norm: &mut dyn NormalizerSource,
    ) -> AnalysisResult<Vec<&CorrelationRecord>> {
        let significant = norm.get_significant_sessions_and_channels(
            bin_width,
            p_threshold,
            selection.stimulus,
            null_method,
        )?;

        let base = Selection { sessions: None, threshold: None, ..selection.clone() };
        let candidates = self.get_selected_data(&base);
        let sessions: Vec<SessionId> = match &selection.sessions {
            Some(sessions) => sessions.clone(),
            None => significant.keys().cloned().collect(),
        };

        let mut selected = Vec::new();
        for session in &sessions {
            let Some(channels) = significant.get(session) else { continue };
            for &channel in channels {
                selected.extend(
                    candidates
                        .iter()
                        .copied()
                        .filter(|row| &row.session == session && row.channel == channel),
                );
            }
        }
        debug!(bin_width, p_threshold, rows = selected.len(), "Statistical inclusion selection");
        Ok(selected)
    }

    // ------------------------------------------------------------------------
    // Distributions
    // ------------------------------------------------------------------------

    /// Values of every significant row of an area at one bin width.
    ///
    /// # Errors
    ///
    /// Unknown area and policy errors.
    pub fn get_correlations_for_bin_width(
        &self,
        query: &DistributionQuery,
        norm: &mut dyn NormalizerSource,
    ) -> AnalysisResult<Vec<f64>> {
        let rows = self.query_rows(query, query.bin_width, None, norm)?;
        Ok(rows
            .iter()
            .filter_map(|row| row.finite_value(query.metric, query.stimulus))
            .collect())
    }

    /// Per-layer distributions of an area at one bin width.
    ///
    /// NaN values are excluded; layers left without values are omitted.
    ///
    /// # Errors
    ///
    /// Unknown area and policy errors.
    pub fn get_corr_all_layers_for_bin_width(
        &self,
        query: &DistributionQuery,
        norm: &mut dyn NormalizerSource,
    ) -> AnalysisResult<LayerDistributions> {
        let rows = self.query_rows(query, query.bin_width, None, norm)?;
        Ok(layer_distributions(&rows, query.metric, query.stimulus))
    }

    /// One layer's distribution at every bin width in the table.
    ///
    /// # Errors
    ///
    /// Unknown area and policy errors.
    pub fn get_corr_all_bin_widths_for_layer(
        &self,
        query: &DistributionQuery,
        layer: LayerId,
        norm: &mut dyn NormalizerSource,
    ) -> AnalysisResult<BTreeMap<BinWidthMs, Vec<f64>>> {
        let mut dists = BTreeMap::new();
        for bin_width in self.bin_widths() {
            let values: Vec<f64> = self
                .query_rows(query, bin_width, Some(layer), norm)?
                .iter()
                .filter_map(|row| row.finite_value(query.metric, query.stimulus))
                .collect();
            if !values.is_empty() {
                dists.insert(bin_width, values);
            }
        }
        Ok(dists)
    }

    /// Distribution of the given layer, or of the layer with the highest
    /// median when `layer` is `None`.
    ///
    /// # Errors
    ///
    /// [`AnalysisError::EmptyDistribution`] when no layer (or not the given
    /// one) has values, plus query errors.
    pub fn get_layer_dist_with_peak_median(
        &self,
        query: &DistributionQuery,
        layer: Option<LayerId>,
        norm: &mut dyn NormalizerSource,
    ) -> AnalysisResult<Vec<f64>> {
        let dists = self.get_corr_all_layers_for_bin_width(query, norm)?;
        take_layer(dists, layer)
    }

    // ------------------------------------------------------------------------
    // Thresholds and Supersets
    // ------------------------------------------------------------------------

    /// Percentile of the pooled null normalizer distribution at a bin width
    /// (the configured `threshold_percentile` by default).
    ///
    /// # Errors
    ///
    /// Normalizer errors, an invalid percentile or an empty null.
    pub fn get_normalizer_threshold(
        &self,
        bin_width: BinWidthMs,
        null_method: NullMethod,
        stimulus: StimulusSet,
        percentile: Option<f64>,
        norm: &mut dyn NormalizerSource,
    ) -> AnalysisResult<f64> {
        let null = math::finite(&norm.get_normalizer_null_dist(bin_width, stimulus, null_method)?);
        if null.is_empty() {
            return Err(AnalysisError::empty(format!("{null_method} null at {bin_width}ms")));
        }
        let percentile = percentile.unwrap_or(self.threshold_percentile);
        Ok(math::percentile(&null, percentile)?)
    }

    /// Unique sessions (in area order) with at least one row passing the
    /// threshold policy at a bin width.
    ///
    /// # Errors
    ///
    /// [`AnalysisError::UnknownArea`].
    pub fn get_significant_sessions(
        &self,
        area: &str,
        bin_width: BinWidthMs,
        multiplier: f64,
    ) -> AnalysisResult<Vec<SessionId>> {
        let selection = Selection::new()
            .sessions(self.area_sessions(area)?)
            .bin_width(bin_width)
            .threshold(multiplier);
        let mut seen = BTreeSet::new();
        Ok(self
            .get_selected_data(&selection)
            .into_iter()
            .filter(|row| seen.insert(row.session.clone()))
            .map(|row| row.session.clone())
            .collect())
    }

    /// Channels whose normalizer exceeds each bin width's normalizer
    /// threshold (zero delay), and their union across bin widths.
    ///
    /// # Errors
    ///
    /// See [`CorrelationStore::get_normalizer_threshold`].
    pub fn get_significant_session_and_channels_at_all_bin_width(
        &self,
        null_method: NullMethod,
        stimulus: StimulusSet,
        percentile: Option<f64>,
        norm: &mut dyn NormalizerSource,
    ) -> AnalysisResult<SupersetSignificance> {
        let mut per_bin_width = BTreeMap::new();
        for bin_width in self.bin_widths() {
            let threshold =
                self.get_normalizer_threshold(bin_width, null_method, stimulus, percentile, norm)?;
            let selection = Selection::new().bin_width(bin_width).delay(0.0).stimulus(stimulus);

            let mut own = SignificanceMap::new();
            for row in self.get_selected_data(&selection) {
                if row.stats(stimulus).is_some_and(|s| s.normalizer > threshold) {
                    own.entry(row.session.clone()).or_default().insert(row.channel);
                }
            }
            debug!(
                bin_width,
                threshold,
                channels = significance::channel_count(&own),
                "Significant channels at bin width"
            );
            per_bin_width.insert(bin_width, own);
        }

        let superset = significance::union(per_bin_width.values());
        info!(
            bin_widths = per_bin_width.len(),
            channels = significance::channel_count(&superset),
            "Superset of significant channels"
        );
        Ok(SupersetSignificance { per_bin_width, superset })
    }

    /// Per-layer distributions over a superset of channels, with channels
    /// outside `own` (this bin width's significant set) contributing `0.0`.
    #[must_use]
    pub fn get_corr_super_set_all_layers_for_bin_width(
        &self,
        superset: &SignificanceMap,
        own: &SignificanceMap,
        bin_width: BinWidthMs,
        delay: f64,
        metric: Metric,
        stimulus: StimulusSet,
    ) -> LayerDistributions {
        let mut dists = LayerDistributions::new();
        for (session, channels) in superset {
            let selection = Selection::new()
                .sessions([session.clone()])
                .bin_width(bin_width)
                .delay(delay)
                .stimulus(stimulus);
            let rows = self.get_selected_data(&selection);
            for &channel in channels {
                let significant = significance::contains(own, session, channel);
                for row in rows.iter().filter(|row| row.channel == channel) {
                    let value = if significant {
                        row.finite_value(metric, stimulus)
                    } else {
                        Some(0.0)
                    };
                    if let Some(value) = value {
                        dists.entry(row.layer).or_default().push(value);
                    }
                }
            }
        }
        dists
    }

    /// Superset counterpart of
    /// [`CorrelationStore::get_layer_dist_with_peak_median`].
    ///
    /// # Errors
    ///
    /// [`AnalysisError::EmptyDistribution`] when no layer has values.
    #[allow(clippy::too_many_arguments)]
    pub fn get_layer_dist_with_peak_median_using_super_set(
        &self,
        superset: &SignificanceMap,
        own: &SignificanceMap,
        bin_width: BinWidthMs,
        delay: f64,
        metric: Metric,
        stimulus: StimulusSet,
        layer: Option<LayerId>,
    ) -> AnalysisResult<Vec<f64>> {
        let dists = self.get_corr_super_set_all_layers_for_bin_width(
            superset, own, bin_width, delay, metric, stimulus,
        );
        take_layer(dists, layer)
    }

    // ------------------------------------------------------------------------
    // Layer Types
    // ------------------------------------------------------------------------

    /// Layer ids per architecture category, from annotated rows.
    pub fn get_architecture_specific_layer_ids(&self) -> BTreeMap<LayerType, Vec<LayerId>> {
        let mut ids: BTreeMap<LayerType, BTreeSet<LayerId>> = BTreeMap::new();
        for row in &self.rows {
            if let Some(layer_type) = row.layer_type {
                ids.entry(layer_type).or_default().insert(row.layer);
            }
        }
        ids.into_iter()
            .map(|(layer_type, layers)| (layer_type, layers.into_iter().collect()))
            .collect()
    }

    /// Annotate rows with their layer type; returns the number of rows
    /// whose layer the architecture lists.
    pub fn annotate_layer_types(&mut self, architecture: &LayerArchitecture) -> usize {
        annotate(&mut self.rows, architecture)
    }

    /// Load the model's architecture from the auxiliary directory.
    ///
    /// # Errors
    ///
    /// [`AnalysisError::UnknownModel`] if the identifier names no configured
    /// model, plus I/O and YAML errors.
    pub fn load_architecture(&self) -> AnalysisResult<LayerArchitecture> {
        let model = self.model_name.as_deref().ok_or_else(|| AnalysisError::UnknownModel {
            model: self.identifier.clone(),
            choices: self.valid_model_names.clone(),
        })?;
        LayerArchitecture::load(&self.aux_dir, model, &self.valid_model_names)
    }

    // ------------------------------------------------------------------------
    // Table Summaries
    // ------------------------------------------------------------------------

    /// Unique sessions, ascending.
    pub fn get_all_sessions(&self) -> Vec<SessionId> {
        let sessions: BTreeSet<&SessionId> = self.rows.iter().map(|row| &row.session).collect();
        sessions.into_iter().cloned().collect()
    }

    /// Unique channels of a session, ascending.
    pub fn get_all_channels(&self, session: &SessionId) -> Vec<ChannelId> {
        self.unique_of_session(session, |row| row.channel)
    }

    /// Unique layers of a session, ascending.
    pub fn get_all_layers(&self, session: &SessionId) -> Vec<LayerId> {
        self.unique_of_session(session, |row| row.layer)
    }

    /// Unique bin widths, ascending.
    pub fn bin_widths(&self) -> Vec<BinWidthMs> {
        let widths: BTreeSet<BinWidthMs> = self.rows.iter().map(|row| row.bin_width).collect();
        widths.into_iter().collect()
    }

    /// Value of the first row matching a selection.
    pub fn get_corr_score(&self, selection: &Selection, metric: Metric) -> Option<f64> {
        self.get_selected_data(selection)
            .first()
            .and_then(|row| row.finite_value(metric, selection.stimulus))
    }

    /// Channel with the highest value among the selected rows.
    pub fn get_best_channel(&self, selection: &Selection, metric: Metric) -> Option<ChannelId> {
        self.get_selected_data(selection)
            .into_iter()
            .filter_map(|row| row.finite_value(metric, selection.stimulus).map(|v| (row.channel, v)))
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(channel, _)| channel)
    }

    /// Highest value among the selected rows.
    pub fn get_peak_corr(&self, selection: &Selection, metric: Metric) -> Option<f64> {
        self.get_selected_data(selection)
            .into_iter()
            .filter_map(|row| row.finite_value(metric, selection.stimulus))
            .max_by(f64::total_cmp)
    }

    /// Unique channels whose normalizer is at least `normalizer_threshold`.
    pub fn get_good_channels(
        &self,
        selection: &Selection,
        normalizer_threshold: f64,
    ) -> Vec<ChannelId> {
        let channels: BTreeSet<ChannelId> = self
            .good_rows(selection, normalizer_threshold)
            .map(|row| row.channel)
            .collect();
        channels.into_iter().collect()
    }

    /// Per-layer descriptive statistics of rows whose normalizer is at least
    /// `normalizer_threshold`.
    ///
    /// # Errors
    ///
    /// [`AnalysisError::EmptyDistribution`] if no row qualifies.
    pub fn summarize(
        &self,
        selection: &Selection,
        normalizer_threshold: f64,
        metric: Metric,
    ) -> AnalysisResult<BTreeMap<LayerId, Summary>> {
        let rows: Vec<&CorrelationRecord> = self.good_rows(selection, normalizer_threshold).collect();
        let dists = layer_distributions(&rows, metric, selection.stimulus);
        if dists.is_empty() {
            return Err(AnalysisError::empty("no rows to summarize"));
        }
        dists
            .into_iter()
            .map(|(layer, values)| -> AnalysisResult<(LayerId, Summary)> {
                Ok((layer, math::describe(&values)?))
            })
            .collect()
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn query_rows(
        &self,
        query: &DistributionQuery,
        bin_width: BinWidthMs,
        layer: Option<LayerId>,
        norm: &mut dyn NormalizerSource,
    ) -> AnalysisResult<Vec<&CorrelationRecord>> {
        let mut selection = query.selection_at(bin_width).sessions(self.area_sessions(&query.area)?);
        selection.layer = layer;
        match (query.policy, query.norm_bin_width) {
            (
                Some(SignificancePolicy::StatisticalInclusion { p_threshold, null_method }),
                Some(norm_bin_width),
            ) => self.included_rows(&selection, norm_bin_width, p_threshold, null_method, norm),
            (policy, _) => self.select_with_policy(&selection, policy, norm),
        }
    }

    fn good_rows<'a>(
        &'a self,
        selection: &Selection,
        normalizer_threshold: f64,
    ) -> impl Iterator<Item = &'a CorrelationRecord> {
        let stimulus = selection.stimulus;
        self.get_selected_data(selection).into_iter().filter(move |row| {
            row.stats(stimulus)
                .is_some_and(|s| s.normalizer >= normalizer_threshold)
        })
    }

    fn unique_of_session<T: Ord>(
        &self,
        session: &SessionId,
        key: impl Fn(&CorrelationRecord) -> T,
    ) -> Vec<T> {
        let values: BTreeSet<T> = self
            .rows
            .iter()
            .filter(|row| &row.session == session)
            .map(key)
            .collect();
        values.into_iter().collect()
    }
}

// ============================================================================
// Free Functions
// ============================================================================

/// Group finite row values by layer.
#[must_use]
pub fn layer_distributions(
    rows: &[&CorrelationRecord],
    metric: Metric,
    stimulus: StimulusSet,
) -> LayerDistributions {
    let mut dists = LayerDistributions::new();
    for row in rows {
        if let Some(value) = row.finite_value(metric, stimulus) {
            dists.entry(row.layer).or_default().push(value);
        }
    }
    dists
}

/// Layer whose distribution has the highest median.
///
/// Equal medians resolve to the highest layer id.
///
/// # Errors
///
/// [`AnalysisError::EmptyDistribution`] for an empty map or an empty layer.
pub fn peak_median_layer(dists: &LayerDistributions) -> AnalysisResult<LayerId> {
    let medians = dists
        .iter()
        .map(|(&layer, values)| {
            math::median(values)
                .map(|median| (layer, median))
                .map_err(|_| AnalysisError::empty(format!("layer {layer}")))
        })
        .collect::<AnalysisResult<Vec<_>>>()?;
    medians
        .into_iter()
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(layer, _)| layer)
        .ok_or_else(|| AnalysisError::empty("no layer distributions"))
}

fn take_layer(mut dists: LayerDistributions, layer: Option<LayerId>) -> AnalysisResult<Vec<f64>> {
    let layer = match layer {
        Some(layer) => layer,
        None => peak_median_layer(&dists)?,
    };
    dists
        .remove(&layer)
        .ok_or_else(|| AnalysisError::empty(format!("layer {layer}")))
}

fn annotate(rows: &mut [CorrelationRecord], architecture: &LayerArchitecture) -> usize {
    let mut annotated = 0;
    for row in rows.iter_mut() {
        if let Some(layer_type) = architecture.layer_type(row.layer) {
            row.layer_type = Some(layer_type);
            annotated += 1;
        }
    }
    annotated
}

/// Annotate a stored table with its model's layer types and write it back.
///
/// # Errors
///
/// [`AnalysisError::UnknownModel`], table and architecture errors.
pub fn add_layer_types(
    config: &AnalysisConfig,
    model_name: &str,
    identifier: &str,
) -> AnalysisResult<usize> {
    let architecture =
        LayerArchitecture::load(&config.aux_dir, model_name, &config.valid_model_names)?;
    let path = config.corr_file_path(identifier);
    let mut rows = record::read_table(&path)?;
    let annotated = annotate(&mut rows, &architecture);
    record::write_table(&path, &rows)?;
    info!(path = %path.display(), annotated, "Layer types added");
    Ok(annotated)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlations::test_support::{metadata, FixedNormalizers};
    use cortex_stats_core::ChannelStats;

    fn row(session: &str, channel: ChannelId, layer: LayerId, bin_width: BinWidthMs, value: f64) -> CorrelationRecord {
        let mut row = CorrelationRecord {
            session: SessionId::from(session),
            channel,
            layer,
            bin_width,
            test_cc_raw: Some(value / 2.0),
            normalized_test_cc: Some(value),
            ..CorrelationRecord::default()
        };
        row.set_stats(StimulusSet::Standard, ChannelStats::new(0.25, 0.05, 0.02));
        row
    }

    fn store(rows: Vec<CorrelationRecord>) -> Correlations {
        Correlations::from_records(&AnalysisConfig::default(), "unit", rows, DnnFilter, metadata())
    }

    fn layered_store() -> Correlations {
        store(vec![
            row("200206", 1, 0, 20, 0.1),
            row("200206", 1, 1, 20, 0.5),
            row("200206", 2, 0, 20, 0.2),
            row("200206", 2, 1, 20, 0.6),
            row("191121", 1, 0, 20, 0.3),
            row("191121", 1, 1, 20, f64::NAN),
            row("180731", 4, 0, 20, 0.9),
            row("200206", 1, 0, 50, 0.7),
        ])
    }

    #[test]
    fn test_layer_distributions_exclude_nan_and_other_areas() {
        let store = layered_store();
        let dists = store
            .get_corr_all_layers_for_bin_width(&DistributionQuery::new("core", 20), &mut FixedNormalizers::new())
            .unwrap();
        // Area sessions ascending: 191121 before 200206
        assert_eq!(dists[&0], vec![0.3, 0.1, 0.2]);
        assert_eq!(dists[&1], vec![0.5, 0.6]);
    }

    #[test]
    fn test_peak_median_layer() {
        let store = layered_store();
        let query = DistributionQuery::new("core", 20);
        let peak = store
            .get_layer_dist_with_peak_median(&query, None, &mut FixedNormalizers::new())
            .unwrap();
        assert_eq!(peak, vec![0.5, 0.6]);

        let layer_zero = store
            .get_layer_dist_with_peak_median(&query, Some(0), &mut FixedNormalizers::new())
            .unwrap();
        assert_eq!(layer_zero, vec![0.3, 0.1, 0.2]);
    }

    #[test]
    fn test_peak_median_of_nothing_fails() {
        assert!(matches!(
            peak_median_layer(&LayerDistributions::new()),
            Err(AnalysisError::EmptyDistribution { .. })
        ));
        let store = layered_store();
        let query = DistributionQuery::new("core", 100);
        assert!(store
            .get_layer_dist_with_peak_median(&query, None, &mut FixedNormalizers::new())
            .is_err());
    }

    #[test]
    fn test_peak_median_ties_pick_highest_layer() {
        let dists = LayerDistributions::from([(0, vec![0.4]), (3, vec![0.4]), (1, vec![0.1])]);
        assert_eq!(peak_median_layer(&dists).unwrap(), 3);
    }

    #[test]
    fn test_unknown_area() {
        let store = layered_store();
        let result = store.get_corr_all_layers_for_bin_width(
            &DistributionQuery::new("pfc", 20),
            &mut FixedNormalizers::new(),
        );
        assert!(matches!(result, Err(AnalysisError::UnknownArea { .. })));
    }

    #[test]
    fn test_all_bin_widths_for_layer() {
        let store = layered_store();
        let dists = store
            .get_corr_all_bin_widths_for_layer(&DistributionQuery::new("all", 20), 0, &mut FixedNormalizers::new())
            .unwrap();
        assert_eq!(dists[&20], vec![0.9, 0.3, 0.1, 0.2]);
        assert_eq!(dists[&50], vec![0.7]);
    }

    #[test]
    fn test_statistical_inclusion_orders_by_session_list() {
        let store = layered_store();
        let mut norm = FixedNormalizers::new()
            .with_pooled_null(&[0.0, 0.1, 0.2, 0.3])
            .with_channel("200206", 20, StimulusSet::Standard, 1, &[0.5], &[0.0])
            .with_channel("200206", 20, StimulusSet::Standard, 2, &[0.05], &[0.0])
            .with_channel("191121", 20, StimulusSet::Standard, 1, &[0.9], &[0.0]);

        let selection = Selection::new()
            .sessions([SessionId::from("200206"), SessionId::from("191121")])
            .bin_width(20)
            .layer(0);
        let rows = store
            .get_significant_data_using_statistical_inclusion(&selection, 0.05, NullMethod::Poisson, &mut norm)
            .unwrap();
        let keys: Vec<_> = rows.iter().map(|r| (r.session.as_str(), r.channel)).collect();
        assert_eq!(keys, vec![("200206", 1), ("191121", 1)]);

        let missing_bin_width = Selection::new();
        assert!(store
            .get_significant_data_using_statistical_inclusion(&missing_bin_width, 0.05, NullMethod::Poisson, &mut norm)
            .is_err());
    }

    #[test]
    fn test_inclusion_decided_at_norm_bin_width() {
        let store = layered_store();
        let mut norm = FixedNormalizers::new()
            .with_pooled_null(&[0.0, 0.1, 0.2, 0.3])
            .with_channel("200206", 20, StimulusSet::Standard, 1, &[0.5], &[0.0]);

        let query = DistributionQuery::new("core", 50).policy(SignificancePolicy::poisson(0.05));
        // Nothing is significant at 50ms itself
        assert!(store.get_correlations_for_bin_width(&query, &mut norm).unwrap().is_empty());

        let query = query.norm_bin_width(20);
        let values = store.get_correlations_for_bin_width(&query, &mut norm).unwrap();
        assert_eq!(values, vec![0.7]);
    }

    #[test]
    fn test_threshold_policy_in_query() {
        let mut rows = vec![row("200206", 1, 0, 20, 0.4), row("200206", 2, 0, 20, 0.3)];
        rows[1].set_stats(StimulusSet::Standard, ChannelStats::new(0.06, 0.05, 0.02));
        let store = store(rows);
        let query = DistributionQuery::new("core", 20).policy(SignificancePolicy::threshold(3.0));
        let values = store
            .get_correlations_for_bin_width(&query, &mut FixedNormalizers::new())
            .unwrap();
        assert_eq!(values, vec![0.4]);

        assert_eq!(
            store.get_significant_sessions("core", 20, 3.0).unwrap(),
            vec![SessionId::from("200206")]
        );
    }

    #[test]
    fn test_superset_zero_fills_channels_outside_own_set() {
        let store = store(vec![row("200206", 1, 0, 20, 0.4), row("200206", 2, 0, 20, 0.3)]);
        let session = SessionId::from("200206");
        let superset = SignificanceMap::from([(session.clone(), BTreeSet::from([1, 2]))]);
        let own = SignificanceMap::from([(session, BTreeSet::from([1]))]);

        let dists = store.get_corr_super_set_all_layers_for_bin_width(
            &superset,
            &own,
            20,
            0.0,
            Metric::Normalized,
            StimulusSet::Standard,
        );
        assert_eq!(dists[&0], vec![0.4, 0.0]);

        let peak = store
            .get_layer_dist_with_peak_median_using_super_set(
                &superset,
                &own,
                20,
                0.0,
                Metric::Normalized,
                StimulusSet::Standard,
                None,
            )
            .unwrap();
        assert_eq!(peak, vec![0.4, 0.0]);
    }

    #[test]
    fn test_superset_across_bin_widths() {
        let mut rows = vec![row("200206", 1, 0, 20, 0.4), row("200206", 2, 0, 50, 0.3)];
        rows[0].set_stats(StimulusSet::Standard, ChannelStats::new(0.35, 0.0, 0.1));
        rows[1].set_stats(StimulusSet::Standard, ChannelStats::new(0.1, 0.0, 0.1));
        let store = store(rows);
        let mut norm = FixedNormalizers::new().with_pooled_null(&[0.0, 0.1, 0.2, 0.3]);

        // 90th percentile of the pooled null: 0.27
        let threshold = store
            .get_normalizer_threshold(20, NullMethod::Poisson, StimulusSet::Standard, None, &mut norm)
            .unwrap();
        assert!((threshold - 0.27).abs() < 1e-12);

        let sig = store
            .get_significant_session_and_channels_at_all_bin_width(
                NullMethod::Poisson,
                StimulusSet::Standard,
                None,
                &mut norm,
            )
            .unwrap();
        let session = SessionId::from("200206");
        assert_eq!(sig.per_bin_width[&20][&session], BTreeSet::from([1]));
        assert!(sig.per_bin_width[&50].is_empty());
        assert_eq!(sig.superset[&session], BTreeSet::from([1]));
    }

    #[test]
    fn test_table_summaries() {
        let store = layered_store();
        let session = SessionId::from("200206");
        assert_eq!(store.get_all_sessions().len(), 3);
        assert_eq!(store.get_all_channels(&session), vec![1, 2]);
        assert_eq!(store.get_all_layers(&session), vec![0, 1]);
        assert_eq!(store.bin_widths(), vec![20, 50]);

        let at_20 = Selection::new().sessions([session.clone()]).bin_width(20);
        assert_eq!(store.get_best_channel(&at_20.clone().layer(1), Metric::Normalized), Some(2));
        assert_eq!(store.get_peak_corr(&at_20, Metric::Normalized), Some(0.6));
        assert_eq!(
            store.get_corr_score(&at_20.clone().layer(0).channel(2), Metric::Raw),
            Some(0.1)
        );
        assert_eq!(store.get_good_channels(&at_20, 0.2), vec![1, 2]);
        assert!(store.get_good_channels(&at_20, 0.3).is_empty());

        let summary = store.summarize(&at_20, 0.0, Metric::Normalized).unwrap();
        assert_eq!(summary[&1].count, 2);
        assert!((summary[&1].mean - 0.55).abs() < 1e-12);
        assert!(store.summarize(&at_20, 0.9, Metric::Normalized).is_err());
    }
}
