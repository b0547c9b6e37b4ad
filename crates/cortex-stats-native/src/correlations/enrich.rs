//! Normalizer enrichment and write-back
//!
//! Enrichment fills the normalizer, null and normalized columns of one
//! stimulus set for every row. Statistics for all (bin width, session,
//! channel) combinations are computed first and merged afterwards, so a
//! failure part-way leaves the table untouched.

use std::collections::{BTreeMap, BTreeSet};

use cortex_stats_core::{BinWidthMs, ChannelId, ChannelStats, SessionId, StimulusSet};
use tracing::{info, warn};

use super::record;
use super::selection::{ResultFilter, Selection};
use super::store::CorrelationStore;
use crate::error::{AnalysisError, AnalysisResult};
use crate::neural::NormalizerSource;

/// Key of one channel's statistics at a row bin width.
pub type StatsKey = (BinWidthMs, SessionId, ChannelId);

/// Outcome of an enrichment pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EnrichmentReport {
    /// Rows that received statistics
    pub rows_updated: usize,
    /// Rows whose channel had no statistics (session absent from recordings)
    pub rows_without_stats: usize,
    /// Rows whose normalized value is NaN (normalizer missing or not positive)
    pub rows_unreliable: usize,
    /// Rows annotated with a layer type
    pub layer_types_added: usize,
}

impl<F: ResultFilter> CorrelationStore<F> {
    /// Compute channel statistics for every (bin width, session, channel)
    /// present in the table.
    ///
    /// With `norm_bin_width` set, statistics are looked up at that bin width
    /// for every row instead of the row's own.
    ///
    /// # Errors
    ///
    /// Normalizer errors other than a session missing from the recordings.
    pub fn compute_channel_stats(
        &self,
        norm: &mut dyn NormalizerSource,
        stimulus: StimulusSet,
        norm_bin_width: Option<BinWidthMs>,
    ) -> AnalysisResult<BTreeMap<StatsKey, ChannelStats>> {
        let mut stats = BTreeMap::new();
        for bin_width in self.bin_widths() {
            let lookup_bin_width = norm_bin_width.unwrap_or(bin_width);
            let sessions: BTreeSet<SessionId> = self
                .get_selected_data(&Selection::new().bin_width(bin_width))
                .into_iter()
                .map(|row| row.session.clone())
                .collect();

            for session in sessions {
                let dists = match norm.get_inter_trial_corr_dists_for_session(
                    &session,
                    lookup_bin_width,
                    stimulus,
                ) {
                    Ok(dists) => dists,
                    Err(AnalysisError::SessionNotFound { session }) => {
                        warn!(%session, %stimulus, "Session has no recording, rows left without normalizer");
                        continue;
                    }
                    Err(e) => return Err(e),
                };
                for (channel, channel_stats) in dists.stats() {
                    stats.insert((bin_width, session.clone(), channel), channel_stats);
                }
            }
            info!(bin_width, lookup_bin_width, %stimulus, "Normalizers computed");
        }
        Ok(stats)
    }

    /// Merge precomputed statistics into the rows and recompute normalized
    /// correlations for the stimulus set.
    pub fn apply_channel_stats(
        &mut self,
        stats: &BTreeMap<StatsKey, ChannelStats>,
        stimulus: StimulusSet,
    ) -> EnrichmentReport {
        let mut report = EnrichmentReport::default();
        for row in &mut self.rows {
            let key = (row.bin_width, row.session.clone(), row.channel);
            match stats.get(&key) {
                Some(channel_stats) => {
                    row.set_stats(stimulus, *channel_stats);
                    report.rows_updated += 1;
                }
                None => report.rows_without_stats += 1,
            }
            if !row.refresh_normalized(stimulus) {
                report.rows_unreliable += 1;
            }
        }
        if report.rows_unreliable > 0 {
            warn!(
                rows = report.rows_unreliable,
                %stimulus,
                "Rows with missing or non-positive normalizer set to NaN"
            );
        }
        report
    }

    /// Compute normalizers, merge them into the table, annotate layer types
    /// when missing and write the table back.
    ///
    /// # Errors
    ///
    /// Normalizer, architecture and write errors. On error the stored file
    /// is unchanged.
    pub fn set_normalizers_using_bootstrap(
        &mut self,
        norm: &mut dyn NormalizerSource,
        stimulus: StimulusSet,
        norm_bin_width: Option<BinWidthMs>,
    ) -> AnalysisResult<EnrichmentReport> {
        let stats = self.compute_channel_stats(norm, stimulus, norm_bin_width)?;
        let architecture = if self.model_name().is_some()
            && self.rows.iter().all(|row| row.layer_type.is_none())
        {
            Some(self.load_architecture()?)
        } else {
            None
        };

        let mut report = self.apply_channel_stats(&stats, stimulus);
        if let Some(architecture) = architecture {
            report.layer_types_added = self.annotate_layer_types(&architecture);
        }
        self.write_back()?;

        info!(
            identifier = self.identifier(),
            rows_updated = report.rows_updated,
            rows_unreliable = report.rows_unreliable,
            "Normalizers written"
        );
        Ok(report)
    }

    /// Persist the table to its path, replacing the file atomically.
    ///
    /// # Errors
    ///
    /// Write and rename errors.
    pub fn write_back(&self) -> AnalysisResult<()> {
        record::write_table(self.path(), &self.rows)?;
        info!(path = %self.path().display(), "Saved correlation table");
        Ok(())
    }
}
