//! Row selection
//!
//! A [`Selection`] names the optional filters of a query; a [`ResultFilter`]
//! applies them to a table. DNN and STRF tables differ in which dimensions
//! they carry, so each table kind has its own filter.

use cortex_stats_core::{BinWidthMs, ChannelId, LayerId, SessionId, StimulusSet};

use super::record::{CorrelationRecord, Metric};
use crate::metadata::ALL_AREAS;
use crate::significance::{self, SignificancePolicy};

/// Number of training sentences assumed for DNN rows without `N_sents`.
pub const DEFAULT_N_SENTS: f64 = 500.0;

/// Optional filters of a row query. Unset filters select everything.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Selection {
    /// Keep these sessions, output in this order
    pub sessions: Option<Vec<SessionId>>,
    /// Keep this bin width
    pub bin_width: Option<BinWidthMs>,
    /// Keep this delay (ms)
    pub delay: Option<f64>,
    /// Keep this STRF lag (`tmax`, ms)
    pub lag: Option<f64>,
    /// Keep this layer
    pub layer: Option<LayerId>,
    /// Keep this channel
    pub channel: Option<ChannelId>,
    /// Keep rows trained on at least this many sentences
    pub min_n_sents: Option<f64>,
    /// Keep rows passing the threshold policy with this multiplier
    pub threshold: Option<f64>,
    /// Stimulus set whose statistics the threshold uses
    pub stimulus: StimulusSet,
}

impl Selection {
    /// Select everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to sessions, keeping their order.
    #[must_use]
    pub fn sessions(mut self, sessions: impl IntoIterator<Item = SessionId>) -> Self {
        self.sessions = Some(sessions.into_iter().collect());
        self
    }

    /// Restrict to one bin width.
    #[must_use]
    pub fn bin_width(mut self, bin_width: BinWidthMs) -> Self {
        self.bin_width = Some(bin_width);
        self
    }

    /// Restrict to one delay.
    #[must_use]
    pub fn delay(mut self, delay: f64) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Restrict to one STRF lag.
    #[must_use]
    pub fn lag(mut self, lag: f64) -> Self {
        self.lag = Some(lag);
        self
    }

    /// Restrict to one layer.
    #[must_use]
    pub fn layer(mut self, layer: LayerId) -> Self {
        self.layer = Some(layer);
        self
    }

    /// Restrict to one channel.
    #[must_use]
    pub fn channel(mut self, channel: ChannelId) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Require at least `n` training sentences.
    #[must_use]
    pub fn min_n_sents(mut self, n: f64) -> Self {
        self.min_n_sents = Some(n);
        self
    }

    /// Apply the threshold policy with multiplier `k`.
    #[must_use]
    pub fn threshold(mut self, multiplier: f64) -> Self {
        self.threshold = Some(multiplier);
        self
    }

    /// Use a stimulus set's statistics.
    #[must_use]
    pub fn stimulus(mut self, stimulus: StimulusSet) -> Self {
        self.stimulus = stimulus;
        self
    }

    fn matches_common(&self, row: &CorrelationRecord) -> bool {
        self.bin_width.map_or(true, |bw| row.bin_width == bw)
            && self.delay.map_or(true, |d| row.delay == d)
            && self.lag.map_or(true, |lag| row.tmax == Some(lag))
            && self.channel.map_or(true, |ch| row.channel == ch)
    }
}

/// Parameters of an area-level distribution query.
#[derive(Clone, Debug, PartialEq)]
pub struct DistributionQuery {
    /// Neural area (`"all"` for every session)
    pub area: String,
    /// Bin width in ms
    pub bin_width: BinWidthMs,
    /// Delay in ms
    pub delay: f64,
    /// STRF lag filter
    pub lag: Option<f64>,
    /// Minimum training sentences (DNN tables)
    pub min_n_sents: Option<f64>,
    /// Significance policy; `None` keeps every row
    pub policy: Option<SignificancePolicy>,
    /// Bin width at which statistical inclusion is decided (the query's own
    /// by default)
    pub norm_bin_width: Option<BinWidthMs>,
    /// Value collected per row
    pub metric: Metric,
    /// Stimulus set
    pub stimulus: StimulusSet,
}

impl Default for DistributionQuery {
    fn default() -> Self {
        Self {
            area: ALL_AREAS.to_string(),
            bin_width: 20,
            delay: 0.0,
            lag: None,
            min_n_sents: Some(DEFAULT_N_SENTS - 1.0),
            policy: None,
            norm_bin_width: None,
            metric: Metric::Normalized,
            stimulus: StimulusSet::Standard,
        }
    }
}

impl DistributionQuery {
    /// Query an area at a bin width with defaults elsewhere.
    #[must_use]
    pub fn new(area: &str, bin_width: BinWidthMs) -> Self {
        Self { area: area.to_string(), bin_width, ..Self::default() }
    }

    /// Set the delay.
    #[must_use]
    pub fn delay(mut self, delay: f64) -> Self {
        self.delay = delay;
        self
    }

    /// Set the STRF lag filter.
    #[must_use]
    pub fn lag(mut self, lag: f64) -> Self {
        self.lag = Some(lag);
        self
    }

    /// Set (or clear) the minimum training sentences.
    #[must_use]
    pub fn min_n_sents(mut self, n: Option<f64>) -> Self {
        self.min_n_sents = n;
        self
    }

    /// Filter rows with a significance policy.
    #[must_use]
    pub fn policy(mut self, policy: SignificancePolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Decide statistical inclusion at another bin width.
    #[must_use]
    pub fn norm_bin_width(mut self, bin_width: BinWidthMs) -> Self {
        self.norm_bin_width = Some(bin_width);
        self
    }

    /// Choose the collected value.
    #[must_use]
    pub fn metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    /// Choose the stimulus set.
    #[must_use]
    pub fn stimulus(mut self, stimulus: StimulusSet) -> Self {
        self.stimulus = stimulus;
        self
    }

    /// Row selection for this query at a bin width, without sessions.
    #[must_use]
    pub fn selection_at(&self, bin_width: BinWidthMs) -> Selection {
        Selection {
            bin_width: Some(bin_width),
            delay: Some(self.delay),
            lag: self.lag,
            min_n_sents: self.min_n_sents,
            stimulus: self.stimulus,
            ..Selection::default()
        }
    }
}

/// Table-specific row filter.
pub trait ResultFilter {
    /// Rows matching a selection. With `sessions` set, rows are grouped in
    /// session-list order; otherwise table order is kept.
    fn select_rows<'a>(
        &self,
        rows: &'a [CorrelationRecord],
        selection: &Selection,
    ) -> Vec<&'a CorrelationRecord>;

    /// Fill table-specific defaults after loading.
    fn prepare(&self, _rows: &mut [CorrelationRecord]) {}
}

/// Filter for DNN result tables (layers, training-set size).
#[derive(Clone, Copy, Debug, Default)]
pub struct DnnFilter;

impl ResultFilter for DnnFilter {
    fn select_rows<'a>(
        &self,
        rows: &'a [CorrelationRecord],
        selection: &Selection,
    ) -> Vec<&'a CorrelationRecord> {
        let matching = rows.iter().filter(|row| {
            selection.matches_common(row)
                && selection.layer.map_or(true, |layer| row.layer == layer)
                && selection
                    .min_n_sents
                    .map_or(true, |n| row.n_sents.unwrap_or(DEFAULT_N_SENTS) >= n)
        });
        finish(matching, selection)
    }

    fn prepare(&self, rows: &mut [CorrelationRecord]) {
        for row in rows.iter_mut().filter(|row| row.n_sents.is_none()) {
            row.n_sents = Some(DEFAULT_N_SENTS);
        }
    }
}

/// Filter for STRF baseline tables; layer and sentence-count filters do not
/// apply to them.
#[derive(Clone, Copy, Debug, Default)]
pub struct StrfFilter;

impl ResultFilter for StrfFilter {
    fn select_rows<'a>(
        &self,
        rows: &'a [CorrelationRecord],
        selection: &Selection,
    ) -> Vec<&'a CorrelationRecord> {
        let matching = rows.iter().filter(|row| selection.matches_common(row));
        finish(matching, selection)
    }
}

/// Apply the threshold policy and session ordering.
fn finish<'a>(
    rows: impl Iterator<Item = &'a CorrelationRecord>,
    selection: &Selection,
) -> Vec<&'a CorrelationRecord> {
    let rows: Vec<&CorrelationRecord> = match selection.threshold {
        Some(multiplier) => significance::get_highly_tuned_channels(rows, multiplier, selection.stimulus),
        None => rows.collect(),
    };
    match &selection.sessions {
        Some(sessions) => {
            let rows = &rows;
            sessions
                .iter()
                .flat_map(move |session| {
                    rows.iter().copied().filter(move |row| &row.session == session)
                })
                .collect()
        }
        None => rows,
    }
}
