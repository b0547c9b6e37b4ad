//! Correlation result rows and table I/O
//!
//! One row per (session, channel, layer, bin width, delay, ...) holding the
//! raw test correlation, its normalized value and the normalizer statistics,
//! for both stimulus sets. Numeric identifiers are read leniently since
//! tables written by pandas spell them as floats (`3.0`).
//!
//! Columns the record does not model are carried through unchanged, so
//! writing a table back keeps every column it was read with.

use std::path::{Path, PathBuf};

use cortex_stats_core::{BinWidthMs, ChannelId, ChannelStats, LayerId, LayerType, SessionId, StimulusSet};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{AnalysisError, AnalysisResult};

/// Value of a row used in distributions.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Metric {
    /// Raw test correlation
    Raw,
    /// Noise-corrected correlation
    #[default]
    Normalized,
    /// Normalizer itself
    Normalizer,
}

impl Metric {
    /// `Normalized` when `normalized` is set, `Raw` otherwise.
    #[must_use]
    pub const fn from_normalized_flag(normalized: bool) -> Self {
        if normalized {
            Self::Normalized
        } else {
            Self::Raw
        }
    }
}

/// One correlation result row.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrelationRecord {
    /// Recording session
    pub session: SessionId,
    /// Channel within the session
    #[serde(deserialize_with = "lenient_index")]
    pub channel: ChannelId,
    /// DNN layer (0 for tables without layers)
    #[serde(default, deserialize_with = "lenient_index_or_zero")]
    pub layer: LayerId,
    /// Spike-count bin width in ms
    #[serde(deserialize_with = "lenient_index")]
    pub bin_width: BinWidthMs,
    /// Response delay in ms
    #[serde(default)]
    pub delay: f64,
    /// Start of the STRF lag window in ms
    #[serde(default)]
    pub tmin: Option<f64>,
    /// End of the STRF lag window (the lag) in ms
    #[serde(default)]
    pub tmax: Option<f64>,
    /// Number of training sentences
    #[serde(rename = "N_sents", default)]
    pub n_sents: Option<f64>,
    /// Spectrogram frequency bins of the STRF
    #[serde(default)]
    pub num_freqs: Option<f64>,
    /// Ridge regularization strength
    #[serde(default)]
    pub lmbda: Option<f64>,

    /// Raw test correlation (TIMIT)
    #[serde(default)]
    pub test_cc_raw: Option<f64>,
    /// Normalized test correlation (TIMIT)
    #[serde(default)]
    pub normalized_test_cc: Option<f64>,
    /// Normalizer (TIMIT)
    #[serde(default)]
    pub normalizer: Option<f64>,
    /// Null mean (TIMIT)
    #[serde(default)]
    pub null_mean: Option<f64>,
    /// Null std (TIMIT)
    #[serde(default)]
    pub null_std: Option<f64>,

    /// Raw test correlation (monkey vocalizations)
    #[serde(rename = "mVocs_test_cc_raw", default)]
    pub mvocs_test_cc_raw: Option<f64>,
    /// Normalized test correlation (monkey vocalizations)
    #[serde(rename = "mVocs_normalized_test_cc", default)]
    pub mvocs_normalized_test_cc: Option<f64>,
    /// Normalizer (monkey vocalizations)
    #[serde(rename = "mVocs_normalizer", default)]
    pub mvocs_normalizer: Option<f64>,
    /// Null mean (monkey vocalizations)
    #[serde(rename = "mVocs_null_mean", default)]
    pub mvocs_null_mean: Option<f64>,
    /// Null std (monkey vocalizations)
    #[serde(rename = "mVocs_null_std", default)]
    pub mvocs_null_std: Option<f64>,

    /// Architecture category of the layer
    #[serde(default)]
    pub layer_type: Option<LayerType>,

    /// Unmodelled (column, value) pairs, in table order
    #[serde(skip)]
    pub extra: Vec<(String, String)>,
}

/// Column names of the modelled fields, in serialization order.
pub const MODELLED_COLUMNS: [&str; 21] = [
    "session",
    "channel",
    "layer",
    "bin_width",
    "delay",
    "tmin",
    "tmax",
    "N_sents",
    "num_freqs",
    "lmbda",
    "test_cc_raw",
    "normalized_test_cc",
    "normalizer",
    "null_mean",
    "null_std",
    "mVocs_test_cc_raw",
    "mVocs_normalized_test_cc",
    "mVocs_normalizer",
    "mVocs_null_mean",
    "mVocs_null_std",
    "layer_type",
];

impl CorrelationRecord {
    /// Value of an unmodelled column, if the row has it.
    #[must_use]
    pub fn extra(&self, column: &str) -> Option<&str> {
        self.extra
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    /// Raw test correlation for a stimulus set.
    #[must_use]
    pub fn raw(&self, stimulus: StimulusSet) -> Option<f64> {
        match stimulus {
            StimulusSet::Standard => self.test_cc_raw,
            StimulusSet::MVocs => self.mvocs_test_cc_raw,
        }
    }

    /// Normalized test correlation for a stimulus set.
    #[must_use]
    pub fn normalized(&self, stimulus: StimulusSet) -> Option<f64> {
        match stimulus {
            StimulusSet::Standard => self.normalized_test_cc,
            StimulusSet::MVocs => self.mvocs_normalized_test_cc,
        }
    }

    /// Stored normalizer statistics, if all three are present.
    #[must_use]
    pub fn stats(&self, stimulus: StimulusSet) -> Option<ChannelStats> {
        let (normalizer, mean, std) = match stimulus {
            StimulusSet::Standard => (self.normalizer, self.null_mean, self.null_std),
            StimulusSet::MVocs => (self.mvocs_normalizer, self.mvocs_null_mean, self.mvocs_null_std),
        };
        Some(ChannelStats::new(normalizer?, mean?, std?))
    }

    /// Store normalizer statistics for a stimulus set.
    pub fn set_stats(&mut self, stimulus: StimulusSet, stats: ChannelStats) {
        let (normalizer, mean, std) = match stimulus {
            StimulusSet::Standard => (&mut self.normalizer, &mut self.null_mean, &mut self.null_std),
            StimulusSet::MVocs => (
                &mut self.mvocs_normalizer,
                &mut self.mvocs_null_mean,
                &mut self.mvocs_null_std,
            ),
        };
        *normalizer = Some(stats.normalizer);
        *mean = Some(stats.null_mean);
        *std = Some(stats.null_std);
    }

    /// Recompute the normalized correlation from the raw one.
    ///
    /// Returns `false` when the result is NaN because the normalizer is
    /// missing or not positive.
    pub fn refresh_normalized(&mut self, stimulus: StimulusSet) -> bool {
        let Some(raw) = self.raw(stimulus) else {
            return true;
        };
        let normalized = self
            .stats(stimulus)
            .map_or(f64::NAN, |stats| stats.normalize(raw));
        match stimulus {
            StimulusSet::Standard => self.normalized_test_cc = Some(normalized),
            StimulusSet::MVocs => self.mvocs_normalized_test_cc = Some(normalized),
        }
        !normalized.is_nan()
    }

    /// Value used for distributions, if present.
    #[must_use]
    pub fn value(&self, metric: Metric, stimulus: StimulusSet) -> Option<f64> {
        match metric {
            Metric::Raw => self.raw(stimulus),
            Metric::Normalized => self.normalized(stimulus),
            Metric::Normalizer => self.stats(stimulus).map(|s| s.normalizer),
        }
    }

    /// Finite value used for distributions; NaN and missing values are `None`.
    #[must_use]
    pub fn finite_value(&self, metric: Metric, stimulus: StimulusSet) -> Option<f64> {
        self.value(metric, stimulus).filter(|v| v.is_finite())
    }

    /// Threshold policy on the stored statistics.
    #[must_use]
    pub fn passes_threshold(&self, multiplier: f64, stimulus: StimulusSet) -> bool {
        self.stats(stimulus)
            .is_some_and(|stats| stats.passes_threshold(multiplier))
    }
}

// ============================================================================
// Lenient Numeric Fields
// ============================================================================

fn parse_index(raw: &str) -> Result<u32, String> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| format!("'{raw}' is not a number"))?;
    if value.fract() != 0.0 || !(0.0..=f64::from(u32::MAX)).contains(&value) {
        return Err(format!("'{raw}' is not a non-negative integer"));
    }
    Ok(value as u32)
}

fn lenient_index<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_index(&raw).map_err(serde::de::Error::custom)
}

fn lenient_index_or_zero<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if raw.trim().is_empty() {
        return Ok(0);
    }
    parse_index(&raw).map_err(serde::de::Error::custom)
}

// ============================================================================
// Table I/O
// ============================================================================

/// Read a correlation table, keeping unmodelled columns on each row.
///
/// # Errors
///
/// [`AnalysisError::TableRead`] if the file is missing or malformed.
pub fn read_table(path: &Path) -> AnalysisResult<Vec<CorrelationRecord>> {
    let table_err = |source| AnalysisError::TableRead { path: path.to_path_buf(), source };
    let mut reader = csv::Reader::from_path(path).map_err(table_err)?;
    let headers = reader.headers().map_err(table_err)?.clone();
    let extra_columns: Vec<(usize, &str)> = headers
        .iter()
        .enumerate()
        .filter(|(_, name)| !MODELLED_COLUMNS.contains(name))
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(table_err)?;
        let mut row: CorrelationRecord = record.deserialize(Some(&headers)).map_err(table_err)?;
        row.extra = extra_columns
            .iter()
            .map(|&(i, name)| (name.to_string(), record.get(i).unwrap_or_default().to_string()))
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

/// Write a correlation table atomically (temporary file, then rename).
///
/// Modelled columns come first, followed by every unmodelled column in
/// order of first appearance; rows without one get an empty field.
///
/// # Errors
///
/// [`AnalysisError::TableWrite`] or [`AnalysisError::Io`].
pub fn write_table(path: &Path, rows: &[CorrelationRecord]) -> AnalysisResult<()> {
    let tmp_path = temporary_path(path);
    let table_err = |source| AnalysisError::TableWrite { path: path.to_path_buf(), source };

    let mut extra_columns: Vec<&str> = Vec::new();
    for (name, _) in rows.iter().flat_map(|row| &row.extra) {
        if !extra_columns.contains(&name.as_str()) {
            extra_columns.push(name);
        }
    }

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(&tmp_path)
        .map_err(table_err)?;
    let mut header: Vec<&str> = MODELLED_COLUMNS.to_vec();
    header.extend(&extra_columns);
    writer.write_record(&header).map_err(table_err)?;
    for row in rows {
        let extras: Vec<&str> = extra_columns
            .iter()
            .map(|column| row.extra(column).unwrap_or_default())
            .collect();
        writer.serialize((row, extras)).map_err(table_err)?;
    }
    writer
        .flush()
        .map_err(|source| AnalysisError::Io { path: tmp_path.clone(), source })?;
    drop(writer);

    std::fs::rename(&tmp_path, path)
        .map_err(|source| AnalysisError::Io { path: path.to_path_buf(), source })
}

fn temporary_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(std::ffi::OsStr::to_os_string).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PANDAS_CSV: &str = "\
,session,layer,channel,bin_width,delay,N_sents,test_cc_raw,normalizer,null_mean,null_std,opt_lmbda
0,200206.0,2.0,5.0,20.0,0.0,500.0,0.4,0.25,0.05,0.02,1e-3
1,200206.0,3.0,5.0,20.0,0.0,,0.3,,,,1e-3
";

    #[test]
    fn test_reads_pandas_float_spellings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m_corr_results.csv");
        std::fs::write(&path, PANDAS_CSV).unwrap();

        let rows = read_table(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].session, SessionId::from("200206"));
        assert_eq!((rows[0].layer, rows[0].channel, rows[0].bin_width), (2, 5, 20));
        assert_eq!(rows[0].n_sents, Some(500.0));
        assert_eq!(rows[1].n_sents, None);
        assert_eq!(rows[1].stats(StimulusSet::Standard), None);
        assert!(rows[0].passes_threshold(3.0, StimulusSet::Standard));
    }

    #[test]
    fn test_missing_table_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            read_table(&dir.path().join("absent.csv")),
            Err(AnalysisError::TableRead { .. })
        ));
    }

    #[test]
    fn test_write_then_read_keeps_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t_corr_results.csv");
        let mut row = CorrelationRecord {
            session: SessionId::from("191121"),
            channel: 7,
            layer: 4,
            bin_width: 50,
            mvocs_test_cc_raw: Some(0.2),
            layer_type: Some(LayerType::Rnn),
            ..CorrelationRecord::default()
        };
        row.set_stats(StimulusSet::MVocs, ChannelStats::new(-0.1, 0.0, 0.1));
        assert!(!row.refresh_normalized(StimulusSet::MVocs));

        write_table(&path, &[row.clone()]).unwrap();
        assert!(!temporary_path(&path).exists());

        let back = read_table(&path).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].layer_type, Some(LayerType::Rnn));
        assert_eq!(back[0].mvocs_normalizer, Some(-0.1));
        assert!(back[0].mvocs_normalized_test_cc.is_some_and(f64::is_nan));
        assert_eq!(back[0].test_cc_raw, None);
    }

    #[test]
    fn test_write_back_keeps_unmodelled_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m_corr_results.csv");
        std::fs::write(
            &path,
            "session,layer,channel,bin_width,delay,test_cc_raw,opt_lmbda,train_cc_raw\n\
             200206,0,5,20,0,0.4,1e-3,0.61\n\
             200206,1,5,20,0,0.3,1e-2,\n",
        )
        .unwrap();

        let mut rows = read_table(&path).unwrap();
        assert_eq!(rows[0].extra("opt_lmbda"), Some("1e-3"));
        assert_eq!(rows[1].extra("train_cc_raw"), Some(""));
        rows[0].set_stats(StimulusSet::Standard, ChannelStats::new(0.25, 0.05, 0.02));
        write_table(&path, &rows).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers: Vec<String> = reader.headers().unwrap().iter().map(str::to_string).collect();
        assert_eq!(&headers[..MODELLED_COLUMNS.len()], &MODELLED_COLUMNS[..]);
        assert_eq!(&headers[MODELLED_COLUMNS.len()..], &["opt_lmbda", "train_cc_raw"]);

        let back = read_table(&path).unwrap();
        assert_eq!(back, rows);
        assert_eq!(back[0].extra("train_cc_raw"), Some("0.61"));
        assert_eq!(back[0].normalizer, Some(0.25));
    }

    #[test]
    fn test_modelled_columns_match_serialized_fields() {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.serialize(CorrelationRecord::default()).unwrap();
        let text = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        let header = text.lines().next().unwrap();
        assert_eq!(header, MODELLED_COLUMNS.join(","));
    }

    #[test]
    fn test_normalize_row() {
        let mut row = CorrelationRecord {
            test_cc_raw: Some(0.4),
            ..CorrelationRecord::default()
        };
        row.set_stats(StimulusSet::Standard, ChannelStats::new(0.25, 0.05, 0.02));
        assert!(row.refresh_normalized(StimulusSet::Standard));
        assert!((row.normalized_test_cc.unwrap() - 0.8).abs() < 1e-12);
        assert_eq!(row.value(Metric::Normalizer, StimulusSet::Standard), Some(0.25));
        assert_eq!(row.finite_value(Metric::Raw, StimulusSet::MVocs), None);
    }

    #[test]
    fn test_parse_index() {
        assert_eq!(parse_index("3.0"), Ok(3));
        assert_eq!(parse_index(" 12 "), Ok(12));
        assert!(parse_index("2.5").is_err());
        assert!(parse_index("-1").is_err());
        assert!(parse_index("x").is_err());
    }
}
