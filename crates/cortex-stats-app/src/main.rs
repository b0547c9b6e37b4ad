//! Cortex Stats Application
//!
//! Command-line entry point for normalizer enrichment and significance
//! queries over stored correlation tables.
//!
//! # Usage
//!
//! ```bash
//! # Compute bootstrap normalizers and write them into a result table
//! cortex-stats enrich --identifier wav2letter_modified_trained_all_bins
//!
//! # Significant channels at 20ms against the Poisson null
//! cortex-stats significant --bin-width 20 --p-threshold 0.05
//!
//! # Per-layer medians of normalized correlations in core sessions
//! cortex-stats layers --area core --bin-width 20 --p-threshold 0.05
//!
//! # Same, against the circular-shift null
//! cortex-stats layers --area core --p-threshold 0.05 --null shifts
//!
//! # Superset peak layers across all bin widths
//! cortex-stats superset --null shifts
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use cortex_stats_core::{math, BinWidthMs, LayerId, NullMethod, StimulusSet};
use cortex_stats_native::correlations::{
    add_layer_types, peak_median_layer, DnnFilter, ResultFilter, StrfFilter,
};
use cortex_stats_native::significance::{self, SignificancePolicy};
use cortex_stats_native::{
    AnalysisConfig, CorrelationStore, DistributionQuery, JsonRecordingSource, Metric,
    NeuralMetadata, NormalizerCalculator, NormalizerSource, RecordingMetadata,
};

/// Cortex Stats Application
#[derive(Parser, Debug)]
#[command(name = "cortex-stats")]
#[command(author, version, about = "Auditory-cortex correlation statistics", long_about = None)]
struct Cli {
    /// Logging verbosity level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// YAML configuration file (defaults are used when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Null distribution choice on the command line.
#[derive(Copy, Clone, Debug, ValueEnum)]
enum NullArg {
    Poisson,
    Shifts,
}

impl From<NullArg> for NullMethod {
    fn from(arg: NullArg) -> Self {
        match arg {
            NullArg::Poisson => Self::Poisson,
            NullArg::Shifts => Self::Shifts,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compute bootstrap normalizers and write them into a result table
    Enrich {
        /// Results identifier
        #[arg(short, long)]
        identifier: String,

        /// Use the monkey-vocalization stimulus set
        #[arg(long)]
        mvocs: bool,

        /// Look up normalizers at this bin width for every row
        #[arg(long)]
        norm_bin_width: Option<BinWidthMs>,

        /// Treat the table as an STRF baseline
        #[arg(long)]
        strf: bool,
    },

    /// List sessions and channels passing statistical inclusion
    Significant {
        /// Bin width in ms
        #[arg(short, long, default_value = "20")]
        bin_width: BinWidthMs,

        /// Significance level in (0, 1)
        #[arg(short, long, default_value = "0.05")]
        p_threshold: f64,

        /// Null distribution
        #[arg(long, value_enum, default_value = "poisson")]
        null: NullArg,

        /// Use the monkey-vocalization stimulus set
        #[arg(long)]
        mvocs: bool,
    },

    /// Per-layer distributions of one area at one bin width
    Layers {
        /// Results identifier
        #[arg(short, long, default_value = "wav2letter_modified_trained_all_bins")]
        identifier: String,

        /// Neural area, or "all"
        #[arg(short, long, default_value = "all")]
        area: String,

        /// Bin width in ms
        #[arg(short, long, default_value = "20")]
        bin_width: BinWidthMs,

        /// Statistical-inclusion level; overrides --threshold
        #[arg(short, long)]
        p_threshold: Option<f64>,

        /// Threshold multiplier of the null standard deviation
        #[arg(short, long)]
        threshold: Option<f64>,

        /// Null distribution for statistical inclusion
        #[arg(long, value_enum, default_value = "poisson")]
        null: NullArg,

        /// Report raw instead of normalized correlations
        #[arg(long)]
        raw: bool,

        /// Use the monkey-vocalization stimulus set
        #[arg(long)]
        mvocs: bool,
    },

    /// Peak layers over the superset of significant channels
    Superset {
        /// Results identifier
        #[arg(short, long, default_value = "wav2letter_modified_trained_all_bins")]
        identifier: String,

        /// Null distribution for the normalizer thresholds
        #[arg(long, value_enum, default_value = "poisson")]
        null: NullArg,

        /// Percentile of the null used as threshold
        #[arg(long)]
        percentile: Option<f64>,

        /// Use the monkey-vocalization stimulus set
        #[arg(long)]
        mvocs: bool,
    },

    /// Annotate a result table with its model's layer types
    AddLayerTypes {
        /// Model name with a `{model}_config.yml` architecture file
        #[arg(short, long)]
        model: String,

        /// Results identifier
        #[arg(short, long)]
        identifier: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Cortex Stats v{}", env!("CARGO_PKG_VERSION"));

    let config = match &cli.config {
        Some(path) => AnalysisConfig::from_yaml_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => {
            warn!("No config given, using defaults");
            AnalysisConfig::default()
        }
    };

    match cli.command {
        Commands::Enrich { identifier, mvocs, norm_bin_width, strf } => {
            let stimulus = StimulusSet::from_mvocs_flag(mvocs);
            if strf {
                run_enrich(&config, &identifier, StrfFilter, stimulus, norm_bin_width)?;
            } else {
                run_enrich(&config, &identifier, DnnFilter, stimulus, norm_bin_width)?;
            }
        }
        Commands::Significant { bin_width, p_threshold, null, mvocs } => {
            run_significant(&config, bin_width, p_threshold, null.into(), mvocs)?;
        }
        Commands::Layers { identifier, area, bin_width, p_threshold, threshold, null, raw, mvocs } => {
            let policy = layer_policy(p_threshold, threshold, null.into());
            let mut query = DistributionQuery::new(&area, bin_width)
                .metric(Metric::from_normalized_flag(!raw))
                .stimulus(StimulusSet::from_mvocs_flag(mvocs));
            query.policy = policy;
            run_layers(&config, &identifier, &query)?;
        }
        Commands::Superset { identifier, null, percentile, mvocs } => {
            run_superset(&config, &identifier, null.into(), percentile, mvocs)?;
        }
        Commands::AddLayerTypes { model, identifier } => {
            let annotated = add_layer_types(&config, &model, &identifier)?;
            println!("{annotated} rows annotated");
        }
    }

    Ok(())
}

/// Significance policy of a `layers` query; `p_threshold` wins over `threshold`.
fn layer_policy(
    p_threshold: Option<f64>,
    threshold: Option<f64>,
    null_method: NullMethod,
) -> Option<SignificancePolicy> {
    match (p_threshold, threshold) {
        (Some(p_threshold), _) => {
            Some(SignificancePolicy::StatisticalInclusion { p_threshold, null_method })
        }
        (None, Some(k)) => Some(SignificancePolicy::threshold(k)),
        (None, None) => None,
    }
}

fn load_metadata(config: &AnalysisConfig) -> anyhow::Result<Box<dyn NeuralMetadata>> {
    let metadata = RecordingMetadata::from_yaml_file(&config.metadata_path)
        .with_context(|| format!("loading metadata {}", config.metadata_path.display()))?;
    Ok(Box::new(metadata))
}

fn calculator(config: &AnalysisConfig) -> anyhow::Result<NormalizerCalculator<JsonRecordingSource>> {
    let source = JsonRecordingSource::new(&config.recordings_dir);
    Ok(NormalizerCalculator::new(config.normalizer.clone(), source)?)
}

fn run_enrich<F: ResultFilter>(
    config: &AnalysisConfig,
    identifier: &str,
    filter: F,
    stimulus: StimulusSet,
    norm_bin_width: Option<BinWidthMs>,
) -> anyhow::Result<()> {
    let mut store = CorrelationStore::open(config, identifier, filter, load_metadata(config)?)?;
    let mut norm = calculator(config)?;
    let report = store.set_normalizers_using_bootstrap(&mut norm, stimulus, norm_bin_width)?;

    println!("Rows updated:        {}", report.rows_updated);
    println!("Rows without stats:  {}", report.rows_without_stats);
    println!("Rows unreliable:     {}", report.rows_unreliable);
    println!("Layer types added:   {}", report.layer_types_added);
    Ok(())
}

fn run_significant(
    config: &AnalysisConfig,
    bin_width: BinWidthMs,
    p_threshold: f64,
    null_method: NullMethod,
    mvocs: bool,
) -> anyhow::Result<()> {
    let mut norm = calculator(config)?;
    let stimulus = StimulusSet::from_mvocs_flag(mvocs);
    let significant =
        norm.get_significant_sessions_and_channels(bin_width, p_threshold, stimulus, null_method)?;

    for (session, channels) in &significant {
        let channels: Vec<String> = channels.iter().map(ToString::to_string).collect();
        println!("{session}: {}", channels.join(" "));
    }
    println!(
        "{} channels in {} sessions ({null_method} null, p = {p_threshold})",
        significance::channel_count(&significant),
        significant.len()
    );
    Ok(())
}

fn run_layers(
    config: &AnalysisConfig,
    identifier: &str,
    query: &DistributionQuery,
) -> anyhow::Result<()> {
    let store = CorrelationStore::open(config, identifier, DnnFilter, load_metadata(config)?)?;
    let mut norm = calculator(config)?;
    let dists = store.get_corr_all_layers_for_bin_width(query, &mut norm)?;

    for (layer, values) in &dists {
        println!("layer {layer:>3}: n = {:>5}, median = {:.4}", values.len(), math::median(values)?);
    }
    let peak: LayerId = peak_median_layer(&dists)?;
    println!("Peak median layer: {peak}");
    Ok(())
}

fn run_superset(
    config: &AnalysisConfig,
    identifier: &str,
    null_method: NullMethod,
    percentile: Option<f64>,
    mvocs: bool,
) -> anyhow::Result<()> {
    let store = CorrelationStore::open(config, identifier, DnnFilter, load_metadata(config)?)?;
    let mut norm = calculator(config)?;
    let stimulus = StimulusSet::from_mvocs_flag(mvocs);
    let sets = store.get_significant_session_and_channels_at_all_bin_width(
        null_method,
        stimulus,
        percentile,
        &mut norm,
    )?;

    println!(
        "Superset: {} channels in {} sessions",
        significance::channel_count(&sets.superset),
        sets.superset.len()
    );
    for (&bin_width, own) in &sets.per_bin_width {
        let dists = store.get_corr_super_set_all_layers_for_bin_width(
            &sets.superset,
            own,
            bin_width,
            0.0,
            Metric::Normalized,
            stimulus,
        );
        match peak_median_layer(&dists) {
            Ok(layer) => println!(
                "{bin_width:>4}ms: {} own channels, peak layer {layer}",
                significance::channel_count(own)
            ),
            Err(e) => warn!(bin_width, error = %e, "No layer distributions"),
        }
    }
    Ok(())
}
