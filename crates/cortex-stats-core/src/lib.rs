//! Cortex Stats Core - `no_std` statistics and shared identifiers
//!
//! This crate provides the foundational types and math used by the
//! auditory-cortex correlation analysis. It is `no_std` (with `alloc`) so the
//! statistics can be reused anywhere, and enables `std::error::Error` support
//! behind the `std` feature.
//!
//! # Modules
//!
//! - [`types`]: Session/channel/layer identifiers, stimulus sets, channel statistics
//! - [`error`]: Error type for statistical operations
//! - [`math`]: Mean, std, median, percentile, Pearson correlation, spike binning
//!
//! # Example
//!
//! ```rust
//! use cortex_stats_core::types::ChannelStats;
//!
//! let stats = ChannelStats::new(0.25, 0.05, 0.02);
//! assert!(stats.passes_threshold(3.0));
//! assert!((stats.normalize(0.4) - 0.8).abs() < 1e-12);
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod error;
pub mod math;
pub mod types;

// Re-export commonly used types at crate root
pub use error::StatsError;
pub use types::{
    BinWidthMs, ChannelId, ChannelStats, ColumnSet, LayerId, LayerType, NullMethod, SessionId,
    StimulusSet,
};
