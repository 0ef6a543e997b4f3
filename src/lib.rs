//! Time-series normalization and lagged correlation engine.
//!
//! Raw observations are coerced into a [`TimeSeries`], resampled onto monthly,
//! fiscal-quarterly or annual buckets, and correlated against a catalog of
//! stored series or against weighted composite indexes.

pub mod api;
pub mod config;
pub mod core_logic;
pub mod error;
pub mod store;

pub use api::models::{AggregationPeriod, CorrelateDataPoint, CorrelationMetric};
pub use core_logic::correlation::{calculate_correlation, correlate};
pub use core_logic::data_processing::transform_data;
pub use core_logic::date_parsing::{coerce_series, parse_input_dataset, DateParser};
pub use core_logic::index::build_index;
pub use core_logic::time_series::TimeSeries;
pub use error::{ConfigError, StoreError, TransformError};
