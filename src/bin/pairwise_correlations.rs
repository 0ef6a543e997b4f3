//! Correlates every stored series against every other and records near-duplicates.
//!
//! Each dataset with partners above [`DUPLICATE_THRESHOLD`] is appended to the
//! configured output as `name,partner,partner,...`.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use chrono::Month;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use series_correlation_engine::api::models::{
    AggregationPeriod, CorrelateDataPoint, CorrelationMetric,
};
use series_correlation_engine::config::ServiceConfig;
use series_correlation_engine::core_logic::correlation::{correlate, sort_by_strength};
use series_correlation_engine::core_logic::data_processing::transform_data;
use series_correlation_engine::core_logic::date_parsing::DateParser;
use series_correlation_engine::core_logic::time_series::TimeSeries;
use series_correlation_engine::store::queries::fetch_datasets::load_catalog;
use std::collections::HashMap;
use std::error::Error;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DUPLICATE_THRESHOLD: f64 = 0.99;

/// Correlations of one dataset against every other, strongest first.
fn run_correlations(
    name: &str,
    series: &TimeSeries,
    transformed: &HashMap<String, TimeSeries>,
) -> Vec<CorrelateDataPoint> {
    let mut correlations: Vec<CorrelateDataPoint> = transformed
        .iter()
        .filter(|(other, _)| other.as_str() != name)
        .filter_map(|(other, other_series)| correlate(series, other_series, other, 0))
        .flatten()
        .collect();

    sort_by_strength(&mut correlations);
    correlations
}

fn average_correlation(correlations: &[CorrelateDataPoint]) -> Option<f64> {
    if correlations.is_empty() {
        return None;
    }
    let total: f64 = correlations.iter().map(|dp| dp.pearson_value.abs()).sum();
    Some(total / correlations.len() as f64)
}

fn write_partners(
    output: &Mutex<BufWriter<std::fs::File>>,
    name: &str,
    partners: &[&str],
) -> std::io::Result<()> {
    let record: Vec<&str> = std::iter::once(name).chain(partners.iter().copied()).collect();
    let mut output = output
        .lock()
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::Other, "output lock poisoned"))?;
    writeln!(output, "{}", record.join(","))
}

fn open_output(path: &Path) -> std::io::Result<Mutex<BufWriter<std::fs::File>>> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(Mutex::new(BufWriter::new(file)))
}

fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServiceConfig::from_env()?;
    let pool = ThreadPoolBuilder::new()
        .stack_size(config.worker_stack_size)
        .build()?;

    let now = Instant::now();
    let catalog = load_catalog(&config.data_dir, &DateParser::new(config.max_year))?;
    info!("finished pre-processing data");

    let transformed: HashMap<String, TimeSeries> = pool.install(|| {
        catalog
            .series
            .par_iter()
            .filter_map(|(name, series)| {
                match transform_data(
                    series,
                    AggregationPeriod::Quarterly,
                    Some(Month::December),
                    CorrelationMetric::RawValue,
                    None,
                ) {
                    Ok(transformed) => Some((name.clone(), transformed)),
                    Err(err) => {
                        warn!(dataset = %name, error = %err, "skipping dataset");
                        None
                    }
                }
            })
            .collect()
    });
    info!(datasets = transformed.len(), "finished transforming data");

    let output = open_output(&config.pairwise_output)?;
    let averages: Vec<(String, f64)> = pool.install(|| {
        transformed
            .par_iter()
            .filter_map(|(name, series)| {
                let correlations = run_correlations(name, series, &transformed);

                let partners: Vec<&str> = correlations
                    .iter()
                    .filter(|dp| dp.pearson_value.abs() > DUPLICATE_THRESHOLD)
                    .map(|dp| dp.title.as_str())
                    .collect();
                if !partners.is_empty() {
                    if let Err(err) = write_partners(&output, name, &partners) {
                        warn!(dataset = %name, error = %err, "failed to record partners");
                    }
                }

                average_correlation(&correlations).map(|average| (name.clone(), average))
            })
            .collect()
    });

    for (name, average) in &averages {
        info!(dataset = %name, average_correlation = average, "average correlation");
    }

    output
        .into_inner()
        .map_err(|_| "output lock poisoned")?
        .flush()?;
    info!(
        datasets = averages.len(),
        elapsed_ms = now.elapsed().as_millis() as u64,
        "finished correlations"
    );
    Ok(())
}
