use crate::api::models::{AggregationPeriod, CorrelateDataPoint, CorrelationMetric};
use crate::core_logic::data_processing::transform_data;
use crate::core_logic::time_series::TimeSeries;
use crate::error::Result;
use crate::store::MetadataLookup;
use chrono::{Month, NaiveDate};
use ndarray::Array2;
use ndarray_stats::CorrelationExt;
use rayon::prelude::*;
use statrs::distribution::{ContinuousCDF, StudentsT};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, warn};

/// Fewest aligned observations worth correlating.
pub const MIN_ALIGNED_POINTS: usize = 4;

fn pearson_correlation(input_data: &[f64], dataset_data: &[f64]) -> f64 {
    let observations: Vec<f64> = input_data
        .iter()
        .chain(dataset_data.iter())
        .copied()
        .collect();

    // One variable per row.
    match Array2::from_shape_vec((2, input_data.len()), observations) {
        Ok(matrix) => match matrix.pearson_correlation() {
            Ok(correlation_matrix) => correlation_matrix[[0, 1]],
            Err(_) => f64::NAN,
        },
        Err(_) => f64::NAN,
    }
}

/// Two-sided p-value of `pearson` under the null of zero correlation, `n - 2` degrees of freedom.
///
/// Returns 0 when fewer than three observations leave no degrees of freedom.
pub fn p_value(pearson: f64, n: usize) -> f64 {
    if n < 3 {
        return 0.0;
    }
    let r = pearson.clamp(-1.0, 1.0);
    if r.abs() >= 1.0 {
        return 0.0;
    }

    let df = (n - 2) as f64;
    let t = r * (df / (1.0 - r * r)).sqrt();
    match StudentsT::new(0.0, 1.0, df) {
        Ok(distribution) => (2.0 * (1.0 - distribution.cdf(t.abs()))).clamp(0.0, 1.0),
        Err(_) => 0.0,
    }
}

/// Inner-joins on exact date equality, returning target-ordered `(date, target, candidate)`.
fn align(target: &TimeSeries, candidate: &TimeSeries) -> Vec<(NaiveDate, f64, f64)> {
    let candidate_values: HashMap<NaiveDate, f64> = candidate.iter().collect();
    target
        .iter()
        .filter_map(|(date, value)| {
            candidate_values
                .get(&date)
                .map(|candidate_value| (date, value, *candidate_value))
        })
        .collect()
}

/// Correlates `candidate` against `target` for every lag in `0..=max_lag`.
///
/// At lag `k` the candidate's last `k` aligned values are dropped and the target's
/// first `k`, so the candidate leads the target by `k` periods. Lags whose
/// correlation is NaN are skipped. Returns `None` when fewer than
/// [`MIN_ALIGNED_POINTS`] dates align.
pub fn correlate(
    target: &TimeSeries,
    candidate: &TimeSeries,
    title: &str,
    max_lag: usize,
) -> Option<Vec<CorrelateDataPoint>> {
    let aligned = align(target, candidate);
    if aligned.len() < MIN_ALIGNED_POINTS {
        return None;
    }

    let dates: Vec<String> = aligned
        .iter()
        .map(|(date, _, _)| target.date_label(*date))
        .collect();
    let input_data: Vec<f64> = aligned.iter().map(|(_, value, _)| *value).collect();
    let dataset_data: Vec<f64> = aligned.iter().map(|(_, _, value)| *value).collect();
    let n = aligned.len();

    let mut correlate_data_points = Vec::new();
    for lag in 0..=max_lag {
        if n.saturating_sub(lag) < 2 {
            break;
        }

        let input_data_shifted = &input_data[lag..];
        let dataset_data_shifted = &dataset_data[..n - lag];

        let pearson_value = pearson_correlation(input_data_shifted, dataset_data_shifted);
        if pearson_value.is_nan() {
            continue;
        }

        correlate_data_points.push(CorrelateDataPoint {
            title: title.to_string(),
            internal_name: None,
            pearson_value,
            p_value: p_value(pearson_value, n - lag),
            lag,
            input_data: input_data_shifted.to_vec(),
            dataset_data: dataset_data_shifted.to_vec(),
            dates: dates[lag..].to_vec(),
            source: None,
            description: None,
        });
    }

    Some(correlate_data_points)
}

/// Sorts strongest relationships first regardless of sign.
///
/// Ties are ordered by title, then lag, so repeated runs agree.
pub fn sort_by_strength(correlations: &mut [CorrelateDataPoint]) {
    correlations.sort_by(|a, b| {
        b.pearson_value
            .abs()
            .partial_cmp(&a.pearson_value.abs())
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.title.cmp(&b.title))
            .then_with(|| a.lag.cmp(&b.lag))
    });
}

/// Transforms the target once and every candidate independently, then correlates each pair.
///
/// Candidates that fail to transform or do not align are logged and skipped.
/// Errors only when the target itself cannot be transformed.
#[tracing::instrument(skip_all, fields(candidates = candidates.len(), max_lag = max_lag))]
pub fn calculate_correlation(
    target: &TimeSeries,
    candidates: &HashMap<String, TimeSeries>,
    time_increment: AggregationPeriod,
    fiscal_year_end: Option<Month>,
    target_metric: CorrelationMetric,
    candidate_metric: CorrelationMetric,
    max_lag: usize,
) -> Result<Vec<CorrelateDataPoint>> {
    let now = Instant::now();
    let target = transform_data(target, time_increment, fiscal_year_end, target_metric, None)?;

    let mut correlations: Vec<CorrelateDataPoint> = candidates
        .par_iter()
        .filter_map(|(title, candidate)| {
            let transformed = match transform_data(
                candidate,
                time_increment,
                fiscal_year_end,
                candidate_metric,
                None,
            ) {
                Ok(transformed) => transformed,
                Err(err) => {
                    warn!(dataset = %title, error = %err, "skipping candidate");
                    return None;
                }
            };

            let correlation = correlate(&target, &transformed, title, max_lag);
            if correlation.is_none() {
                debug!(dataset = %title, "not enough overlapping dates");
            }
            correlation
        })
        .flatten()
        .collect();

    sort_by_strength(&mut correlations);
    debug!(
        results = correlations.len(),
        elapsed_ms = now.elapsed().as_millis() as u64,
        "finished correlations"
    );
    Ok(correlations)
}

/// Fills display name, internal name, source and description from the metadata lookup.
///
/// Points are matched on their current `title`, which the batch driver sets to the
/// dataset identifier.
pub fn enrich_with_metadata(correlations: &mut [CorrelateDataPoint], lookup: &impl MetadataLookup) {
    for correlation in correlations.iter_mut() {
        let Some(metadata) = lookup.metadata(&correlation.title) else {
            continue;
        };
        correlation.internal_name = Some(metadata.internal_name.clone());
        correlation.title = metadata.display_name().to_string();
        correlation.source = metadata.source.clone();
        correlation.description = metadata.description.clone();
    }
}
