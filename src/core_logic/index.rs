use crate::api::models::{AggregationPeriod, CorrelateDataPoint, CorrelationMetric, IndexDefinition};
use crate::core_logic::correlation::{correlate, sort_by_strength};
use crate::core_logic::data_processing::transform_data;
use crate::core_logic::time_series::TimeSeries;
use crate::error::{Result, TransformError};
use crate::store::SeriesStore;
use chrono::{Month, NaiveDate};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Builds a synthetic series as the weighted sum of stored series.
///
/// Each member is transformed independently; under [`CorrelationMetric::RawValue`]
/// it is also scaled by its own largest absolute value so no single series
/// dominates. Only dates present in every member survive.
///
/// Returns `Ok(None)` when `weights` is empty or no identifier resolves.
#[tracing::instrument(skip_all, fields(members = weights.len()))]
pub fn build_index(
    store: &impl SeriesStore,
    weights: &HashMap<String, f64>,
    time_increment: AggregationPeriod,
    fiscal_year_end: Option<Month>,
    correlation_metric: CorrelationMetric,
) -> Result<Option<TimeSeries>> {
    if weights.is_empty() {
        return Ok(None);
    }
    if time_increment == AggregationPeriod::Quarterly && fiscal_year_end.is_none() {
        return Err(TransformError::MissingParameter("fiscal_year_end"));
    }

    let mut identifiers: Vec<String> = weights.keys().cloned().collect();
    identifiers.sort();
    let resolved = store.fetch_series(&identifiers);
    if resolved.is_empty() {
        debug!("no index members resolved");
        return Ok(None);
    }

    let mut members = Vec::with_capacity(resolved.len());
    for identifier in identifiers.iter().filter(|id| resolved.contains_key(*id)) {
        let transformed = match transform_data(
            &resolved[identifier],
            time_increment,
            fiscal_year_end,
            correlation_metric,
            None,
        ) {
            Ok(transformed) => transformed,
            Err(err) => {
                warn!(dataset = %identifier, error = %err, "skipping index member");
                continue;
            }
        };

        let scale = match correlation_metric {
            CorrelationMetric::RawValue => match transformed.max_abs() {
                Some(max_abs) if max_abs > 0.0 => max_abs,
                _ => 1.0,
            },
            CorrelationMetric::YoyGrowth => 1.0,
        };
        let weight = weights[identifier];
        members.push(transformed.map_values(|value| value / scale * weight));
    }

    let Some(first) = members.first() else {
        return Ok(None);
    };
    let frequency = first.frequency();

    let mut sums: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
    for member in &members {
        for (date, value) in member.iter() {
            let entry = sums.entry(date).or_insert((0.0, 0));
            entry.0 += value;
            entry.1 += 1;
        }
    }

    let index = TimeSeries::new(
        sums.into_iter()
            .filter(|(_, (_, count))| *count == members.len())
            .map(|(date, (sum, _))| (date, sum)),
    )
    .with_frequency(frequency);

    Ok(Some(index))
}

/// Builds each named index and correlates it against `target`.
///
/// Indexes that resolve to nothing or do not overlap the target are skipped.
pub fn correlate_indexes(
    target: &TimeSeries,
    store: &impl SeriesStore,
    indexes: &[IndexDefinition],
    time_increment: AggregationPeriod,
    fiscal_year_end: Option<Month>,
    correlation_metric: CorrelationMetric,
    max_lag: usize,
) -> Result<Vec<CorrelateDataPoint>> {
    let target = transform_data(
        target,
        time_increment,
        fiscal_year_end,
        correlation_metric,
        None,
    )?;

    let mut results = Vec::new();
    for index in indexes {
        let Some(index_series) = build_index(
            store,
            &index.weights,
            time_increment,
            fiscal_year_end,
            correlation_metric,
        )?
        else {
            debug!(index = %index.name, "index has no resolvable members");
            continue;
        };

        if let Some(correlations) = correlate(&target, &index_series, &index.name, max_lag) {
            results.extend(correlations);
        }
    }

    sort_by_strength(&mut results);
    Ok(results)
}
