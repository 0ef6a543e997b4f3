use crate::api::models::{AggregationPeriod, CorrelationMetric};
use crate::core_logic::date_parsing::DateParser;
use crate::core_logic::time_series::{
    first_of_month, FiscalQuarter, Frequency, RawDate, RawPoint, RawValue, TimeSeries,
};
use crate::error::{Result, TransformError};
use crate::store::models::{Dataset, DatasetMetadata};
use chrono::{Datelike, Month, NaiveDate};
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

/// Resamples `series` into aligned buckets and optionally derives year-over-year growth.
///
/// Rows before `start_date` are dropped before bucketing. Infinite and NaN results
/// (e.g. growth over a zero base) are removed from the output.
pub fn transform_data(
    series: &TimeSeries,
    time_increment: AggregationPeriod,
    fiscal_year_end: Option<Month>,
    correlation_metric: CorrelationMetric,
    start_date: Option<NaiveDate>,
) -> Result<TimeSeries> {
    if series.is_empty() {
        return Ok(TimeSeries::empty());
    }

    let series = series.between(start_date, None);

    let (bucketed, periods_per_year) = match time_increment {
        AggregationPeriod::Monthly => (bucket_monthly(&series)?, 12),
        AggregationPeriod::Quarterly => {
            let fiscal_year_end =
                fiscal_year_end.ok_or(TransformError::MissingParameter("fiscal_year_end"))?;
            (bucket_quarterly(&series, fiscal_year_end)?, 4)
        }
        AggregationPeriod::Annually => (bucket_annually(&series)?, 1),
    };

    let transformed = match correlation_metric {
        CorrelationMetric::RawValue => bucketed,
        CorrelationMetric::YoyGrowth => {
            let growth = percent_change(bucketed.values(), periods_per_year);
            TimeSeries::new(bucketed.dates().iter().copied().zip(growth))
                .with_frequency(bucketed.frequency())
        }
    };

    Ok(drop_invalid(&transformed))
}

/// `values[i] / values[i - periods] - 1`, NaN where no prior value exists.
pub(crate) fn percent_change(values: &[f64], periods: usize) -> Vec<f64> {
    values
        .iter()
        .enumerate()
        .map(|(i, value)| {
            if periods == 0 || i < periods {
                f64::NAN
            } else {
                value / values[i - periods] - 1.0
            }
        })
        .collect()
}

fn drop_invalid(series: &TimeSeries) -> TimeSeries {
    TimeSeries::new(series.iter().filter(|(_, value)| value.is_finite()))
        .with_frequency(series.frequency())
}

fn sum_buckets<K: Ord + Copy>(
    series: &TimeSeries,
    key: impl Fn(NaiveDate) -> K,
    bucket_date: impl Fn(K) -> Option<NaiveDate>,
) -> Result<Vec<(NaiveDate, f64)>> {
    let mut buckets: BTreeMap<K, f64> = BTreeMap::new();
    for (date, value) in series.iter() {
        *buckets.entry(key(date)).or_insert(0.0) += value;
    }

    buckets
        .into_iter()
        .map(|(bucket, value)| {
            bucket_date(bucket)
                .map(|date| (date, value))
                .ok_or_else(|| TransformError::malformed(None, "bucket date out of range"))
        })
        .collect()
}

fn bucket_monthly(series: &TimeSeries) -> Result<TimeSeries> {
    let points = sum_buckets(
        series,
        |date| (date.year(), date.month()),
        |(year, month)| first_of_month(year, month),
    )?;
    Ok(TimeSeries::new(points).with_frequency(Frequency::Monthly))
}

fn bucket_annually(series: &TimeSeries) -> Result<TimeSeries> {
    let points = sum_buckets(series, |date| date.year(), |year| first_of_month(year, 1))?;
    Ok(TimeSeries::new(points).with_frequency(Frequency::Annually))
}

/// Sources whose first two points are one month apart are treated as monthly;
/// anything else is assumed to be quarterly already. This only looks at the
/// first two rows and can misclassify short, irregular series.
fn is_monthly_source(series: &TimeSeries) -> bool {
    match series.dates() {
        [first, second, ..] => (second.month() as i32 - first.month() as i32).rem_euclid(12) == 1,
        _ => false,
    }
}

fn bucket_quarterly(series: &TimeSeries, fiscal_year_end: Month) -> Result<TimeSeries> {
    let quarterly = Frequency::Quarterly { fiscal_year_end };
    if series.len() < 3 {
        return Ok(TimeSeries::empty().with_frequency(quarterly));
    }

    let quarter_of = |date: NaiveDate| FiscalQuarter::from_date(date, fiscal_year_end);
    let all_rows: Vec<(NaiveDate, f64)> = series.iter().collect();
    let mut rows: &[(NaiveDate, f64)] = &all_rows;

    if is_monthly_source(series) {
        // A quarter is complete when three consecutive months land in it.
        let same_quarter = |window: &[(NaiveDate, f64)]| {
            window
                .iter()
                .all(|(date, _)| quarter_of(*date) == quarter_of(window[0].0))
        };
        while rows.len() >= 3 && !same_quarter(&rows[..3]) {
            rows = &rows[1..];
        }
        while rows.len() >= 3 && !same_quarter(&rows[rows.len() - 3..]) {
            rows = &rows[..rows.len() - 1];
        }
        if rows.len() < 3 {
            return Ok(TimeSeries::empty().with_frequency(quarterly));
        }
    }

    let trimmed = TimeSeries::new(rows.iter().copied());
    let points = sum_buckets(&trimmed, quarter_of, |quarter| {
        quarter.start_date(fiscal_year_end)
    })?;
    Ok(TimeSeries::new(points).with_frequency(quarterly))
}

/// Groups stored rows by dataset and coerces each group into a series keyed by internal name.
///
/// Datasets that fail to coerce are logged and skipped.
pub fn create_series(
    datasets: &[Dataset],
    metadata: &[DatasetMetadata],
    parser: &DateParser,
) -> HashMap<String, TimeSeries> {
    let mut rows_by_dataset: HashMap<i64, Vec<RawPoint>> = HashMap::new();
    for dataset in datasets {
        rows_by_dataset
            .entry(dataset.metadata_id)
            .or_default()
            .push(RawPoint {
                date: RawDate::Text(dataset.date.clone()),
                value: RawValue::Text(dataset.value.clone()),
            });
    }

    let mut series = HashMap::new();
    for meta in metadata {
        let Some(rows) = rows_by_dataset.get(&meta.id) else {
            continue;
        };

        match parser.coerce_series(rows) {
            Ok(parsed) => {
                series.insert(meta.internal_name.clone(), parsed);
            }
            Err(err) => warn!(dataset = %meta.internal_name, error = %err, "skipping dataset"),
        }
    }

    series
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn monthly(start_year: i32, start_month: u32, values: &[f64]) -> TimeSeries {
        values
            .iter()
            .enumerate()
            .map(|(i, value)| {
                let index = start_year * 12 + start_month as i32 - 1 + i as i32;
                (
                    date(index.div_euclid(12), index.rem_euclid(12) as u32 + 1, 1),
                    *value,
                )
            })
            .collect()
    }

    fn one_to(n: usize) -> Vec<f64> {
        (1..=n).map(|x| x as f64).collect()
    }

    fn labels(series: &TimeSeries) -> Vec<String> {
        series.date_labels()
    }

    fn quarterly_data() -> TimeSeries {
        let points = vec![
            ("2020Q1", 1.0),
            ("2020Q2", 1.0),
            ("2020Q3", 1.0),
            ("2020Q4", 1.0),
            ("2021Q1", 2.0),
            ("2021Q2", 2.0),
            ("2021Q3", 2.0),
            ("2021Q4", 2.0),
        ]
        .into_iter()
        .map(|(d, v)| RawPoint::new(d, v))
        .collect::<Vec<_>>();
        DateParser::default().coerce_series(&points).unwrap()
    }

    fn quarterly(series: &TimeSeries, fiscal_year_end: Month) -> Result<TimeSeries> {
        transform_data(
            series,
            AggregationPeriod::Quarterly,
            Some(fiscal_year_end),
            CorrelationMetric::RawValue,
            None,
        )
    }

    #[test]
    fn test_transform_empty() {
        let result = transform_data(
            &TimeSeries::empty(),
            AggregationPeriod::Quarterly,
            None,
            CorrelationMetric::RawValue,
            None,
        )
        .unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_transform_quarterly_requires_fiscal_year_end() {
        let result = transform_data(
            &monthly(2020, 1, &one_to(12)),
            AggregationPeriod::Quarterly,
            None,
            CorrelationMetric::RawValue,
            None,
        );
        assert_eq!(
            result,
            Err(TransformError::MissingParameter("fiscal_year_end"))
        );
    }

    #[test]
    fn test_transform_data() {
        let df = monthly(2020, 1, &[10.0, 20.0, 30.0, 40.0, 50.0, 60.0]);
        let result = quarterly(&df, Month::December).unwrap();

        assert_eq!(labels(&result), vec!["2020Q1", "2020Q2"]);
        assert_eq!(result.dates(), &[date(2020, 1, 1), date(2020, 4, 1)]);
        assert_eq!(result.values(), &[60.0, 150.0]);
    }

    #[test]
    fn test_transform_data_fiscal_year_end() {
        let df = monthly(2020, 1, &[10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 90.0]);
        let result = quarterly(&df, Month::March).unwrap();

        assert_eq!(labels(&result), vec!["2020Q4", "2021Q1", "2021Q2"]);
        assert_eq!(result.values(), &[60.0, 150.0, 240.0]);
    }

    #[test]
    fn test_transform_quarterly_full_year() {
        let result = quarterly(&monthly(2020, 1, &one_to(12)), Month::December).unwrap();

        assert_eq!(labels(&result), vec!["2020Q1", "2020Q2", "2020Q3", "2020Q4"]);
        assert_eq!(result.values(), &[6.0, 15.0, 24.0, 33.0]);
    }

    #[test]
    fn test_transform_quarterly_already_quarterly() {
        let result = quarterly(&quarterly_data(), Month::December).unwrap();

        assert_eq!(labels(&result)[0], "2020Q1");
        assert_eq!(labels(&result)[3], "2020Q4");
        assert_eq!(result.values(), &[1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_transform_quarterly_less_than_three_months_of_data() {
        let result = quarterly(&monthly(2020, 1, &[1.0, 2.0]), Month::December).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_transform_quarterly_fiscal_month_january() {
        let result = quarterly(&monthly(2020, 1, &one_to(12)), Month::January).unwrap();

        assert_eq!(labels(&result), vec!["2021Q1", "2021Q2", "2021Q3"]);
        assert_eq!(result.values(), &[9.0, 18.0, 27.0]);
    }

    #[test]
    fn test_transform_quarterly_incomplete_start() {
        let values: Vec<f64> = (2..=12).map(|x| x as f64).collect();
        let result = quarterly(&monthly(2020, 2, &values), Month::December).unwrap();

        assert_eq!(labels(&result), vec!["2020Q2", "2020Q3", "2020Q4"]);
        assert_eq!(result.values()[0], 15.0);
    }

    #[test]
    fn test_transform_quarterly_incomplete_end() {
        let result = quarterly(&monthly(2020, 1, &one_to(11)), Month::December).unwrap();

        assert_eq!(labels(&result), vec!["2020Q1", "2020Q2", "2020Q3"]);
    }

    #[test]
    fn test_transform_quarterly_monthly_source_across_year_boundary() {
        let result = quarterly(&monthly(2019, 12, &one_to(7)), Month::December).unwrap();

        assert_eq!(labels(&result), vec!["2020Q1", "2020Q2"]);
        assert_eq!(result.values(), &[9.0, 18.0]);
    }

    #[test]
    fn test_transform_quarterly_yoy_growth() {
        let two_years: Vec<f64> = [vec![1.0; 12], vec![2.0; 12]].concat();
        let result = transform_data(
            &monthly(2020, 1, &two_years),
            AggregationPeriod::Quarterly,
            Some(Month::December),
            CorrelationMetric::YoyGrowth,
            None,
        )
        .unwrap();

        assert_eq!(result.len(), 4);
        assert_abs_diff_eq!(result.values()[0], 1.0, epsilon = 1e-9);
        assert_eq!(labels(&result)[0], "2021Q1");
    }

    #[test]
    fn test_transform_data_correlation_metric() {
        let result = transform_data(
            &monthly(2020, 1, &one_to(24)),
            AggregationPeriod::Quarterly,
            Some(Month::December),
            CorrelationMetric::YoyGrowth,
            None,
        )
        .unwrap();

        assert_eq!(labels(&result), vec!["2021Q1", "2021Q2", "2021Q3", "2021Q4"]);
        for (value, expected) in result.values().iter().zip([6.0, 2.4, 1.5, 1.09090909]) {
            assert_abs_diff_eq!(*value, expected, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_transform_annual() {
        let result = transform_data(
            &monthly(2020, 1, &one_to(12)),
            AggregationPeriod::Annually,
            Some(Month::December),
            CorrelationMetric::RawValue,
            None,
        )
        .unwrap();

        assert_eq!(result.dates(), &[date(2020, 1, 1)]);
        assert_eq!(result.values(), &[78.0]);

        let result = transform_data(
            &quarterly_data(),
            AggregationPeriod::Annually,
            None,
            CorrelationMetric::RawValue,
            None,
        )
        .unwrap();
        assert_eq!(result.dates(), &[date(2020, 1, 1), date(2021, 1, 1)]);
        assert_eq!(result.values(), &[4.0, 8.0]);
    }

    #[test]
    fn test_transform_annual_yoy_growth() {
        let two_years: Vec<f64> = [vec![1.0; 12], vec![2.0; 12]].concat();
        let result = transform_data(
            &monthly(2020, 1, &two_years),
            AggregationPeriod::Annually,
            None,
            CorrelationMetric::YoyGrowth,
            None,
        )
        .unwrap();

        assert_eq!(result.dates(), &[date(2021, 1, 1)]);
        assert_abs_diff_eq!(result.values()[0], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_transform_monthly_passes_values_through() {
        let input = monthly(2020, 1, &one_to(6));
        let result = transform_data(
            &input,
            AggregationPeriod::Monthly,
            None,
            CorrelationMetric::RawValue,
            None,
        )
        .unwrap();

        assert_eq!(result.dates(), input.dates());
        assert_eq!(result.values(), input.values());
        assert_eq!(result.frequency(), Frequency::Monthly);
    }

    #[test]
    fn test_transform_monthly_yoy_growth_drops_first_year() {
        let result = transform_data(
            &monthly(2020, 1, &one_to(24)),
            AggregationPeriod::Monthly,
            None,
            CorrelationMetric::YoyGrowth,
            None,
        )
        .unwrap();

        assert_eq!(result.len(), 12);
        assert_eq!(result.dates()[0], date(2021, 1, 1));
        assert_abs_diff_eq!(result.values()[0], 12.0, epsilon = 1e-12);
    }

    #[test]
    fn test_transform_drops_growth_over_zero_base() {
        let result = transform_data(
            &monthly(2020, 1, &[vec![0.0; 12], vec![5.0; 12]].concat()),
            AggregationPeriod::Annually,
            None,
            CorrelationMetric::YoyGrowth,
            None,
        )
        .unwrap();

        assert!(result.is_empty());
    }

    #[test]
    fn test_transform_data_with_start_date() {
        let result = transform_data(
            &monthly(2020, 1, &one_to(12)),
            AggregationPeriod::Quarterly,
            Some(Month::December),
            CorrelationMetric::RawValue,
            Some(date(2020, 6, 1)),
        )
        .unwrap();

        assert_eq!(result.values(), &[24.0, 33.0]);
    }

    #[test]
    fn test_transform_quarterly_with_start_date() {
        let result = transform_data(
            &quarterly_data(),
            AggregationPeriod::Quarterly,
            Some(Month::December),
            CorrelationMetric::RawValue,
            Some(date(2020, 6, 1)),
        )
        .unwrap();

        assert_eq!(labels(&result)[0], "2020Q3");
        assert_eq!(labels(&result)[result.len() - 1], "2021Q4");
        assert_eq!(result.len(), 6);
    }

    #[test]
    fn test_transform_is_idempotent() {
        let input = monthly(2019, 11, &one_to(30));
        for period in [
            AggregationPeriod::Monthly,
            AggregationPeriod::Quarterly,
            AggregationPeriod::Annually,
        ] {
            let once = transform_data(
                &input,
                period,
                Some(Month::June),
                CorrelationMetric::RawValue,
                None,
            )
            .unwrap();
            let twice = transform_data(
                &once,
                period,
                Some(Month::June),
                CorrelationMetric::RawValue,
                None,
            )
            .unwrap();

            assert_eq!(once.dates(), twice.dates());
            assert_eq!(once.values(), twice.values());
        }
    }

    #[test]
    fn test_transform_does_not_mutate_input() {
        let input = monthly(2020, 1, &one_to(12));
        let snapshot = input.clone();
        let _ = quarterly(&input, Month::December).unwrap();
        assert_eq!(input, snapshot);
    }

    #[test]
    fn test_create_series_groups_by_metadata() {
        let metadata = vec![
            DatasetMetadata::new(1, "gdp"),
            DatasetMetadata::new(2, "cpi"),
            DatasetMetadata::new(3, "unused"),
        ];
        let datasets = vec![
            Dataset::new(1, "2020-02-01", "2"),
            Dataset::new(2, "2020-01-01", "$1,000"),
            Dataset::new(1, "2020-01-01", "1"),
        ];

        let series = create_series(&datasets, &metadata, &DateParser::default());

        assert_eq!(series.len(), 2);
        assert_eq!(series["gdp"].values(), &[1.0, 2.0]);
        assert_eq!(series["cpi"].values(), &[1000.0]);
    }

    #[test]
    fn test_create_series_skips_malformed_dataset() {
        let metadata = vec![DatasetMetadata::new(1, "bad"), DatasetMetadata::new(2, "good")];
        let datasets = vec![
            Dataset::new(1, "not a date", "2"),
            Dataset::new(2, "2020-01-01", "1"),
        ];

        let series = create_series(&datasets, &metadata, &DateParser::default());

        assert!(!series.contains_key("bad"));
        assert!(series.contains_key("good"));
    }
}
