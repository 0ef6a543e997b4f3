use crate::core_logic::data_processing::percent_change;
use crate::core_logic::time_series::TimeSeries;
use chrono::Datelike;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

pub const DEFAULT_WINDOWS: [usize; 3] = [3, 6, 12];
pub const DEFAULT_STACK_YEARS: usize = 5;

const MONTHS_PER_YEAR: usize = 12;

/// Rolling sum of the trailing `w` values for each window, NaN until `w` values are available.
///
/// Zero-width windows are ignored.
pub fn trailing_sums(series: &TimeSeries, windows: &[usize]) -> BTreeMap<usize, Vec<f64>> {
    let values = series.values();
    windows
        .iter()
        .copied()
        .filter(|window| *window > 0)
        .map(|window| {
            let sums = (0..values.len())
                .map(|i| {
                    if i + 1 < window {
                        f64::NAN
                    } else {
                        values[i + 1 - window..=i].iter().sum()
                    }
                })
                .collect();
            (window, sums)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct GrowthColumns {
    pub mom: Vec<f64>,
    pub yoy: Vec<f64>,
    /// Year-over-year change of each trailing-sum column, keyed by window.
    pub trailing_yoy: BTreeMap<usize, Vec<f64>>,
}

pub fn yoy_growth(series: &TimeSeries, trailing: &BTreeMap<usize, Vec<f64>>) -> GrowthColumns {
    GrowthColumns {
        mom: percent_change(series.values(), 1),
        yoy: percent_change(series.values(), MONTHS_PER_YEAR),
        trailing_yoy: trailing
            .iter()
            .map(|(window, sums)| (*window, percent_change(sums, MONTHS_PER_YEAR)))
            .collect(),
    }
}

/// Geometric mean of `k` consecutive years of YoY growth, for `k` in `2..=max_years`.
///
/// `stack_k[t] = (prod_{i<k} (1 + yoy[t - 12 i]))^(1/k) - 1`
///
/// Stack lengths longer than the history allows are not produced.
pub fn yearly_stacks(yoy: &[f64], max_years: usize) -> BTreeMap<usize, Vec<f64>> {
    let max_years = max_years.min(yoy.len() / MONTHS_PER_YEAR + 1);
    (2..=max_years)
        .map(|years| {
            let stack = (0..yoy.len())
                .map(|t| {
                    let span = MONTHS_PER_YEAR * (years - 1);
                    if t < span {
                        return f64::NAN;
                    }
                    let product: f64 = (0..years)
                        .map(|i| 1.0 + yoy[t - MONTHS_PER_YEAR * i])
                        .product();
                    product.powf(1.0 / years as f64) - 1.0
                })
                .collect();
            (years, stack)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Seasonality {
    /// Mean MoM growth of each row's calendar month.
    pub average_mom: Vec<f64>,
    /// Actual MoM growth minus its calendar-month average.
    pub delta: Vec<f64>,
}

/// Compares each month's MoM growth against the average for that calendar month.
///
/// Averages use the trailing `years` of rows, or the whole series when `years`
/// is `None` or exceeds the history. NaN growth values are left out of the mean.
pub fn seasonality_delta(series: &TimeSeries, mom: &[f64], years: Option<usize>) -> Seasonality {
    let dates = series.dates();
    let lookback = years
        .map(|years| years.saturating_mul(MONTHS_PER_YEAR).min(dates.len()))
        .unwrap_or(dates.len());
    let start = dates.len() - lookback;

    let mut totals: HashMap<u32, (f64, usize)> = HashMap::new();
    let recent_mom = mom.get(start..).unwrap_or(&[]);
    for (date, growth) in dates[start..].iter().zip(recent_mom) {
        if growth.is_nan() {
            continue;
        }
        let entry = totals.entry(date.month()).or_insert((0.0, 0));
        entry.0 += growth;
        entry.1 += 1;
    }

    let average_mom: Vec<f64> = dates
        .iter()
        .map(|date| match totals.get(&date.month()) {
            Some((total, count)) => total / *count as f64,
            None => f64::NAN,
        })
        .collect();
    let delta = mom
        .iter()
        .zip(&average_mom)
        .map(|(growth, average)| growth - average)
        .collect();

    Seasonality { average_mom, delta }
}

#[derive(Debug, Clone)]
pub struct TrendOptions {
    pub windows: Vec<usize>,
    pub stack_years: usize,
    pub seasonality_years: Option<usize>,
}

impl Default for TrendOptions {
    fn default() -> Self {
        TrendOptions {
            windows: DEFAULT_WINDOWS.to_vec(),
            stack_years: DEFAULT_STACK_YEARS,
            seasonality_years: None,
        }
    }
}

/// Every trend column for one monthly series. Undefined cells serialize as `null`.
#[derive(Debug, Clone, Serialize)]
pub struct TrendTable {
    pub dates: Vec<String>,
    pub value: Vec<f64>,
    pub columns: BTreeMap<String, Vec<Option<f64>>>,
}

impl TrendTable {
    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns.get(name).map(Vec::as_slice)
    }
}

fn to_cells(values: &[f64]) -> Vec<Option<f64>> {
    values
        .iter()
        .map(|value| value.is_finite().then_some(*value))
        .collect()
}

pub fn analyze_trends(series: &TimeSeries, options: &TrendOptions) -> TrendTable {
    let trailing = trailing_sums(series, &options.windows);
    let growth = yoy_growth(series, &trailing);
    let stacks = yearly_stacks(&growth.yoy, options.stack_years);
    let seasonality = seasonality_delta(series, &growth.mom, options.seasonality_years);

    let mut columns = BTreeMap::new();
    for (window, sums) in &trailing {
        columns.insert(format!("T{window}M"), to_cells(sums));
    }
    for (window, yoy) in &growth.trailing_yoy {
        columns.insert(format!("T{window}M_YoYGrowth"), to_cells(yoy));
    }
    columns.insert("MoMGrowth".to_string(), to_cells(&growth.mom));
    columns.insert("YoYGrowth".to_string(), to_cells(&growth.yoy));
    for (years, stack) in &stacks {
        columns.insert(format!("Stack{years}Y"), to_cells(stack));
    }
    columns.insert("AverageMoM".to_string(), to_cells(&seasonality.average_mom));
    columns.insert("DeltaSeasonality".to_string(), to_cells(&seasonality.delta));

    TrendTable {
        dates: series.date_labels(),
        value: series.values().to_vec(),
        columns,
    }
}
