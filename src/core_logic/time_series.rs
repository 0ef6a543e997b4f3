use chrono::{Datelike, Month, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Date half of a raw observation as it arrives from an adapter or a request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawDate {
    Date(NaiveDate),
    Text(String),
}

/// Value half of a raw observation. Text values may carry `$`, `%` or thousands separators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
}

impl RawValue {
    /// Converts to `f64`, stripping currency, percent and thousands separators from text.
    pub fn to_f64(&self) -> Result<f64, String> {
        match self {
            RawValue::Number(value) => Ok(*value),
            RawValue::Text(text) => {
                let cleaned: String = text
                    .chars()
                    .filter(|c| !matches!(c, '$' | '%' | ',') && !c.is_whitespace())
                    .collect();
                cleaned
                    .parse::<f64>()
                    .map_err(|_| format!("cannot parse value {text:?} as a number"))
            }
        }
    }
}

impl From<NaiveDate> for RawDate {
    fn from(date: NaiveDate) -> Self {
        RawDate::Date(date)
    }
}

impl From<&str> for RawDate {
    fn from(text: &str) -> Self {
        RawDate::Text(text.to_string())
    }
}

impl From<String> for RawDate {
    fn from(text: String) -> Self {
        RawDate::Text(text)
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Number(value)
    }
}

impl From<&str> for RawValue {
    fn from(text: &str) -> Self {
        RawValue::Text(text.to_string())
    }
}

impl From<String> for RawValue {
    fn from(text: String) -> Self {
        RawValue::Text(text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPoint {
    pub date: RawDate,
    pub value: RawValue,
}

impl RawPoint {
    pub fn new(date: impl Into<RawDate>, value: impl Into<RawValue>) -> Self {
        RawPoint {
            date: date.into(),
            value: value.into(),
        }
    }
}

/// Bucket granularity a series is known to be aligned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    /// Straight out of coercion, no alignment guaranteed.
    Irregular,
    Monthly,
    Quarterly { fiscal_year_end: Month },
    Annually,
}

/// A fiscal quarter, named by the calendar year in which its fiscal year ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FiscalQuarter {
    pub fiscal_year: i32,
    pub quarter: u32,
}

impl FiscalQuarter {
    pub fn from_date(date: NaiveDate, fiscal_year_end: Month) -> Self {
        let end = fiscal_year_end.number_from_month() as i32;
        let month = date.month() as i32;
        let fiscal_year = if month > end {
            date.year() + 1
        } else {
            date.year()
        };
        let quarter = ((month - 1 - end).rem_euclid(12) / 3 + 1) as u32;
        FiscalQuarter {
            fiscal_year,
            quarter,
        }
    }

    /// First day of the quarter. `None` only outside chrono's representable range.
    pub fn start_date(&self, fiscal_year_end: Month) -> Option<NaiveDate> {
        let end = fiscal_year_end.number_from_month() as i32;
        let month_index = (self.fiscal_year - 1) * 12 + end + 3 * (self.quarter as i32 - 1);
        first_of_month(month_index.div_euclid(12), month_index.rem_euclid(12) as u32 + 1)
    }
}

impl fmt::Display for FiscalQuarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Q{}", self.fiscal_year, self.quarter)
    }
}

pub(crate) fn first_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)
}

/// An owned, date-sorted series of `f64` observations.
///
/// Every transform returns a new `TimeSeries`; nothing in the engine mutates one in place.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    dates: Vec<NaiveDate>,
    values: Vec<f64>,
    frequency: Frequency,
}

impl TimeSeries {
    /// Builds a series from unordered points. Sorting is stable so equal dates keep input order.
    pub fn new(points: impl IntoIterator<Item = (NaiveDate, f64)>) -> Self {
        let mut points: Vec<(NaiveDate, f64)> = points.into_iter().collect();
        points.sort_by_key(|(date, _)| *date);
        let (dates, values) = points.into_iter().unzip();
        TimeSeries {
            dates,
            values,
            frequency: Frequency::Irregular,
        }
    }

    pub fn empty() -> Self {
        TimeSeries {
            dates: Vec::new(),
            values: Vec::new(),
            frequency: Frequency::Irregular,
        }
    }

    pub(crate) fn with_frequency(mut self, frequency: Frequency) -> Self {
        self.frequency = frequency;
        self
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.dates.iter().copied().zip(self.values.iter().copied())
    }

    /// Keeps points with `start <= date <= end`; either bound may be open.
    pub fn between(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> TimeSeries {
        let points = self.iter().filter(|(date, _)| {
            start.map_or(true, |start| *date >= start) && end.map_or(true, |end| *date <= end)
        });
        TimeSeries::new(points).with_frequency(self.frequency)
    }

    pub fn map_values(&self, f: impl Fn(f64) -> f64) -> TimeSeries {
        TimeSeries {
            dates: self.dates.clone(),
            values: self.values.iter().map(|value| f(*value)).collect(),
            frequency: self.frequency,
        }
    }

    /// Largest absolute value, ignoring NaN. `None` for an empty or all-NaN series.
    pub fn max_abs(&self) -> Option<f64> {
        self.values
            .iter()
            .filter(|value| !value.is_nan())
            .map(|value| value.abs())
            .fold(None, |max, value| match max {
                Some(max) if max >= value => Some(max),
                _ => Some(value),
            })
    }

    /// Display label for one date: `2020Q1` for fiscal quarters, ISO dates otherwise.
    pub fn date_label(&self, date: NaiveDate) -> String {
        match self.frequency {
            Frequency::Quarterly { fiscal_year_end } => {
                FiscalQuarter::from_date(date, fiscal_year_end).to_string()
            }
            _ => date.format("%Y-%m-%d").to_string(),
        }
    }

    pub fn date_labels(&self) -> Vec<String> {
        self.dates.iter().map(|date| self.date_label(*date)).collect()
    }
}

impl FromIterator<(NaiveDate, f64)> for TimeSeries {
    fn from_iter<I: IntoIterator<Item = (NaiveDate, f64)>>(iter: I) -> Self {
        TimeSeries::new(iter)
    }
}
