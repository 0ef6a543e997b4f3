//! Coercion of raw `(date, value)` observations into a [`TimeSeries`].
//!
//! Dates are tried against a generic parser first and then against an ordered
//! table of quarter notations (`2014Q1`, `Q1'14`, ...). Quarter tokens resolve
//! to the first day of the calendar quarter.

use crate::core_logic::time_series::{first_of_month, RawDate, RawPoint, TimeSeries};
use crate::error::{Result, TransformError};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// Upper bound used to resolve two-digit years: `14` -> 2014, `30` -> 1930.
pub const DEFAULT_MAX_YEAR: i32 = 2029;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// A parsed date string, before it is pinned to a calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateToken {
    Day(NaiveDate),
    Quarter { year: i32, quarter: u32 },
}

impl DateToken {
    pub fn to_date(&self) -> Option<NaiveDate> {
        match *self {
            DateToken::Day(date) => Some(date),
            DateToken::Quarter { year, quarter } => first_of_month(year, (quarter - 1) * 3 + 1),
        }
    }
}

impl fmt::Display for DateToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateToken::Day(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            DateToken::Quarter { year, quarter } => write!(f, "{year}Q{quarter}"),
        }
    }
}

struct QuarterPattern {
    regex: Regex,
}

impl QuarterPattern {
    fn new(pattern: &str) -> Self {
        QuarterPattern {
            regex: Regex::new(pattern).expect("quarter pattern must compile"),
        }
    }

    fn parse(&self, text: &str, max_year: i32) -> Option<DateToken> {
        let captures = self.regex.captures(text)?;
        let quarter: u32 = captures.name("quarter")?.as_str().parse().ok()?;
        let year_text = captures.name("year")?.as_str();
        let year: i32 = year_text.parse().ok()?;
        let year = if year_text.len() == 2 {
            expand_two_digit_year(year, max_year)
        } else {
            year
        };
        Some(DateToken::Quarter { year, quarter })
    }
}

fn quarter_patterns() -> &'static [QuarterPattern] {
    static PATTERNS: OnceLock<Vec<QuarterPattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            // 2014Q1, 2014-Q1, 2014 Q1
            QuarterPattern::new(r"(?i)^(?P<year>\d{4})\s*-?\s*Q(?P<quarter>[1-4])$"),
            // Q1'14
            QuarterPattern::new(r"(?i)^Q(?P<quarter>[1-4])\s*'(?P<year>\d{2})$"),
            // Q1 2014, Q1-2014
            QuarterPattern::new(r"(?i)^Q(?P<quarter>[1-4])[\s-]+(?P<year>\d{4})$"),
            // 1Q14, 1Q'14, 1Q2014
            QuarterPattern::new(r"(?i)^(?P<quarter>[1-4])Q\s*'?(?P<year>\d{2}|\d{4})$"),
        ]
    })
}

pub fn expand_two_digit_year(year: i32, max_year: i32) -> i32 {
    if year < max_year % 100 {
        2000 + year
    } else {
        1900 + year
    }
}

fn parse_generic_date(text: &str) -> Option<NaiveDate> {
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date);
        }
    }
    for format in DATETIME_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(text, format) {
            return Some(datetime.date());
        }
    }
    if let Ok(datetime) = DateTime::parse_from_rfc3339(text) {
        return Some(datetime.date_naive());
    }
    // Bare year-month and year resolve to the first day of the period.
    if let Ok(date) = NaiveDate::parse_from_str(&format!("{text}-01"), "%Y-%m-%d") {
        return Some(date);
    }
    if text.len() == 4 {
        if let Ok(year) = text.parse::<i32>() {
            return NaiveDate::from_ymd_opt(year, 1, 1);
        }
    }
    None
}

/// Parses raw dates and values, resolving two-digit years against `max_year`.
#[derive(Debug, Clone, Copy)]
pub struct DateParser {
    max_year: i32,
}

impl Default for DateParser {
    fn default() -> Self {
        DateParser::new(DEFAULT_MAX_YEAR)
    }
}

impl DateParser {
    pub fn new(max_year: i32) -> Self {
        DateParser { max_year }
    }

    pub fn parse_token(&self, text: &str) -> Option<DateToken> {
        let text = text.trim();
        if let Some(date) = parse_generic_date(text) {
            return Some(DateToken::Day(date));
        }
        quarter_patterns()
            .iter()
            .find_map(|pattern| pattern.parse(text, self.max_year))
    }

    pub fn parse_date(&self, date: &RawDate) -> Option<NaiveDate> {
        match date {
            RawDate::Date(date) => Some(*date),
            RawDate::Text(text) => self.parse_token(text)?.to_date(),
        }
    }

    /// Coerces raw points into a date-sorted series. Empty input yields an empty series.
    pub fn coerce_series(&self, points: &[RawPoint]) -> Result<TimeSeries> {
        let parsed = points
            .iter()
            .enumerate()
            .map(|(row, point)| {
                let date = self.parse_date(&point.date).ok_or_else(|| {
                    TransformError::malformed(
                        Some(row),
                        format!("unrecognised date {:?}", point.date),
                    )
                })?;
                let value = point
                    .value
                    .to_f64()
                    .map_err(|reason| TransformError::malformed(Some(row), reason))?;
                Ok((date, value))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(TimeSeries::new(parsed))
    }

    /// Parses pasted `date<TAB>value` lines, e.g. `Q1'14\t5,000`.
    pub fn parse_input_dataset(&self, input: &str) -> Result<TimeSeries> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .trim(csv::Trim::All)
            .from_reader(input.as_bytes());

        let mut points = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record =
                record.map_err(|err| TransformError::malformed(Some(row), err.to_string()))?;
            match (record.get(0), record.get(1)) {
                (Some(date), Some(value)) => points.push(RawPoint::new(date, value)),
                _ => {
                    return Err(TransformError::malformed(
                        Some(row),
                        "expected a date and a value separated by a tab",
                    ))
                }
            }
        }

        if points.is_empty() {
            return Err(TransformError::malformed(None, "no data rows"));
        }
        self.coerce_series(&points)
    }
}

pub fn parse_date_token(text: &str) -> Option<DateToken> {
    DateParser::default().parse_token(text)
}

pub fn coerce_series(points: &[RawPoint]) -> Result<TimeSeries> {
    DateParser::default().coerce_series(points)
}

pub fn parse_input_dataset(input: &str) -> Result<TimeSeries> {
    DateParser::default().parse_input_dataset(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[rstest]
    #[case("Q1'14", "2014Q1")]
    #[case("2014Q1", "2014Q1")]
    #[case("2014-q3", "2014Q3")]
    #[case("Q4 1999", "1999Q4")]
    #[case("2Q21", "2021Q2")]
    #[case("Q2'95", "1995Q2")]
    fn test_parse_quarter_strings(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(parse_date_token(input).unwrap().to_string(), expected);
    }

    #[rstest]
    #[case("2020-03-01", date(2020, 3, 1))]
    #[case("2020/03/01", date(2020, 3, 1))]
    #[case("2020-03-01T00:00:00", date(2020, 3, 1))]
    #[case("2020-03-01T12:30:00+02:00", date(2020, 3, 1))]
    #[case("2020-03", date(2020, 3, 1))]
    #[case("2020", date(2020, 1, 1))]
    fn test_parse_generic_dates(#[case] input: &str, #[case] expected: NaiveDate) {
        assert_eq!(parse_date_token(input), Some(DateToken::Day(expected)));
    }

    #[test]
    fn test_two_digit_year_pivot() {
        assert_eq!(expand_two_digit_year(28, 2029), 2028);
        assert_eq!(expand_two_digit_year(29, 2029), 1929);
        assert_eq!(expand_two_digit_year(14, 2010), 1914);
        assert_eq!(
            DateParser::new(2010).parse_token("Q1'14").unwrap().to_string(),
            "1914Q1"
        );
    }

    #[test]
    fn test_quarter_token_to_date() {
        let token = parse_date_token("2014Q3").unwrap();
        assert_eq!(token.to_date(), Some(date(2014, 7, 1)));
    }

    #[test]
    fn test_coerce_series_sorts_and_parses() {
        let points = vec![
            RawPoint::new("2020-02-01", "$2,000"),
            RawPoint::new(date(2020, 1, 1), 1000.0),
            RawPoint::new("Q2'20", "5%"),
        ];
        let series = coerce_series(&points).unwrap();

        assert_eq!(
            series.dates(),
            &[date(2020, 1, 1), date(2020, 2, 1), date(2020, 4, 1)]
        );
        assert_eq!(series.values(), &[1000.0, 2000.0, 5.0]);
    }

    #[test]
    fn test_coerce_series_empty() {
        assert!(coerce_series(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_coerce_series_reports_bad_row() {
        let points = vec![
            RawPoint::new("2020-01-01", 1.0),
            RawPoint::new("sometime", 2.0),
        ];
        assert!(matches!(
            coerce_series(&points),
            Err(TransformError::MalformedInput { row: Some(1), .. })
        ));

        let points = vec![RawPoint::new("2020-01-01", "abc")];
        assert!(matches!(
            coerce_series(&points),
            Err(TransformError::MalformedInput { row: Some(0), .. })
        ));
    }

    #[test]
    fn test_parse_input_dataset_with_floats() {
        let input = "Q1'14\t0.05\nQ2'14\t-0.02\nQ3'14\t0.04\nQ4'14\t0.02\nQ1'23\t0.09\nQ4'23\t0.03";
        let result = parse_input_dataset(input).unwrap();

        assert_eq!(result.dates()[0], date(2014, 1, 1));
        assert_eq!(result.values()[0], 0.05);
        assert_eq!(result.dates()[result.len() - 1], date(2023, 10, 1));
        assert_eq!(result.values()[result.len() - 1], 0.03);
    }

    #[test]
    fn test_parse_input_dataset_with_integers_with_commas() {
        let result = parse_input_dataset("Q1'14\t5,000").unwrap();

        assert_eq!(result.dates(), &[date(2014, 1, 1)]);
        assert_eq!(result.values(), &[5000.0]);
    }

    #[test]
    fn test_parse_input_dataset_requires_rows() {
        assert!(matches!(
            parse_input_dataset(""),
            Err(TransformError::MalformedInput { row: None, .. })
        ));
    }

    #[test]
    fn test_parse_input_dataset_rejects_missing_value() {
        assert!(parse_input_dataset("Q1'14").is_err());
    }
}
