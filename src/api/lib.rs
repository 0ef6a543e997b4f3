use crate::api::models::{AggregationPeriod, CorrelationMetric};
use crate::error::TransformError;
use chrono::Month;
use std::fmt;
use std::str::FromStr;

impl FromStr for CorrelationMetric {
    type Err = TransformError;

    fn from_str(metric: &str) -> Result<Self, Self::Err> {
        match metric {
            "RAW_VALUE" => Ok(CorrelationMetric::RawValue),
            "YOY_GROWTH" => Ok(CorrelationMetric::YoyGrowth),
            other => Err(TransformError::InvalidCorrelationMetric(other.to_string())),
        }
    }
}

impl fmt::Display for CorrelationMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorrelationMetric::RawValue => write!(f, "RAW_VALUE"),
            CorrelationMetric::YoyGrowth => write!(f, "YOY_GROWTH"),
        }
    }
}

impl FromStr for AggregationPeriod {
    type Err = TransformError;

    fn from_str(period: &str) -> Result<Self, Self::Err> {
        match period {
            "Monthly" => Ok(AggregationPeriod::Monthly),
            "Quarterly" => Ok(AggregationPeriod::Quarterly),
            "Annually" => Ok(AggregationPeriod::Annually),
            other => Err(TransformError::InvalidAggregationPeriod(other.to_string())),
        }
    }
}

impl fmt::Display for AggregationPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregationPeriod::Monthly => write!(f, "Monthly"),
            AggregationPeriod::Quarterly => write!(f, "Quarterly"),
            AggregationPeriod::Annually => write!(f, "Annually"),
        }
    }
}

pub fn correlation_metric_from_str(metric: &str) -> Result<CorrelationMetric, TransformError> {
    metric.parse()
}

pub fn month_from_number(month: u32) -> Result<Month, TransformError> {
    u8::try_from(month)
        .ok()
        .and_then(|number| Month::try_from(number).ok())
        .ok_or_else(|| TransformError::InvalidMonth(month.to_string()))
}

/// Accepts a month number (`12`) or an English name (`December`, `dec`).
pub fn fiscal_month_from_str(month: &str) -> Result<Month, TransformError> {
    let month = month.trim();
    match month.parse::<u32>() {
        Ok(number) => month_from_number(number),
        Err(_) => month
            .parse::<Month>()
            .map_err(|_| TransformError::InvalidMonth(month.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_correlation_metric_from_str() {
        assert_eq!(
            correlation_metric_from_str("RAW_VALUE"),
            Ok(CorrelationMetric::RawValue)
        );
        assert_eq!(
            correlation_metric_from_str("YOY_GROWTH"),
            Ok(CorrelationMetric::YoyGrowth)
        );
        assert_eq!(
            correlation_metric_from_str("MOM"),
            Err(TransformError::InvalidCorrelationMetric("MOM".to_string()))
        );
    }

    #[test]
    fn test_aggregation_period_round_trip() {
        for period in [
            AggregationPeriod::Monthly,
            AggregationPeriod::Quarterly,
            AggregationPeriod::Annually,
        ] {
            assert_eq!(period.to_string().parse::<AggregationPeriod>(), Ok(period));
        }
        assert_eq!(
            "Weekly".parse::<AggregationPeriod>(),
            Err(TransformError::InvalidAggregationPeriod("Weekly".to_string()))
        );
    }

    #[rstest]
    #[case("12", Month::December)]
    #[case("1", Month::January)]
    #[case("December", Month::December)]
    #[case("mar", Month::March)]
    fn test_fiscal_month_from_str(#[case] input: &str, #[case] expected: Month) {
        assert_eq!(fiscal_month_from_str(input), Ok(expected));
    }

    #[test]
    fn test_month_from_number() {
        assert_eq!(month_from_number(1), Ok(Month::January));
        assert_eq!(month_from_number(12), Ok(Month::December));
        assert_eq!(
            month_from_number(268),
            Err(TransformError::InvalidMonth("268".to_string()))
        );
    }

    #[rstest]
    #[case("0")]
    #[case("13")]
    #[case("268")]
    #[case("Smarch")]
    fn test_fiscal_month_from_str_rejects(#[case] input: &str) {
        assert!(matches!(
            fiscal_month_from_str(input),
            Err(TransformError::InvalidMonth(_))
        ));
    }
}
