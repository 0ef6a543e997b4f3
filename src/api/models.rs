use crate::core_logic::time_series::RawPoint;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct CorrelateDataPoint {
    pub title: String,
    pub internal_name: Option<String>,
    pub pearson_value: f64,
    pub p_value: f64,
    pub lag: usize,
    pub input_data: Vec<f64>,
    pub dataset_data: Vec<f64>,
    pub dates: Vec<String>,
    pub source: Option<String>,
    pub description: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct CorrelationData {
    pub data: Vec<CorrelateDataPoint>,
    pub aggregation_period: String,
    pub correlation_metric: String,
    pub fiscal_year_end: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CorrelationMetric {
    RawValue,
    YoyGrowth,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationPeriod {
    Monthly,
    Quarterly,
    Annually,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CorrelateRequestParameters {
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
    pub aggregation_period: String,
    #[serde(default)]
    pub lag_periods: usize,
    pub correlation_metric: String,
    /// Metric for the input series when it differs from the candidates'.
    pub target_correlation_metric: Option<String>,
    /// Month number (1-12) or month name.
    pub fiscal_year_end: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CorrelateInputBody {
    pub manual_input_dataset: Vec<RawPoint>,
    #[serde(default)]
    pub selected_datasets: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct IndexDefinition {
    pub name: String,
    pub weights: HashMap<String, f64>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CorrelateIndexBody {
    pub manual_input_dataset: Vec<RawPoint>,
    pub indexes: Vec<IndexDefinition>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TrendRequestBody {
    pub dataset: Vec<RawPoint>,
    pub windows: Option<Vec<usize>>,
    pub stack_years: Option<usize>,
    pub seasonality_years: Option<usize>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ErrorBody {
    pub error: String,
}
