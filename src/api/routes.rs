use crate::api::lib::fiscal_month_from_str;
use crate::api::models::{
    AggregationPeriod, CorrelateDataPoint, CorrelateIndexBody, CorrelateInputBody,
    CorrelateRequestParameters, CorrelationData, CorrelationMetric, ErrorBody, TrendRequestBody,
};
use crate::core_logic::correlation::{calculate_correlation, enrich_with_metadata};
use crate::core_logic::data_processing::transform_data;
use crate::core_logic::data_trends::{analyze_trends, TrendOptions};
use crate::core_logic::date_parsing::DateParser;
use crate::core_logic::index::correlate_indexes;
use crate::core_logic::time_series::{RawPoint, TimeSeries};
use crate::error::TransformError;
use crate::store::{SeriesCatalog, SeriesStore};
use chrono::{Month, NaiveDate};
use rayon::ThreadPool;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};
use warp::http::StatusCode;
use warp::{reject, Filter, Rejection, Reply};

const MAX_BODY_BYTES: u64 = 16 * 1024 * 1024;

/// Everything the handlers share. Cloned into each request.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<SeriesCatalog>,
    pub pool: Arc<ThreadPool>,
    pub max_results: usize,
    pub date_parser: DateParser,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error("worker failed: {0}")]
    Worker(String),
}

impl reject::Reject for ApiError {}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Transform(_) => StatusCode::BAD_REQUEST,
            ApiError::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn rejection(err: impl Into<ApiError>) -> Rejection {
    reject::custom(err.into())
}

/// Query parameters after string parsing.
#[derive(Debug, Clone, Copy)]
struct CorrelationRequest {
    time_increment: AggregationPeriod,
    fiscal_year_end: Option<Month>,
    correlation_metric: CorrelationMetric,
    target_metric: CorrelationMetric,
    lag_periods: usize,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
}

impl TryFrom<&CorrelateRequestParameters> for CorrelationRequest {
    type Error = TransformError;

    fn try_from(params: &CorrelateRequestParameters) -> Result<Self, Self::Error> {
        let correlation_metric: CorrelationMetric = params.correlation_metric.parse()?;
        let target_metric = match &params.target_correlation_metric {
            Some(metric) => metric.parse()?,
            None => correlation_metric,
        };
        let fiscal_year_end = params
            .fiscal_year_end
            .as_deref()
            .map(fiscal_month_from_str)
            .transpose()?;

        let year_bound = |year: Option<i32>, month: u32, day: u32| {
            year.map(|year| {
                NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
                    TransformError::malformed(None, format!("year out of range: {year}"))
                })
            })
            .transpose()
        };

        Ok(CorrelationRequest {
            time_increment: params.aggregation_period.parse()?,
            fiscal_year_end,
            correlation_metric,
            target_metric,
            lag_periods: params.lag_periods,
            start: year_bound(params.start_year, 1, 1)?,
            end: year_bound(params.end_year, 12, 31)?,
        })
    }
}

impl CorrelationRequest {
    fn response(&self, data: Vec<CorrelateDataPoint>) -> CorrelationData {
        CorrelationData {
            data,
            aggregation_period: self.time_increment.to_string(),
            correlation_metric: self.correlation_metric.to_string(),
            fiscal_year_end: self
                .fiscal_year_end
                .map(|month| month.number_from_month().to_string())
                .unwrap_or_default(),
        }
    }
}

/// Runs CPU-bound work on the rayon pool without blocking the async executor.
async fn run_blocking<T, F>(pool: Arc<ThreadPool>, work: F) -> Result<T, Rejection>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, TransformError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || pool.install(work))
        .await
        .map_err(|err| rejection(ApiError::Worker(err.to_string())))?
        .map_err(rejection)
}

fn coerce_target(
    parser: &DateParser,
    points: &[RawPoint],
    request: &CorrelationRequest,
) -> Result<TimeSeries, TransformError> {
    Ok(parser.coerce_series(points)?.between(request.start, request.end))
}

async fn correlate_input(
    params: CorrelateRequestParameters,
    body: CorrelateInputBody,
    state: AppState,
) -> Result<impl Reply, Rejection> {
    let request = CorrelationRequest::try_from(&params).map_err(rejection)?;
    info!(
        points = body.manual_input_dataset.len(),
        selected = body.selected_datasets.len(),
        period = %request.time_increment,
        "correlate input"
    );

    let pool = Arc::clone(&state.pool);
    let correlations = run_blocking(pool, move || {
        let target = coerce_target(&state.date_parser, &body.manual_input_dataset, &request)?;

        let identifiers = if body.selected_datasets.is_empty() {
            state.catalog.identifiers()
        } else {
            body.selected_datasets
        };
        let candidates: HashMap<String, TimeSeries> = state
            .catalog
            .fetch_series(&identifiers)
            .into_iter()
            .map(|(name, series)| (name, series.between(request.start, request.end)))
            .collect();

        let mut correlations = calculate_correlation(
            &target,
            &candidates,
            request.time_increment,
            request.fiscal_year_end,
            request.target_metric,
            request.correlation_metric,
            request.lag_periods,
        )?;
        correlations.truncate(state.max_results);
        enrich_with_metadata(&mut correlations, state.catalog.as_ref());
        Ok(correlations)
    })
    .await?;

    Ok(warp::reply::json(&request.response(correlations)))
}

async fn correlate_index(
    params: CorrelateRequestParameters,
    body: CorrelateIndexBody,
    state: AppState,
) -> Result<impl Reply, Rejection> {
    let request = CorrelationRequest::try_from(&params).map_err(rejection)?;
    info!(indexes = body.indexes.len(), "correlate indexes");

    let pool = Arc::clone(&state.pool);
    let correlations = run_blocking(pool, move || {
        let target = coerce_target(&state.date_parser, &body.manual_input_dataset, &request)?;
        let mut correlations = correlate_indexes(
            &target,
            state.catalog.as_ref(),
            &body.indexes,
            request.time_increment,
            request.fiscal_year_end,
            request.correlation_metric,
            request.lag_periods,
        )?;
        correlations.truncate(state.max_results);
        Ok(correlations)
    })
    .await?;

    Ok(warp::reply::json(&request.response(correlations)))
}

async fn trends(body: TrendRequestBody, state: AppState) -> Result<impl Reply, Rejection> {
    let defaults = TrendOptions::default();
    let options = TrendOptions {
        windows: body.windows.unwrap_or(defaults.windows),
        stack_years: body.stack_years.unwrap_or(defaults.stack_years),
        seasonality_years: body.seasonality_years,
    };

    let pool = Arc::clone(&state.pool);
    let table = run_blocking(pool, move || {
        let series = state.date_parser.coerce_series(&body.dataset)?;
        let monthly = transform_data(
            &series,
            AggregationPeriod::Monthly,
            None,
            CorrelationMetric::RawValue,
            None,
        )?;
        Ok(analyze_trends(&monthly, &options))
    })
    .await?;

    Ok(warp::reply::json(&table))
}

fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn json_body<T: serde::de::DeserializeOwned + Send>(
) -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

pub fn routes(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let correlate_input_route = warp::path("correlate_input")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::query::<CorrelateRequestParameters>())
        .and(json_body::<CorrelateInputBody>())
        .and(with_state(state.clone()))
        .and_then(correlate_input);

    let correlate_index_route = warp::path("correlate_index")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::query::<CorrelateRequestParameters>())
        .and(json_body::<CorrelateIndexBody>())
        .and(with_state(state.clone()))
        .and_then(correlate_index);

    let trends_route = warp::path("trends")
        .and(warp::path::end())
        .and(warp::post())
        .and(json_body::<TrendRequestBody>())
        .and(with_state(state))
        .and_then(trends);

    correlate_input_route
        .or(correlate_index_route)
        .or(trends_route)
        .recover(handle_rejection)
}

async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if let Some(api_error) = err.find::<ApiError>() {
        (api_error.status(), api_error.to_string())
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "not found".to_string())
    } else if let Some(body_error) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, body_error.to_string())
    } else if let Some(query_error) = err.find::<reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, query_error.to_string())
    } else if err.find::<reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "payload too large".to_string())
    } else if err.find::<reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "method not allowed".to_string())
    } else {
        error!(rejection = ?err, "unhandled rejection");
        (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_string())
    };

    if status.is_server_error() {
        error!(%status, error = %message, "request failed");
    }

    Ok(warp::reply::with_status(
        warp::reply::json(&ErrorBody { error: message }),
        status,
    ))
}
