#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use rayon::ThreadPoolBuilder;
use series_correlation_engine::api::routes::{routes, AppState};
use series_correlation_engine::config::ServiceConfig;
use series_correlation_engine::core_logic::date_parsing::DateParser;
use series_correlation_engine::store::queries::fetch_datasets::load_catalog;
use std::error::Error;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServiceConfig::from_env()?;
    info!(?config, "starting set up");

    let pool = ThreadPoolBuilder::new()
        .stack_size(config.worker_stack_size)
        .build()?;

    let now = Instant::now();
    let date_parser = DateParser::new(config.max_year);
    let catalog = load_catalog(&config.data_dir, &date_parser)?;
    info!(
        datasets = catalog.series.len(),
        elapsed_ms = now.elapsed().as_millis() as u64,
        "finished fetching data"
    );

    let state = AppState {
        catalog: Arc::new(catalog),
        pool: Arc::new(pool),
        max_results: config.max_results,
        date_parser,
    };

    let addr = config.socket_addr();
    info!(%addr, "starting web server");
    warp::serve(routes(state)).run(addr).await;
    Ok(())
}
