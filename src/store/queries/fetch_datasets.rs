use crate::core_logic::data_processing::create_series;
use crate::core_logic::date_parsing::DateParser;
use crate::error::StoreError;
use crate::store::models::{Dataset, DatasetMetadata};
use crate::store::SeriesCatalog;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::info;

/// `metadata_id,date,value` rows for every dataset.
pub const DATASETS_FILE: &str = "datasets.csv";
/// JSON array of [`DatasetMetadata`].
pub const METADATA_FILE: &str = "metadata.json";

pub fn fetch_datasets(dir: &Path) -> Result<Vec<Dataset>, StoreError> {
    let path = dir.join(DATASETS_FILE);
    let csv_error = |source| StoreError::Csv {
        file: path.display().to_string(),
        source,
    };

    let mut reader = csv::Reader::from_path(&path).map_err(csv_error)?;
    reader
        .deserialize()
        .collect::<Result<Vec<Dataset>, csv::Error>>()
        .map_err(csv_error)
}

pub fn fetch_dataset_metadata(dir: &Path) -> Result<Vec<DatasetMetadata>, StoreError> {
    let file = File::open(dir.join(METADATA_FILE))?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// Loads every dataset under `dir` and coerces it into a series.
pub fn load_catalog(dir: &Path, parser: &DateParser) -> Result<SeriesCatalog, StoreError> {
    let datasets = fetch_datasets(dir)?;
    let dataset_metadatas = fetch_dataset_metadata(dir)?;

    let series = create_series(&datasets, &dataset_metadatas, parser);
    info!(
        rows = datasets.len(),
        datasets = series.len(),
        dir = %dir.display(),
        "loaded series catalog"
    );

    let metadata = dataset_metadatas
        .into_iter()
        .map(|metadata| (metadata.internal_name.clone(), metadata))
        .collect();

    Ok(SeriesCatalog { series, metadata })
}
