pub mod fetch_datasets;
