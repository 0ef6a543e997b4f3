//! Seams to the collaborators that own raw observations and dataset metadata.
//!
//! The engine never fetches or caches on its own; callers hand it a store that
//! already holds materialized series.

pub mod models;
pub mod queries;

use crate::core_logic::time_series::TimeSeries;
use models::DatasetMetadata;
use std::collections::HashMap;

/// Resolves dataset identifiers to already-fetched series.
pub trait SeriesStore: Sync {
    /// Returns the series for every identifier that resolves; unknown identifiers are omitted.
    fn fetch_series(&self, identifiers: &[String]) -> HashMap<String, TimeSeries>;

    /// Identifiers offered when a caller does not select datasets explicitly.
    fn identifiers(&self) -> Vec<String>;
}

impl SeriesStore for HashMap<String, TimeSeries> {
    fn fetch_series(&self, identifiers: &[String]) -> HashMap<String, TimeSeries> {
        identifiers
            .iter()
            .filter_map(|id| self.get(id).map(|series| (id.clone(), series.clone())))
            .collect()
    }

    fn identifiers(&self) -> Vec<String> {
        let mut identifiers: Vec<String> = self.keys().cloned().collect();
        identifiers.sort();
        identifiers
    }
}

pub trait MetadataLookup {
    fn metadata(&self, internal_name: &str) -> Option<&DatasetMetadata>;
}

impl MetadataLookup for HashMap<String, DatasetMetadata> {
    fn metadata(&self, internal_name: &str) -> Option<&DatasetMetadata> {
        self.get(internal_name)
    }
}

/// Series and metadata loaded together, keyed by internal name.
#[derive(Debug, Clone, Default)]
pub struct SeriesCatalog {
    pub series: HashMap<String, TimeSeries>,
    pub metadata: HashMap<String, DatasetMetadata>,
}

impl SeriesStore for SeriesCatalog {
    fn fetch_series(&self, identifiers: &[String]) -> HashMap<String, TimeSeries> {
        self.series.fetch_series(identifiers)
    }

    /// Hidden datasets are only reachable when requested by name.
    fn identifiers(&self) -> Vec<String> {
        self.series
            .identifiers()
            .into_iter()
            .filter(|id| !self.metadata.get(id).is_some_and(|meta| meta.hidden))
            .collect()
    }
}

impl MetadataLookup for SeriesCatalog {
    fn metadata(&self, internal_name: &str) -> Option<&DatasetMetadata> {
        self.metadata.get(internal_name)
    }
}
