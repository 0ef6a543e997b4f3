use serde::{Deserialize, Serialize};

/// Descriptive record for one stored dataset. Only used to decorate results.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct DatasetMetadata {
    pub id: i64,
    pub internal_name: String,
    pub external_name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub source: Option<String>,
    pub sub_source: Option<String>,
    pub units: Option<String>,
    pub units_short: Option<String>,
    pub release: Option<String>,
    pub url: Option<String>,
    #[serde(default)]
    pub hidden: bool,
}

impl DatasetMetadata {
    pub fn new(id: i64, internal_name: impl Into<String>) -> Self {
        DatasetMetadata {
            id,
            internal_name: internal_name.into(),
            external_name: None,
            description: None,
            category: None,
            source: None,
            sub_source: None,
            units: None,
            units_short: None,
            release: None,
            url: None,
            hidden: false,
        }
    }

    /// Name shown to users: the external name when present.
    pub fn display_name(&self) -> &str {
        self.external_name.as_deref().unwrap_or(&self.internal_name)
    }
}

/// One stored observation row, kept as text until coercion.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Dataset {
    pub metadata_id: i64,
    pub date: String,
    pub value: String,
}

impl Dataset {
    pub fn new(metadata_id: i64, date: impl Into<String>, value: impl Into<String>) -> Self {
        Dataset {
            metadata_id,
            date: date.into(),
            value: value.into(),
        }
    }
}
