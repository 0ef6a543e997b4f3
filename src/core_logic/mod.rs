pub mod correlation;
pub mod data_processing;
pub mod data_trends;
pub mod date_parsing;
pub mod index;
pub mod time_series;
