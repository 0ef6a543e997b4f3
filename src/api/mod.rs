pub mod lib;
pub mod models;
pub mod routes;
