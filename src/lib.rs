pub mod cache;
pub mod config;
pub mod fuzzy;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod source;
pub mod worker;
