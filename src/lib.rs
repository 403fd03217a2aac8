// Library interface for the binary and the integration tests

pub mod app;
pub mod capture;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod models;
pub mod monitor;
pub mod notify;
pub mod probe;
pub mod queries;
pub mod realtime;
pub mod registry;
pub mod schema;
pub mod serve;
pub mod storage;
pub mod store;
pub mod subscription;

// Re-export the expected database version for convenience
pub use constants::EXPECTED_DB_VERSION;
