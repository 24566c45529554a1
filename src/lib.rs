pub mod analyzers;
pub mod config;
pub mod delivery;
pub mod error;
pub mod infra;
pub mod ingest;
pub mod output;
pub mod pipeline;
pub mod services;
