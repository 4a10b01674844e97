pub mod api;
pub mod config;
pub mod db;
pub mod enrich;
pub mod error;
pub mod fetch;
pub mod ingest;
pub mod models;
pub mod parser;
pub mod pipeline;
pub mod promote;
pub mod scheduler;
pub mod service;
pub mod stats;
pub mod tasks;
pub mod walker;
