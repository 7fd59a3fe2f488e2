// src/lib.rs

//! Git history ingestion into SQLite and co-change graph construction.

pub mod cli;
pub mod config;
pub mod error;
pub mod graph;
pub mod ingest;
pub mod log_parser;
pub mod model;
pub mod modules;
pub mod renames;
pub mod report;
pub mod store;
pub mod timespec;
pub mod users;

pub use error::{Error, Result};
