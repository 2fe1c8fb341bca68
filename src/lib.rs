//! Contribuinte API Library
//!
//! Record management for taxpayer/client ("contribuinte") records stored in
//! one of several independent PostgreSQL databases, picked per request by
//! the `module` query parameter.
//!
//! # Modules
//!
//! - `api`: Router construction, middleware and docs endpoints.
//! - `core`: Domain-layer namespace (repository, importer, models, errors).
//! - `bulk_import`: Semicolon-delimited file ingestion with per-row errors.
//! - `config`: Configuration management.
//! - `db`: Pool construction and schema bootstrap.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers.
//! - `models`: Record, payload and response models.
//! - `module_router`: Module tag parsing and database selection.
//! - `repository`: CRUD against one module database.
//! - `validation`: Date, email and length rules.

pub mod api;
pub mod core;

// Re-export primary modules for shared use in tests and other binaries
pub mod bulk_import;
pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod module_router;
pub mod repository;
pub mod validation;
