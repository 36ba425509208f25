//! Hotel booking cancellation scoring service.

pub mod config;
pub mod encoder;
pub mod error;
pub mod features;
pub mod model;
pub mod routes;
pub mod static_files;
pub mod types;
