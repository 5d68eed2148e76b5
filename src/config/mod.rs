//! Configuration module for crawl jobs
//!
//! This module holds the job description submitted to the server, the
//! client-side session options, and loading of TOML job files.
//!
//! # Example
//!
//! ```no_run
//! use crawlwire::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("job.toml")).unwrap();
//! println!("Crawl depth: {}", config.job.depth);
//! ```

mod parser;
mod request;
mod types;
mod validation;

// Re-export types
pub use types::{ChromeConfig, ClientOptions, Config, JobConfig, LoginConfig, ServerAddr};

// Re-export parser and validation functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::{apply_server_overrides, validate, validate_client_options, validate_job};
