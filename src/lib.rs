//! Crawlwire: client-side job handles for a remote crawl server
//!
//! A job describes one crawl, submits it to the server over gRPC, and streams
//! the fetched pages back to the caller through either a callback or a bounded
//! channel. Running jobs accept extra pages and scripts, can be cancelled, and
//! can relay the server's analyzed-URL notifications.
//!
//! # Example
//!
//! ```no_run
//! use crawlwire::{page_channel, CrawlJob};
//!
//! # async fn example() -> Result<(), crawlwire::JobError> {
//! let mut job = CrawlJob::new("127.0.0.1", 10000);
//! job.config_mut()?.seed_url = "https://example.com".to_string();
//!
//! let (tx, mut pages) = page_channel();
//! job.set_page_channel(tx);
//! job.start().await?;
//!
//! while let Some(page) = pages.recv().await {
//!     println!("{} ({} bytes)", page.url, page.content.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod job;
pub mod rpc;
pub mod state;

use thiserror::Error;

/// Main error type for job operations
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to establish a session with {addr}: {message}")]
    Connection { addr: String, message: String },

    #[error("{operation} can't be called when the crawl job is not running")]
    NotRunning { operation: &'static str },

    #[error("Result stream failed: {0}")]
    Stream(String),

    #[error("Result dispatch failed: {0}")]
    Dispatch(String),

    #[error("{operation} requires an established job subscription")]
    NoSubscription { operation: &'static str },

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::StreamPhase,
        to: state::StreamPhase,
    },

    #[error("Job configuration is read-only once the job has started")]
    AlreadyStarted,

    #[error("Injection stream was closed by the server")]
    InjectionClosed,

    #[error("RPC error: {0}")]
    Rpc(#[from] rpc::RpcError),
}

impl JobError {
    /// Returns true for failures that leave the job untouched and may be ignored
    pub fn is_soft(&self) -> bool {
        matches!(self, Self::NoSubscription { .. })
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read job file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid result sink: {0}")]
    Sink(String),
}

/// Result type alias for job operations
pub type Result<T> = std::result::Result<T, JobError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::{Config, JobConfig};
pub use job::{analyzed_url_channel, page_channel, CrawlJob, JobHandle, JobSummary, WaitGroup};
pub use rpc::{PageHtml, PageReqType, UrlList};
pub use state::{JobState, StreamPhase};
