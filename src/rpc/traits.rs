//! Service traits and error types
//!
//! This module defines the trait interface that every transport to the crawl
//! server implements, together with its error type.

use crate::config::{ClientOptions, ServerAddr};
use crate::rpc::{DomainOpt, PageHtml, PageRequest, Subscription, UrlList};
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors that can occur while talking to the crawl server
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("RPC failed with {code:?}: {message}")]
    Status { code: tonic::Code, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Stream closed by peer")]
    Closed,
}

impl From<tonic::Status> for RpcError {
    fn from(status: tonic::Status) -> Self {
        RpcError::Status {
            code: status.code(),
            message: status.message().to_string(),
        }
    }
}

impl From<tonic::transport::Error> for RpcError {
    fn from(err: tonic::transport::Error) -> Self {
        RpcError::Transport(err.to_string())
    }
}

/// Result type for RPC operations
pub type RpcResult<T> = Result<T, RpcError>;

/// Server-push stream of fetched pages
pub type PageStream = BoxStream<'static, RpcResult<PageHtml>>;

/// Server-push stream of analyzed URL batches
pub type UrlListStream = BoxStream<'static, RpcResult<UrlList>>;

/// The four logical operations of the crawl service
///
/// Implementations must be cheap to share between the job's tasks.
#[async_trait]
pub trait CrawlService: Send + Sync {
    /// Submits a job and returns its result stream
    ///
    /// The first message of the stream carries the job's subscription.
    async fn add_domain_and_listen(&self, opts: DomainOpt) -> RpcResult<PageStream>;

    /// Opens the injection stream
    ///
    /// Requests written to the returned sender are forwarded to the server.
    /// The sender reports closed once the server side of the stream is gone.
    async fn open_page_requests(&self) -> RpcResult<mpsc::Sender<PageRequest>>;

    /// Asks the server to cancel the job identified by `sub`
    async fn cancel_job(&self, sub: Subscription) -> RpcResult<()>;

    /// Opens the analyzed-URL stream for the job identified by `sub`
    async fn get_analyzed_urls(&self, sub: Subscription) -> RpcResult<UrlListStream>;
}

/// Establishes sessions with a crawl server
#[async_trait]
pub trait Connector: Send + Sync {
    /// Dials `addr` and returns a service bound to the new connection
    async fn connect(
        &self,
        addr: &ServerAddr,
        options: &ClientOptions,
    ) -> RpcResult<Arc<dyn CrawlService>>;
}
