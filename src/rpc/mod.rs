//! RPC layer for talking to the crawl server
//!
//! This module contains:
//! - The wire messages exchanged with the server
//! - The `CrawlService` and `Connector` traits the job engine is written against
//! - A tonic-based gRPC transport
//! - An in-process server for embedding and tests

mod grpc;
mod local;
mod messages;
mod traits;

pub use grpc::{CrawlerClient, GrpcConnector, GrpcCrawlService};
pub use local::{AnalyzedFeed, LocalServer, LocalSession};
pub use messages::{
    Ack, DomainOpt, KeyValue, PageHtml, PageReqType, PageRequest, Subscription, UrlList,
};
pub use traits::{Connector, CrawlService, PageStream, RpcError, RpcResult, UrlListStream};
