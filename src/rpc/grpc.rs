//! gRPC transport built on tonic

use crate::config::{ClientOptions, ServerAddr};
use crate::rpc::traits::{Connector, CrawlService, PageStream, RpcError, RpcResult, UrlListStream};
use crate::rpc::{Ack, DomainOpt, PageHtml, PageRequest, Subscription, UrlList};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::codec::{ProstCodec, Streaming};
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};

const ADD_DOMAIN_AND_LISTEN: &str = "/protofiles.IdeaCrawler/AddDomainAndListen";
const ADD_PAGES: &str = "/protofiles.IdeaCrawler/AddPages";
const CANCEL_JOB: &str = "/protofiles.IdeaCrawler/CancelJob";
const GET_ANALYZED_URLS: &str = "/protofiles.IdeaCrawler/GetAnalyzedURLs";

/// Requests buffered on the injection stream before `send` waits
const INJECTION_BUFFER: usize = 64;

/// Low-level client for the crawl service
#[derive(Debug, Clone)]
pub struct CrawlerClient {
    inner: tonic::client::Grpc<Channel>,
}

impl CrawlerClient {
    /// Wraps an established channel
    pub fn new(channel: Channel, options: &ClientOptions) -> Self {
        let inner = tonic::client::Grpc::new(channel)
            .max_decoding_message_size(options.max_message_size);
        Self { inner }
    }

    async fn ready(&mut self) -> Result<(), tonic::Status> {
        self.inner
            .ready()
            .await
            .map_err(|e| tonic::Status::unknown(format!("Service was not ready: {}", e)))
    }

    pub async fn add_domain_and_listen(
        &mut self,
        request: DomainOpt,
    ) -> Result<tonic::Response<Streaming<PageHtml>>, tonic::Status> {
        self.ready().await?;
        let codec: ProstCodec<DomainOpt, PageHtml> = ProstCodec::default();
        let path = PathAndQuery::from_static(ADD_DOMAIN_AND_LISTEN);
        self.inner
            .server_streaming(tonic::Request::new(request), path, codec)
            .await
    }

    pub async fn add_pages(
        &mut self,
        requests: ReceiverStream<PageRequest>,
    ) -> Result<tonic::Response<Streaming<Ack>>, tonic::Status> {
        self.ready().await?;
        let codec: ProstCodec<PageRequest, Ack> = ProstCodec::default();
        let path = PathAndQuery::from_static(ADD_PAGES);
        self.inner
            .streaming(tonic::Request::new(requests), path, codec)
            .await
    }

    pub async fn cancel_job(
        &mut self,
        request: Subscription,
    ) -> Result<tonic::Response<Ack>, tonic::Status> {
        self.ready().await?;
        let codec: ProstCodec<Subscription, Ack> = ProstCodec::default();
        let path = PathAndQuery::from_static(CANCEL_JOB);
        self.inner
            .unary(tonic::Request::new(request), path, codec)
            .await
    }

    pub async fn get_analyzed_urls(
        &mut self,
        request: Subscription,
    ) -> Result<tonic::Response<Streaming<UrlList>>, tonic::Status> {
        self.ready().await?;
        let codec: ProstCodec<Subscription, UrlList> = ProstCodec::default();
        let path = PathAndQuery::from_static(GET_ANALYZED_URLS);
        self.inner
            .server_streaming(tonic::Request::new(request), path, codec)
            .await
    }
}

/// [`CrawlService`] over a tonic channel
#[derive(Debug, Clone)]
pub struct GrpcCrawlService {
    client: CrawlerClient,
}

impl GrpcCrawlService {
    pub fn new(client: CrawlerClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CrawlService for GrpcCrawlService {
    async fn add_domain_and_listen(&self, opts: DomainOpt) -> RpcResult<PageStream> {
        let mut client = self.client.clone();
        let response = client.add_domain_and_listen(opts).await?;
        Ok(response
            .into_inner()
            .map(|page| page.map_err(RpcError::from))
            .boxed())
    }

    async fn open_page_requests(&self) -> RpcResult<mpsc::Sender<PageRequest>> {
        let mut client = self.client.clone();
        // Surface an unreachable server now rather than on the first send
        client.ready().await?;

        let (tx, rx) = mpsc::channel(INJECTION_BUFFER);
        tokio::spawn(async move {
            let mut acks = match client.add_pages(ReceiverStream::new(rx)).await {
                Ok(response) => response.into_inner(),
                Err(status) => {
                    tracing::warn!("AddPages stream failed to open: {}", status);
                    return;
                }
            };

            while let Some(ack) = acks.next().await {
                match ack {
                    Ok(ack) if !ack.success => {
                        tracing::warn!("Server rejected injected request: {}", ack.error);
                    }
                    Ok(_) => {}
                    Err(status) => {
                        tracing::warn!("AddPages stream ended with error: {}", status);
                        break;
                    }
                }
            }
            tracing::debug!("AddPages stream closed");
        });

        Ok(tx)
    }

    async fn cancel_job(&self, sub: Subscription) -> RpcResult<()> {
        let mut client = self.client.clone();
        let ack = client.cancel_job(sub).await?.into_inner();
        if !ack.success && !ack.error.is_empty() {
            tracing::warn!("Server reported cancel failure: {}", ack.error);
        }
        Ok(())
    }

    async fn get_analyzed_urls(&self, sub: Subscription) -> RpcResult<UrlListStream> {
        let mut client = self.client.clone();
        let response = client.get_analyzed_urls(sub).await?;
        Ok(response
            .into_inner()
            .map(|batch| batch.map_err(RpcError::from))
            .boxed())
    }
}

/// Dials crawl servers over plaintext HTTP/2
#[derive(Debug, Clone, Default)]
pub struct GrpcConnector;

#[async_trait]
impl Connector for GrpcConnector {
    async fn connect(
        &self,
        addr: &ServerAddr,
        options: &ClientOptions,
    ) -> RpcResult<Arc<dyn CrawlService>> {
        let channel = Endpoint::from_shared(addr.endpoint())?.connect().await?;
        tracing::debug!("Connected to crawl server at {}", addr);
        Ok(Arc::new(GrpcCrawlService::new(CrawlerClient::new(
            channel, options,
        ))))
    }
}
