//! In-process crawl server
//!
//! `LocalServer` implements [`Connector`] and [`CrawlService`] without a
//! network. Every submitted job becomes a [`LocalSession`] that the owner
//! drives by hand: pushing pages, failing the stream, or ending it. It backs the
//! integration tests and can stand in for a real server when embedding.

use crate::config::{ClientOptions, ServerAddr};
use crate::rpc::traits::{Connector, CrawlService, PageStream, RpcError, RpcResult, UrlListStream};
use crate::rpc::{DomainOpt, PageHtml, PageRequest, Subscription, UrlList};
use async_trait::async_trait;
use futures::{stream, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;

/// Capacity of the per-session page and batch feeds
const FEED_CAPACITY: usize = 16;

/// In-process crawl server
#[derive(Clone)]
pub struct LocalServer {
    shared: Arc<Shared>,
}

struct Shared {
    dials: AtomicUsize,
    injection_opens: AtomicUsize,
    refuse_dials: AtomicBool,
    stall_dials: AtomicBool,
    refuse_injection: AtomicBool,
    next_subcode: AtomicUsize,
    sessions_tx: mpsc::UnboundedSender<LocalSession>,
    sessions_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<LocalSession>>,
    feeds_tx: mpsc::UnboundedSender<AnalyzedFeed>,
    feeds_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<AnalyzedFeed>>,
    requests_tx: mpsc::UnboundedSender<PageRequest>,
    requests_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<PageRequest>>,
    cancelled: Mutex<Vec<Subscription>>,
    injection_streams: Mutex<Vec<InjectionStream>>,
}

/// Kill switch of one open injection stream
struct InjectionStream {
    kill: oneshot::Sender<()>,
    closed: oneshot::Receiver<()>,
}

/// Server side of one submitted job
pub struct LocalSession {
    /// The request the client submitted
    pub options: DomainOpt,
    /// Subscription handed to the client
    pub subscription: Subscription,
    pages: mpsc::Sender<RpcResult<PageHtml>>,
}

impl LocalSession {
    /// Pushes one page to the client, waiting while the feed is full
    ///
    /// Returns false once the client has stopped listening.
    pub async fn push(&self, page: PageHtml) -> bool {
        self.pages.send(Ok(page)).await.is_ok()
    }

    /// Ends the stream with an error
    pub async fn fail(self, error: RpcError) {
        let _ = self.pages.send(Err(error)).await;
    }

    /// Ends the stream cleanly
    pub fn finish(self) {
        drop(self.pages);
    }
}

/// Server side of one analyzed-URL stream
pub struct AnalyzedFeed {
    /// Subscription the client asked for
    pub subscription: Subscription,
    batches: mpsc::Sender<RpcResult<UrlList>>,
}

impl AnalyzedFeed {
    /// Pushes one batch, returning false once the client is gone
    pub async fn push(&self, batch: UrlList) -> bool {
        self.batches.send(Ok(batch)).await.is_ok()
    }

    /// Ends the stream cleanly
    pub fn finish(self) {
        drop(self.batches);
    }
}

impl LocalServer {
    pub fn new() -> Self {
        let (sessions_tx, sessions_rx) = mpsc::unbounded_channel();
        let (feeds_tx, feeds_rx) = mpsc::unbounded_channel();
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();

        Self {
            shared: Arc::new(Shared {
                dials: AtomicUsize::new(0),
                injection_opens: AtomicUsize::new(0),
                refuse_dials: AtomicBool::new(false),
                stall_dials: AtomicBool::new(false),
                refuse_injection: AtomicBool::new(false),
                next_subcode: AtomicUsize::new(1),
                sessions_tx,
                sessions_rx: tokio::sync::Mutex::new(sessions_rx),
                feeds_tx,
                feeds_rx: tokio::sync::Mutex::new(feeds_rx),
                requests_tx,
                requests_rx: tokio::sync::Mutex::new(requests_rx),
                cancelled: Mutex::new(Vec::new()),
                injection_streams: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Makes every later dial fail, as if the server were down
    pub fn refuse_dials(&self, refuse: bool) {
        self.shared.refuse_dials.store(refuse, Ordering::SeqCst);
    }

    /// Makes every later dial hang forever, as if the server never answered
    pub fn stall_dials(&self, stall: bool) {
        self.shared.stall_dials.store(stall, Ordering::SeqCst);
    }

    /// Makes every later attempt to open an injection stream fail
    pub fn refuse_injection(&self, refuse: bool) {
        self.shared.refuse_injection.store(refuse, Ordering::SeqCst);
    }

    /// Closes the server end of every open injection stream
    ///
    /// Returns once no stream accepts further requests.
    pub async fn close_injection_streams(&self) {
        let streams = match self.shared.injection_streams.lock() {
            Ok(mut streams) => std::mem::take(&mut *streams),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for stream in streams {
            let _ = stream.kill.send(());
            let _ = stream.closed.await;
        }
    }

    /// Number of dial attempts seen so far, refused ones included
    pub fn dial_count(&self) -> usize {
        self.shared.dials.load(Ordering::SeqCst)
    }

    /// Number of injection streams opened so far, refused ones excluded
    pub fn injection_stream_count(&self) -> usize {
        self.shared.injection_opens.load(Ordering::SeqCst)
    }

    /// Subscriptions for which a cancel was received
    pub fn cancelled(&self) -> Vec<Subscription> {
        match self.shared.cancelled.lock() {
            Ok(cancelled) => cancelled.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Waits for the next submitted job
    pub async fn next_session(&self) -> Option<LocalSession> {
        self.shared.sessions_rx.lock().await.recv().await
    }

    /// Waits for the next analyzed-URL stream request
    pub async fn next_analyzed_feed(&self) -> Option<AnalyzedFeed> {
        self.shared.feeds_rx.lock().await.recv().await
    }

    /// Waits for the next injected request
    pub async fn next_page_request(&self) -> Option<PageRequest> {
        self.shared.requests_rx.lock().await.recv().await
    }
}

impl Default for LocalServer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for LocalServer {
    async fn connect(
        &self,
        addr: &ServerAddr,
        _options: &ClientOptions,
    ) -> RpcResult<Arc<dyn CrawlService>> {
        self.shared.dials.fetch_add(1, Ordering::SeqCst);
        if self.shared.stall_dials.load(Ordering::SeqCst) {
            futures::future::pending::<()>().await;
        }
        if self.shared.refuse_dials.load(Ordering::SeqCst) {
            return Err(RpcError::Transport(format!("connection refused: {}", addr)));
        }
        Ok(Arc::new(self.clone()))
    }
}

#[async_trait]
impl CrawlService for LocalServer {
    async fn add_domain_and_listen(&self, opts: DomainOpt) -> RpcResult<PageStream> {
        let code = self.shared.next_subcode.fetch_add(1, Ordering::SeqCst);
        let subscription = Subscription {
            subcode: format!("local-{}", code),
            seqnum: 0,
            datetime: None,
        };

        let (pages, rx) = mpsc::channel(FEED_CAPACITY);
        let session = LocalSession {
            options: opts,
            subscription: subscription.clone(),
            pages,
        };
        self.shared
            .sessions_tx
            .send(session)
            .map_err(|_| RpcError::Closed)?;

        let confirmation = PageHtml {
            sub: Some(subscription),
            ..Default::default()
        };
        Ok(stream::once(async move { Ok(confirmation) })
            .chain(ReceiverStream::new(rx))
            .boxed())
    }

    async fn open_page_requests(&self) -> RpcResult<mpsc::Sender<PageRequest>> {
        if self.shared.refuse_injection.load(Ordering::SeqCst) {
            return Err(RpcError::Status {
                code: tonic::Code::Unavailable,
                message: "injection stream refused".to_string(),
            });
        }
        self.shared.injection_opens.fetch_add(1, Ordering::SeqCst);

        let (tx, mut rx) = mpsc::channel::<PageRequest>(FEED_CAPACITY);
        let (kill_tx, mut kill_rx) = oneshot::channel();
        let (closed_tx, closed_rx) = oneshot::channel();
        let requests_tx = self.shared.requests_tx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = &mut kill_rx => break,
                    request = rx.recv() => match request {
                        Some(request) => {
                            if requests_tx.send(request).is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
            drop(rx);
            let _ = closed_tx.send(());
        });

        let stream = InjectionStream {
            kill: kill_tx,
            closed: closed_rx,
        };
        match self.shared.injection_streams.lock() {
            Ok(mut streams) => streams.push(stream),
            Err(poisoned) => poisoned.into_inner().push(stream),
        }
        Ok(tx)
    }

    async fn cancel_job(&self, sub: Subscription) -> RpcResult<()> {
        match self.shared.cancelled.lock() {
            Ok(mut cancelled) => cancelled.push(sub),
            Err(poisoned) => poisoned.into_inner().push(sub),
        }
        Ok(())
    }

    async fn get_analyzed_urls(&self, sub: Subscription) -> RpcResult<UrlListStream> {
        let (batches, rx) = mpsc::channel(FEED_CAPACITY);
        self.shared
            .feeds_tx
            .send(AnalyzedFeed {
                subscription: sub,
                batches,
            })
            .map_err(|_| RpcError::Closed)?;
        Ok(ReceiverStream::new(rx).boxed())
    }
}
