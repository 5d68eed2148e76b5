//! Crawl jobs
//!
//! A [`CrawlJob`] is configured, started once, and then lives until the
//! server closes its result stream. Everything that happens after start goes
//! through a cloneable [`JobHandle`].

mod forwarder;
mod relay;
mod session;
mod sink;
mod wait_group;

pub use session::{JobHandle, JobSummary};
pub use sink::{analyzed_url_channel, page_channel, PageCallback, CHANNEL_CAPACITY};
pub use wait_group::WaitGroup;

use crate::config::{
    validate_client_options, validate_job, ClientOptions, Config, JobConfig, ServerAddr,
};
use crate::rpc::{Connector, GrpcConnector, PageHtml, PageReqType, Subscription, UrlList};
use crate::state::{JobState, StreamPhase};
use crate::JobError;
use session::{Failure, StartGuard};
use sink::Sink;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// One crawl submitted to a crawl server
pub struct CrawlJob {
    config: JobConfig,
    options: ClientOptions,
    connector: Arc<dyn Connector>,
    callback: Mutex<Option<PageCallback>>,
    page_tx: Option<mpsc::Sender<PageHtml>>,
    wait_group: Option<WaitGroup>,
    handle: JobHandle,
}

impl CrawlJob {
    /// Creates a job for the server at `host:port` with default settings
    ///
    /// The seed URL has to be set through [`config_mut`](Self::config_mut)
    /// before the job can start.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self::with_parts(
            ServerAddr::new(host, port),
            ClientOptions::default(),
            JobConfig::default(),
        )
    }

    /// Creates a job from a loaded job file
    pub fn from_config(config: Config) -> Self {
        Self::with_parts(config.server, config.client, config.job)
    }

    fn with_parts(addr: ServerAddr, options: ClientOptions, config: JobConfig) -> Self {
        Self {
            config,
            options,
            connector: Arc::new(GrpcConnector),
            callback: Mutex::new(None),
            page_tx: None,
            wait_group: None,
            handle: JobHandle::new(addr),
        }
    }

    /// Replaces the transport used to reach the server
    pub fn with_connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Arc::new(connector);
        self
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    /// Mutable access to the job description, refused once the job has started
    pub fn config_mut(&mut self) -> Result<&mut JobConfig, JobError> {
        if self.handle.phase() != StreamPhase::NotStarted {
            return Err(JobError::AlreadyStarted);
        }
        Ok(&mut self.config)
    }

    pub fn client_options(&self) -> &ClientOptions {
        &self.options
    }

    /// Replaces the client-side session options, refused once the job has started
    pub fn set_client_options(&mut self, options: ClientOptions) -> Result<(), JobError> {
        if self.handle.phase() != StreamPhase::NotStarted {
            return Err(JobError::AlreadyStarted);
        }
        self.options = options;
        Ok(())
    }

    /// Delivers pages to `callback` instead of a channel
    pub fn set_callback<F>(&mut self, callback: F)
    where
        F: FnMut(PageHtml, &JobHandle) + Send + 'static,
    {
        *self.callback_slot() = Some(Box::new(callback));
    }

    fn callback_slot(&mut self) -> &mut Option<PageCallback> {
        match self.callback.get_mut() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Delivers pages into `tx` instead of a callback
    ///
    /// Dispatch waits while the channel is full.
    pub fn set_page_channel(&mut self, tx: mpsc::Sender<PageHtml>) {
        self.page_tx = Some(tx);
    }

    /// Signs the job off on `wait_group` once it terminates
    pub fn set_wait_group(&mut self, wait_group: WaitGroup) {
        self.wait_group = Some(wait_group);
    }

    /// Submits the job and starts forwarding its results
    ///
    /// Returns once the server has accepted the job. Delivery to the sink
    /// begins only after this returns `Ok`. A job starts at most once.
    pub async fn start(&mut self) -> Result<(), JobError> {
        let phase = self.handle.phase();
        if phase != StreamPhase::NotStarted {
            return Err(JobError::InvalidTransition {
                from: phase,
                to: StreamPhase::Connecting,
            });
        }

        validate_job(&self.config)?;
        validate_client_options(&self.options)?;
        let mut page_tx = self.page_tx.take();
        let taken = Sink::take_from(self.callback_slot(), &mut page_tx);
        self.page_tx = page_tx;
        let sink = taken?;

        let shared = self.handle.shared.clone();
        shared.transition(StreamPhase::Connecting)?;
        if let Some(wait_group) = &self.wait_group {
            shared.register(wait_group);
        }
        // Terminates the job if this future is dropped before the forwarder runs
        let guard = StartGuard::new(shared.clone());

        let addr = self.handle.server().clone();
        tracing::info!("Submitting crawl of {} to {}", self.config.seed_url, addr);

        let opened = session::open(
            self.connector.as_ref(),
            &addr,
            &self.options,
            self.config.to_domain_opt(),
        )
        .await;
        let (service, subscription, stream) = match opened {
            Ok(opened) => opened,
            Err(failure) => {
                let err = failure.to_error();
                tracing::error!("Crawl server is possibly down: {}", err);
                guard.fail(failure);
                return Err(err);
            }
        };

        tracing::info!("Job accepted with subscription {}", subscription.subcode);
        if let Err(e) = shared.establish(service, subscription) {
            guard.fail(Failure::Stream(e.to_string()));
            return Err(e);
        }

        let pending = forwarder::spawn(
            self.handle.clone(),
            stream,
            sink,
            self.options.buffer_capacity,
        );
        guard.disarm();
        pending.ready().await.release();
        Ok(())
    }

    /// Handle that outlives borrows of the job and can move into other tasks
    pub fn handle(&self) -> JobHandle {
        self.handle.clone()
    }

    pub fn phase(&self) -> StreamPhase {
        self.handle.phase()
    }

    pub fn state(&self) -> JobState {
        self.handle.state()
    }

    pub fn is_alive(&self) -> bool {
        self.handle.is_alive()
    }

    pub fn subscription(&self) -> Option<Subscription> {
        self.handle.subscription()
    }

    pub async fn add_page(
        &self,
        url: impl Into<String>,
        meta_str: impl Into<String>,
    ) -> Result<(), JobError> {
        self.handle.add_page(url, meta_str).await
    }

    pub async fn add_js(
        &self,
        kind: PageReqType,
        url: impl Into<String>,
        js: impl Into<String>,
        meta_str: impl Into<String>,
    ) -> Result<(), JobError> {
        self.handle.add_js(kind, url, js, meta_str).await
    }

    pub async fn stop(&self) -> Result<(), JobError> {
        self.handle.stop().await
    }

    pub async fn fetch_analyzed_urls(&self, tx: mpsc::Sender<UrlList>) -> Result<(), JobError> {
        self.handle.fetch_analyzed_urls(tx).await
    }

    pub async fn relay_analyzed_urls(&self, tx: mpsc::Sender<UrlList>) {
        self.handle.relay_analyzed_urls(tx).await
    }

    pub async fn wait(&self) -> Result<JobSummary, JobError> {
        self.handle.wait().await
    }
}

impl std::fmt::Debug for CrawlJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrawlJob")
            .field("seed_url", &self.config.seed_url)
            .field("handle", &self.handle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConfigError;

    #[test]
    fn test_new_job_defaults() {
        let job = CrawlJob::new("localhost", 10000);
        assert_eq!(job.state(), JobState::Configured);
        assert_eq!(job.client_options().buffer_capacity, 1000);
        assert_eq!(job.handle().server().to_string(), "localhost:10000");
        assert!(job.subscription().is_none());
    }

    #[test]
    fn test_job_is_shareable_with_non_sync_callback() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CrawlJob>();

        let seen = std::cell::Cell::new(0u32);
        let mut job = CrawlJob::new("localhost", 10000);
        job.set_callback(move |_, _| seen.set(seen.get() + 1));
        assert!(job.callback_slot().is_some());
    }

    #[tokio::test]
    async fn test_invalid_config_fails_before_dialing() {
        let mut job = CrawlJob::new("localhost", 10000);
        let (tx, _rx) = page_channel();
        job.set_page_channel(tx);

        let err = job.start().await.unwrap_err();
        assert!(matches!(err, JobError::Config(ConfigError::InvalidUrl(_))));
        assert_eq!(job.phase(), StreamPhase::NotStarted);

        // Still configurable after a rejected start
        job.config_mut().unwrap().seed_url = "https://example.com".to_string();
    }
}
