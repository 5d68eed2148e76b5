//! Session with the crawl server and the shareable job handle
//!
//! The handle is what callbacks receive and what callers clone into other
//! tasks. It exposes the operations that only make sense once the server has
//! accepted the job: injecting pages, cancelling, and asking for the
//! analyzed-URL feed.

use crate::config::{ClientOptions, ServerAddr};
use crate::job::relay;
use crate::job::wait_group::WaitGroup;
use crate::rpc::{
    Connector, CrawlService, DomainOpt, PageReqType, PageRequest, PageStream, Subscription,
    UrlList,
};
use crate::state::{JobState, StreamPhase};
use crate::JobError;
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::{mpsc, watch, Mutex};

/// Counters reported once a job has terminated
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobSummary {
    /// Pages read off the result stream and buffered for dispatch,
    /// subscription confirmation excluded
    pub received: u64,
    /// Pages handed to the callback or accepted by the page channel
    pub delivered: u64,
}

/// Why a job ended other than by its result stream closing cleanly
#[derive(Debug, Clone)]
pub(crate) enum Failure {
    Connection { addr: String, message: String },
    Stream(String),
    Dispatch(String),
}

impl Failure {
    pub(crate) fn to_error(&self) -> JobError {
        match self {
            Failure::Connection { addr, message } => JobError::Connection {
                addr: addr.clone(),
                message: message.clone(),
            },
            Failure::Stream(message) => JobError::Stream(message.clone()),
            Failure::Dispatch(message) => JobError::Dispatch(message.clone()),
        }
    }
}

#[derive(Debug)]
struct Outcome {
    summary: JobSummary,
    failure: Option<Failure>,
}

/// An accepted job: the service it lives on and its subscription
pub(crate) struct Session {
    service: Arc<dyn CrawlService>,
    subscription: Subscription,
}

/// State shared by the job, its handles, and its background tasks
pub(crate) struct JobShared {
    addr: ServerAddr,
    phase: watch::Sender<StreamPhase>,
    session: OnceLock<Session>,
    injection: Mutex<Option<mpsc::Sender<PageRequest>>>,
    completion: OnceLock<WaitGroup>,
    outcome: OnceLock<Outcome>,
    finished: AtomicBool,
}

impl JobShared {
    pub(crate) fn new(addr: ServerAddr) -> Self {
        let (phase, _) = watch::channel(StreamPhase::NotStarted);
        Self {
            addr,
            phase,
            session: OnceLock::new(),
            injection: Mutex::new(None),
            completion: OnceLock::new(),
            outcome: OnceLock::new(),
            finished: AtomicBool::new(false),
        }
    }

    pub(crate) fn phase(&self) -> StreamPhase {
        *self.phase.borrow()
    }

    /// Moves to `next` if that is a legal step from the current phase
    pub(crate) fn transition(&self, next: StreamPhase) -> Result<(), JobError> {
        let mut result = Ok(());
        self.phase.send_if_modified(|phase| {
            if phase.can_transition_to(next) {
                tracing::debug!("Job phase {} -> {}", phase, next);
                *phase = next;
                true
            } else {
                result = Err(JobError::InvalidTransition {
                    from: *phase,
                    to: next,
                });
                false
            }
        });
        result
    }

    /// Registers the job with `wait_group` for the rest of its life
    pub(crate) fn register(&self, wait_group: &WaitGroup) {
        if self.completion.set(wait_group.clone()).is_ok() {
            wait_group.add(1);
        }
    }

    /// Records the accepted session and enters `Streaming`
    pub(crate) fn establish(
        &self,
        service: Arc<dyn CrawlService>,
        subscription: Subscription,
    ) -> Result<(), JobError> {
        if self
            .session
            .set(Session {
                service,
                subscription,
            })
            .is_err()
        {
            return Err(JobError::InvalidTransition {
                from: self.phase(),
                to: StreamPhase::Streaming,
            });
        }
        self.transition(StreamPhase::Streaming)
    }

    /// Terminates the job and fires its completion signal
    ///
    /// Only the first call has any effect.
    pub(crate) fn finish(&self, summary: JobSummary, failure: Option<Failure>) {
        if self.finished.swap(true, Ordering::SeqCst) {
            tracing::warn!("Job on {} already finished; ignoring", self.addr);
            return;
        }

        let _ = self.outcome.set(Outcome { summary, failure });
        if let Err(e) = self.transition(StreamPhase::Terminated) {
            tracing::error!("Failed to terminate job on {}: {}", self.addr, e);
        }
        if let Some(wait_group) = self.completion.get() {
            wait_group.done();
        }
    }
}

/// Terminates a job whose `start` was abandoned before the forwarder took over
///
/// Armed from the moment the job leaves `NotStarted`. Dropping it armed, for
/// instance when the `start` future is cancelled mid-dial, finishes the job
/// with a connection failure.
pub(crate) struct StartGuard {
    shared: Arc<JobShared>,
    armed: bool,
}

impl StartGuard {
    pub(crate) fn new(shared: Arc<JobShared>) -> Self {
        Self {
            shared,
            armed: true,
        }
    }

    /// Finishes the job with `failure`
    pub(crate) fn fail(mut self, failure: Failure) {
        self.armed = false;
        self.shared.finish(JobSummary::default(), Some(failure));
    }

    /// Hands the job's completion over to the forwarder
    pub(crate) fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for StartGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        tracing::warn!("Start of job on {} was abandoned", self.shared.addr);
        // The result stream went away with the abandoned start
        if self.shared.phase() == StreamPhase::Streaming {
            let _ = self.shared.transition(StreamPhase::Draining);
        }
        self.shared.finish(
            JobSummary::default(),
            Some(Failure::Connection {
                addr: self.shared.addr.to_string(),
                message: "start was abandoned before the job was running".to_string(),
            }),
        );
    }
}

/// Dials the server, submits the job, and waits for its subscription
///
/// The confirmation message carrying the subscription is consumed here and
/// is not forwarded to the sink.
pub(crate) async fn open(
    connector: &dyn Connector,
    addr: &ServerAddr,
    options: &ClientOptions,
    request: DomainOpt,
) -> Result<(Arc<dyn CrawlService>, Subscription, PageStream), Failure> {
    let failed = |message: String| Failure::Connection {
        addr: addr.to_string(),
        message,
    };

    let service = connector
        .connect(addr, options)
        .await
        .map_err(|e| failed(e.to_string()))?;

    let mut stream = service
        .add_domain_and_listen(request)
        .await
        .map_err(|e| failed(e.to_string()))?;

    let confirmation = match stream.next().await {
        Some(Ok(page)) => page,
        Some(Err(e)) => return Err(failed(e.to_string())),
        None => {
            return Err(failed(
                "result stream ended before the subscription arrived".to_string(),
            ))
        }
    };

    let subscription = confirmation
        .sub
        .ok_or_else(|| failed("first message carried no subscription".to_string()))?;

    Ok((service, subscription, stream))
}

/// Cloneable handle to a started (or not yet started) job
#[derive(Clone)]
pub struct JobHandle {
    pub(crate) shared: Arc<JobShared>,
}

impl JobHandle {
    pub(crate) fn new(addr: ServerAddr) -> Self {
        Self {
            shared: Arc::new(JobShared::new(addr)),
        }
    }

    /// Current phase of the job's stream
    pub fn phase(&self) -> StreamPhase {
        self.shared.phase()
    }

    /// Coarse lifecycle state
    pub fn state(&self) -> JobState {
        self.phase().job_state()
    }

    /// True from `start` until the result stream ends
    pub fn is_alive(&self) -> bool {
        self.phase().is_running()
    }

    /// Subscription assigned by the server, once the job was accepted
    pub fn subscription(&self) -> Option<Subscription> {
        self.shared
            .session
            .get()
            .map(|session| session.subscription.clone())
    }

    /// Address of the server the job talks to
    pub fn server(&self) -> &ServerAddr {
        &self.shared.addr
    }

    /// Asks the server to fetch one more page for this job
    pub async fn add_page(
        &self,
        url: impl Into<String>,
        meta_str: impl Into<String>,
    ) -> Result<(), JobError> {
        self.send_request(
            "add_page",
            PageReqType::Get,
            url.into(),
            String::new(),
            meta_str.into(),
        )
        .await
    }

    /// Asks the server to run a script, or load a page with one, for this job
    pub async fn add_js(
        &self,
        kind: PageReqType,
        url: impl Into<String>,
        js: impl Into<String>,
        meta_str: impl Into<String>,
    ) -> Result<(), JobError> {
        self.send_request("add_js", kind, url.into(), js.into(), meta_str.into())
            .await
    }

    async fn send_request(
        &self,
        operation: &'static str,
        kind: PageReqType,
        url: String,
        js: String,
        meta_str: String,
    ) -> Result<(), JobError> {
        let session = match self.shared.session.get() {
            Some(session) if self.is_alive() => session,
            _ => {
                tracing::warn!("{} called on a job that is not running", operation);
                return Err(JobError::NotRunning { operation });
            }
        };

        let request = PageRequest {
            sub: Some(session.subscription.clone()),
            reqtype: kind as i32,
            url,
            js,
            no_callback: false,
            meta_str,
        };

        // Held across the send so injected requests keep their call order
        let mut injection = self.shared.injection.lock().await;
        let sender = match injection.clone() {
            Some(sender) => sender,
            None => {
                let sender = session.service.open_page_requests().await.map_err(|e| {
                    tracing::warn!("Failed to open injection stream: {}", e);
                    JobError::Rpc(e)
                })?;
                *injection = Some(sender.clone());
                sender
            }
        };

        if sender.send(request).await.is_err() {
            tracing::warn!("Injection stream for {} closed", session.subscription.subcode);
            *injection = None;
            return Err(JobError::InjectionClosed);
        }
        Ok(())
    }

    /// Asks the server to cancel the job
    ///
    /// Does nothing on a job that is not running. The job terminates once the
    /// server closes the result stream.
    pub async fn stop(&self) -> Result<(), JobError> {
        if !self.is_alive() {
            return Ok(());
        }
        let Some(session) = self.shared.session.get() else {
            tracing::debug!("stop called before the subscription arrived; nothing to cancel");
            return Ok(());
        };

        session
            .service
            .cancel_job(session.subscription.clone())
            .await?;
        tracing::info!("Cancel sent for job {}", session.subscription.subcode);
        Ok(())
    }

    /// Starts relaying the server's analyzed-URL batches into `tx`
    ///
    /// Returns once the feed is open; the relay runs in the background until
    /// either side goes away. Fails softly with `NoSubscription` when the
    /// server never accepted the job.
    pub async fn fetch_analyzed_urls(&self, tx: mpsc::Sender<UrlList>) -> Result<(), JobError> {
        let operation = "fetch_analyzed_urls";
        let Some(session) = self.shared.session.get() else {
            tracing::warn!("{}: job has no subscription", operation);
            return Err(JobError::NoSubscription { operation });
        };

        let stream = session
            .service
            .get_analyzed_urls(session.subscription.clone())
            .await
            .map_err(|e| {
                tracing::warn!("Failed to open analyzed URL stream: {}", e);
                JobError::Rpc(e)
            })?;

        tokio::spawn(relay::forward_batches(
            session.subscription.subcode.clone(),
            stream,
            tx,
        ));
        Ok(())
    }

    /// Like [`fetch_analyzed_urls`](Self::fetch_analyzed_urls), but logs failures instead
    pub async fn relay_analyzed_urls(&self, tx: mpsc::Sender<UrlList>) {
        if let Err(e) = self.fetch_analyzed_urls(tx).await {
            tracing::debug!("Analyzed URL relay not started: {}", e);
        }
    }

    /// Waits for the job to terminate and reports how it went
    ///
    /// Never returns for a job that is never started.
    pub async fn wait(&self) -> Result<JobSummary, JobError> {
        let mut rx = self.shared.phase.subscribe();
        let _ = rx.wait_for(|phase| phase.is_terminal()).await;

        match self.shared.outcome.get() {
            Some(Outcome {
                failure: Some(failure),
                ..
            }) => Err(failure.to_error()),
            Some(Outcome { summary, .. }) => Ok(summary.clone()),
            None => Ok(JobSummary::default()),
        }
    }
}

impl std::fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandle")
            .field("server", &self.shared.addr)
            .field("phase", &self.phase())
            .field("subscription", &self.subscription().map(|s| s.subcode))
            .finish()
    }
}
