//! Result stream forwarder
//!
//! A producer reads the server's result stream into a bounded buffer and a
//! dispatcher drains that buffer into the job's sink. The dispatcher does not
//! deliver anything until the task that started the job releases it.

use crate::job::session::{Failure, JobHandle, JobSummary};
use crate::job::sink::Sink;
use crate::rpc::{PageHtml, PageStream};
use crate::state::StreamPhase;
use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};

/// A forwarder whose tasks are running but whose dispatcher is still parked
pub(crate) struct Pending {
    ready: oneshot::Receiver<()>,
    release: oneshot::Sender<()>,
}

impl Pending {
    /// Waits until the dispatcher is parked
    pub(crate) async fn ready(self) -> Release {
        // The dispatcher only drops its end after signalling, or by panicking
        let _ = self.ready.await;
        Release(self.release)
    }
}

/// Releases a spawned forwarder's dispatcher
pub(crate) struct Release(oneshot::Sender<()>);

impl Release {
    pub(crate) fn release(self) {
        // A dispatcher that already exited has nothing left to deliver
        let _ = self.0.send(());
    }
}

/// Spawns the forwarder for a job that just entered `Streaming`
///
/// From here on the forwarder owns the job's completion. Dropping the
/// returned [`Pending`], or the [`Release`] it yields, releases the
/// dispatcher as well.
pub(crate) fn spawn(
    handle: JobHandle,
    stream: PageStream,
    sink: Sink,
    capacity: usize,
) -> Pending {
    let (buffer_tx, buffer_rx) = mpsc::channel(capacity);
    let (ready_tx, ready_rx) = oneshot::channel();
    let (release_tx, release_rx) = oneshot::channel();

    tracing::debug!(
        "Forwarding results to a {} with a buffer of {}",
        sink.kind(),
        capacity
    );
    let dispatcher = tokio::spawn(dispatch(
        buffer_rx,
        sink,
        handle.clone(),
        ready_tx,
        release_rx,
    ));

    tokio::spawn(async move {
        let (received, failure) = produce(stream, buffer_tx).await;

        if let Err(e) = handle.shared.transition(StreamPhase::Draining) {
            tracing::error!("{}", e);
        }

        let (delivered, dispatch_failure) = match dispatcher.await {
            Ok(delivered) => (delivered, None),
            Err(e) => {
                tracing::error!("Result dispatcher failed: {}", e);
                (0, Some(Failure::Dispatch(e.to_string())))
            }
        };

        tracing::info!(
            "Job on {} finished: {} pages received, {} delivered",
            handle.server(),
            received,
            delivered
        );
        handle.shared.finish(
            JobSummary {
                received,
                delivered,
            },
            failure.or(dispatch_failure),
        );
    });

    Pending {
        ready: ready_rx,
        release: release_tx,
    }
}

/// Pushes every result into the buffer until the stream ends
///
/// The buffer sender is dropped on return, which closes the buffer.
async fn produce(
    mut stream: PageStream,
    buffer: mpsc::Sender<PageHtml>,
) -> (u64, Option<Failure>) {
    let mut received = 0;

    while let Some(result) = stream.next().await {
        match result {
            Ok(page) => {
                if buffer.send(page).await.is_err() {
                    tracing::warn!("Result dispatcher is gone; stopping receive loop");
                    break;
                }
                received += 1;
            }
            Err(e) => {
                tracing::warn!("Result stream failed: {}", e);
                return (received, Some(Failure::Stream(e.to_string())));
            }
        }
    }

    (received, None)
}

/// Drains the buffer into the sink once released
async fn dispatch(
    mut buffer: mpsc::Receiver<PageHtml>,
    sink: Sink,
    handle: JobHandle,
    ready: oneshot::Sender<()>,
    release: oneshot::Receiver<()>,
) -> u64 {
    let _ = ready.send(());
    // Released explicitly, or implicitly when the starter went away
    let _ = release.await;

    let mut delivered = 0;
    match sink {
        Sink::Channel(tx) => {
            while let Some(page) = buffer.recv().await {
                tracing::debug!("Dispatching {}", page.url);
                if tx.send(page).await.is_err() {
                    tracing::warn!("Page receiver dropped; discarding remaining results");
                    while buffer.recv().await.is_some() {}
                    break;
                }
                delivered += 1;
            }
        }
        Sink::Callback(mut callback) => {
            while let Some(page) = buffer.recv().await {
                tracing::debug!("Dispatching {}", page.url);
                callback(page, &handle);
                delivered += 1;
            }
        }
    }

    delivered
}
