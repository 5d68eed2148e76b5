use std::sync::Arc;
use tokio::sync::watch;

/// Counter shared between an owner and the jobs it waits on
///
/// Each job registers itself when it starts and signs off exactly once when
/// its results have been fully dispatched. `wait` returns as soon as the
/// count is back to zero.
#[derive(Debug, Clone)]
pub struct WaitGroup {
    count: Arc<watch::Sender<usize>>,
}

impl WaitGroup {
    pub fn new() -> Self {
        let (count, _) = watch::channel(0);
        Self {
            count: Arc::new(count),
        }
    }

    /// Registers `n` more participants
    pub fn add(&self, n: usize) {
        self.count.send_modify(|count| *count += n);
    }

    /// Signs off one participant
    pub fn done(&self) {
        self.count.send_modify(|count| {
            if *count == 0 {
                tracing::warn!("WaitGroup::done called more times than add");
            } else {
                *count -= 1;
            }
        });
    }

    /// Number of participants that have not signed off yet
    pub fn count(&self) -> usize {
        *self.count.borrow()
    }

    /// Waits until every participant has signed off
    pub async fn wait(&self) {
        let mut rx = self.count.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait
        let _ = rx.wait_for(|count| *count == 0).await;
    }
}

impl Default for WaitGroup {
    fn default() -> Self {
        Self::new()
    }
}
