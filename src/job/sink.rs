use crate::job::JobHandle;
use crate::rpc::{PageHtml, UrlList};
use crate::ConfigError;
use tokio::sync::mpsc;

/// Capacity of the channels handed out by [`page_channel`] and [`analyzed_url_channel`]
pub const CHANNEL_CAPACITY: usize = 100;

/// Per-page callback
///
/// Runs on the job's dispatch task, one page at a time, in arrival order.
pub type PageCallback = Box<dyn FnMut(PageHtml, &JobHandle) + Send + 'static>;

/// Creates a bounded channel suitable for [`CrawlJob::set_page_channel`](crate::CrawlJob::set_page_channel)
pub fn page_channel() -> (mpsc::Sender<PageHtml>, mpsc::Receiver<PageHtml>) {
    mpsc::channel(CHANNEL_CAPACITY)
}

/// Creates a bounded channel suitable for [`JobHandle::fetch_analyzed_urls`]
pub fn analyzed_url_channel() -> (mpsc::Sender<UrlList>, mpsc::Receiver<UrlList>) {
    mpsc::channel(CHANNEL_CAPACITY)
}

/// Where a job's pages end up
pub(crate) enum Sink {
    Callback(PageCallback),
    Channel(mpsc::Sender<PageHtml>),
}

impl Sink {
    /// Takes the one configured sink out of the job's slots
    ///
    /// Both slots are left untouched unless exactly one of them is set.
    pub(crate) fn take_from(
        callback: &mut Option<PageCallback>,
        channel: &mut Option<mpsc::Sender<PageHtml>>,
    ) -> Result<Self, ConfigError> {
        match (callback.is_some(), channel.is_some()) {
            (true, true) => Err(ConfigError::Sink(
                "callback and page channel are mutually exclusive".to_string(),
            )),
            (false, false) => Err(ConfigError::Sink(
                "either a callback or a page channel is required".to_string(),
            )),
            _ => match (callback.take(), channel.take()) {
                (Some(callback), None) => Ok(Sink::Callback(callback)),
                (None, Some(channel)) => Ok(Sink::Channel(channel)),
                _ => Err(ConfigError::Sink("result sink changed while starting".to_string())),
            },
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Sink::Callback(_) => "callback",
            Sink::Channel(_) => "channel",
        }
    }
}
