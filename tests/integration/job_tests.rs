//! Integration tests for crawl jobs
//!
//! These tests drive `CrawlJob` against the in-process `LocalServer` and
//! check the full job lifecycle end-to-end.

use crawlwire::rpc::{LocalServer, LocalSession, PageReqType, RpcError, UrlList};
use crawlwire::{
    analyzed_url_channel, page_channel, ConfigError, CrawlJob, JobError, JobHandle, JobState,
    PageHtml, StreamPhase, WaitGroup,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

const PATIENCE: Duration = Duration::from_secs(5);

/// Creates a job with a valid config, wired to `server`
fn create_test_job(server: &LocalServer) -> CrawlJob {
    let mut job = CrawlJob::new("127.0.0.1", 10000).with_connector(server.clone());
    job.config_mut().unwrap().seed_url = "https://example.com".to_string();
    job
}

fn page(url: &str) -> PageHtml {
    PageHtml {
        success: true,
        url: url.to_string(),
        httpstatuscode: 200,
        content: b"<html></html>".to_vec(),
        ..Default::default()
    }
}

async fn next_session(server: &LocalServer) -> LocalSession {
    tokio::time::timeout(PATIENCE, server.next_session())
        .await
        .expect("no session submitted")
        .expect("server closed")
}

/// Polls until the job reaches `phase`
async fn wait_for_phase(handle: &JobHandle, phase: StreamPhase) {
    tokio::time::timeout(PATIENCE, async {
        while handle.phase() != phase {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("job never reached {}", phase));
}

#[tokio::test]
async fn test_both_sinks_rejected_without_dialing() {
    let server = LocalServer::new();
    let mut job = create_test_job(&server);
    let (tx, _rx) = page_channel();
    job.set_page_channel(tx);
    job.set_callback(|_, _| {});

    let err = job.start().await.unwrap_err();
    assert!(matches!(err, JobError::Config(ConfigError::Sink(_))));
    assert_eq!(server.dial_count(), 0);
    assert_eq!(job.state(), JobState::Configured);
}

#[tokio::test]
async fn test_missing_sink_rejected_without_dialing() {
    let server = LocalServer::new();
    let mut job = create_test_job(&server);

    let err = job.start().await.unwrap_err();
    assert!(matches!(err, JobError::Config(ConfigError::Sink(_))));
    assert_eq!(server.dial_count(), 0);
}

#[tokio::test]
async fn test_job_submits_its_config() {
    let server = LocalServer::new();
    let mut job = create_test_job(&server);
    {
        let config = job.config_mut().unwrap();
        config.depth = 3;
        config.set_callback_xpath_match([("//title", "News"), ("//h1", "Today")]);
    }
    let (tx, _rx) = page_channel();
    job.set_page_channel(tx);
    job.start().await.unwrap();

    let session = next_session(&server).await;
    assert_eq!(session.options.seed_url, "https://example.com");
    assert_eq!(session.options.depth, 3);
    assert_eq!(session.options.useragent, "Fetchbot");
    assert!(!session.options.no_follow);

    // Rules keep the order they were given in
    let keys: Vec<_> = session
        .options
        .callback_xpath_match
        .iter()
        .map(|kv| kv.key.as_str())
        .collect();
    assert_eq!(keys, vec!["//title", "//h1"]);

    assert_eq!(job.subscription(), Some(session.subscription.clone()));
    assert!(job.is_alive());
    assert_eq!(job.phase(), StreamPhase::Streaming);
}

#[tokio::test]
async fn test_started_job_is_frozen() {
    let server = LocalServer::new();
    let mut job = create_test_job(&server);
    let (tx, _rx) = page_channel();
    job.set_page_channel(tx);
    job.start().await.unwrap();
    let _session = next_session(&server).await;

    assert!(matches!(job.config_mut(), Err(JobError::AlreadyStarted)));

    let (tx, _rx) = page_channel();
    job.set_page_channel(tx);
    let err = job.start().await.unwrap_err();
    assert!(matches!(err, JobError::InvalidTransition { .. }));
    assert_eq!(server.dial_count(), 1);
}

#[tokio::test]
async fn test_burst_is_delivered_in_order_without_loss() {
    let server = LocalServer::new();
    let mut job = create_test_job(&server);
    let (tx, mut rx) = page_channel();
    job.set_page_channel(tx);
    job.start().await.unwrap();

    let session = next_session(&server).await;
    tokio::spawn(async move {
        for i in 0..500 {
            assert!(session.push(page(&format!("https://example.com/{}", i))).await);
        }
        session.finish();
    });

    for i in 0..500 {
        let received = tokio::time::timeout(PATIENCE, rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.url, format!("https://example.com/{}", i));
    }
    // The job drops its sender once everything was dispatched
    assert!(rx.recv().await.is_none());

    let summary = job.wait().await.unwrap();
    assert_eq!(summary.received, 500);
    assert_eq!(summary.delivered, 500);
    assert_eq!(job.phase(), StreamPhase::Terminated);
}

#[tokio::test]
async fn test_callback_receives_pages_then_completion() {
    let server = LocalServer::new();
    let mut job = create_test_job(&server);
    job.config_mut().unwrap().depth = 2;
    let wait_group = WaitGroup::new();
    job.set_wait_group(wait_group.clone());

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    job.set_callback(move |page, handle| {
        assert!(handle.subscription().is_some());
        sink.lock().unwrap().push(page.url);
    });
    job.start().await.unwrap();
    assert_eq!(wait_group.count(), 1);

    let session = next_session(&server).await;
    assert_eq!(session.options.depth, 2);
    for url in ["https://example.com/a", "https://example.com/b", "https://example.com/c"] {
        assert!(session.push(page(url)).await);
    }
    session.finish();

    tokio::time::timeout(PATIENCE, wait_group.wait())
        .await
        .unwrap();

    // Completion fires only after every page reached the callback
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            "https://example.com/a",
            "https://example.com/b",
            "https://example.com/c"
        ]
    );
    assert!(!job.is_alive());
    assert_eq!(job.phase(), StreamPhase::Terminated);
}

#[tokio::test]
async fn test_slow_consumer_holds_job_in_draining() {
    let server = LocalServer::new();
    let mut job = create_test_job(&server);
    let (tx, mut rx) = mpsc::channel(2);
    job.set_page_channel(tx);
    job.start().await.unwrap();

    let session = next_session(&server).await;
    for i in 0..5 {
        assert!(session.push(page(&format!("https://example.com/{}", i))).await);
    }
    session.finish();

    let handle = job.handle();
    wait_for_phase(&handle, StreamPhase::Draining).await;
    assert!(!handle.is_alive());

    // Nobody is reading, so the job cannot finish yet
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handle.phase(), StreamPhase::Draining);

    for i in 0..5 {
        let received = rx.recv().await.unwrap();
        assert_eq!(received.url, format!("https://example.com/{}", i));
    }

    let summary = tokio::time::timeout(PATIENCE, handle.wait())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(summary.delivered, 5);
}

#[tokio::test]
async fn test_paced_reader_receives_every_page() {
    let server = LocalServer::new();
    let mut job = create_test_job(&server);
    job.config_mut().unwrap().depth = 2;
    let (tx, mut rx) = mpsc::channel(2);
    job.set_page_channel(tx);
    job.start().await.unwrap();

    let session = next_session(&server).await;
    assert_eq!(session.options.depth, 2);
    let producer = tokio::spawn(async move {
        for i in 0..5 {
            assert!(session.push(page(&format!("https://example.com/{}", i))).await);
        }
        session.finish();
    });

    let handle = job.handle();
    let mut ticks = tokio::time::interval(Duration::from_millis(20));
    for i in 0..5 {
        ticks.tick().await;
        // At least one page is still waiting for room in the channel
        if i <= 2 {
            assert_ne!(handle.phase(), StreamPhase::Terminated);
        }
        let received = tokio::time::timeout(PATIENCE, rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.url, format!("https://example.com/{}", i));
    }
    producer.await.unwrap();

    let summary = tokio::time::timeout(PATIENCE, handle.wait())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(summary.received, 5);
    assert_eq!(summary.delivered, 5);
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn test_concurrent_stops_complete_once() {
    let server = LocalServer::new();
    let mut job = create_test_job(&server);
    let wait_group = WaitGroup::new();
    job.set_wait_group(wait_group.clone());
    let (tx, _rx) = page_channel();
    job.set_page_channel(tx);
    job.start().await.unwrap();

    let session = next_session(&server).await;
    let subscription = session.subscription.clone();

    let stops: Vec<_> = (0..8)
        .map(|_| {
            let handle = job.handle();
            tokio::spawn(async move { handle.stop().await })
        })
        .collect();
    for stop in stops {
        stop.await.unwrap().unwrap();
    }

    let cancelled = server.cancelled();
    assert_eq!(cancelled.len(), 8);
    assert!(cancelled.iter().all(|sub| *sub == subscription));

    // The server ends the stream in response to the cancel
    session.finish();
    tokio::time::timeout(PATIENCE, wait_group.wait())
        .await
        .unwrap();
    assert_eq!(wait_group.count(), 0);
    assert_eq!(job.phase(), StreamPhase::Terminated);

    // Stop on a terminated job is a no-op
    job.stop().await.unwrap();
    assert_eq!(server.cancelled().len(), 8);
}

#[tokio::test]
async fn test_injection_requires_running_job() {
    let server = LocalServer::new();
    let mut job = create_test_job(&server);

    let err = job.add_page("https://example.com/early", "").await.unwrap_err();
    assert!(matches!(err, JobError::NotRunning { .. }));

    let (tx, _rx) = page_channel();
    job.set_page_channel(tx);
    job.start().await.unwrap();
    let session = next_session(&server).await;
    session.finish();
    job.wait().await.unwrap();

    let err = job
        .add_js(PageReqType::Jscript, "", "document.title", "")
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::NotRunning { operation: "add_js" }));
    assert_eq!(server.injection_stream_count(), 0);
}

#[tokio::test]
async fn test_injected_requests_reach_server() {
    let server = LocalServer::new();
    let mut job = create_test_job(&server);
    let (tx, _rx) = page_channel();
    job.set_page_channel(tx);
    job.start().await.unwrap();
    let session = next_session(&server).await;

    job.add_page("https://example.com/extra", "from-test").await.unwrap();
    job.add_js(
        PageReqType::BuiltinJs,
        "https://example.com/scroll",
        "scroll",
        "",
    )
    .await
    .unwrap();

    let first = tokio::time::timeout(PATIENCE, server.next_page_request())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.url, "https://example.com/extra");
    assert_eq!(first.meta_str, "from-test");
    assert_eq!(first.reqtype, PageReqType::Get as i32);
    assert_eq!(first.sub, Some(session.subscription.clone()));

    let second = tokio::time::timeout(PATIENCE, server.next_page_request())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.reqtype, PageReqType::BuiltinJs as i32);
    assert_eq!(second.js, "scroll");

    // One injection stream serves every request of the job
    assert_eq!(server.injection_stream_count(), 1);
}

#[tokio::test]
async fn test_refused_injection_stream_is_opened_on_next_call() {
    let server = LocalServer::new();
    server.refuse_injection(true);
    let mut job = create_test_job(&server);
    let (tx, _rx) = page_channel();
    job.set_page_channel(tx);
    job.start().await.unwrap();
    let _session = next_session(&server).await;

    let err = job.add_page("https://example.com/a", "").await.unwrap_err();
    assert!(matches!(err, JobError::Rpc(RpcError::Status { .. })));
    assert_eq!(server.injection_stream_count(), 0);
    assert!(job.is_alive());

    server.refuse_injection(false);
    job.add_page("https://example.com/b", "").await.unwrap();
    let request = tokio::time::timeout(PATIENCE, server.next_page_request())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(request.url, "https://example.com/b");
    assert_eq!(server.injection_stream_count(), 1);
}

#[tokio::test]
async fn test_closed_injection_stream_is_reopened() {
    let server = LocalServer::new();
    let mut job = create_test_job(&server);
    let (tx, _rx) = page_channel();
    job.set_page_channel(tx);
    job.start().await.unwrap();
    let _session = next_session(&server).await;

    job.add_page("https://example.com/a", "").await.unwrap();
    let first = tokio::time::timeout(PATIENCE, server.next_page_request())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.url, "https://example.com/a");

    server.close_injection_streams().await;
    let err = job.add_page("https://example.com/b", "").await.unwrap_err();
    assert!(matches!(err, JobError::InjectionClosed));
    assert!(job.is_alive());

    // The dead sender was dropped, so the next call opens a fresh stream
    job.add_page("https://example.com/c", "").await.unwrap();
    let next = tokio::time::timeout(PATIENCE, server.next_page_request())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(next.url, "https://example.com/c");
    assert_eq!(server.injection_stream_count(), 2);
}

#[tokio::test]
async fn test_analyzed_urls_without_subscription_is_soft() {
    let server = LocalServer::new();
    let job = create_test_job(&server);
    let (tx, _rx) = analyzed_url_channel();

    let err = job.fetch_analyzed_urls(tx).await.unwrap_err();
    assert!(err.is_soft());
    assert!(matches!(err, JobError::NoSubscription { .. }));

    // The convenience path swallows the same failure
    let (tx, _rx) = analyzed_url_channel();
    job.relay_analyzed_urls(tx).await;
    assert_eq!(job.state(), JobState::Configured);
}

#[tokio::test]
async fn test_analyzed_url_batches_are_relayed() {
    let server = LocalServer::new();
    let mut job = create_test_job(&server);
    let (tx, _rx) = page_channel();
    job.set_page_channel(tx);
    job.start().await.unwrap();
    let _session = next_session(&server).await;

    let (tx, mut batches) = analyzed_url_channel();
    job.fetch_analyzed_urls(tx).await.unwrap();

    let feed = tokio::time::timeout(PATIENCE, server.next_analyzed_feed())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(Some(feed.subscription.clone()), job.subscription());

    let batch = UrlList {
        url: vec![
            "https://example.com/x".to_string(),
            "https://example.com/y".to_string(),
        ],
        meta_str: "m".to_string(),
        url_depth: 1,
    };
    assert!(feed.push(batch.clone()).await);
    feed.finish();

    assert_eq!(batches.recv().await.unwrap(), batch);
    assert!(batches.recv().await.is_none());
}

#[tokio::test]
async fn test_refused_connection_terminates_job() {
    let server = LocalServer::new();
    server.refuse_dials(true);
    let mut job = create_test_job(&server);
    let wait_group = WaitGroup::new();
    job.set_wait_group(wait_group.clone());
    let (tx, _rx) = page_channel();
    job.set_page_channel(tx);

    let err = job.start().await.unwrap_err();
    assert!(matches!(err, JobError::Connection { .. }));
    assert_eq!(server.dial_count(), 1);
    assert!(!job.is_alive());
    assert_eq!(job.phase(), StreamPhase::Terminated);
    assert_eq!(wait_group.count(), 0);

    assert!(matches!(job.wait().await, Err(JobError::Connection { .. })));

    let (tx, _rx) = analyzed_url_channel();
    assert!(job.fetch_analyzed_urls(tx).await.unwrap_err().is_soft());
}

#[tokio::test]
async fn test_abandoned_start_terminates_job() {
    let server = LocalServer::new();
    server.stall_dials(true);
    let mut job = create_test_job(&server);
    let wait_group = WaitGroup::new();
    job.set_wait_group(wait_group.clone());
    let (tx, _rx) = page_channel();
    job.set_page_channel(tx);
    let handle = job.handle();

    let started = tokio::time::timeout(Duration::from_millis(100), job.start()).await;
    assert!(started.is_err());
    assert_eq!(server.dial_count(), 1);

    assert_eq!(handle.phase(), StreamPhase::Terminated);
    assert!(!handle.is_alive());
    assert_eq!(wait_group.count(), 0);
    let waited = tokio::time::timeout(PATIENCE, handle.wait()).await.unwrap();
    assert!(matches!(waited, Err(JobError::Connection { .. })));

    // A job starts at most once, abandoned or not
    let (tx, _rx) = page_channel();
    job.set_page_channel(tx);
    assert!(matches!(
        job.start().await,
        Err(JobError::InvalidTransition { .. })
    ));
}

#[tokio::test]
async fn test_stream_failure_keeps_delivered_pages() {
    let server = LocalServer::new();
    let mut job = create_test_job(&server);
    let (tx, mut rx) = page_channel();
    job.set_page_channel(tx);
    job.start().await.unwrap();

    let session = next_session(&server).await;
    assert!(session.push(page("https://example.com/ok")).await);
    session
        .fail(RpcError::Transport("connection reset".to_string()))
        .await;

    assert_eq!(rx.recv().await.unwrap().url, "https://example.com/ok");
    assert!(rx.recv().await.is_none());
    assert!(matches!(job.wait().await, Err(JobError::Stream(_))));
}

#[tokio::test]
async fn test_silent_server_never_times_out() {
    let server = LocalServer::new();
    let mut job = create_test_job(&server);
    let (tx, _rx) = page_channel();
    job.set_page_channel(tx);
    job.start().await.unwrap();

    // Keep the session open without ever sending anything
    let _session = next_session(&server).await;

    let waited = tokio::time::timeout(Duration::from_millis(200), job.wait()).await;
    assert!(waited.is_err());
    assert!(job.is_alive());
    assert_eq!(job.phase(), StreamPhase::Streaming);
}
