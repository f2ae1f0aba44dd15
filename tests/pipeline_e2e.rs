// tests/pipeline_e2e.rs
//
// End-to-end pipeline runs against an in-memory database: produce,
// normalize, persist, notify, then read back through the feed.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::NaiveTime;

use stock_news_notifier::db::Database;
use stock_news_notifier::devices::DeviceRegistry;
use stock_news_notifier::news::{FeedQuery, FeedReader};
use stock_news_notifier::notify::{PushTransport, TokenOutcome};
use stock_news_notifier::producer::{FixedProducer, NewsProducer, ProducerOutput};
use stock_news_notifier::scheduler::{PipelineCtx, PipelineScheduler, RunOutcome};

struct RecordingTransport {
    calls: AtomicUsize,
    last_tokens: Mutex<Vec<String>>,
    last_data: Mutex<Option<serde_json::Value>>,
}

impl RecordingTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            last_tokens: Mutex::new(Vec::new()),
            last_data: Mutex::new(None),
        })
    }
}

#[async_trait::async_trait]
impl PushTransport for RecordingTransport {
    async fn send_bulk(
        &self,
        tokens: &[String],
        _title: &str,
        _body: &str,
        data: &serde_json::Value,
    ) -> anyhow::Result<Vec<TokenOutcome>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_tokens.lock().unwrap() = tokens.to_vec();
        *self.last_data.lock().unwrap() = Some(data.clone());
        Ok(tokens
            .iter()
            .map(|t| TokenOutcome {
                token: t.clone(),
                ok: true,
                error: None,
            })
            .collect())
    }

    async fn send_one(
        &self,
        _token: &str,
        _title: &str,
        _body: &str,
        _data: &serde_json::Value,
    ) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

async fn scheduler_with(
    producer: Arc<dyn NewsProducer>,
    transport: Arc<RecordingTransport>,
) -> (PipelineScheduler, Database) {
    let db = Database::open_in_memory().await.expect("in-memory db");
    let ctx = PipelineCtx::new(db.clone(), producer, transport);
    let scheduler = PipelineScheduler::new(
        ctx,
        vec![NaiveTime::from_hms_opt(17, 0, 0).expect("time")],
        chrono_tz::Asia::Seoul,
    );
    (scheduler, db)
}

// Producer output as a model would emit it: prose, a code fence, one good
// element and one with a malformed score.
fn noisy_producer() -> Arc<FixedProducer> {
    let text = r#"Here are today's findings:
```json
[
  {"title": "Rate decision", "summary": "Cut by 50bp", "url": "https://x/1",
   "published_date": "2025-06-01", "score": 8, "tickers": ["SPY"]},
  {"title": "Broken element", "url": "https://x/2", "score": "very high"}
]
```
Hope this helps!"#;
    Arc::new(FixedProducer::new(ProducerOutput::Text(text.to_string())))
}

#[tokio::test]
async fn full_run_saves_notifies_and_serves_the_feed() {
    let transport = RecordingTransport::new();
    let (scheduler, db) = scheduler_with(noisy_producer(), transport.clone()).await;

    let device = uuid::Uuid::new_v4();
    DeviceRegistry::new(db.pool())
        .register(device, "ExponentPushToken[e2e]")
        .await
        .expect("register");

    let outcome = scheduler.run_once().await;
    match outcome {
        RunOutcome::Completed { ingest, fanout } => {
            // The malformed element is dropped before the store sees it.
            assert_eq!(ingest.total_processed, 1);
            assert_eq!(ingest.saved, 1);
            assert_eq!(ingest.skipped_duplicates, 0);
            assert_eq!(ingest.failed, 0);

            let fanout = fanout.expect("notification expected");
            assert_eq!(fanout.success_count, 1);
            assert!(fanout.failed_tokens.is_empty());
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    assert_eq!(
        *transport.last_tokens.lock().unwrap(),
        vec!["ExponentPushToken[e2e]".to_string()]
    );
    let data = transport.last_data.lock().unwrap().clone().expect("data");
    assert_eq!(data["type"], "news_update");
    // Stringified for mobile clients that parse data values as strings.
    assert_eq!(data["saved_count"], "1");
    assert!(data["timestamp"].is_string());

    let page = FeedReader::new(db.pool())
        .page(&FeedQuery::default())
        .await
        .expect("feed");
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].url, "https://x/1");
    assert_eq!(page.items[0].score, 8);
}

#[tokio::test]
async fn repeat_run_skips_duplicates_and_stays_silent() {
    let transport = RecordingTransport::new();
    let (scheduler, db) = scheduler_with(noisy_producer(), transport.clone()).await;

    DeviceRegistry::new(db.pool())
        .register(uuid::Uuid::new_v4(), "tok")
        .await
        .expect("register");

    scheduler.run_once().await;
    let second = scheduler.run_once().await;

    match second {
        RunOutcome::Completed { ingest, fanout } => {
            assert_eq!(ingest.saved, 0);
            assert_eq!(ingest.skipped_duplicates, 1);
            assert!(fanout.is_none());
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    // Only the first run pushed.
    assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn producer_failure_skips_without_touching_the_store() {
    let transport = RecordingTransport::new();
    let (scheduler, db) =
        scheduler_with(Arc::new(FixedProducer::failing()), transport.clone()).await;

    let outcome = scheduler.run_once().await;
    assert!(matches!(outcome, RunOutcome::Skipped { .. }));
    assert_eq!(transport.calls.load(Ordering::SeqCst), 0);

    let page = FeedReader::new(db.pool())
        .page(&FeedQuery::default())
        .await
        .expect("feed");
    assert!(page.items.is_empty());
}

#[tokio::test]
async fn inactive_devices_are_not_notified() {
    let transport = RecordingTransport::new();
    let (scheduler, db) = scheduler_with(noisy_producer(), transport.clone()).await;

    let registry = DeviceRegistry::new(db.pool());
    let active = uuid::Uuid::new_v4();
    let inactive = uuid::Uuid::new_v4();
    registry.register(active, "tok-active").await.expect("register");
    registry.register(inactive, "tok-inactive").await.expect("register");
    registry.deactivate(inactive).await.expect("deactivate");

    let outcome = scheduler.run_once().await;
    assert!(matches!(outcome, RunOutcome::Completed { .. }));
    assert_eq!(
        *transport.last_tokens.lock().unwrap(),
        vec!["tok-active".to_string()]
    );
}
