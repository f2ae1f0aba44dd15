//! Pipeline orchestrator and daily schedule.
//!
//! One `PipelineScheduler` owns the background jobs that run the full
//! produce / normalize / persist / notify sequence at fixed local times.
//! Runs never overlap: every entry point takes the run lock first, so a
//! manual trigger queues behind an in-flight scheduled run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use metrics::counter;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::db::Database;
use crate::devices::DeviceRegistry;
use crate::news::{IngestSummary, NewsStore};
use crate::normalize::normalize;
use crate::notify::{send_to_all, FanoutSummary, PushTransport};
use crate::producer::NewsProducer;

const NOTIFICATION_TITLE: &str = "Financial News Update";

/// Everything one pipeline run needs. Cloned into each background job.
#[derive(Clone)]
pub struct PipelineCtx {
    pub db: Database,
    pub producer: Arc<dyn NewsProducer>,
    pub transport: Arc<dyn PushTransport>,
    /// Serializes runs across scheduled jobs and manual triggers.
    run_lock: Arc<tokio::sync::Mutex<()>>,
}

impl PipelineCtx {
    pub fn new(
        db: Database,
        producer: Arc<dyn NewsProducer>,
        transport: Arc<dyn PushTransport>,
    ) -> Self {
        Self {
            db,
            producer,
            transport,
            run_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }
}

/// What one pipeline run did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Nothing reached the store. Not an error; the next run retries.
    Skipped { reason: String },
    Completed {
        ingest: IngestSummary,
        /// None when nothing new was saved, so no notification went out.
        fanout: Option<FanoutSummary>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub id: String,
    pub trigger: String,
    pub next_run_time: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub status: &'static str,
    pub jobs: Vec<JobStatus>,
}

pub struct PipelineScheduler {
    ctx: PipelineCtx,
    times: Vec<NaiveTime>,
    tz: Tz,
    jobs: StdMutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
}

impl PipelineScheduler {
    pub fn new(ctx: PipelineCtx, times: Vec<NaiveTime>, tz: Tz) -> Self {
        Self {
            ctx,
            times,
            tz,
            jobs: StdMutex::new(Vec::new()),
            running: AtomicBool::new(false),
        }
    }

    /// Spawn one background job per configured time. Idempotent: a second
    /// call while running does nothing.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut jobs = match self.jobs.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for &at in &self.times {
            let ctx = self.ctx.clone();
            let tz = self.tz;
            jobs.push(tokio::spawn(async move {
                loop {
                    let now = Utc::now().with_timezone(&tz);
                    let next = next_occurrence(now, at);
                    let wait = (next - now)
                        .to_std()
                        .unwrap_or(Duration::from_secs(0));
                    info!(at = %at, next = %next, "scheduled pipeline run");
                    tokio::time::sleep(wait).await;
                    match run_pipeline(&ctx).await {
                        RunOutcome::Skipped { reason } => {
                            warn!(%reason, "scheduled run skipped")
                        }
                        RunOutcome::Completed { ingest, .. } => {
                            info!(saved = ingest.saved, "scheduled run completed")
                        }
                    }
                }
            }));
        }
        info!(jobs = jobs.len(), tz = %self.tz, "scheduler started");
    }

    /// Abort all background jobs. An in-flight run is cancelled at the
    /// next await point.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let mut jobs = match self.jobs.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for job in jobs.drain(..) {
            job.abort();
        }
        info!("scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Snapshot of the schedule. A stopped scheduler reports no jobs.
    pub fn status(&self) -> SchedulerStatus {
        if !self.is_running() {
            return SchedulerStatus {
                status: "stopped",
                jobs: Vec::new(),
            };
        }
        let now = Utc::now().with_timezone(&self.tz);
        let jobs = self
            .times
            .iter()
            .map(|&at| JobStatus {
                id: format!("daily-{}", at.format("%H:%M")),
                trigger: format!("daily at {} {}", at.format("%H:%M"), self.tz),
                next_run_time: next_occurrence(now, at).to_rfc3339(),
            })
            .collect();
        SchedulerStatus {
            status: "running",
            jobs,
        }
    }

    /// Fire one run in the background without waiting for the schedule.
    /// Returns immediately; the run queues behind any in-flight run.
    pub fn trigger_now(&self) {
        let ctx = self.ctx.clone();
        tokio::spawn(async move {
            let outcome = run_pipeline(&ctx).await;
            info!(?outcome, "manually triggered run finished");
        });
    }

    /// Run the pipeline once and wait for the outcome.
    pub async fn run_once(&self) -> RunOutcome {
        run_pipeline(&self.ctx).await
    }
}

async fn run_pipeline(ctx: &PipelineCtx) -> RunOutcome {
    let _guard = ctx.run_lock.lock().await;
    counter!("pipeline_runs_total").increment(1);

    let output = match ctx.producer.produce().await {
        Ok(output) => output,
        Err(e) => {
            error!(producer = ctx.producer.name(), error = %e, "producer failed");
            counter!("pipeline_runs_skipped_total").increment(1);
            return RunOutcome::Skipped {
                reason: format!("producer unavailable: {e}"),
            };
        }
    };

    let batch = normalize(output);
    for reason in &batch.dropped {
        warn!(%reason, "dropped producer element");
    }
    if batch.entities.is_empty() {
        counter!("pipeline_runs_skipped_total").increment(1);
        return RunOutcome::Skipped {
            reason: "producer output contained no usable news items".to_string(),
        };
    }

    let store = NewsStore::new(ctx.db.pool());
    let ingest = store.ingest(&batch.entities).await;

    let fanout = if ingest.saved > 0 {
        Some(notify_devices(ctx, ingest.saved).await)
    } else {
        info!("nothing new saved, skipping notification");
        None
    };

    RunOutcome::Completed { ingest, fanout }
}

async fn notify_devices(ctx: &PipelineCtx, saved: usize) -> FanoutSummary {
    let registry = DeviceRegistry::new(ctx.db.pool());
    let tokens = match registry.tokens(true).await {
        Ok(tokens) => tokens,
        Err(e) => {
            error!(error = %e, "failed to load device tokens");
            return FanoutSummary::default();
        }
    };

    let body = if saved == 1 {
        "1 new market-moving news analysis is available!".to_string()
    } else {
        format!("{saved} new market-moving news analyses are available!")
    };
    // Data values go out as strings; mobile clients parse them that way.
    let data = serde_json::json!({
        "type": "news_update",
        "saved_count": saved.to_string(),
        "timestamp": Utc::now().to_rfc3339(),
    });

    send_to_all(ctx.transport.as_ref(), &tokens, NOTIFICATION_TITLE, &body, &data).await
}

/// Next wall-clock occurrence of `at` in the timezone of `now`, strictly
/// after `now`. Steps forward by days over DST gaps where the local time
/// does not exist.
fn next_occurrence(now: DateTime<Tz>, at: NaiveTime) -> DateTime<Tz> {
    let tz = now.timezone();
    let mut date = now.date_naive();
    loop {
        if let Some(candidate) = tz.from_local_datetime(&date.and_time(at)).earliest() {
            if candidate > now {
                return candidate;
            }
        }
        date = date.succ_opt().unwrap_or(date);
    }
}
