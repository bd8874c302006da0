use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::pipeline::{DecisionPipeline, PipelineReport};

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub paused: bool,
    pub symbols: Vec<String>,
    pub interval_seconds: u64,
    pub simulate: bool,
    pub last_run: Option<DateTime<Utc>>,
}

struct SchedulerInner {
    pipeline: Arc<DecisionPipeline>,
    symbols: Vec<String>,
    interval: Duration,
    simulate: bool,
    paused: AtomicBool,
    last_run: RwLock<Option<DateTime<Utc>>>,
}

/// Periodic auto-pipeline runs over the configured symbols.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    pub fn new(
        pipeline: Arc<DecisionPipeline>,
        symbols: Vec<String>,
        interval: Duration,
        simulate: bool,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                pipeline,
                symbols,
                interval,
                simulate,
                paused: AtomicBool::new(false),
                last_run: RwLock::new(None),
            }),
        }
    }

    pub fn pause(&self) {
        self.inner.paused.store(true, Ordering::SeqCst);
        tracing::info!("Scheduler paused");
    }

    pub fn resume(&self) {
        self.inner.paused.store(false, Ordering::SeqCst);
        tracing::info!("Scheduler resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }

    pub async fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            paused: self.is_paused(),
            symbols: self.inner.symbols.clone(),
            interval_seconds: self.inner.interval.as_secs(),
            simulate: self.inner.simulate,
            last_run: *self.inner.last_run.read().await,
        }
    }

    /// One pass over every symbol, concurrently. Runs even while paused.
    pub async fn run_once(&self) -> Vec<PipelineReport> {
        let inner = &self.inner;
        *inner.last_run.write().await = Some(Utc::now());

        let runs = inner
            .symbols
            .iter()
            .map(|symbol| inner.pipeline.run_auto(symbol, inner.simulate));
        let reports = join_all(runs).await;

        tracing::info!(
            "Scheduler pass complete: {} symbol(s), {} logged",
            reports.len(),
            reports.iter().filter(|r| r.logged).count()
        );
        reports
    }

    /// Start the interval loop. The first pass happens one interval after start.
    pub fn spawn(&self) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(scheduler.inner.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;

            tracing::info!(
                "Scheduler started: polling {:?} every {}s",
                scheduler.inner.symbols,
                scheduler.inner.interval.as_secs()
            );

            loop {
                ticker.tick().await;
                if scheduler.is_paused() {
                    tracing::debug!("Scheduler paused, skipping tick");
                    continue;
                }
                scheduler.run_once().await;
            }
        })
    }
}
