use std::sync::Arc;

use chrono::{DateTime, Local};
use tokio::sync::watch;

use crate::aggregate::{self, MetricsSnapshot};
use crate::models::BookingRecord;
use crate::store::StoreError;
use crate::window::TimeWindow;

pub type Clock = Arc<dyn Fn() -> DateTime<Local> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedStatus {
    /// No clinic signed in, nothing subscribed.
    Waiting,
    /// Subscribed, first snapshot not in yet.
    Connecting,
    Live,
    /// The feed reported a failure; metrics are from the last good snapshot.
    Failed(String),
}

/// What the display layer renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineView {
    pub window: TimeWindow,
    pub metrics: Option<MetricsSnapshot>,
    pub status: FeedStatus,
}

/// Keeps the latest booking snapshot and the selected window, and publishes
/// freshly computed metrics whenever either changes.
pub struct AggregationEngine {
    window: TimeWindow,
    records: Option<Vec<BookingRecord>>,
    clock: Clock,
    output: watch::Sender<EngineView>,
}

impl AggregationEngine {
    pub fn new(window: TimeWindow) -> Self {
        Self::with_clock(window, Arc::new(Local::now))
    }

    pub fn with_clock(window: TimeWindow, clock: Clock) -> Self {
        let (output, _) = watch::channel(EngineView {
            window,
            metrics: None,
            status: FeedStatus::Waiting,
        });
        Self {
            window,
            records: None,
            clock,
            output,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<EngineView> {
        self.output.subscribe()
    }

    pub fn set_time_window(&mut self, window: TimeWindow) {
        self.window = window;
        let status = self.output.borrow().status.clone();
        let metrics = self.compute();
        tracing::debug!(window = %window, "Time window changed");
        self.publish(metrics, status);
    }

    pub fn on_snapshot(&mut self, records: Vec<BookingRecord>) {
        self.records = Some(records);
        let metrics = self.compute();
        self.publish(metrics, FeedStatus::Live);
    }

    pub fn on_subscription_error(&mut self, error: &StoreError) {
        tracing::warn!(error = %error, window = %self.window, "Live booking updates failed");
        let metrics = self.output.borrow().metrics;
        self.publish(metrics, FeedStatus::Failed(error.to_string()));
    }

    pub fn mark_waiting(&mut self) {
        self.records = None;
        self.publish(None, FeedStatus::Waiting);
    }

    /// A new feed replaces whatever the previous one delivered.
    pub fn begin_feed(&mut self) {
        self.records = None;
        self.publish(None, FeedStatus::Connecting);
    }

    fn compute(&self) -> Option<MetricsSnapshot> {
        let records = self.records.as_deref()?;
        let now = (self.clock)();
        Some(aggregate::summarize_window(records, self.window, &now))
    }

    fn publish(&self, metrics: Option<MetricsSnapshot>, status: FeedStatus) {
        self.output.send_replace(EngineView {
            window: self.window,
            metrics,
            status,
        });
    }
}
