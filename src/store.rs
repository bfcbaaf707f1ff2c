use std::time::Duration;

use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::db;
use crate::models::{BookingRecord, ClinicId};

/// Channel the `bookings_notify` trigger publishes on.
pub const BOOKINGS_CHANNEL: &str = "clinic_portal_bookings";

const SUBSCRIPTION_BUFFER: usize = 16;
const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(1);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("record store unavailable: {0}")]
    Unavailable(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("record feed closed")]
    Closed,
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        let insufficient_privilege = err
            .as_database_error()
            .and_then(|db_err| db_err.code())
            .is_some_and(|code| code == "42501");

        if insufficient_privilege {
            StoreError::PermissionDenied(err.to_string())
        } else {
            StoreError::Unavailable(err.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// Complete current result set for the subscription's filter.
    Snapshot(Vec<BookingRecord>),
    Failed(StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingFilter {
    pub clinic_id: ClinicId,
}

/// Live, clinic-scoped booking feed. Dropping the handle unsubscribes.
pub struct Subscription {
    events: mpsc::Receiver<StoreEvent>,
    feed: Option<JoinHandle<()>>,
}

impl Subscription {
    #[cfg(test)]
    pub fn new(events: mpsc::Receiver<StoreEvent>) -> Self {
        Self { events, feed: None }
    }

    pub fn with_feed(events: mpsc::Receiver<StoreEvent>, feed: JoinHandle<()>) -> Self {
        Self {
            events,
            feed: Some(feed),
        }
    }

    /// `None` once the store has closed the feed.
    pub async fn next(&mut self) -> Option<StoreEvent> {
        self.events.recv().await
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.events.close();
        if let Some(feed) = self.feed.take() {
            feed.abort();
        }
    }
}

/// Source of live booking snapshots. Tenant filtering happens here, never
/// in the consumer.
pub trait RecordStore: Send + Sync {
    fn subscribe(&self, filter: BookingFilter) -> Subscription;
}

/// Bookings table watched through `LISTEN/NOTIFY` on [`BOOKINGS_CHANNEL`].
/// The notification payload is the clinic id of the changed row.
#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl RecordStore for PgRecordStore {
    fn subscribe(&self, filter: BookingFilter) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let pool = self.pool.clone();

        tracing::info!(clinic_id = %filter.clinic_id, channel = BOOKINGS_CHANNEL, "Opening booking feed");
        let feed = tokio::spawn(async move { feed_bookings(pool, filter, tx).await });

        Subscription::with_feed(rx, feed)
    }
}

async fn feed_bookings(pool: PgPool, filter: BookingFilter, tx: mpsc::Sender<StoreEvent>) {
    let mut retry_delay = INITIAL_RETRY_DELAY;

    loop {
        let mut delivered = false;
        match stream_bookings(&pool, filter, &tx, &mut delivered).await {
            Ok(()) => {
                tracing::debug!(clinic_id = %filter.clinic_id, "Booking feed subscriber gone");
                return;
            }
            Err(error) => {
                let (wait, next) = retry_delays(retry_delay, delivered);
                retry_delay = next;
                tracing::warn!(
                    clinic_id = %filter.clinic_id,
                    error = %error,
                    retry_in_secs = wait.as_secs(),
                    "Booking feed interrupted"
                );
                if tx.send(StoreEvent::Failed(error)).await.is_err() {
                    return;
                }
                tokio::time::sleep(wait).await;
            }
        }
    }
}

/// Delay before the next reconnect and the one to use if that attempt fails
/// too. A delivered snapshot resets the backoff.
fn retry_delays(current: Duration, delivered: bool) -> (Duration, Duration) {
    let wait = if delivered {
        INITIAL_RETRY_DELAY
    } else {
        current
    };
    (wait, (wait * 2).min(MAX_RETRY_DELAY))
}

// `None` from the listener means its connection dropped and was re-opened;
// whatever was notified in between is gone, so the snapshot can't be trusted.
fn concerns_clinic(payload: Option<&str>, clinic_key: &str) -> Result<bool, StoreError> {
    match payload {
        Some(payload) => Ok(payload == clinic_key),
        None => Err(StoreError::Unavailable(
            "notification connection lost".to_string(),
        )),
    }
}

// Returns Ok only when the receiving side has gone away.
async fn stream_bookings(
    pool: &PgPool,
    filter: BookingFilter,
    tx: &mpsc::Sender<StoreEvent>,
    delivered: &mut bool,
) -> Result<(), StoreError> {
    let mut listener = PgListener::connect_with(pool).await?;
    listener.listen(BOOKINGS_CHANNEL).await?;
    let clinic_key = filter.clinic_id.to_string();

    loop {
        let records = db::fetch_bookings(pool, filter.clinic_id).await?;
        tracing::debug!(clinic_id = %filter.clinic_id, records = records.len(), "Booking snapshot loaded");
        if tx.send(StoreEvent::Snapshot(records)).await.is_err() {
            return Ok(());
        }
        *delivered = true;

        loop {
            let notification = listener.try_recv().await?;
            let payload = notification.as_ref().map(|notification| notification.payload());
            if concerns_clinic(payload, &clinic_key)? {
                break;
            }
        }
    }
}

#[cfg(test)]
pub mod memory {
    use std::sync::Mutex;

    use super::*;

    /// In-process store for exercising subscribers without a database.
    #[derive(Default)]
    pub struct MemoryStore {
        records: Mutex<Vec<BookingRecord>>,
        subscribers: Mutex<Vec<(BookingFilter, mpsc::Sender<StoreEvent>)>>,
        opened: Mutex<Vec<BookingFilter>>,
    }

    impl MemoryStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn replace(&self, records: Vec<BookingRecord>) {
            *self.records.lock().unwrap() = records;
            let subscribers = self.subscribers.lock().unwrap();
            for (filter, tx) in subscribers.iter() {
                let _ = tx.try_send(StoreEvent::Snapshot(self.matching(*filter)));
            }
        }

        pub fn fail(&self, error: StoreError) {
            for (_, tx) in self.subscribers.lock().unwrap().iter() {
                let _ = tx.try_send(StoreEvent::Failed(error.clone()));
            }
        }

        /// Drops every sender so subscribers see the feed end.
        pub fn close_all(&self) {
            self.subscribers.lock().unwrap().clear();
        }

        pub fn active_subscribers(&self) -> usize {
            self.subscribers
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, tx)| !tx.is_closed())
                .count()
        }

        pub fn opened(&self) -> Vec<BookingFilter> {
            self.opened.lock().unwrap().clone()
        }

        fn matching(&self, filter: BookingFilter) -> Vec<BookingRecord> {
            self.records
                .lock()
                .unwrap()
                .iter()
                .filter(|record| record.clinic_id == filter.clinic_id)
                .cloned()
                .collect()
        }
    }

    impl RecordStore for MemoryStore {
        fn subscribe(&self, filter: BookingFilter) -> Subscription {
            let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
            let _ = tx.try_send(StoreEvent::Snapshot(self.matching(filter)));
            self.opened.lock().unwrap().push(filter);
            self.subscribers.lock().unwrap().push((filter, tx));
            Subscription::new(rx)
        }
    }
}
