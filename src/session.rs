use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::engine::AggregationEngine;
use crate::identity::IdentityProvider;
use crate::models::ClinicId;
use crate::store::{BookingFilter, RecordStore, StoreError, StoreEvent};
use crate::window::TimeWindow;

enum Next {
    IdentityChanged,
    Shutdown,
}

/// Hosts the engine for one live view: follows the signed-in clinic, owns
/// its booking subscription and applies window changes from the operator.
pub struct ReportSession {
    identity: Arc<dyn IdentityProvider>,
    store: Arc<dyn RecordStore>,
    engine: AggregationEngine,
}

impl ReportSession {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn RecordStore>,
        engine: AggregationEngine,
    ) -> Self {
        Self {
            identity,
            store,
            engine,
        }
    }

    /// Runs until `windows` closes. The subscription is released on return.
    pub async fn run(mut self, mut windows: mpsc::Receiver<TimeWindow>) {
        let mut identity = self.identity.watch();

        loop {
            let clinic = *identity.borrow_and_update();
            let next = match clinic {
                None => self.wait_for_clinic(&mut identity, &mut windows).await,
                Some(clinic_id) => {
                    self.follow_clinic(clinic_id, &mut identity, &mut windows)
                        .await
                }
            };

            if let Next::Shutdown = next {
                tracing::info!("Report session finished");
                return;
            }
        }
    }

    async fn wait_for_clinic(
        &mut self,
        identity: &mut watch::Receiver<Option<ClinicId>>,
        windows: &mut mpsc::Receiver<TimeWindow>,
    ) -> Next {
        tracing::info!("Waiting for a clinic to sign in");
        self.engine.mark_waiting();

        loop {
            tokio::select! {
                changed = identity.changed() => {
                    return match changed {
                        Ok(()) => Next::IdentityChanged,
                        Err(_) => Next::Shutdown,
                    };
                }
                window = windows.recv() => match window {
                    Some(window) => self.engine.set_time_window(window),
                    None => return Next::Shutdown,
                },
            }
        }
    }

    async fn follow_clinic(
        &mut self,
        clinic_id: ClinicId,
        identity: &mut watch::Receiver<Option<ClinicId>>,
        windows: &mut mpsc::Receiver<TimeWindow>,
    ) -> Next {
        let mut subscription = self.store.subscribe(BookingFilter { clinic_id });
        self.engine.begin_feed();
        let mut feed_open = true;

        loop {
            tokio::select! {
                event = subscription.next(), if feed_open => match event {
                    Some(StoreEvent::Snapshot(records)) => {
                        tracing::debug!(clinic_id = %clinic_id, records = records.len(), "Booking snapshot received");
                        self.engine.on_snapshot(records);
                    }
                    Some(StoreEvent::Failed(error)) => self.engine.on_subscription_error(&error),
                    None => {
                        feed_open = false;
                        self.engine.on_subscription_error(&StoreError::Closed);
                    }
                },
                changed = identity.changed() => {
                    subscription.unsubscribe();
                    return match changed {
                        Ok(()) => Next::IdentityChanged,
                        Err(_) => Next::Shutdown,
                    };
                }
                window = windows.recv() => match window {
                    Some(window) => self.engine.set_time_window(window),
                    None => return Next::Shutdown,
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::engine::{EngineView, FeedStatus};
    use crate::identity::SessionIdentity;
    use crate::models::{BookingRecord, PaymentStatus};
    use crate::store::memory::MemoryStore;
    use uuid::Uuid;

    fn booking(clinic_id: ClinicId, status: PaymentStatus, amount: Option<u64>) -> BookingRecord {
        BookingRecord {
            id: Uuid::new_v4(),
            clinic_id,
            payment_status: status,
            amount,
            created_at: None,
        }
    }

    async fn next_view(
        view: &mut watch::Receiver<EngineView>,
        accept: impl Fn(&EngineView) -> bool,
    ) -> EngineView {
        let wait = async {
            loop {
                view.changed().await.expect("engine dropped");
                let current = view.borrow_and_update().clone();
                if accept(&current) {
                    return current;
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(5), wait)
            .await
            .expect("no matching view published")
    }

    struct Harness {
        identity: Arc<SessionIdentity>,
        store: Arc<MemoryStore>,
        windows: mpsc::Sender<TimeWindow>,
        view: watch::Receiver<EngineView>,
        task: tokio::task::JoinHandle<()>,
    }

    fn start(identity: SessionIdentity, store: MemoryStore) -> Harness {
        let identity = Arc::new(identity);
        let store = Arc::new(store);
        let engine = AggregationEngine::new(TimeWindow::Monthly);
        let view = engine.subscribe();
        let (windows, rx) = mpsc::channel(8);
        let session = ReportSession::new(identity.clone(), store.clone(), engine);
        let task = tokio::spawn(session.run(rx));
        Harness {
            identity,
            store,
            windows,
            view,
            task,
        }
    }

    #[tokio::test]
    async fn signed_out_session_opens_no_subscription() {
        let mut harness = start(SessionIdentity::signed_out(), MemoryStore::new());

        harness.windows.send(TimeWindow::Daily).await.unwrap();
        let view = next_view(&mut harness.view, |v| v.window == TimeWindow::Daily).await;

        assert_eq!(view.status, FeedStatus::Waiting);
        assert!(harness.store.opened().is_empty());
    }

    #[tokio::test]
    async fn publishes_snapshots_for_signed_in_clinic() {
        let clinic_id = ClinicId(Uuid::new_v4());
        let store = MemoryStore::new();
        store.replace(vec![
            booking(clinic_id, PaymentStatus::Paid, Some(1000)),
            booking(clinic_id, PaymentStatus::Unpaid, None),
        ]);
        let mut harness = start(SessionIdentity::signed_in(clinic_id), store);

        let view = next_view(&mut harness.view, |v| v.status == FeedStatus::Live).await;
        let metrics = view.metrics.unwrap();
        assert_eq!(metrics.total_bookings, 2);
        assert_eq!(metrics.total_revenue_minor_units, 1000);

        harness
            .store
            .replace(vec![booking(clinic_id, PaymentStatus::Paid, Some(4000))]);
        let view = next_view(&mut harness.view, |v| {
            v.metrics.is_some_and(|m| m.total_revenue_minor_units == 4000)
        })
        .await;
        assert_eq!(view.metrics.unwrap().total_bookings, 1);
    }

    #[tokio::test]
    async fn failure_is_reported_and_metrics_kept() {
        let clinic_id = ClinicId(Uuid::new_v4());
        let store = MemoryStore::new();
        store.replace(vec![booking(clinic_id, PaymentStatus::Paid, Some(1000))]);
        let mut harness = start(SessionIdentity::signed_in(clinic_id), store);
        next_view(&mut harness.view, |v| v.status == FeedStatus::Live).await;

        harness
            .store
            .fail(StoreError::PermissionDenied("bookings".to_string()));
        let view = next_view(&mut harness.view, |v| {
            matches!(v.status, FeedStatus::Failed(_))
        })
        .await;
        assert_eq!(view.metrics.unwrap().total_revenue_minor_units, 1000);
    }

    #[tokio::test]
    async fn closed_feed_still_serves_window_changes() {
        let clinic_id = ClinicId(Uuid::new_v4());
        let store = MemoryStore::new();
        store.replace(vec![booking(clinic_id, PaymentStatus::Paid, Some(1000))]);
        let mut harness = start(SessionIdentity::signed_in(clinic_id), store);
        next_view(&mut harness.view, |v| v.status == FeedStatus::Live).await;

        harness.store.close_all();
        next_view(&mut harness.view, |v| {
            v.status == FeedStatus::Failed(StoreError::Closed.to_string())
        })
        .await;

        harness.windows.send(TimeWindow::Yearly).await.unwrap();
        let view = next_view(&mut harness.view, |v| v.window == TimeWindow::Yearly).await;
        assert_eq!(view.metrics.unwrap().paid_count, 1);
    }

    #[tokio::test]
    async fn switching_clinic_resubscribes() {
        let first = ClinicId(Uuid::new_v4());
        let second = ClinicId(Uuid::new_v4());
        let store = MemoryStore::new();
        store.replace(vec![
            booking(first, PaymentStatus::Paid, Some(1000)),
            booking(second, PaymentStatus::Unpaid, None),
            booking(second, PaymentStatus::Unpaid, None),
        ]);
        let mut harness = start(SessionIdentity::signed_in(first), store);
        next_view(&mut harness.view, |v| v.status == FeedStatus::Live).await;

        harness.identity.sign_in(second);
        let view = next_view(&mut harness.view, |v| {
            v.status == FeedStatus::Live && v.metrics.is_some_and(|m| m.unpaid_count == 2)
        })
        .await;

        assert_eq!(view.metrics.unwrap().paid_count, 0);
        assert_eq!(
            harness.store.opened(),
            vec![
                BookingFilter { clinic_id: first },
                BookingFilter { clinic_id: second }
            ]
        );
        assert_eq!(harness.store.active_subscribers(), 1);
    }

    #[tokio::test]
    async fn sign_out_releases_subscription() {
        let clinic_id = ClinicId(Uuid::new_v4());
        let mut harness = start(SessionIdentity::signed_in(clinic_id), MemoryStore::new());
        next_view(&mut harness.view, |v| v.status == FeedStatus::Live).await;

        harness.identity.sign_out();
        next_view(&mut harness.view, |v| v.status == FeedStatus::Waiting).await;
        assert_eq!(harness.store.active_subscribers(), 0);
    }

    #[tokio::test]
    async fn closing_window_channel_ends_session_and_unsubscribes() {
        let clinic_id = ClinicId(Uuid::new_v4());
        let mut harness = start(SessionIdentity::signed_in(clinic_id), MemoryStore::new());
        next_view(&mut harness.view, |v| v.status == FeedStatus::Live).await;

        drop(harness.windows);
        tokio::time::timeout(Duration::from_secs(5), harness.task)
            .await
            .expect("session did not stop")
            .unwrap();
        assert_eq!(harness.store.active_subscribers(), 0);
    }
}
