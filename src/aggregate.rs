use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

use crate::models::{BookingRecord, PaymentStatus};
use crate::window::TimeWindow;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub total_bookings: u64,
    pub paid_count: u64,
    pub unpaid_count: u64,
    pub total_revenue_minor_units: u64,
}

/// Records without a timestamp are never filtered out.
pub fn in_window(record: &BookingRecord, cutoff: DateTime<Utc>) -> bool {
    record
        .created_at
        .map_or(true, |created_at| created_at >= cutoff)
}

pub fn summarize(records: &[BookingRecord], cutoff: DateTime<Utc>) -> MetricsSnapshot {
    let mut metrics = MetricsSnapshot::default();

    for record in records {
        if !in_window(record, cutoff) {
            continue;
        }

        match record.payment_status {
            PaymentStatus::Paid => {
                metrics.paid_count += 1;
                if let Some(amount) = record.amount {
                    metrics.total_revenue_minor_units =
                        metrics.total_revenue_minor_units.saturating_add(amount);
                }
            }
            PaymentStatus::Unpaid => metrics.unpaid_count += 1,
            PaymentStatus::Other(_) | PaymentStatus::Unset => {}
        }
    }

    metrics.total_bookings = metrics.paid_count + metrics.unpaid_count;
    metrics
}

pub fn summarize_window<Tz: TimeZone>(
    records: &[BookingRecord],
    window: TimeWindow,
    now: &DateTime<Tz>,
) -> MetricsSnapshot {
    summarize(records, window.cutoff(now))
}

/// Metrics for every window, narrowest first.
pub fn summarize_all<Tz: TimeZone>(
    records: &[BookingRecord],
    now: &DateTime<Tz>,
) -> Vec<(TimeWindow, MetricsSnapshot)> {
    TimeWindow::ALL
        .iter()
        .map(|window| (*window, summarize_window(records, *window, now)))
        .collect()
}
