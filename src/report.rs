use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::aggregate::MetricsSnapshot;
use crate::currency::CurrencyFormat;
use crate::models::BookingRecord;
use crate::window::TimeWindow;

pub struct ReportInput<'a> {
    pub clinic_name: &'a str,
    pub window: TimeWindow,
    pub cutoff: DateTime<Utc>,
    pub metrics: MetricsSnapshot,
    /// Narrowest window first.
    pub by_window: &'a [(TimeWindow, MetricsSnapshot)],
    pub bookings: &'a [BookingRecord],
}

pub fn build_report(input: &ReportInput<'_>, currency: &CurrencyFormat) -> String {
    let mut output = String::new();
    let metrics = &input.metrics;

    let _ = writeln!(output, "# Clinic Booking Report");
    let _ = writeln!(
        output,
        "Generated for {} ({} window, bookings since {})",
        input.clinic_name,
        input.window,
        input.cutoff.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Summary");

    if metrics.total_bookings == 0 {
        let _ = writeln!(output, "No paid or unpaid bookings in this window.");
    } else {
        let _ = writeln!(output, "- Total bookings: {}", metrics.total_bookings);
        let _ = writeln!(output, "- Paid: {}", metrics.paid_count);
        let _ = writeln!(output, "- Unpaid: {}", metrics.unpaid_count);
    }
    let _ = writeln!(
        output,
        "- Revenue: {}",
        currency.format_minor_units(metrics.total_revenue_minor_units)
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## By Window");
    let _ = writeln!(output, "| Window | Bookings | Paid | Unpaid | Revenue |");
    let _ = writeln!(output, "|---|---|---|---|---|");
    for (window, row) in input.by_window {
        let _ = writeln!(
            output,
            "| {} | {} | {} | {} | {} |",
            window,
            row.total_bookings,
            row.paid_count,
            row.unpaid_count,
            currency.format_minor_units(row.total_revenue_minor_units)
        );
    }

    let mut recent: Vec<&BookingRecord> = input
        .bookings
        .iter()
        .filter(|booking| booking.created_at.is_some())
        .collect();
    recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Bookings");

    if recent.is_empty() {
        let _ = writeln!(output, "No dated bookings on record.");
    } else {
        for booking in recent.iter().take(5) {
            let when = booking
                .created_at
                .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default();
            let amount = booking
                .amount
                .map(|amount| currency.format_minor_units(amount))
                .unwrap_or_else(|| "-".to_string());
            let _ = writeln!(
                output,
                "- {} {} ({})",
                when,
                booking.payment_status.label(),
                amount
            );
        }
    }

    output
}
