use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, LocalResult, Months, NaiveTime, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Lookback period that decides which bookings a report includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TimeWindow {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl TimeWindow {
    /// Narrowest first.
    pub const ALL: [TimeWindow; 5] = [
        TimeWindow::Daily,
        TimeWindow::Weekly,
        TimeWindow::Monthly,
        TimeWindow::Quarterly,
        TimeWindow::Yearly,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TimeWindow::Daily => "daily",
            TimeWindow::Weekly => "weekly",
            TimeWindow::Monthly => "monthly",
            TimeWindow::Quarterly => "quarterly",
            TimeWindow::Yearly => "yearly",
        }
    }

    /// Earliest instant still inside the window, evaluated against `now`.
    ///
    /// Daily snaps to local midnight; every other window is a rolling
    /// lookback from `now`.
    pub fn cutoff<Tz: TimeZone>(self, now: &DateTime<Tz>) -> DateTime<Utc> {
        match self {
            TimeWindow::Daily => start_of_day(now),
            TimeWindow::Weekly => (now.clone() - Duration::days(7)).with_timezone(&Utc),
            TimeWindow::Monthly => months_back(now, 1),
            TimeWindow::Quarterly => months_back(now, 3),
            TimeWindow::Yearly => months_back(now, 12),
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeWindow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(TimeWindow::Daily),
            "weekly" => Ok(TimeWindow::Weekly),
            "monthly" => Ok(TimeWindow::Monthly),
            "quarterly" => Ok(TimeWindow::Quarterly),
            "yearly" => Ok(TimeWindow::Yearly),
            other => Err(format!("unknown time window: {other}")),
        }
    }
}

fn start_of_day<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Utc> {
    let midnight = now.date_naive().and_time(NaiveTime::MIN);
    match now.timezone().from_local_datetime(&midnight) {
        LocalResult::Single(start) => start.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        // Midnight falls in a DST gap: read it with the offset in effect now.
        LocalResult::None => {
            let offset = i64::from(now.offset().fix().local_minus_utc());
            (midnight - Duration::seconds(offset)).and_utc()
        }
    }
}

// Calendar months, clamped to the end of shorter months (Mar 31 -> Feb 28).
fn months_back<Tz: TimeZone>(now: &DateTime<Tz>, months: u32) -> DateTime<Utc> {
    match now.clone().checked_sub_months(Months::new(months)) {
        Some(cutoff) => cutoff.with_timezone(&Utc),
        None => now
            .naive_utc()
            .checked_sub_months(Months::new(months))
            .map(|naive| naive.and_utc())
            .unwrap_or(DateTime::<Utc>::MIN_UTC),
    }
}
