use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClinicId(pub Uuid);

impl fmt::Display for ClinicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentStatus {
    Paid,
    Unpaid,
    Other(String),
    Unset,
}

impl PaymentStatus {
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return PaymentStatus::Unset;
        };
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return PaymentStatus::Unset;
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "paid" => PaymentStatus::Paid,
            "unpaid" => PaymentStatus::Unpaid,
            _ => PaymentStatus::Other(trimmed.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            PaymentStatus::Paid => "paid",
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Other(raw) => raw.as_str(),
            PaymentStatus::Unset => "unset",
        }
    }
}

/// Booking row exactly as the store hands it over, before validation.
#[derive(Debug, Clone)]
pub struct RawBooking {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub payment_status: Option<String>,
    pub amount: Option<Value>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BookingRecord {
    pub id: Uuid,
    pub clinic_id: ClinicId,
    pub payment_status: PaymentStatus,
    /// Minor currency units; `None` when missing or not a usable number.
    pub amount: Option<u64>,
    pub created_at: Option<DateTime<Utc>>,
}

impl BookingRecord {
    /// Field-by-field validation: a bad field becomes absent, the record
    /// itself is always kept.
    pub fn from_raw(raw: RawBooking) -> Self {
        BookingRecord {
            id: raw.id,
            clinic_id: ClinicId(raw.clinic_id),
            payment_status: PaymentStatus::parse(raw.payment_status.as_deref()),
            amount: raw.amount.as_ref().and_then(minor_units),
            created_at: raw.created_at,
        }
    }
}

fn minor_units(value: &Value) -> Option<u64> {
    let Value::Number(number) = value else {
        return None;
    };
    if let Some(units) = number.as_u64() {
        return Some(units);
    }
    if number.is_i64() {
        return None;
    }
    let float = number.as_f64()?;
    if float.is_finite() && float >= 0.0 && float <= u64::MAX as f64 {
        Some(float.round() as u64)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalStatus {
    Pending,
    Accepted,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Accepted => "accepted",
            ApprovalStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    Accept { hourly_rate: Option<u64> },
    Reject,
}

impl ApprovalDecision {
    pub fn status(self) -> ApprovalStatus {
        match self {
            ApprovalDecision::Accept { .. } => ApprovalStatus::Accepted,
            ApprovalDecision::Reject => ApprovalStatus::Rejected,
        }
    }

    pub fn hourly_rate(self) -> Option<u64> {
        match self {
            ApprovalDecision::Accept { hourly_rate } => hourly_rate,
            ApprovalDecision::Reject => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Consultant {
    pub id: Uuid,
    pub name: String,
    pub specialty: String,
    pub email: String,
    pub applied_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ClinicProfile {
    pub id: ClinicId,
    pub clinic_name: String,
    pub email: Option<String>,
    pub address: Option<String>,
    pub location: Option<(f64, f64)>,
}

impl ClinicProfile {
    pub fn address_line(&self) -> String {
        match (&self.address, self.location) {
            (Some(address), _) if !address.trim().is_empty() => address.clone(),
            (_, Some((lat, lng))) => format!("Lat: {lat}, Lng: {lng}"),
            _ => "No address provided".to_string(),
        }
    }

    pub fn email_line(&self) -> &str {
        self.email.as_deref().unwrap_or("No email added")
    }
}
