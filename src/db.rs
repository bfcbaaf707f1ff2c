use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{
    ApprovalDecision, ApprovalStatus, BookingRecord, ClinicId, ClinicProfile, Consultant,
    RawBooking,
};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let clinic_id: Uuid = sqlx::query(
        r#"
        INSERT INTO clinic_portal.clinics (id, clinic_name, email, address, latitude, longitude)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (email) DO UPDATE
        SET clinic_name = EXCLUDED.clinic_name, address = EXCLUDED.address
        RETURNING id
        "#,
    )
    .bind(Uuid::parse_str("6f1c2a7e-3b4d-4c8a-9e21-5d7f0b9a1c33")?)
    .bind("NeoCare Maternity Clinic")
    .bind("frontdesk@neocare.ph")
    .bind("118 Kalaw Ave, Ermita, Manila")
    .bind(14.5826_f64)
    .bind(120.9787_f64)
    .fetch_one(pool)
    .await?
    .get("id");

    let consultants = vec![
        (
            Uuid::parse_str("a3e9b7c1-52d4-4f0e-8c6b-1f2d3e4a5b6c")?,
            "Dr. Liza Ramos",
            "Obstetrics",
            "liza.ramos@neocare.ph",
        ),
        (
            Uuid::parse_str("b4f0c8d2-63e5-4a1f-9d7c-2a3e4f5b6c7d")?,
            "Marco Dizon, RN",
            "Lactation Consulting",
            "marco.dizon@neocare.ph",
        ),
        (
            Uuid::parse_str("c5a1d9e3-74f6-4b2a-8e8d-3b4f5a6c7d8e")?,
            "Dr. Ana Villanueva",
            "Pediatrics",
            "ana.villanueva@neocare.ph",
        ),
    ];

    for (id, name, specialty, email) in consultants {
        sqlx::query(
            r#"
            INSERT INTO clinic_portal.consultants (id, clinic_id, name, specialty, email)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (email) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(clinic_id)
        .bind(name)
        .bind(specialty)
        .bind(email)
        .execute(pool)
        .await?;
    }

    let now = Utc::now();
    let bookings = vec![
        ("seed-001", Some("paid"), Some(json!(150_000)), Some(now)),
        ("seed-002", Some("unpaid"), None, Some(now - Duration::hours(2))),
        ("seed-003", Some("paid"), Some(json!(85_000)), Some(now - Duration::days(3))),
        ("seed-004", Some("paid"), Some(json!(120_000)), Some(now - Duration::days(20))),
        ("seed-005", Some("unpaid"), None, Some(now - Duration::days(45))),
        ("seed-006", Some("paid"), Some(json!(200_000)), Some(now - Duration::days(200))),
        ("seed-007", Some("paid"), Some(json!(95_000)), Some(now - Duration::days(730))),
        ("seed-008", Some("refunded"), Some(json!(60_000)), Some(now - Duration::days(5))),
        ("seed-009", Some("paid"), Some(json!(50_000)), None),
    ];

    for (source_key, payment_status, amount, created_at) in bookings {
        sqlx::query(
            r#"
            INSERT INTO clinic_portal.bookings
            (id, clinic_id, payment_status, amount, created_at, source_key)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(clinic_id)
        .bind(payment_status)
        .bind(amount)
        .bind(created_at)
        .bind(source_key)
        .execute(pool)
        .await?;
    }

    Ok(())
}

/// Every booking of one clinic, validated field by field.
pub async fn fetch_bookings(
    pool: &PgPool,
    clinic_id: ClinicId,
) -> Result<Vec<BookingRecord>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT id, clinic_id, payment_status, amount, created_at
        FROM clinic_portal.bookings
        WHERE clinic_id = $1
        "#,
    )
    .bind(clinic_id.0)
    .fetch_all(pool)
    .await?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let raw = RawBooking {
            id: row.try_get("id")?,
            clinic_id: row.try_get("clinic_id")?,
            payment_status: row.try_get::<Option<String>, _>("payment_status").ok().flatten(),
            amount: row.try_get::<Option<Value>, _>("amount").ok().flatten(),
            created_at: row
                .try_get::<Option<DateTime<Utc>>, _>("created_at")
                .ok()
                .flatten(),
        };
        records.push(BookingRecord::from_raw(raw));
    }

    Ok(records)
}

pub async fn find_clinic_by_email(pool: &PgPool, email: &str) -> anyhow::Result<Option<ClinicId>> {
    let row = sqlx::query("SELECT id FROM clinic_portal.clinics WHERE lower(email) = lower($1)")
        .bind(email.trim())
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|row| ClinicId(row.get("id"))))
}

pub async fn clinic_profile(pool: &PgPool, clinic_id: ClinicId) -> anyhow::Result<ClinicProfile> {
    let row = sqlx::query(
        r#"
        SELECT id, clinic_name, email, address, latitude, longitude
        FROM clinic_portal.clinics
        WHERE id = $1
        "#,
    )
    .bind(clinic_id.0)
    .fetch_optional(pool)
    .await?
    .with_context(|| format!("no clinic profile for {clinic_id}"))?;

    let latitude: Option<f64> = row.get("latitude");
    let longitude: Option<f64> = row.get("longitude");

    Ok(ClinicProfile {
        id: ClinicId(row.get("id")),
        clinic_name: row.get("clinic_name"),
        email: row.get("email"),
        address: row.get("address"),
        location: latitude.zip(longitude),
    })
}

pub async fn clinic_name(pool: &PgPool, clinic_id: ClinicId) -> anyhow::Result<String> {
    Ok(clinic_profile(pool, clinic_id).await?.clinic_name)
}

pub async fn pending_consultants(
    pool: &PgPool,
    clinic_id: ClinicId,
) -> anyhow::Result<Vec<Consultant>> {
    let rows = sqlx::query(
        r#"
        SELECT id, name, specialty, email, applied_at
        FROM clinic_portal.consultants
        WHERE clinic_id = $1 AND approval_status = $2
        ORDER BY applied_at, name
        "#,
    )
    .bind(clinic_id.0)
    .bind(ApprovalStatus::Pending.as_str())
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| Consultant {
            id: row.get("id"),
            name: row.get("name"),
            specialty: row.get("specialty"),
            email: row.get("email"),
            applied_at: row.get("applied_at"),
        })
        .collect())
}

pub async fn decide_consultant(
    pool: &PgPool,
    clinic_id: ClinicId,
    consultant_id: Uuid,
    decision: ApprovalDecision,
) -> anyhow::Result<()> {
    let hourly_rate = checked_hourly_rate(decision)?;

    let result = sqlx::query(
        r#"
        UPDATE clinic_portal.consultants
        SET approval_status = $3, hourly_rate = $4, reviewed_at = now()
        WHERE id = $1 AND clinic_id = $2 AND approval_status = $5
        "#,
    )
    .bind(consultant_id)
    .bind(clinic_id.0)
    .bind(decision.status().as_str())
    .bind(hourly_rate)
    .bind(ApprovalStatus::Pending.as_str())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        anyhow::bail!("consultant {consultant_id} not found or already reviewed");
    }

    tracing::info!(
        clinic_id = %clinic_id,
        consultant_id = %consultant_id,
        status = decision.status().as_str(),
        "Consultant application reviewed"
    );
    Ok(())
}

fn checked_hourly_rate(decision: ApprovalDecision) -> anyhow::Result<Option<i64>> {
    match decision.hourly_rate() {
        None => Ok(None),
        Some(0) => anyhow::bail!("hourly rate must be greater than zero"),
        Some(rate) => Ok(Some(
            i64::try_from(rate).context("hourly rate is too large")?,
        )),
    }
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        clinic_email: String,
        payment_status: Option<String>,
        amount: Option<String>,
        created_at: Option<String>,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut inserted = 0usize;

    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let line = index + 2;
        let row = result.with_context(|| format!("malformed row at line {line}"))?;

        let clinic_id = find_clinic_by_email(pool, &row.clinic_email)
            .await?
            .with_context(|| format!("unknown clinic {} at line {line}", row.clinic_email))?;
        let created_at = parse_timestamp_cell(row.created_at.as_deref())
            .with_context(|| format!("invalid created_at at line {line}"))?;

        let source_key = row
            .source_key
            .filter(|key| !key.trim().is_empty())
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        let result = sqlx::query(
            r#"
            INSERT INTO clinic_portal.bookings
            (id, clinic_id, payment_status, amount, created_at, source_key)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(clinic_id.0)
        .bind(row.payment_status.filter(|status| !status.trim().is_empty()))
        .bind(parse_amount_cell(row.amount.as_deref()))
        .bind(created_at)
        .bind(source_key)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}

// Numbers are stored as JSON numbers, anything else verbatim as a string.
fn parse_amount_cell(cell: Option<&str>) -> Option<Value> {
    let cell = cell?.trim();
    if cell.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(cell) {
        Ok(number @ Value::Number(_)) => Some(number),
        _ => Some(Value::String(cell.to_string())),
    }
}

fn parse_timestamp_cell(cell: Option<&str>) -> anyhow::Result<Option<DateTime<Utc>>> {
    match cell.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => Ok(Some(
            DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc),
        )),
    }
}
