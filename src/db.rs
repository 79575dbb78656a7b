use std::path::Path;

use anyhow::Context;
use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::access::Capabilities;
use crate::buckets::{parse_date, ParseMode};
use crate::finance::FinanceKind;
use crate::files;
use crate::models::{
    ActivitySet, AttendanceRecord, Branch, EventRecord, FinanceRecord, MemberRecord, RecordKind,
};

/// Date floors for one report run, one per table.
#[derive(Debug, Clone, Copy)]
pub struct Floors {
    pub attendance: NaiveDate,
    pub members: NaiveDate,
    pub finance: NaiveDate,
    pub events: NaiveDate,
}

struct NewRecord {
    branch_id: Option<String>,
    date: NaiveDate,
    amount: Decimal,
    kind: FinanceKind,
    category: String,
    title: String,
    source_key: String,
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool, caps: Capabilities, today: NaiveDate) -> anyhow::Result<()> {
    caps.require_edit("seed")?;

    let branches = vec![
        Branch {
            id: "grace-central".into(),
            name: "Grace Central".into(),
            district: Some("north".into()),
        },
        Branch {
            id: "harbor-chapel".into(),
            name: "Harbor Chapel".into(),
            district: Some("north".into()),
        },
        Branch {
            id: "riverside".into(),
            name: "Riverside Fellowship".into(),
            district: Some("south".into()),
        },
    ];
    upsert_branches(pool, caps, &branches).await?;

    // (branch, services attended in the last weeks, members joined, events, weekly offering)
    let activity = [
        ("grace-central", 8, 3, 2, Decimal::new(125_000, 2)),
        ("harbor-chapel", 5, 1, 1, Decimal::new(64_050, 2)),
        ("riverside", 3, 0, 1, Decimal::new(31_000, 2)),
    ];

    for (branch_id, services, joined, events, offering) in activity {
        for week in 0..services {
            let date = today - Duration::weeks(week);
            let base = NewRecord {
                branch_id: Some(branch_id.to_string()),
                date,
                amount: Decimal::ZERO,
                kind: FinanceKind::Income,
                category: String::new(),
                title: String::new(),
                source_key: format!("seed-attendance-{branch_id}-{week}"),
            };
            insert_record(pool, RecordKind::Attendance, &base).await?;
            insert_record(
                pool,
                RecordKind::Finance,
                &NewRecord {
                    amount: offering,
                    category: "offering".into(),
                    source_key: format!("seed-finance-{branch_id}-{week}"),
                    ..base
                },
            )
            .await?;
        }
        for idx in 0..joined {
            let record = NewRecord {
                branch_id: Some(branch_id.to_string()),
                date: today - Duration::days(5 * (idx + 1)),
                amount: Decimal::ZERO,
                kind: FinanceKind::Income,
                category: String::new(),
                title: String::new(),
                source_key: format!("seed-members-{branch_id}-{idx}"),
            };
            insert_record(pool, RecordKind::Members, &record).await?;
        }
        for idx in 0..events {
            let record = NewRecord {
                branch_id: Some(branch_id.to_string()),
                date: today - Duration::days(10 * (idx + 1)),
                amount: Decimal::ZERO,
                kind: FinanceKind::Income,
                category: String::new(),
                title: format!("Community outreach {}", idx + 1),
                source_key: format!("seed-events-{branch_id}-{idx}"),
            };
            insert_record(pool, RecordKind::Events, &record).await?;
        }
        let rent = NewRecord {
            branch_id: Some(branch_id.to_string()),
            date: today - Duration::days(2),
            amount: Decimal::new(40_000, 2),
            kind: FinanceKind::Expense,
            category: "rent".into(),
            title: String::new(),
            source_key: format!("seed-rent-{branch_id}"),
        };
        insert_record(pool, RecordKind::Finance, &rent).await?;
    }

    Ok(())
}

pub async fn upsert_branches(
    pool: &PgPool,
    caps: Capabilities,
    branches: &[Branch],
) -> anyhow::Result<usize> {
    caps.require_edit("branch import")?;

    for branch in branches {
        sqlx::query(
            r#"
            INSERT INTO district_reports.branches (id, name, district)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name, district = EXCLUDED.district
            "#,
        )
        .bind(&branch.id)
        .bind(&branch.name)
        .bind(&branch.district)
        .execute(pool)
        .await?;
    }

    Ok(branches.len())
}

async fn insert_record(pool: &PgPool, kind: RecordKind, record: &NewRecord) -> anyhow::Result<bool> {
    let query = match kind {
        RecordKind::Attendance => sqlx::query(
            r#"
            INSERT INTO district_reports.attendance (id, branch_id, attendance_date, source_key)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&record.branch_id)
        .bind(record.date)
        .bind(&record.source_key),
        RecordKind::Members => sqlx::query(
            r#"
            INSERT INTO district_reports.members (id, branch_id, date_joined, source_key)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&record.branch_id)
        .bind(record.date)
        .bind(&record.source_key),
        RecordKind::Finance => sqlx::query(
            r#"
            INSERT INTO district_reports.finance
            (id, branch_id, transaction_date, amount, type, category, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&record.branch_id)
        .bind(record.date)
        .bind(record.amount)
        .bind(record.kind.as_str())
        .bind(&record.category)
        .bind(&record.source_key),
        RecordKind::Events => sqlx::query(
            r#"
            INSERT INTO district_reports.events (id, branch_id, event_date, title, source_key)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&record.branch_id)
        .bind(record.date)
        .bind(&record.title)
        .bind(&record.source_key),
    };

    let result = query.execute(pool).await?;
    Ok(result.rows_affected() > 0)
}

pub async fn import_csv(
    pool: &PgPool,
    caps: Capabilities,
    kind: RecordKind,
    csv_path: &Path,
    mode: ParseMode,
) -> anyhow::Result<usize> {
    #[derive(Deserialize)]
    struct CsvRow {
        branch_id: Option<String>,
        #[serde(
            alias = "attendance_date",
            alias = "date_joined",
            alias = "transaction_date",
            alias = "event_date"
        )]
        date: String,
        amount: Option<Decimal>,
        #[serde(rename = "type")]
        kind: Option<String>,
        category: Option<String>,
        title: Option<String>,
        source_key: Option<String>,
    }

    caps.require_edit("import")?;

    let rows: Vec<CsvRow> = files::read_rows(csv_path)?;
    let mut inserted = 0usize;

    for (idx, row) in rows.into_iter().enumerate() {
        let line = idx + 2;
        let date = parse_date(&row.date)
            .with_context(|| format!("line {line}: unparseable date '{}'", row.date))?;
        let (amount, finance_kind) = if kind == RecordKind::Finance {
            let amount = row
                .amount
                .with_context(|| format!("line {line}: finance rows need an amount"))?;
            let raw_kind = row.kind.as_deref().unwrap_or_default();
            let finance_kind = FinanceKind::classify(raw_kind, mode)
                .with_context(|| format!("line {line}"))?;
            (amount, finance_kind)
        } else {
            (Decimal::ZERO, FinanceKind::Income)
        };

        let record = NewRecord {
            branch_id: row.branch_id,
            date,
            amount,
            kind: finance_kind,
            category: row.category.unwrap_or_default(),
            title: row.title.unwrap_or_default(),
            source_key: row
                .source_key
                .unwrap_or_else(|| format!("import-{}", Uuid::new_v4())),
        };

        if insert_record(pool, kind, &record).await? {
            inserted += 1;
        }
    }

    Ok(inserted)
}

pub async fn fetch_branches(
    pool: &PgPool,
    district: Option<&str>,
    branch_ids: &[String],
) -> anyhow::Result<Vec<Branch>> {
    let mut query =
        String::from("SELECT id, name, district FROM district_reports.branches WHERE TRUE");
    let mut param = 0;

    if district.is_some() {
        param += 1;
        query.push_str(&format!(" AND district = ${param}"));
    }
    if !branch_ids.is_empty() {
        param += 1;
        query.push_str(&format!(" AND id = ANY(${param})"));
    }
    query.push_str(" ORDER BY name");

    let mut rows = sqlx::query(&query);
    if let Some(value) = district {
        rows = rows.bind(value);
    }
    if !branch_ids.is_empty() {
        rows = rows.bind(branch_ids);
    }

    let mut branches = Vec::new();
    for row in rows.fetch_all(pool).await? {
        branches.push(Branch {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            district: row.try_get("district")?,
        });
    }

    Ok(branches)
}

pub async fn fetch_attendance(
    pool: &PgPool,
    branch_ids: &[String],
    since: NaiveDate,
) -> anyhow::Result<Vec<AttendanceRecord>> {
    let rows = sqlx::query(
        "SELECT branch_id, attendance_date::text AS attendance_date \
         FROM district_reports.attendance \
         WHERE branch_id = ANY($1) AND attendance_date >= $2 \
         ORDER BY attendance_date",
    )
    .bind(branch_ids)
    .bind(since)
    .fetch_all(pool)
    .await?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        records.push(AttendanceRecord {
            branch_id: row.try_get("branch_id")?,
            attendance_date: row.try_get("attendance_date")?,
        });
    }
    Ok(records)
}

pub async fn fetch_members(
    pool: &PgPool,
    branch_ids: &[String],
    since: NaiveDate,
) -> anyhow::Result<Vec<MemberRecord>> {
    let rows = sqlx::query(
        "SELECT branch_id, date_joined::text AS date_joined \
         FROM district_reports.members \
         WHERE branch_id = ANY($1) AND date_joined >= $2 \
         ORDER BY date_joined",
    )
    .bind(branch_ids)
    .bind(since)
    .fetch_all(pool)
    .await?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        records.push(MemberRecord {
            branch_id: row.try_get("branch_id")?,
            date_joined: row.try_get("date_joined")?,
        });
    }
    Ok(records)
}

pub async fn fetch_finance(
    pool: &PgPool,
    branch_ids: &[String],
    since: NaiveDate,
) -> anyhow::Result<Vec<FinanceRecord>> {
    let rows = sqlx::query(
        "SELECT branch_id, transaction_date::text AS transaction_date, amount, type, category \
         FROM district_reports.finance \
         WHERE branch_id = ANY($1) AND transaction_date >= $2 \
         ORDER BY transaction_date",
    )
    .bind(branch_ids)
    .bind(since)
    .fetch_all(pool)
    .await?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        records.push(FinanceRecord {
            branch_id: row.try_get("branch_id")?,
            transaction_date: row.try_get("transaction_date")?,
            amount: row.try_get("amount")?,
            kind: row.try_get("type")?,
            category: row.try_get("category")?,
        });
    }
    Ok(records)
}

pub async fn fetch_events(
    pool: &PgPool,
    branch_ids: &[String],
    since: NaiveDate,
) -> anyhow::Result<Vec<EventRecord>> {
    let rows = sqlx::query(
        "SELECT branch_id, event_date::text AS event_date \
         FROM district_reports.events \
         WHERE branch_id = ANY($1) AND event_date >= $2 \
         ORDER BY event_date",
    )
    .bind(branch_ids)
    .bind(since)
    .fetch_all(pool)
    .await?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        records.push(EventRecord {
            branch_id: row.try_get("branch_id")?,
            event_date: row.try_get("event_date")?,
        });
    }
    Ok(records)
}

/// Issues the four reads together. The first failure aborts the whole fetch.
pub async fn fetch_activity(
    pool: &PgPool,
    branch_ids: &[String],
    floors: Floors,
) -> anyhow::Result<ActivitySet> {
    let (attendance, members, finance, events) = tokio::try_join!(
        fetch_attendance(pool, branch_ids, floors.attendance),
        fetch_members(pool, branch_ids, floors.members),
        fetch_finance(pool, branch_ids, floors.finance),
        fetch_events(pool, branch_ids, floors.events),
    )?;

    tracing::info!(
        branches = branch_ids.len(),
        attendance = attendance.len(),
        members = members.len(),
        finance = finance.len(),
        events = events.len(),
        "fetched activity"
    );

    Ok(ActivitySet {
        attendance,
        members,
        finance,
        events,
    })
}

pub async fn count_rows(
    pool: &PgPool,
    kind: RecordKind,
    branch_ids: &[String],
    since: NaiveDate,
) -> anyhow::Result<i64> {
    let query = format!(
        "SELECT COUNT(*) AS count FROM district_reports.{} WHERE branch_id = ANY($1) AND {} >= $2",
        kind.table(),
        kind.date_column()
    );
    let row = sqlx::query(&query)
        .bind(branch_ids)
        .bind(since)
        .fetch_one(pool)
        .await?;
    Ok(row.try_get("count")?)
}

pub async fn purge(
    pool: &PgPool,
    caps: Capabilities,
    kind: RecordKind,
    branch_ids: &[String],
    before: NaiveDate,
) -> anyhow::Result<u64> {
    caps.require_delete("purge")?;

    let query = format!(
        "DELETE FROM district_reports.{} WHERE branch_id = ANY($1) AND {} < $2",
        kind.table(),
        kind.date_column()
    );
    let result = sqlx::query(&query)
        .bind(branch_ids)
        .bind(before)
        .execute(pool)
        .await?;

    tracing::warn!(
        table = kind.table(),
        before = %before,
        deleted = result.rows_affected(),
        "purged rows"
    );
    Ok(result.rows_affected())
}
