use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{Datelike, Months, NaiveDate};
use sqlx::postgres::{PgListener, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::models::{NewRecord, PerformanceRecord};
use crate::registry::Category;
use crate::store::{RecordQuery, RecordStore, StoreError, Subscription};

const CHANGE_CHANNEL: &str = "performance_records_changed";

/// Postgres caps a statement at 65535 bind parameters; each row binds five.
const ROWS_PER_INSERT: usize = 10_000;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Sample records spread over the last three months, keyed so reseeding is a
/// no-op.
pub async fn seed(pool: &PgPool, today: NaiveDate) -> anyhow::Result<usize> {
    let samples = [
        ("seed-001", 1, Category::Nbw, 42.0, 0, 3),
        ("seed-002", 1, Category::Narcotics, 7.0, 1, 12),
        ("seed-003", 2, Category::Conviction, 18.0, 0, 5),
        ("seed-004", 2, Category::Firearms, 4.0, 2, 20),
        ("seed-005", 3, Category::MissingPerson, 11.0, 0, 8),
        ("seed-006", 3, Category::Nbw, 35.0, 1, 2),
        ("seed-007", 4, Category::SandMining, 6.0, 0, 1),
        ("seed-008", 4, Category::PreventiveActions, 27.0, 1, 15),
        ("seed-009", 5, Category::ImportantDetections, 3.0, 2, 9),
        ("seed-010", 5, Category::Nbw, 19.0, 0, 4),
        ("seed-011", 6, Category::Narcotics, 9.0, 1, 22),
        ("seed-012", 6, Category::Conviction, 14.0, 2, 6),
    ];

    let mut inserted = 0usize;
    for (source_key, district_id, category, value, months_ago, day) in samples {
        let month_start = today
            .with_day(1)
            .and_then(|first| first.checked_sub_months(Months::new(months_ago)))
            .context("invalid seed month")?;
        let record_date = month_start
            .with_day(day)
            .filter(|date| *date <= today)
            .unwrap_or(today);

        let result = sqlx::query(
            r#"
            INSERT INTO performance_dashboard.records
            (id, district_id, category, value, record_date, source_key)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(district_id)
        .bind(category.as_str())
        .bind(value)
        .bind(record_date)
        .bind(source_key)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}

pub async fn fetch_records(
    pool: &PgPool,
    query: RecordQuery,
) -> Result<Vec<PerformanceRecord>, StoreError> {
    let mut sql = String::from(
        "SELECT id, district_id, category, value, record_date \
         FROM performance_dashboard.records",
    );
    if query.district_id.is_some() {
        sql.push_str(" WHERE district_id = $1");
    }
    sql.push_str(" ORDER BY created_at, id");

    let mut rows = sqlx::query(&sql);
    if let Some(district_id) = query.district_id {
        rows = rows.bind(district_id);
    }

    let rows = rows.fetch_all(pool).await?;
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        match record_from_row(&row) {
            Ok(record) => records.push(record),
            Err(reason) => warn!(%reason, "skipping unreadable stored record"),
        }
    }

    Ok(records)
}

fn record_from_row(row: &PgRow) -> Result<PerformanceRecord, String> {
    let category: String = row.try_get("category").map_err(|e| e.to_string())?;
    Ok(PerformanceRecord {
        id: row.try_get("id").map_err(|e| e.to_string())?,
        district_id: row.try_get("district_id").map_err(|e| e.to_string())?,
        category: category.parse::<Category>().map_err(|e| e.to_string())?,
        value: row.try_get("value").map_err(|e| e.to_string())?,
        date: row.try_get("record_date").map_err(|e| e.to_string())?,
    })
}

pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn write(&self, record: &NewRecord) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO performance_dashboard.records
            (id, district_id, category, value, record_date)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(id)
        .bind(record.district_id)
        .bind(record.category.as_str())
        .bind(record.value)
        .bind(record.date)
        .execute(&self.pool)
        .await?;

        debug!(%id, district_id = record.district_id, category = %record.category, "record written");
        Ok(id)
    }

    async fn batch_write(&self, records: &[NewRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for chunk in records.chunks(ROWS_PER_INSERT) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO performance_dashboard.records \
                 (id, district_id, category, value, record_date) ",
            );
            builder.push_values(chunk, |mut row, record| {
                row.push_bind(Uuid::new_v4())
                    .push_bind(record.district_id)
                    .push_bind(record.category.as_str())
                    .push_bind(record.value)
                    .push_bind(record.date);
            });
            builder.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;

        info!(count = records.len(), "record batch committed");
        Ok(())
    }

    async fn subscribe(&self, query: RecordQuery) -> Result<Subscription, StoreError> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(CHANGE_CHANNEL).await?;

        let initial = fetch_records(&self.pool, query).await?;
        let (sender, receiver) = watch::channel(Arc::new(initial));
        let pool = self.pool.clone();

        let task = tokio::spawn(async move {
            loop {
                match listener.recv().await {
                    Ok(notification) => {
                        debug!(operation = notification.payload(), "records changed");
                        match fetch_records(&pool, query).await {
                            Ok(records) => {
                                if sender.send(Arc::new(records)).is_err() {
                                    break;
                                }
                            }
                            Err(err) => warn!(error = %err, "failed to refresh subscription"),
                        }
                    }
                    Err(err) => {
                        error!(error = %err, "record subscription lost");
                        break;
                    }
                }
            }
        });

        info!(district_id = ?query.district_id, "subscribed to records");
        Ok(Subscription::new(receiver, query).with_task(task))
    }
}
