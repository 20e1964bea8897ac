use std::path::Path;

use anyhow::Context;
use chrono::NaiveDate;
use sqlx::{PgPool, Row};

use crate::loader;
use crate::models::{EoiRecord, Points};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Inserts every row of a CSV (plain or `.gz`) using the loader's rules.
pub async fn import_csv(pool: &PgPool, csv_path: &Path) -> anyhow::Result<usize> {
    let records = loader::read_csv_path(csv_path)?;
    let mut tx = pool.begin().await?;
    let mut inserted = 0usize;

    for record in &records {
        let count = i64::try_from(record.count_eois).context("count_eois out of range")?;
        let result = sqlx::query(
            r#"
            INSERT INTO eoi_dashboard.eoi_records
            (ds, occupation, visa_type, eoi_status, points, count_eois)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(record.timestamp)
        .bind(&record.occupation)
        .bind(&record.visa_type)
        .bind(&record.eoi_status)
        .bind(record.points.label())
        .bind(count)
        .execute(&mut *tx)
        .await?;

        inserted += result.rows_affected() as usize;
    }

    tx.commit().await?;
    Ok(inserted)
}

pub async fn fetch_records(pool: &PgPool) -> anyhow::Result<Vec<EoiRecord>> {
    let rows = sqlx::query(
        "SELECT ds, occupation, visa_type, eoi_status, points, count_eois \
         FROM eoi_dashboard.eoi_records \
         ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let timestamp: NaiveDate = row.get("ds");
        let points: String = row.get("points");
        let count: i64 = row.get("count_eois");
        records.push(EoiRecord {
            timestamp: loader::month_start(timestamp),
            occupation: row.get("occupation"),
            visa_type: row.get("visa_type"),
            eoi_status: row.get("eoi_status"),
            points: Points::parse(&points),
            count_eois: u64::try_from(count).context("negative count_eois in database")?,
        });
    }

    Ok(records)
}
