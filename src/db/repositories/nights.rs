use anyhow::{Context, Result};
use rusqlite::{params, Connection, Row};

use crate::db::{
    connection::Database,
    helpers::{ensure_affected, to_i32},
    live::NightsStream,
    models::SessionRecord,
};

fn row_to_night(row: &Row) -> Result<SessionRecord> {
    let quality_rating: i64 = row.get("quality_rating")?;

    Ok(SessionRecord {
        id: row.get("night_id")?,
        start_time_milli: row.get("start_time_milli")?,
        end_time_milli: row.get("end_time_milli")?,
        quality_rating: to_i32(quality_rating, "quality_rating")?,
    })
}

pub(crate) fn select_all_nights(conn: &Connection) -> Result<Vec<SessionRecord>> {
    let mut stmt = conn.prepare_cached(
        "SELECT night_id, start_time_milli, end_time_milli, quality_rating
         FROM daily_sleep_quality
         ORDER BY night_id DESC",
    )?;

    let mut rows = stmt.query([])?;
    let mut nights = Vec::new();
    while let Some(row) = rows.next()? {
        nights.push(row_to_night(row)?);
    }

    Ok(nights)
}

impl Database {
    /// Appends a night and returns the id the store assigned. `record.id` is ignored.
    pub async fn insert_night(&self, record: &SessionRecord) -> Result<i64> {
        let record = record.clone();
        self.execute_write(move |conn| {
            conn.execute(
                "INSERT INTO daily_sleep_quality (start_time_milli, end_time_milli, quality_rating)
                 VALUES (?1, ?2, ?3)",
                params![
                    record.start_time_milli,
                    record.end_time_milli,
                    record.quality_rating,
                ],
            )
            .context("failed to insert night")?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// Overwrites every column of the row matching `record.id`.
    pub async fn update_night(&self, record: &SessionRecord) -> Result<()> {
        let record = record.clone();
        self.execute_write(move |conn| {
            let rows_affected = conn
                .execute(
                    "UPDATE daily_sleep_quality
                     SET start_time_milli = ?1,
                         end_time_milli = ?2,
                         quality_rating = ?3
                     WHERE night_id = ?4",
                    params![
                        record.start_time_milli,
                        record.end_time_milli,
                        record.quality_rating,
                        record.id,
                    ],
                )
                .context("failed to update night")?;
            ensure_affected(rows_affected, record.id)
        })
        .await
    }

    pub async fn get_night(&self, night_id: i64) -> Result<Option<SessionRecord>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT night_id, start_time_milli, end_time_milli, quality_rating
                 FROM daily_sleep_quality
                 WHERE night_id = ?1",
            )?;

            let mut rows = stmt.query(params![night_id])?;
            let night = match rows.next()? {
                Some(row) => Some(row_to_night(row)?),
                None => None,
            };
            Ok(night)
        })
        .await
    }

    /// Removes every night. Ids keep increasing afterwards.
    pub async fn clear_nights(&self) -> Result<()> {
        self.execute_write(|conn| {
            conn.execute("DELETE FROM daily_sleep_quality", [])
                .context("failed to clear nights")?;
            Ok(())
        })
        .await
    }

    /// Most recently inserted night, open or not.
    pub async fn get_tonight(&self) -> Result<Option<SessionRecord>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT night_id, start_time_milli, end_time_milli, quality_rating
                 FROM daily_sleep_quality
                 ORDER BY night_id DESC
                 LIMIT 1",
            )?;

            let mut rows = stmt.query([])?;
            let night = match rows.next()? {
                Some(row) => Some(row_to_night(row)?),
                None => None,
            };
            Ok(night)
        })
        .await
    }

    pub async fn count_nights(&self) -> Result<i64> {
        self.execute(|conn| {
            let count =
                conn.query_row("SELECT COUNT(*) FROM daily_sleep_quality", [], |row| row.get(0))?;
            Ok(count)
        })
        .await
    }

    pub async fn count_open_nights(&self) -> Result<i64> {
        self.execute(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM daily_sleep_quality WHERE end_time_milli = start_time_milli",
                [],
                |row| row.get(0),
            )?;
            Ok(count)
        })
        .await
    }

    /// Live view of every night, newest first. Emits the current contents immediately,
    /// then once per committed write.
    pub async fn get_all_nights(&self) -> Result<NightsStream> {
        self.subscribe_nights().await
    }
}
