use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{OptionalExtension, params};
use tracing::debug;

use crate::db::{Database, date_column, format_date, opt_date_column};
use crate::error::{StoreError, classify};
use crate::models::{HistoryEntry, HistoryStatus, MemberRatings, PerMember};

const ENTRY_SELECT: &str = "SELECT h.id, h.meal_id, m.name, h.date_planned, h.date_cooked, h.status,
        h.brad_rating, h.kayla_rating, h.skylar_rating, h.aubrey_rating, h.comments
     FROM meal_history h
     JOIN meals m ON h.meal_id = m.id";

/// Planning, cooking and rating events for meals.
pub struct History<'a> {
    db: &'a Database,
}

impl<'a> History<'a> {
    #[must_use]
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    fn entry_from_row(row: &rusqlite::Row) -> rusqlite::Result<HistoryEntry> {
        let status: String = row.get(5)?;
        Ok(HistoryEntry {
            id: row.get(0)?,
            meal_id: row.get(1)?,
            meal_name: row.get(2)?,
            date_planned: date_column(row, 3)?,
            date_cooked: opt_date_column(row, 4)?,
            status: status.parse::<HistoryStatus>().map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    5,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?,
            ratings: PerMember {
                brad: row.get(6)?,
                kayla: row.get(7)?,
                skylar: row.get(8)?,
                aubrey: row.get(9)?,
            },
            comments: row.get(10)?,
        })
    }

    fn query_entries(&self, sql: &str, args: impl rusqlite::Params) -> Result<Vec<HistoryEntry>> {
        let mut stmt = self.db.conn().prepare(sql)?;
        let entries = stmt
            .query_map(args, Self::entry_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Plan a meal for a date. The entry starts out unrated.
    pub fn schedule(&self, meal_id: i64, date_planned: NaiveDate) -> Result<i64> {
        let conn = self.db.conn();
        let meal_found = conn
            .query_row("SELECT 1 FROM meals WHERE id = ?1", params![meal_id], |_| Ok(()))
            .optional()?;
        if meal_found.is_none() {
            return Err(StoreError::not_found("meal", meal_id).into());
        }
        conn.execute(
            "INSERT INTO meal_history (meal_id, date_planned, status) VALUES (?1, ?2, 'unrated')",
            params![meal_id, format_date(date_planned)],
        )
        .map_err(classify)
        .context("Failed to schedule meal")?;
        let id = conn.last_insert_rowid();
        debug!(id, meal_id, %date_planned, "scheduled meal");
        Ok(id)
    }

    pub fn get_entry(&self, id: i64) -> Result<HistoryEntry> {
        self.db
            .conn()
            .query_row(
                &format!("{ENTRY_SELECT} WHERE h.id = ?1"),
                params![id],
                Self::entry_from_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::not_found("history entry", id).into())
    }

    /// Unrated entries, most recently planned first.
    pub fn list_unrated(&self) -> Result<Vec<HistoryEntry>> {
        self.query_entries(
            &format!(
                "{ENTRY_SELECT} WHERE h.status = 'unrated'
                 ORDER BY h.date_planned DESC, h.id DESC"
            ),
            [],
        )
    }

    /// Rated entries, most recently cooked first.
    pub fn list_rated(&self) -> Result<Vec<HistoryEntry>> {
        self.query_entries(
            &format!(
                "{ENTRY_SELECT} WHERE h.status = 'rated'
                 ORDER BY h.date_cooked DESC, h.date_planned DESC, h.id DESC"
            ),
            [],
        )
    }

    pub fn list_for_meal(&self, meal_id: i64) -> Result<Vec<HistoryEntry>> {
        self.query_entries(
            &format!(
                "{ENTRY_SELECT} WHERE h.meal_id = ?1
                 ORDER BY h.date_planned DESC, h.id DESC"
            ),
            params![meal_id],
        )
    }

    /// Record how the household rated a cooked meal.
    ///
    /// Ratings, comments, the cooked date and the `rated` status are written
    /// together in one statement inside a transaction. An entry can be rated
    /// once; a second attempt is a validation error and leaves it unchanged.
    pub fn rate(
        &self,
        history_id: i64,
        ratings: &MemberRatings,
        comments: Option<&str>,
        date_cooked: NaiveDate,
    ) -> Result<()> {
        ratings.validate()?;
        let comments = comments.map(str::trim).filter(|c| !c.is_empty());

        self.db.in_transaction(|tx| {
            let status: Option<String> = tx
                .query_row(
                    "SELECT status FROM meal_history WHERE id = ?1",
                    params![history_id],
                    |row| row.get(0),
                )
                .optional()?;
            match status.as_deref() {
                None => return Err(StoreError::not_found("history entry", history_id).into()),
                Some(s) if s == HistoryStatus::Rated.as_str() => {
                    return Err(StoreError::validation(format!(
                        "History entry {history_id} has already been rated"
                    ))
                    .into());
                }
                Some(_) => {}
            }
            tx.execute(
                "UPDATE meal_history
                 SET brad_rating = ?1, kayla_rating = ?2, skylar_rating = ?3, aubrey_rating = ?4,
                     comments = ?5, date_cooked = ?6, status = 'rated'
                 WHERE id = ?7 AND status = 'unrated'",
                params![
                    ratings.brad,
                    ratings.kayla,
                    ratings.skylar,
                    ratings.aubrey,
                    comments,
                    format_date(date_cooked),
                    history_id
                ],
            )
            .map_err(classify)
            .context("Failed to save ratings")?;
            Ok(())
        })?;
        debug!(history_id, "rated history entry");
        Ok(())
    }

    /// Returns `false` when no such entry existed.
    pub fn delete_entry(&self, id: i64) -> Result<bool> {
        let rows = self
            .db
            .conn()
            .execute("DELETE FROM meal_history WHERE id = ?1", params![id])
            .map_err(classify)?;
        Ok(rows > 0)
    }

    /// Drop every plan that was never rated; returns how many went.
    pub fn delete_all_unrated(&self) -> Result<usize> {
        let rows = self
            .db
            .conn()
            .execute("DELETE FROM meal_history WHERE status = 'unrated'", [])
            .map_err(classify)?;
        debug!(rows, "cleared unrated history");
        Ok(rows)
    }
}
