use anyhow::{Context, Result};
use chrono::{Days, NaiveDate};
use rusqlite::{OptionalExtension, params};

use crate::db::{Database, category_column, format_date, opt_date_column};
use crate::error::{StoreError, classify};
use crate::models::{NewPantryItem, PantryItem};

const ITEM_SELECT: &str = "SELECT p.id, p.ingredient_id, i.name, i.category, p.quantity_remaining,
        p.date_purchased, p.expiry_date
     FROM pantry_items p
     JOIN ingredients i ON p.ingredient_id = i.id";

pub struct Pantry<'a> {
    db: &'a Database,
}

impl<'a> Pantry<'a> {
    #[must_use]
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    fn item_from_row(row: &rusqlite::Row) -> rusqlite::Result<PantryItem> {
        Ok(PantryItem {
            id: row.get(0)?,
            ingredient_id: row.get(1)?,
            ingredient_name: row.get(2)?,
            category: category_column(row, 3)?,
            quantity_remaining: row.get(4)?,
            date_purchased: opt_date_column(row, 5)?,
            expiry_date: opt_date_column(row, 6)?,
        })
    }

    /// Stock an ingredient. Without an explicit expiry date the ingredient's
    /// shelf life, counted from the purchase date, decides it.
    pub fn add_item(&self, item: &NewPantryItem) -> Result<i64> {
        let conn = self.db.conn();
        let shelf_life: Option<Option<i64>> = conn
            .query_row(
                "SELECT shelf_life_days FROM ingredients WHERE id = ?1",
                params![item.ingredient_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(shelf_life) = shelf_life else {
            return Err(StoreError::not_found("ingredient", item.ingredient_id).into());
        };

        let expiry = item.expiry_date.or_else(|| {
            shelf_life
                .and_then(|days| u64::try_from(days).ok())
                .and_then(|days| item.date_purchased.checked_add_days(Days::new(days)))
        });
        let quantity = item
            .quantity_remaining
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty());

        conn.execute(
            "INSERT INTO pantry_items (ingredient_id, quantity_remaining, date_purchased, expiry_date)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                item.ingredient_id,
                quantity,
                format_date(item.date_purchased),
                expiry.map(format_date)
            ],
        )
        .map_err(classify)
        .context("Failed to add pantry item")?;
        Ok(conn.last_insert_rowid())
    }

    /// Everything in stock, soonest to expire first. Items with no known
    /// expiry sort last.
    pub fn list_items(&self) -> Result<Vec<PantryItem>> {
        let mut stmt = self.db.conn().prepare(&format!(
            "{ITEM_SELECT} ORDER BY p.expiry_date IS NULL, p.expiry_date, p.id"
        ))?;
        let items = stmt
            .query_map([], Self::item_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    /// Items whose expiry date falls on or before `date`.
    pub fn expiring_by(&self, date: NaiveDate) -> Result<Vec<PantryItem>> {
        let mut stmt = self.db.conn().prepare(&format!(
            "{ITEM_SELECT} WHERE p.expiry_date IS NOT NULL AND p.expiry_date <= ?1
             ORDER BY p.expiry_date, p.id"
        ))?;
        let items = stmt
            .query_map(params![format_date(date)], Self::item_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    pub fn remove_item(&self, id: i64) -> Result<bool> {
        let rows = self
            .db
            .conn()
            .execute("DELETE FROM pantry_items WHERE id = ?1", params![id])
            .map_err(classify)?;
        Ok(rows > 0)
    }
}
