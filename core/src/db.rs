use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};
use tracing::debug;

use crate::error::classify;
use crate::models::{Category, DATE_FORMAT};

pub(crate) const MEALS: &str = "meals";
pub(crate) const MEAL_INGREDIENTS: &str = "meal_ingredients";
pub(crate) const MEAL_HISTORY: &str = "meal_history";

/// Column list shared by every query that maps a row to a `Meal`.
pub(crate) const MEAL_COLUMNS: &str =
    "id, name, instructions, brad_liked, kayla_liked, skylar_liked, aubrey_liked";

/// Shape of the `meals` table. The renumbering pass builds a second copy
/// under another name, so the table name is a parameter; it is only ever
/// one of the constants in this crate.
pub(crate) fn meals_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            instructions TEXT,
            brad_liked INTEGER DEFAULT NULL,
            kayla_liked INTEGER DEFAULT NULL,
            skylar_liked INTEGER DEFAULT NULL,
            aubrey_liked INTEGER DEFAULT NULL
        );"
    )
}

pub(crate) fn meal_ingredients_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            meal_id INTEGER NOT NULL,
            ingredient_id INTEGER NOT NULL,
            quantity TEXT NOT NULL,
            FOREIGN KEY (meal_id) REFERENCES meals(id) ON DELETE CASCADE,
            FOREIGN KEY (ingredient_id) REFERENCES ingredients(id) ON DELETE CASCADE
        );"
    )
}

pub(crate) fn meal_history_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            meal_id INTEGER NOT NULL,
            date_planned TEXT NOT NULL,
            date_cooked TEXT,
            status TEXT NOT NULL CHECK(status IN ('unrated', 'rated')) DEFAULT 'unrated',
            brad_rating INTEGER CHECK(brad_rating BETWEEN 1 AND 5),
            kayla_rating INTEGER CHECK(kayla_rating BETWEEN 1 AND 5),
            skylar_rating INTEGER CHECK(skylar_rating BETWEEN 1 AND 5),
            aubrey_rating INTEGER CHECK(aubrey_rating BETWEEN 1 AND 5),
            comments TEXT,
            FOREIGN KEY (meal_id) REFERENCES meals(id) ON DELETE CASCADE
        );"
    )
}

const INGREDIENTS_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS ingredients (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    category TEXT NOT NULL CHECK(category IN ('Pantry', 'Fridge', 'Freezer', 'Misc')),
    shelf_life_days INTEGER CHECK(shelf_life_days IS NULL OR shelf_life_days >= 0)
);";

const PANTRY_ITEMS_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS pantry_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ingredient_id INTEGER NOT NULL,
    quantity_remaining TEXT,
    date_purchased DATE,
    expiry_date DATE,
    FOREIGN KEY (ingredient_id) REFERENCES ingredients(id) ON DELETE CASCADE
);";

/// Indexes live apart from the tables because renumbering drops and renames
/// tables and has to put them back afterwards.
pub(crate) const INDEXES_SQL: &str =
    "CREATE INDEX IF NOT EXISTS idx_meal_ingredients_meal ON meal_ingredients(meal_id);
     CREATE INDEX IF NOT EXISTS idx_meal_history_meal ON meal_history(meal_id);
     CREATE INDEX IF NOT EXISTS idx_meal_history_status ON meal_history(status);
     CREATE INDEX IF NOT EXISTS idx_pantry_items_ingredient ON pantry_items(ingredient_id);";

/// Handle on the single shared SQLite connection. Every store component is
/// constructed from a borrowed `Database`.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.initialize()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Create every table, constraint and index that is missing and turn on
    /// foreign key enforcement for this connection. Safe to call repeatedly.
    pub fn initialize(&self) -> Result<()> {
        self.set_foreign_keys(true)?;
        let schema = [
            meals_table_sql(MEALS),
            INGREDIENTS_TABLE_SQL.to_string(),
            meal_ingredients_table_sql(MEAL_INGREDIENTS),
            PANTRY_ITEMS_TABLE_SQL.to_string(),
            meal_history_table_sql(MEAL_HISTORY),
            INDEXES_SQL.to_string(),
        ]
        .join("\n");
        self.conn
            .execute_batch(&schema)
            .context("Failed to create schema")?;
        debug!("schema initialized");
        Ok(())
    }

    pub fn close(self) -> Result<()> {
        self.conn
            .close()
            .map_err(|(_, e)| e)
            .context("Failed to close database")
    }

    pub fn foreign_keys_enabled(&self) -> Result<bool> {
        let enabled: bool = self
            .conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))?;
        Ok(enabled)
    }

    /// SQLite ignores this pragma inside a transaction, so callers toggle it
    /// before opening one.
    pub(crate) fn set_foreign_keys(&self, enabled: bool) -> Result<()> {
        let value = if enabled { "ON" } else { "OFF" };
        self.conn
            .pragma_update(None, "foreign_keys", value)
            .with_context(|| format!("Failed to set foreign_keys = {value}"))
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run `f` inside a transaction. The transaction is committed only when
    /// `f` succeeds; on any error it is rolled back before the error returns.
    pub(crate) fn in_transaction<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to start transaction")?;
        let value = f(&tx)?;
        tx.commit()
            .map_err(classify)
            .context("Failed to commit transaction")?;
        Ok(value)
    }

    pub(crate) fn table_exists(&self, name: &str) -> Result<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![name],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

// --- Column mapping helpers ---

pub(crate) fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub(crate) fn date_column(row: &Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, DATE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn opt_date_column(row: &Row, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    let raw: Option<String> = row.get(idx)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s, DATE_FORMAT)
            .map(Some)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
    }
}

pub(crate) fn category_column(row: &Row, idx: usize) -> rusqlite::Result<Category> {
    let raw: String = row.get(idx)?;
    raw.parse::<Category>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    fn table_names(db: &Database) -> Vec<String> {
        let mut stmt = db
            .conn()
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' AND name != 'sqlite_sequence' ORDER BY name")
            .unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<String>, _>>()
            .unwrap()
    }

    #[test]
    fn test_initialize_creates_all_tables() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(
            table_names(&db),
            vec![
                "ingredients",
                "meal_history",
                "meal_ingredients",
                "meals",
                "pantry_items"
            ]
        );
        assert!(db.foreign_keys_enabled().unwrap());
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.conn()
            .execute("INSERT INTO meals (name) VALUES ('Soup')", [])
            .unwrap();
        db.initialize().unwrap();
        db.initialize().unwrap();
        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM meals", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_initialize_restores_foreign_keys() {
        let db = Database::open_in_memory().unwrap();
        db.set_foreign_keys(false).unwrap();
        assert!(!db.foreign_keys_enabled().unwrap());
        db.initialize().unwrap();
        assert!(db.foreign_keys_enabled().unwrap());
    }

    #[test]
    fn test_category_check_constraint() {
        let db = Database::open_in_memory().unwrap();
        let err = db
            .conn()
            .execute(
                "INSERT INTO ingredients (name, category) VALUES ('Ice', 'Cellar')",
                [],
            )
            .map_err(classify)
            .unwrap_err();
        assert!(matches!(StoreError::of(&err), Some(StoreError::Integrity(_))));
    }

    #[test]
    fn test_rating_check_constraint() {
        let db = Database::open_in_memory().unwrap();
        db.conn()
            .execute("INSERT INTO meals (name) VALUES ('Soup')", [])
            .unwrap();
        let result = db.conn().execute(
            "INSERT INTO meal_history (meal_id, date_planned, brad_rating) VALUES (1, '2024-01-01', 9)",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_foreign_key_enforced() {
        let db = Database::open_in_memory().unwrap();
        let err = db
            .conn()
            .execute(
                "INSERT INTO meal_history (meal_id, date_planned) VALUES (42, '2024-01-01')",
                [],
            )
            .map_err(classify)
            .unwrap_err();
        assert!(matches!(StoreError::of(&err), Some(StoreError::Integrity(_))));
    }

    #[test]
    fn test_in_transaction_rolls_back_on_error() {
        let db = Database::open_in_memory().unwrap();
        let result: Result<()> = db.in_transaction(|tx| {
            tx.execute("INSERT INTO meals (name) VALUES ('Soup')", [])?;
            anyhow::bail!("boom")
        });
        assert!(result.is_err());
        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM meals", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_in_transaction_commits() {
        let db = Database::open_in_memory().unwrap();
        let id = db
            .in_transaction(|tx| {
                tx.execute("INSERT INTO meals (name) VALUES ('Soup')", [])?;
                Ok(tx.last_insert_rowid())
            })
            .unwrap();
        assert_eq!(id, 1);
        assert!(db.table_exists("meals").unwrap());
        assert!(!db.table_exists("meals_renumbered").unwrap());
    }

    #[test]
    fn test_open_close_reopen_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meal-planner.db");

        let db = Database::open(&path).unwrap();
        db.conn()
            .execute("INSERT INTO meals (name) VALUES ('Soup')", [])
            .unwrap();
        db.close().unwrap();

        let db = Database::open(&path).unwrap();
        let name: String = db
            .conn()
            .query_row("SELECT name FROM meals WHERE id = 1", [], |row| row.get(0))
            .unwrap();
        assert_eq!(name, "Soup");
        assert!(db.foreign_keys_enabled().unwrap());
    }
}
