//! Bulk rewrites of the meal tables: merging meals that share a name, and
//! renumbering meal ids so they are dense from 1 again.
//!
//! Both work on the tables directly instead of going through [`Catalog`],
//! because they move rows between primary keys.
//!
//! [`Catalog`]: crate::catalog::Catalog

use std::collections::HashMap;

use anyhow::{Context, Result};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::db::{
    Database, INDEXES_SQL, MEAL_COLUMNS, meal_history_table_sql, meal_ingredients_table_sql,
    meals_table_sql,
};
use crate::error::{StoreError, classify};

const MEALS_STAGING: &str = "meals_renumbered";
const MEAL_INGREDIENTS_STAGING: &str = "meal_ingredients_renumbered";
const MEAL_HISTORY_STAGING: &str = "meal_history_renumbered";

const DROP_STAGING_SQL: &str = "DROP TABLE IF EXISTS meal_history_renumbered;
     DROP TABLE IF EXISTS meal_ingredients_renumbered;
     DROP TABLE IF EXISTS meals_renumbered;";

const SWAP_SQL: &str = "DROP TABLE meal_ingredients;
     DROP TABLE meal_history;
     DROP TABLE meals;
     ALTER TABLE meals_renumbered RENAME TO meals;
     ALTER TABLE meal_ingredients_renumbered RENAME TO meal_ingredients;
     ALTER TABLE meal_history_renumbered RENAME TO meal_history;";

// --- Consolidation ---

/// What happens to the links and history of the meals being merged away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// Delete the duplicates outright. Their ingredient links and history
    /// entries are removed with them by cascade; only the canonical meal's
    /// own links and history survive.
    #[default]
    Discard,
    /// Move the duplicates' ingredient links and history onto the canonical
    /// meal before deleting them. A link is dropped instead of moved when the
    /// canonical meal already uses that ingredient.
    Union,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupOutcome {
    pub name: String,
    pub kept_id: i64,
    pub duplicate_ids: Vec<i64>,
    /// Set when the group could not be merged; the group is left untouched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConsolidationReport {
    pub strategy: MergeStrategy,
    pub groups: Vec<GroupOutcome>,
    pub removed: usize,
    pub failed: usize,
}

// --- Renumbering ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IdChange {
    pub old: i64,
    pub new: i64,
}

/// The staged result of a renumbering, waiting to be swapped in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RenumberPlan {
    /// Every meal, by ascending old id.
    pub mapping: Vec<IdChange>,
    pub links: usize,
    pub history: usize,
    /// Ingredient links that point at a missing meal or ingredient.
    pub dropped_links: Vec<i64>,
    /// History entries that point at a missing meal.
    pub dropped_history: Vec<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RenumberReport {
    pub meals: usize,
    /// Meals whose id actually changed.
    pub changed: usize,
    pub links: usize,
    pub history: usize,
    pub dropped_links: Vec<i64>,
    pub dropped_history: Vec<i64>,
}

impl From<&RenumberPlan> for RenumberReport {
    fn from(plan: &RenumberPlan) -> Self {
        Self {
            meals: plan.mapping.len(),
            changed: plan.mapping.iter().filter(|c| c.old != c.new).count(),
            links: plan.links,
            history: plan.history,
            dropped_links: plan.dropped_links.clone(),
            dropped_history: plan.dropped_history.clone(),
        }
    }
}

pub struct Maintenance<'a> {
    db: &'a Database,
}

impl<'a> Maintenance<'a> {
    #[must_use]
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Merge meals that share exactly the same name into the one with the
    /// lowest id.
    ///
    /// With [`MergeStrategy::Discard`] this is destructive: whatever was
    /// attached only to a duplicate is lost. Each group commits on its own, so
    /// a failure in one group is recorded in the report and the remaining
    /// groups still run.
    pub fn consolidate_duplicates(&self, strategy: MergeStrategy) -> Result<ConsolidationReport> {
        let mut report = ConsolidationReport {
            strategy,
            ..ConsolidationReport::default()
        };

        for name in self.duplicate_names()? {
            let ids = self.meal_ids_named(&name)?;
            let Some((&kept_id, duplicates)) = ids.split_first() else {
                continue;
            };
            let result = self.db.in_transaction(|tx| {
                for &dup in duplicates {
                    if strategy == MergeStrategy::Union {
                        move_attachments(tx, dup, kept_id)?;
                    }
                    tx.execute("DELETE FROM meals WHERE id = ?1", params![dup])
                        .map_err(classify)
                        .with_context(|| format!("Failed to delete meal {dup}"))?;
                }
                Ok(())
            });

            let error = match result {
                Ok(()) => {
                    info!(name = %name, kept_id, removed = duplicates.len(), "merged duplicate meals");
                    report.removed += duplicates.len();
                    None
                }
                Err(e) => {
                    let reason = format!("{e:#}");
                    warn!(name = %name, error = %reason, "failed to merge duplicate meals");
                    report.failed += 1;
                    Some(reason)
                }
            };
            report.groups.push(GroupOutcome {
                name,
                kept_id,
                duplicate_ids: duplicates.to_vec(),
                error,
            });
        }
        Ok(report)
    }

    fn duplicate_names(&self) -> Result<Vec<String>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT name FROM meals GROUP BY name HAVING COUNT(*) > 1 ORDER BY MIN(id)",
        )?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    fn meal_ids_named(&self, name: &str) -> Result<Vec<i64>> {
        let mut stmt = self
            .db
            .conn()
            .prepare("SELECT id FROM meals WHERE name = ?1 ORDER BY id")?;
        let ids = stmt
            .query_map(params![name], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    /// Renumber meals densely from 1 in their current order, rewriting every
    /// ingredient link and history entry to match.
    ///
    /// Stages the new tables, then swaps them in. If anything fails the
    /// original tables are left as they were and the staging tables are
    /// dropped.
    pub fn renumber_meals(&self) -> Result<RenumberReport> {
        let plan = match self.stage_renumbering() {
            Ok(plan) => plan,
            Err(e) => {
                self.discard_after_failure();
                return Err(e);
            }
        };
        if plan.mapping.is_empty() {
            self.discard_staging()?;
            info!("no meals to renumber");
            return Ok(RenumberReport::default());
        }
        match self.apply_renumbering(&plan) {
            Ok(report) => Ok(report),
            Err(e) => {
                self.discard_after_failure();
                Err(e)
            }
        }
    }

    fn discard_after_failure(&self) {
        if let Err(e) = self.discard_staging() {
            warn!("failed to drop renumbering staging tables: {e:#}");
        }
    }

    /// Build the renumbered copies of `meals`, `meal_ingredients` and
    /// `meal_history` alongside the originals, which are not modified.
    /// Leftover staging tables from an earlier interrupted run are replaced.
    pub fn stage_renumbering(&self) -> Result<RenumberPlan> {
        with_foreign_keys_off(self.db, || self.db.in_transaction(stage))
    }

    /// Swap staged tables in for the originals in one transaction. Refuses
    /// the plan when the original tables changed after it was staged.
    pub fn apply_renumbering(&self, plan: &RenumberPlan) -> Result<RenumberReport> {
        for table in [MEALS_STAGING, MEAL_INGREDIENTS_STAGING, MEAL_HISTORY_STAGING] {
            if !self.db.table_exists(table)? {
                return Err(StoreError::validation(format!(
                    "No staged renumbering found (missing table {table})"
                ))
                .into());
            }
        }
        with_foreign_keys_off(self.db, || {
            self.db.in_transaction(|tx| {
                verify_unchanged(tx, plan)?;
                swap(tx)
            })
        })?;

        let report = RenumberReport::from(plan);
        info!(
            meals = report.meals,
            changed = report.changed,
            links = report.links,
            history = report.history,
            "renumbered meals"
        );
        Ok(report)
    }

    /// Drop staging tables left behind by an interrupted renumbering.
    /// Returns whether there was anything to drop.
    pub fn discard_staging(&self) -> Result<bool> {
        let mut found = false;
        for table in [MEALS_STAGING, MEAL_INGREDIENTS_STAGING, MEAL_HISTORY_STAGING] {
            found |= self.db.table_exists(table)?;
        }
        if found {
            self.db
                .conn()
                .execute_batch(DROP_STAGING_SQL)
                .context("Failed to drop staging tables")?;
            debug!("dropped renumbering staging tables");
        }
        Ok(found)
    }
}

/// Run `f` with foreign key enforcement off, turning it back on afterwards
/// whether or not `f` succeeded.
fn with_foreign_keys_off<T>(db: &Database, f: impl FnOnce() -> Result<T>) -> Result<T> {
    db.set_foreign_keys(false)?;
    let result = f();
    let restored = db.set_foreign_keys(true);
    let value = result?;
    restored?;
    Ok(value)
}

fn move_attachments(tx: &Transaction<'_>, from: i64, to: i64) -> Result<()> {
    tx.execute(
        "DELETE FROM meal_ingredients
         WHERE meal_id = ?1
           AND ingredient_id IN (SELECT ingredient_id FROM meal_ingredients WHERE meal_id = ?2)",
        params![from, to],
    )
    .map_err(classify)?;
    tx.execute(
        "UPDATE meal_ingredients SET meal_id = ?2 WHERE meal_id = ?1",
        params![from, to],
    )
    .map_err(classify)?;
    tx.execute(
        "UPDATE meal_history SET meal_id = ?2 WHERE meal_id = ?1",
        params![from, to],
    )
    .map_err(classify)
    .with_context(|| format!("Failed to move history from meal {from} to {to}"))?;
    Ok(())
}

fn stage(tx: &Transaction<'_>) -> Result<RenumberPlan> {
    let schema = [
        DROP_STAGING_SQL.to_string(),
        meals_table_sql(MEALS_STAGING),
        meal_ingredients_table_sql(MEAL_INGREDIENTS_STAGING),
        meal_history_table_sql(MEAL_HISTORY_STAGING),
    ]
    .join("\n");
    tx.execute_batch(&schema)
        .context("Failed to create staging tables")?;

    let mut plan = RenumberPlan::default();

    let meals = {
        let mut stmt = tx.prepare(&format!("SELECT {MEAL_COLUMNS} FROM meals ORDER BY id"))?;
        stmt.query_map([], Catalog::meal_from_row)?
            .collect::<Result<Vec<_>, _>>()?
    };
    for meal in &meals {
        tx.execute(
            "INSERT INTO meals_renumbered
                 (name, instructions, brad_liked, kayla_liked, skylar_liked, aubrey_liked)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                meal.name,
                meal.instructions,
                meal.liked.brad,
                meal.liked.kayla,
                meal.liked.skylar,
                meal.liked.aubrey
            ],
        )?;
        plan.mapping.push(IdChange {
            old: meal.id,
            new: tx.last_insert_rowid(),
        });
    }
    let new_id: HashMap<i64, i64> = plan.mapping.iter().map(|c| (c.old, c.new)).collect();

    let links = {
        let mut stmt = tx.prepare(
            "SELECT mi.id, mi.meal_id, mi.ingredient_id, mi.quantity, i.id IS NOT NULL
             FROM meal_ingredients mi
             LEFT JOIN ingredients i ON mi.ingredient_id = i.id
             ORDER BY mi.id",
        )?;
        stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, bool>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?
    };
    for (link_id, meal_id, ingredient_id, quantity, ingredient_exists) in links {
        match new_id.get(&meal_id) {
            Some(&meal_id) if ingredient_exists => {
                tx.execute(
                    "INSERT INTO meal_ingredients_renumbered (meal_id, ingredient_id, quantity)
                     VALUES (?1, ?2, ?3)",
                    params![meal_id, ingredient_id, quantity],
                )?;
                plan.links += 1;
            }
            _ => {
                warn!(link_id, meal_id, ingredient_id, "dropping dangling ingredient link");
                plan.dropped_links.push(link_id);
            }
        }
    }

    let history = {
        let mut stmt = tx.prepare("SELECT id, meal_id FROM meal_history ORDER BY id")?;
        stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?
    };
    for (history_id, meal_id) in history {
        if let Some(&new_meal_id) = new_id.get(&meal_id) {
            tx.execute(
                "INSERT INTO meal_history_renumbered
                     (id, meal_id, date_planned, date_cooked, status,
                      brad_rating, kayla_rating, skylar_rating, aubrey_rating, comments)
                 SELECT id, ?2, date_planned, date_cooked, status,
                        brad_rating, kayla_rating, skylar_rating, aubrey_rating, comments
                 FROM meal_history WHERE id = ?1",
                params![history_id, new_meal_id],
            )?;
            plan.history += 1;
        } else {
            warn!(history_id, meal_id, "dropping history entry for missing meal");
            plan.dropped_history.push(history_id);
        }
    }

    debug!(
        meals = plan.mapping.len(),
        links = plan.links,
        history = plan.history,
        "staged renumbering"
    );
    Ok(plan)
}

type Row = Vec<Value>;

fn rows(conn: &Connection, sql: &str) -> Result<Vec<Row>> {
    let mut stmt = conn.prepare(sql)?;
    let columns = stmt.column_count();
    let rows = stmt
        .query_map([], |row| {
            (0..columns)
                .map(|i| row.get::<_, Value>(i))
                .collect::<rusqlite::Result<Row>>()
        })?
        .collect::<Result<Vec<Row>, _>>()?;
    Ok(rows)
}

/// Rewrite the meal id in column `col` through the plan's mapping. `None`
/// when the row points at a meal the plan does not know.
fn remap(mut row: Row, col: usize, new_id: &HashMap<i64, i64>) -> Option<Row> {
    let Value::Integer(old) = row[col] else {
        return None;
    };
    row[col] = Value::Integer(*new_id.get(&old)?);
    Some(row)
}

/// Rebuild what staging would produce from the live tables and compare it
/// with the staged rows, so any insert, delete or edit since staging
/// (a rating, a preference, a renamed meal, a changed quantity) is caught.
fn verify_unchanged(tx: &Transaction<'_>, plan: &RenumberPlan) -> Result<()> {
    let new_id: HashMap<i64, i64> = plan.mapping.iter().map(|c| (c.old, c.new)).collect();
    let stale = || -> anyhow::Error {
        StoreError::Integrity("meal tables changed since renumbering was staged".to_string())
            .into()
    };

    let meal_sql = |table: &str| format!("SELECT {MEAL_COLUMNS} FROM {table} ORDER BY id");
    let live_meals = rows(tx, &meal_sql("meals"))?
        .into_iter()
        .map(|row| remap(row, 0, &new_id))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(stale)?;
    if live_meals.len() != plan.mapping.len()
        || live_meals != rows(tx, &meal_sql(MEALS_STAGING))?
    {
        return Err(stale());
    }

    // Links keep no id across the swap; dangling ones were left out of staging.
    let live_links = rows(
        tx,
        "SELECT id, meal_id, ingredient_id, quantity FROM meal_ingredients ORDER BY id",
    )?
    .into_iter()
    .filter(|row| !matches!(row[0], Value::Integer(id) if plan.dropped_links.contains(&id)))
    .map(|mut row| {
        row.remove(0);
        remap(row, 0, &new_id)
    })
    .collect::<Option<Vec<_>>>()
    .ok_or_else(stale)?;
    let staged_links = rows(
        tx,
        &format!(
            "SELECT meal_id, ingredient_id, quantity FROM {MEAL_INGREDIENTS_STAGING} ORDER BY id"
        ),
    )?;
    if live_links != staged_links {
        return Err(stale());
    }

    let history_sql = |table: &str| {
        format!(
            "SELECT id, meal_id, date_planned, date_cooked, status,
                    brad_rating, kayla_rating, skylar_rating, aubrey_rating, comments
             FROM {table} ORDER BY id"
        )
    };
    let live_history = rows(tx, &history_sql("meal_history"))?
        .into_iter()
        .filter(|row| !matches!(row[0], Value::Integer(id) if plan.dropped_history.contains(&id)))
        .map(|row| remap(row, 1, &new_id))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(stale)?;
    if live_history != rows(tx, &history_sql(MEAL_HISTORY_STAGING))? {
        return Err(stale());
    }
    Ok(())
}

fn swap(tx: &Transaction<'_>) -> Result<()> {
    let history_seq: i64 = tx
        .query_row(
            "SELECT seq FROM sqlite_sequence WHERE name = 'meal_history'",
            [],
            |row| row.get(0),
        )
        .optional()?
        .unwrap_or(0);

    tx.execute_batch(SWAP_SQL)
        .context("Failed to swap renumbered tables")?;
    tx.execute_batch(INDEXES_SQL)
        .context("Failed to recreate indexes")?;

    tx.execute(
        "DELETE FROM sqlite_sequence WHERE name IN ('meals', 'meal_ingredients', 'meal_history')",
        [],
    )?;
    tx.execute_batch(
        "INSERT INTO sqlite_sequence (name, seq) SELECT 'meals', COALESCE(MAX(id), 0) FROM meals;
         INSERT INTO sqlite_sequence (name, seq)
             SELECT 'meal_ingredients', COALESCE(MAX(id), 0) FROM meal_ingredients;",
    )?;
    tx.execute(
        "INSERT INTO sqlite_sequence (name, seq)
         SELECT 'meal_history', MAX(?1, COALESCE(MAX(id), 0)) FROM meal_history",
        params![history_seq],
    )?;

    for table in ["meal_ingredients", "meal_history"] {
        let mut stmt = tx.prepare(&format!("PRAGMA foreign_key_check({table})"))?;
        let mut rows = stmt.query([])?;
        if let Some(row) = rows.next()? {
            let rowid: Option<i64> = row.get(1)?;
            return Err(StoreError::Integrity(format!(
                "foreign key check failed for {table} row {}",
                rowid.map_or_else(|| "?".to_string(), |r| r.to_string())
            ))
            .into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::History;
    use crate::models::{Category, Member, MemberRatings, NewIngredient};
    use chrono::NaiveDate;

    fn ids(db: &Database, sql: &str) -> Vec<i64> {
        let mut stmt = db.conn().prepare(sql).unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<i64>, _>>()
            .unwrap()
    }

    fn meal_ids(db: &Database) -> Vec<i64> {
        ids(db, "SELECT id FROM meals ORDER BY id")
    }

    fn ingredient(db: &Database, name: &str) -> i64 {
        Catalog::new(db)
            .find_or_create_ingredient(&NewIngredient {
                name: name.to_string(),
                category: Category::Pantry,
                shelf_life_days: None,
            })
            .unwrap()
    }

    fn plan_on(db: &Database, meal_id: i64, d: u32) -> i64 {
        History::new(db)
            .schedule(meal_id, NaiveDate::from_ymd_opt(2024, 1, d).unwrap())
            .unwrap()
    }

    /// Meals 3, 7 and 9 survive out of 1..=9; meal 7 has a link and a
    /// preference, meal 9 has a history entry.
    fn sparse_catalog(db: &Database) -> (i64, i64) {
        let catalog = Catalog::new(db);
        for n in 1..=9 {
            catalog.create_meal(&format!("Meal {n}"), None).unwrap();
        }
        for n in [1, 2, 4, 5, 6, 8] {
            catalog.delete_meal(n).unwrap();
        }
        let rice = ingredient(db, "Rice");
        catalog.link_ingredient(7, rice, "2 cups").unwrap();
        catalog.set_preference(7, Member::Skylar, Some(true)).unwrap();
        let history_id = plan_on(db, 9, 5);
        (rice, history_id)
    }

    // --- Consolidation ---

    #[test]
    fn test_consolidate_keeps_lowest_id() {
        let db = Database::open_in_memory().unwrap();
        db.conn()
            .execute_batch(
                "INSERT INTO meals (id, name) VALUES (5, 'Soup'), (8, 'Soup'), (9, 'Stew');",
            )
            .unwrap();

        let report = Maintenance::new(&db)
            .consolidate_duplicates(MergeStrategy::default())
            .unwrap();
        assert_eq!(report.removed, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(
            report.groups,
            vec![GroupOutcome {
                name: "Soup".to_string(),
                kept_id: 5,
                duplicate_ids: vec![8],
                error: None,
            }]
        );
        assert_eq!(meal_ids(&db), vec![5, 9]);
    }

    #[test]
    fn test_consolidate_is_case_sensitive() {
        let db = Database::open_in_memory().unwrap();
        let catalog = Catalog::new(&db);
        catalog.create_meal("Tacos", None).unwrap();
        catalog.create_meal("tacos", None).unwrap();
        let maintenance = Maintenance::new(&db);
        let report = maintenance.consolidate_duplicates(MergeStrategy::Discard).unwrap();
        assert!(report.groups.is_empty());
        assert_eq!(meal_ids(&db).len(), 2);
    }

    #[test]
    fn test_consolidate_discard_drops_duplicate_attachments() {
        let db = Database::open_in_memory().unwrap();
        let catalog = Catalog::new(&db);
        let keep = catalog.create_meal("Soup", None).unwrap();
        let dup = catalog.create_meal("Soup", None).unwrap();
        let leek = ingredient(&db, "Leek");
        catalog.link_ingredient(dup, leek, "2").unwrap();
        plan_on(&db, dup, 3);

        Maintenance::new(&db)
            .consolidate_duplicates(MergeStrategy::Discard)
            .unwrap();
        assert_eq!(meal_ids(&db), vec![keep]);
        assert!(catalog.ingredients_for(keep).unwrap().is_empty());
        assert!(ids(&db, "SELECT id FROM meal_history").is_empty());
    }

    #[test]
    fn test_consolidate_union_moves_links_and_history() {
        let db = Database::open_in_memory().unwrap();
        let catalog = Catalog::new(&db);
        let keep = catalog.create_meal("Soup", None).unwrap();
        let dup_a = catalog.create_meal("Soup", None).unwrap();
        let dup_b = catalog.create_meal("Soup", None).unwrap();
        let leek = ingredient(&db, "Leek");
        let potato = ingredient(&db, "Potato");
        let stock = ingredient(&db, "Stock");
        catalog.link_ingredient(keep, leek, "2").unwrap();
        catalog.link_ingredient(dup_a, leek, "3").unwrap();
        catalog.link_ingredient(dup_a, potato, "4").unwrap();
        catalog.link_ingredient(dup_b, potato, "1").unwrap();
        catalog.link_ingredient(dup_b, stock, "1 l").unwrap();
        let h1 = plan_on(&db, dup_a, 1);
        let h2 = plan_on(&db, dup_b, 2);

        let report = Maintenance::new(&db)
            .consolidate_duplicates(MergeStrategy::Union)
            .unwrap();
        assert_eq!(report.removed, 2);
        assert_eq!(meal_ids(&db), vec![keep]);

        let lines: Vec<(String, String)> = catalog
            .ingredients_for(keep)
            .unwrap()
            .into_iter()
            .map(|l| (l.ingredient_name, l.quantity))
            .collect();
        assert_eq!(
            lines,
            vec![
                ("Leek".to_string(), "2".to_string()),
                ("Potato".to_string(), "4".to_string()),
                ("Stock".to_string(), "1 l".to_string()),
            ]
        );
        let moved: Vec<i64> = History::new(&db)
            .list_for_meal(keep)
            .unwrap()
            .iter()
            .map(|h| h.id)
            .collect();
        assert_eq!(moved, vec![h2, h1]);
    }

    #[test]
    fn test_consolidate_failure_is_isolated_per_group() {
        let db = Database::open_in_memory().unwrap();
        let catalog = Catalog::new(&db);
        catalog.create_meal("Stew", None).unwrap();
        catalog.create_meal("Stew", None).unwrap();
        catalog.create_meal("Stew", None).unwrap();
        catalog.create_meal("Soup", None).unwrap();
        catalog.create_meal("Soup", None).unwrap();
        db.conn()
            .execute_batch(
                "CREATE TRIGGER stew_locked BEFORE DELETE ON meals
                 WHEN OLD.id = 3
                 BEGIN SELECT RAISE(ABORT, 'stew is locked'); END;",
            )
            .unwrap();

        let report = Maintenance::new(&db)
            .consolidate_duplicates(MergeStrategy::Discard)
            .unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.removed, 1);
        assert_eq!(report.groups.len(), 2);
        assert_eq!(report.groups[0].name, "Stew");
        assert!(report.groups[0].error.as_deref().unwrap().contains("stew is locked"));
        assert!(report.groups[1].error.is_none());
        // The failed group rolled back as a whole, including meal 2.
        assert_eq!(meal_ids(&db), vec![1, 2, 3, 4]);
    }

    // --- Renumbering ---

    #[test]
    fn test_renumber_makes_ids_dense_and_remaps() {
        let db = Database::open_in_memory().unwrap();
        let (rice, history_id) = sparse_catalog(&db);
        let catalog = Catalog::new(&db);

        let report = Maintenance::new(&db).renumber_meals().unwrap();
        assert_eq!(report.meals, 3);
        assert_eq!(report.changed, 3);
        assert_eq!(report.links, 1);
        assert_eq!(report.history, 1);
        assert!(report.dropped_links.is_empty());

        assert_eq!(meal_ids(&db), vec![1, 2, 3]);
        let names: Vec<String> = catalog.list_meals().unwrap().into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["Meal 3", "Meal 7", "Meal 9"]);
        assert_eq!(catalog.get_meal(2).unwrap().liked.skylar, Some(true));

        let link_meal: Vec<i64> = ids(&db, "SELECT meal_id FROM meal_ingredients");
        assert_eq!(link_meal, vec![2]);
        assert_eq!(ids(&db, "SELECT ingredient_id FROM meal_ingredients"), vec![rice]);

        let entry = History::new(&db).get_entry(history_id).unwrap();
        assert_eq!(entry.meal_id, 3);
        assert_eq!(entry.meal_name, "Meal 9");

        assert!(db.foreign_keys_enabled().unwrap());
        assert!(!db.table_exists(MEALS_STAGING).unwrap());
        assert_eq!(catalog.create_meal("Meal 10", None).unwrap(), 4);
    }

    #[test]
    fn test_renumber_keeps_cascade_and_indexes() {
        let db = Database::open_in_memory().unwrap();
        sparse_catalog(&db);
        Maintenance::new(&db).renumber_meals().unwrap();

        let indexes = ids(
            &db,
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name LIKE 'idx_%'",
        );
        assert_eq!(indexes, vec![4]);

        let catalog = Catalog::new(&db);
        assert!(catalog.delete_meal(2).unwrap());
        assert!(ids(&db, "SELECT id FROM meal_ingredients").is_empty());
        assert!(catalog.delete_meal(3).unwrap());
        assert!(ids(&db, "SELECT id FROM meal_history").is_empty());
    }

    #[test]
    fn test_renumber_history_rating_survives() {
        let db = Database::open_in_memory().unwrap();
        let (_, history_id) = sparse_catalog(&db);
        let mut ratings = MemberRatings::default();
        ratings.set(Member::Brad, Some(5));
        History::new(&db)
            .rate(history_id, &ratings, Some("great"), NaiveDate::from_ymd_opt(2024, 1, 6).unwrap())
            .unwrap();

        Maintenance::new(&db).renumber_meals().unwrap();
        let entry = History::new(&db).get_entry(history_id).unwrap();
        assert_eq!(entry.ratings.brad, Some(5));
        assert_eq!(entry.comments.as_deref(), Some("great"));
        let next = plan_on(&db, 1, 9);
        assert!(next > history_id);
    }

    #[test]
    fn test_renumber_empty_catalog_is_noop() {
        let db = Database::open_in_memory().unwrap();
        let report = Maintenance::new(&db).renumber_meals().unwrap();
        assert_eq!(report, RenumberReport::default());
        assert!(!db.table_exists(MEALS_STAGING).unwrap());
        assert!(db.foreign_keys_enabled().unwrap());
    }

    #[test]
    fn test_renumber_drops_dangling_rows() {
        let db = Database::open_in_memory().unwrap();
        let catalog = Catalog::new(&db);
        let meal = catalog.create_meal("Pie", None).unwrap();
        let apple = ingredient(&db, "Apple");
        catalog.link_ingredient(meal, apple, "6").unwrap();
        db.set_foreign_keys(false).unwrap();
        db.conn()
            .execute_batch(
                "INSERT INTO meal_ingredients (id, meal_id, ingredient_id, quantity) VALUES (50, 99, 1, '1');
                 INSERT INTO meal_ingredients (id, meal_id, ingredient_id, quantity) VALUES (51, 1, 77, '1');
                 INSERT INTO meal_history (id, meal_id, date_planned) VALUES (60, 99, '2024-01-01');",
            )
            .unwrap();
        db.set_foreign_keys(true).unwrap();

        let report = Maintenance::new(&db).renumber_meals().unwrap();
        assert_eq!(report.dropped_links, vec![50, 51]);
        assert_eq!(report.dropped_history, vec![60]);
        assert_eq!(report.links, 1);
        assert_eq!(ids(&db, "SELECT id FROM meal_ingredients"), vec![1]);
        assert!(ids(&db, "SELECT id FROM meal_history").is_empty());
    }

    #[test]
    fn test_interrupted_renumbering_leaves_originals_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meal-planner.db");

        let db = Database::open(&path).unwrap();
        sparse_catalog(&db);
        let plan = Maintenance::new(&db).stage_renumbering().unwrap();
        assert_eq!(
            plan.mapping,
            vec![
                IdChange { old: 3, new: 1 },
                IdChange { old: 7, new: 2 },
                IdChange { old: 9, new: 3 },
            ]
        );
        assert!(db.foreign_keys_enabled().unwrap());
        // Simulate a crash between staging and the swap.
        drop(db);

        let db = Database::open(&path).unwrap();
        assert_eq!(meal_ids(&db), vec![3, 7, 9]);
        assert_eq!(ids(&db, "SELECT meal_id FROM meal_ingredients"), vec![7]);
        assert_eq!(ids(&db, "SELECT meal_id FROM meal_history"), vec![9]);
        assert!(db.table_exists(MEALS_STAGING).unwrap());
        assert!(db.table_exists(MEAL_INGREDIENTS_STAGING).unwrap());

        let maintenance = Maintenance::new(&db);
        assert!(maintenance.discard_staging().unwrap());
        assert!(!maintenance.discard_staging().unwrap());
        assert!(!db.table_exists(MEAL_HISTORY_STAGING).unwrap());

        maintenance.renumber_meals().unwrap();
        assert_eq!(meal_ids(&db), vec![1, 2, 3]);
    }

    #[test]
    fn test_apply_refuses_stale_plan() {
        let db = Database::open_in_memory().unwrap();
        sparse_catalog(&db);
        let maintenance = Maintenance::new(&db);
        let plan = maintenance.stage_renumbering().unwrap();
        Catalog::new(&db).create_meal("Late arrival", None).unwrap();

        let err = maintenance.apply_renumbering(&plan).unwrap_err();
        assert!(matches!(StoreError::of(&err), Some(StoreError::Integrity(_))));
        assert_eq!(meal_ids(&db), vec![3, 7, 9, 10]);
        assert!(db.foreign_keys_enabled().unwrap());
    }

    #[test]
    fn test_apply_refuses_plan_after_rating_and_preference() {
        let db = Database::open_in_memory().unwrap();
        let catalog = Catalog::new(&db);
        let meal = catalog.create_meal("Chili", None).unwrap();
        let history_id = plan_on(&db, meal, 4);
        let maintenance = Maintenance::new(&db);
        let plan = maintenance.stage_renumbering().unwrap();

        let mut ratings = MemberRatings::default();
        ratings.set(Member::Brad, Some(5));
        History::new(&db)
            .rate(history_id, &ratings, Some("yum"), NaiveDate::from_ymd_opt(2024, 1, 5).unwrap())
            .unwrap();
        catalog.set_preference(meal, Member::Brad, Some(true)).unwrap();

        let err = maintenance.apply_renumbering(&plan).unwrap_err();
        assert!(matches!(StoreError::of(&err), Some(StoreError::Integrity(_))));
        let entry = History::new(&db).get_entry(history_id).unwrap();
        assert_eq!(entry.ratings.brad, Some(5));
        assert_eq!(entry.comments.as_deref(), Some("yum"));
        assert_eq!(catalog.get_meal(meal).unwrap().liked.brad, Some(true));
        assert!(db.foreign_keys_enabled().unwrap());
    }

    #[test]
    fn test_apply_refuses_plan_after_content_edits() {
        let db = Database::open_in_memory().unwrap();
        sparse_catalog(&db);
        let maintenance = Maintenance::new(&db);

        let plan = maintenance.stage_renumbering().unwrap();
        db.conn()
            .execute("UPDATE meal_ingredients SET quantity = '3 cups'", [])
            .unwrap();
        assert!(maintenance.apply_renumbering(&plan).is_err());
        assert_eq!(meal_ids(&db), vec![3, 7, 9]);

        let plan = maintenance.stage_renumbering().unwrap();
        db.conn()
            .execute("UPDATE meals SET name = 'Meal seven' WHERE id = 7", [])
            .unwrap();
        assert!(maintenance.apply_renumbering(&plan).is_err());
        assert_eq!(catalog_names(&db), vec!["Meal 3", "Meal seven", "Meal 9"]);

        // A fresh plan over the edited tables applies cleanly.
        let plan = maintenance.stage_renumbering().unwrap();
        maintenance.apply_renumbering(&plan).unwrap();
        assert_eq!(meal_ids(&db), vec![1, 2, 3]);
        assert_eq!(catalog_names(&db), vec!["Meal 3", "Meal seven", "Meal 9"]);
    }

    fn catalog_names(db: &Database) -> Vec<String> {
        Catalog::new(db)
            .list_meals()
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect()
    }

    #[test]
    fn test_apply_without_staging() {
        let db = Database::open_in_memory().unwrap();
        let err = Maintenance::new(&db)
            .apply_renumbering(&RenumberPlan::default())
            .unwrap_err();
        assert!(matches!(StoreError::of(&err), Some(StoreError::Validation(_))));
    }
}
