use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::db::{Database, MEAL_COLUMNS, category_column};
use crate::error::{StoreError, classify};
use crate::models::{
    DEFAULT_INSTRUCTIONS, Ingredient, IngredientLine, Meal, MealDraft, Member, NewIngredient,
    PerMember, validate_not_empty,
};

/// Meals, ingredients and the links between them.
pub struct Catalog<'a> {
    db: &'a Database,
}

impl<'a> Catalog<'a> {
    #[must_use]
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub(crate) fn meal_from_row(row: &rusqlite::Row) -> rusqlite::Result<Meal> {
        Ok(Meal {
            id: row.get(0)?,
            name: row.get(1)?,
            instructions: row.get(2)?,
            liked: PerMember {
                brad: row.get(3)?,
                kayla: row.get(4)?,
                skylar: row.get(5)?,
                aubrey: row.get(6)?,
            },
        })
    }

    fn ingredient_from_row(row: &rusqlite::Row) -> rusqlite::Result<Ingredient> {
        Ok(Ingredient {
            id: row.get(0)?,
            name: row.get(1)?,
            category: category_column(row, 2)?,
            shelf_life_days: row.get(3)?,
        })
    }

    // --- Meals ---

    pub fn create_meal(&self, name: &str, instructions: Option<&str>) -> Result<i64> {
        insert_meal(self.db.conn(), name, instructions)
    }

    pub fn get_meal(&self, id: i64) -> Result<Meal> {
        self.db
            .conn()
            .query_row(
                &format!("SELECT {MEAL_COLUMNS} FROM meals WHERE id = ?1"),
                params![id],
                Self::meal_from_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::not_found("meal", id).into())
    }

    pub fn list_meals(&self) -> Result<Vec<Meal>> {
        let mut stmt = self
            .db
            .conn()
            .prepare(&format!("SELECT {MEAL_COLUMNS} FROM meals ORDER BY id"))?;
        let meals = stmt
            .query_map([], Self::meal_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(meals)
    }

    pub fn meal_exists(&self, id: i64) -> Result<bool> {
        meal_exists(self.db.conn(), id)
    }

    /// Delete a meal. Its ingredient links and history go with it through
    /// `ON DELETE CASCADE`. Returns `false` when no such meal existed.
    pub fn delete_meal(&self, id: i64) -> Result<bool> {
        let rows = self
            .db
            .conn()
            .execute("DELETE FROM meals WHERE id = ?1", params![id])
            .map_err(classify)?;
        Ok(rows > 0)
    }

    /// Record whether `member` likes a meal. `None` clears the preference.
    pub fn set_preference(&self, meal_id: i64, member: Member, liked: Option<bool>) -> Result<()> {
        let rows = self
            .db
            .conn()
            .execute(set_liked_sql(member), params![liked, meal_id])
            .map_err(classify)?;
        if rows == 0 {
            return Err(StoreError::not_found("meal", meal_id).into());
        }
        Ok(())
    }

    /// Insert a meal with all of its ingredients in one transaction.
    /// Nothing is written if the draft is invalid or any step fails.
    pub fn add_meal(&self, draft: &MealDraft) -> Result<i64> {
        draft.validate()?;
        let meal_id = self.db.in_transaction(|tx| {
            let meal_id = insert_meal(tx, &draft.name, Some(&draft.instructions))?;
            for ing in &draft.ingredients {
                let ingredient_id = find_or_create_ingredient(tx, &ing.as_new_ingredient())?;
                insert_link(tx, meal_id, ingredient_id, &ing.quantity)?;
            }
            Ok(meal_id)
        })?;
        debug!(
            meal_id,
            ingredients = draft.ingredients.len(),
            "added meal {}",
            draft.name
        );
        Ok(meal_id)
    }

    // --- Ingredients ---

    /// Return the id of the ingredient whose name matches case-insensitively,
    /// creating it if there is none. An existing ingredient keeps its own
    /// category and shelf life.
    ///
    /// Matching uses SQLite's `LOWER()`, which folds ASCII letters only:
    /// "Éclair" and "éclair" are different ingredients.
    pub fn find_or_create_ingredient(&self, ingredient: &NewIngredient) -> Result<i64> {
        find_or_create_ingredient(self.db.conn(), ingredient)
    }

    pub fn find_ingredient_by_name(&self, name: &str) -> Result<Option<Ingredient>> {
        let ingredient = self
            .db
            .conn()
            .query_row(
                "SELECT id, name, category, shelf_life_days FROM ingredients
                 WHERE LOWER(name) = LOWER(?1) ORDER BY id LIMIT 1",
                params![name.trim()],
                Self::ingredient_from_row,
            )
            .optional()?;
        Ok(ingredient)
    }

    pub fn get_ingredient(&self, id: i64) -> Result<Ingredient> {
        self.db
            .conn()
            .query_row(
                "SELECT id, name, category, shelf_life_days FROM ingredients WHERE id = ?1",
                params![id],
                Self::ingredient_from_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::not_found("ingredient", id).into())
    }

    pub fn list_ingredients(&self) -> Result<Vec<Ingredient>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT id, name, category, shelf_life_days FROM ingredients ORDER BY name COLLATE NOCASE, id",
        )?;
        let ingredients = stmt
            .query_map([], Self::ingredient_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ingredients)
    }

    // --- Links ---

    pub fn link_ingredient(&self, meal_id: i64, ingredient_id: i64, quantity: &str) -> Result<i64> {
        insert_link(self.db.conn(), meal_id, ingredient_id, quantity)
    }

    /// The ingredients of a meal in the order they were linked. Unknown meals
    /// have no ingredients.
    pub fn ingredients_for(&self, meal_id: i64) -> Result<Vec<IngredientLine>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT i.name, mi.quantity, i.category
             FROM meal_ingredients mi
             JOIN ingredients i ON mi.ingredient_id = i.id
             WHERE mi.meal_id = ?1
             ORDER BY mi.id",
        )?;
        let lines = stmt
            .query_map(params![meal_id], |row| {
                Ok(IngredientLine {
                    ingredient_name: row.get(0)?,
                    quantity: row.get(1)?,
                    category: category_column(row, 2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(lines)
    }
}

/// Fixed member → statement table; column names never come from input.
fn set_liked_sql(member: Member) -> &'static str {
    match member {
        Member::Brad => "UPDATE meals SET brad_liked = ?1 WHERE id = ?2",
        Member::Kayla => "UPDATE meals SET kayla_liked = ?1 WHERE id = ?2",
        Member::Skylar => "UPDATE meals SET skylar_liked = ?1 WHERE id = ?2",
        Member::Aubrey => "UPDATE meals SET aubrey_liked = ?1 WHERE id = ?2",
    }
}

// The free functions take a `Connection` so they run the same way on the
// plain connection and inside a transaction (which derefs to one).

fn insert_meal(conn: &Connection, name: &str, instructions: Option<&str>) -> Result<i64> {
    validate_not_empty("Meal name", name)?;
    let instructions = instructions
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_INSTRUCTIONS);
    conn.execute(
        "INSERT INTO meals (name, instructions) VALUES (?1, ?2)",
        params![name.trim(), instructions],
    )
    .map_err(classify)
    .context("Failed to create meal")?;
    Ok(conn.last_insert_rowid())
}

fn meal_exists(conn: &Connection, id: i64) -> Result<bool> {
    let found = conn
        .query_row("SELECT 1 FROM meals WHERE id = ?1", params![id], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

fn find_or_create_ingredient(conn: &Connection, ingredient: &NewIngredient) -> Result<i64> {
    ingredient.validate()?;
    let name = ingredient.name.trim();
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM ingredients WHERE LOWER(name) = LOWER(?1) ORDER BY id LIMIT 1",
            params![name],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }
    conn.execute(
        "INSERT INTO ingredients (name, category, shelf_life_days) VALUES (?1, ?2, ?3)",
        params![
            name,
            ingredient.category.as_str(),
            ingredient.shelf_life_days
        ],
    )
    .map_err(classify)
    .with_context(|| format!("Failed to create ingredient '{name}'"))?;
    Ok(conn.last_insert_rowid())
}

fn insert_link(conn: &Connection, meal_id: i64, ingredient_id: i64, quantity: &str) -> Result<i64> {
    validate_not_empty("Quantity", quantity)?;
    if !meal_exists(conn, meal_id)? {
        return Err(StoreError::not_found("meal", meal_id).into());
    }
    let ingredient_found = conn
        .query_row(
            "SELECT 1 FROM ingredients WHERE id = ?1",
            params![ingredient_id],
            |_| Ok(()),
        )
        .optional()?;
    if ingredient_found.is_none() {
        return Err(StoreError::not_found("ingredient", ingredient_id).into());
    }
    conn.execute(
        "INSERT INTO meal_ingredients (meal_id, ingredient_id, quantity) VALUES (?1, ?2, ?3)",
        params![meal_id, ingredient_id, quantity.trim()],
    )
    .map_err(classify)
    .context("Failed to link ingredient")?;
    Ok(conn.last_insert_rowid())
}
