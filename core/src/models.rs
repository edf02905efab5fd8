use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Stored when a meal is created without instructions.
pub const DEFAULT_INSTRUCTIONS: &str = "No instructions provided";

// --- Categories ---

/// Where an ingredient lives. The store enforces the same four values with a
/// CHECK constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    Pantry,
    Fridge,
    Freezer,
    Misc,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Pantry,
        Category::Fridge,
        Category::Freezer,
        Category::Misc,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Pantry => "Pantry",
            Category::Fridge => "Fridge",
            Category::Freezer => "Freezer",
            Category::Misc => "Misc",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| {
                StoreError::validation(format!(
                    "Invalid category '{s}'. Must be one of: Pantry, Fridge, Freezer, Misc"
                ))
            })
    }
}

// --- Household members ---

/// The fixed set of household members. Each member owns one `*_liked` column
/// on `meals` and one `*_rating` column on `meal_history`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Member {
    Brad,
    Kayla,
    Skylar,
    Aubrey,
}

impl Member {
    pub const ALL: [Member; 4] = [Member::Brad, Member::Kayla, Member::Skylar, Member::Aubrey];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Member::Brad => "Brad",
            Member::Kayla => "Kayla",
            Member::Skylar => "Skylar",
            Member::Aubrey => "Aubrey",
        }
    }

    /// Single-letter alias, A through D in household order.
    #[must_use]
    pub fn letter(self) -> char {
        match self {
            Member::Brad => 'A',
            Member::Kayla => 'B',
            Member::Skylar => 'C',
            Member::Aubrey => 'D',
        }
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Member {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Member::ALL
            .into_iter()
            .find(|m| {
                m.name().eq_ignore_ascii_case(trimmed)
                    || (trimmed.len() == 1
                        && trimmed.eq_ignore_ascii_case(&m.letter().to_string()))
            })
            .ok_or_else(|| {
                StoreError::validation(format!(
                    "Unknown household member '{s}'. Must be one of: Brad, Kayla, Skylar, Aubrey"
                ))
            })
    }
}

/// One value per household member, addressed by [`Member`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerMember<T> {
    pub brad: T,
    pub kayla: T,
    pub skylar: T,
    pub aubrey: T,
}

impl<T> PerMember<T> {
    pub fn get(&self, member: Member) -> &T {
        match member {
            Member::Brad => &self.brad,
            Member::Kayla => &self.kayla,
            Member::Skylar => &self.skylar,
            Member::Aubrey => &self.aubrey,
        }
    }

    pub fn set(&mut self, member: Member, value: T) {
        match member {
            Member::Brad => self.brad = value,
            Member::Kayla => self.kayla = value,
            Member::Skylar => self.skylar = value,
            Member::Aubrey => self.aubrey = value,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Member, &T)> {
        Member::ALL.into_iter().map(move |m| (m, self.get(m)))
    }
}

pub type MemberRatings = PerMember<Option<u8>>;

impl MemberRatings {
    /// Ratings are whole numbers from 1 to 5; `None` means the member skipped.
    pub fn validate(&self) -> Result<(), StoreError> {
        for (member, rating) in self.iter() {
            if let Some(r) = *rating {
                if !(1..=5).contains(&r) {
                    return Err(StoreError::validation(format!(
                        "{member}'s rating must be between 1 and 5 (got {r})"
                    )));
                }
            }
        }
        Ok(())
    }
}

// --- Catalog ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meal {
    pub id: i64,
    pub name: String,
    pub instructions: Option<String>,
    pub liked: PerMember<Option<bool>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    pub id: i64,
    pub name: String,
    pub category: Category,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shelf_life_days: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct NewIngredient {
    pub name: String,
    pub category: Category,
    pub shelf_life_days: Option<i64>,
}

impl NewIngredient {
    pub fn validate(&self) -> Result<(), StoreError> {
        validate_not_empty("Ingredient name", &self.name)?;
        if self.shelf_life_days.is_some_and(|d| d < 0) {
            return Err(StoreError::validation("Shelf life must not be negative"));
        }
        Ok(())
    }
}

/// One ingredient of a meal as the shopping list sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngredientLine {
    pub ingredient_name: String,
    pub quantity: String,
    pub category: Category,
}

/// A validated meal ready to be written, as produced by import adapters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MealDraft {
    pub name: String,
    pub instructions: String,
    pub ingredients: Vec<IngredientDraft>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngredientDraft {
    pub name: String,
    pub quantity: String,
    pub category: Category,
    pub shelf_life_days: Option<i64>,
}

impl MealDraft {
    pub fn validate(&self) -> Result<(), StoreError> {
        validate_not_empty("Meal name", &self.name)?;
        for ing in &self.ingredients {
            ing.as_new_ingredient().validate()?;
            validate_not_empty("Quantity", &ing.quantity)?;
        }
        Ok(())
    }
}

impl IngredientDraft {
    #[must_use]
    pub fn as_new_ingredient(&self) -> NewIngredient {
        NewIngredient {
            name: self.name.clone(),
            category: self.category,
            shelf_life_days: self.shelf_life_days,
        }
    }
}

// --- History ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryStatus {
    Unrated,
    Rated,
}

impl HistoryStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            HistoryStatus::Unrated => "unrated",
            HistoryStatus::Rated => "rated",
        }
    }
}

impl FromStr for HistoryStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unrated" => Ok(HistoryStatus::Unrated),
            "rated" => Ok(HistoryStatus::Rated),
            _ => Err(StoreError::validation(format!("Invalid history status '{s}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub meal_id: i64,
    pub meal_name: String,
    pub date_planned: NaiveDate,
    pub date_cooked: Option<NaiveDate>,
    pub status: HistoryStatus,
    pub ratings: MemberRatings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}

impl HistoryEntry {
    /// Mean of the ratings that were given for this one cooking.
    #[must_use]
    pub fn average_rating(&self) -> Option<f64> {
        let given: Vec<f64> = self
            .ratings
            .iter()
            .filter_map(|(_, r)| r.map(f64::from))
            .collect();
        mean(&given)
    }
}

// --- Pantry ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PantryItem {
    pub id: i64,
    pub ingredient_id: i64,
    pub ingredient_name: String,
    pub category: Category,
    pub quantity_remaining: Option<String>,
    pub date_purchased: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
}

#[derive(Debug, Clone)]
pub struct NewPantryItem {
    pub ingredient_id: i64,
    pub quantity_remaining: Option<String>,
    pub date_purchased: NaiveDate,
    pub expiry_date: Option<NaiveDate>,
}

// --- Helpers ---

pub(crate) fn validate_not_empty(field: &str, value: &str) -> Result<(), StoreError> {
    if value.trim().is_empty() {
        Err(StoreError::validation(format!("{field} must not be empty")))
    } else {
        Ok(())
    }
}

#[allow(clippy::cast_precision_loss)]
pub(crate) fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
