use std::collections::HashSet;
use std::io::Read;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::models::{Category, IngredientDraft, MealDraft};

/// Separator between the fields of an ingredient line.
const FIELD_SEPARATOR: &str = " - ";

/// Outcome of importing one meal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MealOutcome {
    pub name: String,
    pub ingredients: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meal_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of what an import would do / did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportReport {
    pub dry_run: bool,
    pub meals: Vec<MealOutcome>,
    pub imported: usize,
    pub failed: usize,
    pub ingredients_created: usize,
    pub ingredients_reused: usize,
}

/// Map a free-text category such as "Meat" or "Frozen veg" to a storage
/// category. Unrecognised text lands in the pantry.
#[must_use]
pub fn map_category(text: &str) -> Category {
    if let Ok(category) = text.parse::<Category>() {
        return category;
    }
    let text = text.trim().to_lowercase();
    let has = |word: &str| text.contains(word);
    if has("meat") || has("dairy") || has("produce") || has("refrigerated") {
        Category::Fridge
    } else if has("frozen") {
        Category::Freezer
    } else if has("spice") {
        Category::Misc
    } else {
        Category::Pantry
    }
}

/// Convert a shelf life such as "3 days", "1-2 weeks" or "2 years" to days.
///
/// Ranges use their upper bound, a bare number is days, and "Indefinite" or
/// anything without a number is unknown.
#[must_use]
pub fn parse_shelf_life(text: &str) -> Option<i64> {
    let text = text.trim().to_lowercase();
    if text.is_empty() || text == "indefinite" {
        return None;
    }

    // Take the last number of a leading "N-M" range, or the leading number.
    let numeric: String = text
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '-' || c.is_whitespace())
        .collect();
    let amount = numeric
        .split('-')
        .filter_map(|part| part.trim().parse::<i64>().ok())
        .next_back()?;

    let unit = &text[numeric.len()..];
    let per_unit = if unit.contains("year") {
        365
    } else if unit.contains("month") {
        30
    } else if unit.contains("week") {
        7
    } else {
        1
    };
    // Too large to represent is treated as unknown.
    amount.checked_mul(per_unit)
}

/// Parse `name - quantity - category [- shelf life]`. Returns `None` for
/// lines that do not have at least the first three fields.
#[must_use]
pub fn parse_ingredient_line(line: &str) -> Option<IngredientDraft> {
    let parts: Vec<&str> = line.split(FIELD_SEPARATOR).map(str::trim).collect();
    if parts.len() < 3 || parts[0].is_empty() || parts[1].is_empty() {
        return None;
    }
    Some(IngredientDraft {
        name: parts[0].to_string(),
        quantity: parts[1].to_string(),
        category: map_category(parts[2]),
        shelf_life_days: parts.get(3).and_then(|s| parse_shelf_life(s)),
    })
}

/// Strip a leading `N. ` meal number, returning the rest.
fn meal_header(line: &str) -> Option<&str> {
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let rest = line[digits..].strip_prefix('.')?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let name = rest.trim();
    (!name.is_empty()).then_some(name)
}

/// Parse the plain-text meal list format:
///
/// ```text
/// 1. Spaghetti Bolognese
/// Instructions: Brown beef, add sauce
/// Ingredients:
/// Ground Beef - 1 lb - Meat - 3 days
/// ```
///
/// Meals that end up with no ingredients are skipped.
#[must_use]
pub fn parse_meal_text(text: &str) -> Vec<MealDraft> {
    let mut meals = Vec::new();
    let mut current: Option<MealDraft> = None;
    let mut reading_ingredients = false;

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(name) = meal_header(line) {
            meals.extend(current.take().filter(|m| !m.ingredients.is_empty()));
            current = Some(MealDraft {
                name: name.to_string(),
                instructions: String::new(),
                ingredients: Vec::new(),
            });
            reading_ingredients = false;
        } else if let Some(instructions) = line.strip_prefix("Instructions:") {
            if let Some(meal) = current.as_mut() {
                meal.instructions = instructions.trim().to_string();
            }
        } else if line == "Ingredients:" {
            reading_ingredients = true;
        } else if reading_ingredients {
            if let Some(meal) = current.as_mut() {
                match parse_ingredient_line(line) {
                    Some(ingredient) => meal.ingredients.push(ingredient),
                    None => warn!(meal = %meal.name, line, "skipping malformed ingredient line"),
                }
            }
        }
    }
    meals.extend(current.filter(|m| !m.ingredients.is_empty()));
    meals
}

/// Parse a CSV meal list from any reader.
///
/// Expected header:
/// `meal,instructions,ingredient,quantity,category,shelf_life`
///
/// `instructions` and `shelf_life` are optional. Consecutive rows with the
/// same meal name make up one meal.
pub fn parse_meal_csv<R: Read>(reader: R) -> Result<Vec<MealDraft>> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers().context("Failed to read CSV headers")?.clone();

    let required = ["meal", "ingredient", "quantity", "category"];
    for name in &required {
        if !headers.iter().any(|h| h.eq_ignore_ascii_case(name)) {
            bail!("Missing required column: {name}");
        }
    }

    let col =
        |name: &str| -> Option<usize> { headers.iter().position(|h| h.eq_ignore_ascii_case(name)) };

    let idx_meal = col("meal").context("Missing 'meal' column")?;
    let idx_ingredient = col("ingredient").context("Missing 'ingredient' column")?;
    let idx_quantity = col("quantity").context("Missing 'quantity' column")?;
    let idx_category = col("category").context("Missing 'category' column")?;
    let idx_instructions = col("instructions");
    let idx_shelf = col("shelf_life");

    let mut meals: Vec<MealDraft> = Vec::new();

    for (line_num, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("Failed to parse CSV row {}", line_num + 2))?;
        let field = |idx: Option<usize>| idx.and_then(|i| record.get(i)).unwrap_or("").trim();

        let meal_name = field(Some(idx_meal));
        if meal_name.is_empty() {
            continue;
        }

        if meals.last().is_none_or(|m| m.name != meal_name) {
            meals.push(MealDraft {
                name: meal_name.to_string(),
                instructions: String::new(),
                ingredients: Vec::new(),
            });
        }
        let Some(meal) = meals.last_mut() else {
            continue;
        };

        let instructions = field(idx_instructions);
        if meal.instructions.is_empty() && !instructions.is_empty() {
            meal.instructions = instructions.to_string();
        }

        let ingredient = field(Some(idx_ingredient));
        let quantity = field(Some(idx_quantity));
        if ingredient.is_empty() || quantity.is_empty() {
            continue;
        }
        meal.ingredients.push(IngredientDraft {
            name: ingredient.to_string(),
            quantity: quantity.to_string(),
            category: map_category(field(Some(idx_category))),
            shelf_life_days: parse_shelf_life(field(idx_shelf)),
        });
    }

    meals.retain(|m| !m.ingredients.is_empty());
    Ok(meals)
}

/// Import parsed meals, one transaction per meal.
///
/// A meal that fails is recorded in the report and the rest still import.
/// When `dry_run` is true, meals are only validated and nothing is written.
pub fn import_drafts(catalog: &Catalog, drafts: &[MealDraft], dry_run: bool) -> Result<ImportReport> {
    let mut report = ImportReport {
        dry_run,
        ..ImportReport::default()
    };
    // Lowercased names of ingredients already present or created by this run.
    let mut known: HashSet<String> = HashSet::new();

    for draft in drafts {
        let mut created = Vec::new();
        let mut reused = 0;
        for ing in &draft.ingredients {
            let key = ing.name.trim().to_lowercase();
            if known.contains(&key) || created.contains(&key) {
                reused += 1;
            } else if catalog.find_ingredient_by_name(&ing.name)?.is_some() {
                known.insert(key);
                reused += 1;
            } else {
                created.push(key);
            }
        }

        let result = if dry_run {
            draft.validate().map(|()| None).map_err(anyhow::Error::from)
        } else {
            catalog.add_meal(draft).map(Some)
        };

        let outcome = match result {
            Ok(meal_id) => {
                if !dry_run {
                    info!(name = %draft.name, ingredients = draft.ingredients.len(), "imported meal");
                }
                report.imported += 1;
                report.ingredients_created += created.len();
                report.ingredients_reused += reused;
                known.extend(created);
                MealOutcome {
                    name: draft.name.clone(),
                    ingredients: draft.ingredients.len(),
                    meal_id,
                    error: None,
                }
            }
            Err(e) => {
                let reason = format!("{e:#}");
                warn!(name = %draft.name, error = %reason, "failed to import meal");
                report.failed += 1;
                MealOutcome {
                    name: draft.name.clone(),
                    ingredients: draft.ingredients.len(),
                    meal_id: None,
                    error: Some(reason),
                }
            }
        };
        report.meals.push(outcome);
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::DEFAULT_INSTRUCTIONS;

    const SAMPLE_TEXT: &str = "\
1. Spaghetti Bolognese
Instructions: Brown beef, add sauce, cook pasta, combine
Ingredients:
Ground Beef - 1 lb - Meat - 3 days
Spaghetti Noodles - 1 box - Pantry - 2 years
Tomato Sauce - 1 jar - Pantry - 1-2 years

2. Water
Instructions: Pour
Ingredients:

3. Ice Cream Sundae
Ingredients:
Vanilla Ice Cream - 2 scoops - Frozen - 2 months
Sprinkles - 1 tbsp - Spices - Indefinite
Cherry - 1
";

    const SAMPLE_CSV: &str = "\
meal,instructions,ingredient,quantity,category,shelf_life
Pancakes,Mix and fry,Flour,2 cups,Pantry,1 year
Pancakes,,Milk,1 cup,Dairy,7 days
Pancakes,,Egg,2,Refrigerated,3-5 weeks
Toast,,Bread,2 slices,Bread,
Empty,Nothing here,,,,
";

    #[test]
    fn test_map_category() {
        assert_eq!(map_category("Meat"), Category::Fridge);
        assert_eq!(map_category("dairy & eggs"), Category::Fridge);
        assert_eq!(map_category("Produce"), Category::Fridge);
        assert_eq!(map_category("Refrigerated"), Category::Fridge);
        assert_eq!(map_category("Frozen"), Category::Freezer);
        assert_eq!(map_category("Bread"), Category::Pantry);
        assert_eq!(map_category("Spices"), Category::Misc);
        assert_eq!(map_category("freezer"), Category::Freezer);
        assert_eq!(map_category("Misc"), Category::Misc);
        assert_eq!(map_category("canned goods"), Category::Pantry);
    }

    #[test]
    fn test_parse_shelf_life() {
        assert_eq!(parse_shelf_life("3 days"), Some(3));
        assert_eq!(parse_shelf_life("1 day"), Some(1));
        assert_eq!(parse_shelf_life("2 weeks"), Some(14));
        assert_eq!(parse_shelf_life("6 months"), Some(180));
        assert_eq!(parse_shelf_life("2 years"), Some(730));
        assert_eq!(parse_shelf_life("1-2 years"), Some(730));
        assert_eq!(parse_shelf_life("3-5 days"), Some(5));
        assert_eq!(parse_shelf_life("10"), Some(10));
        assert_eq!(parse_shelf_life("Indefinite"), None);
        assert_eq!(parse_shelf_life(""), None);
        assert_eq!(parse_shelf_life("a while"), None);
    }

    #[test]
    fn test_parse_shelf_life_overflow_is_unknown() {
        assert_eq!(parse_shelf_life("99999999999999999 years"), None);
        assert_eq!(parse_shelf_life("9999999999999999999999 days"), None);
        assert_eq!(
            parse_ingredient_line("Salt - 1 tsp - Pantry - 99999999999999999 years")
                .unwrap()
                .shelf_life_days,
            None
        );
    }

    #[test]
    fn test_parse_ingredient_line() {
        let ing = parse_ingredient_line("Ground Beef - 1 lb - Meat - 3 days").unwrap();
        assert_eq!(ing.name, "Ground Beef");
        assert_eq!(ing.quantity, "1 lb");
        assert_eq!(ing.category, Category::Fridge);
        assert_eq!(ing.shelf_life_days, Some(3));

        let no_shelf = parse_ingredient_line("Salt - pinch - Spice").unwrap();
        assert_eq!(no_shelf.shelf_life_days, None);
        assert_eq!(no_shelf.category, Category::Misc);

        let hyphenated = parse_ingredient_line("Semi-sweet Chips - 1 cup - Pantry").unwrap();
        assert_eq!(hyphenated.name, "Semi-sweet Chips");

        assert!(parse_ingredient_line("Cherry - 1").is_none());
        assert!(parse_ingredient_line(" - 1 - Pantry").is_none());
    }

    #[test]
    fn test_parse_meal_text() {
        let meals = parse_meal_text(SAMPLE_TEXT);
        let names: Vec<&str> = meals.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Spaghetti Bolognese", "Ice Cream Sundae"]);

        let spaghetti = &meals[0];
        assert_eq!(spaghetti.instructions, "Brown beef, add sauce, cook pasta, combine");
        assert_eq!(spaghetti.ingredients.len(), 3);
        assert_eq!(spaghetti.ingredients[2].shelf_life_days, Some(730));

        let sundae = &meals[1];
        assert_eq!(sundae.instructions, "");
        assert_eq!(sundae.ingredients.len(), 2);
        assert_eq!(sundae.ingredients[0].category, Category::Freezer);
        assert_eq!(sundae.ingredients[0].shelf_life_days, Some(60));
        assert_eq!(sundae.ingredients[1].shelf_life_days, None);
    }

    #[test]
    fn test_parse_meal_text_ignores_lines_before_ingredients() {
        let text = "1. Toast\nBread - 2 slices - Bread\nIngredients:\nButter - 1 tbsp - Dairy\n";
        let meals = parse_meal_text(text);
        assert_eq!(meals.len(), 1);
        assert_eq!(meals[0].ingredients.len(), 1);
        assert_eq!(meals[0].ingredients[0].name, "Butter");
    }

    #[test]
    fn test_parse_meal_csv() {
        let meals = parse_meal_csv(SAMPLE_CSV.as_bytes()).unwrap();
        assert_eq!(meals.len(), 2);

        assert_eq!(meals[0].name, "Pancakes");
        assert_eq!(meals[0].instructions, "Mix and fry");
        assert_eq!(meals[0].ingredients.len(), 3);
        assert_eq!(meals[0].ingredients[1].category, Category::Fridge);
        assert_eq!(meals[0].ingredients[2].shelf_life_days, Some(35));

        assert_eq!(meals[1].name, "Toast");
        assert_eq!(meals[1].ingredients[0].shelf_life_days, None);
    }

    #[test]
    fn test_parse_meal_csv_missing_column() {
        let csv = "meal,ingredient,category\nToast,Bread,Pantry\n";
        let err = parse_meal_csv(csv.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("quantity"));
    }

    #[test]
    fn test_import_drafts() {
        let db = Database::open_in_memory().unwrap();
        let catalog = Catalog::new(&db);
        let meals = parse_meal_text(SAMPLE_TEXT);

        let report = import_drafts(&catalog, &meals, false).unwrap();
        assert_eq!(report.imported, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(report.ingredients_created, 5);
        assert_eq!(report.ingredients_reused, 0);

        let stored = catalog.list_meals().unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1].instructions.as_deref(), Some(DEFAULT_INSTRUCTIONS));
        let sundae_id = report.meals[1].meal_id.unwrap();
        assert_eq!(catalog.ingredients_for(sundae_id).unwrap().len(), 2);

        // A second import reuses every ingredient.
        let again = import_drafts(&catalog, &meals, false).unwrap();
        assert_eq!(again.ingredients_created, 0);
        assert_eq!(again.ingredients_reused, 5);
        assert_eq!(catalog.list_ingredients().unwrap().len(), 5);
    }

    #[test]
    fn test_import_drafts_dry_run_writes_nothing() {
        let db = Database::open_in_memory().unwrap();
        let catalog = Catalog::new(&db);
        let meals = parse_meal_csv(SAMPLE_CSV.as_bytes()).unwrap();

        let report = import_drafts(&catalog, &meals, true).unwrap();
        assert!(report.dry_run);
        assert_eq!(report.imported, 2);
        assert_eq!(report.ingredients_created, 4);
        assert!(report.meals.iter().all(|m| m.meal_id.is_none()));
        assert!(catalog.list_meals().unwrap().is_empty());
        assert!(catalog.list_ingredients().unwrap().is_empty());
    }

    #[test]
    fn test_import_drafts_continues_after_failure() {
        let db = Database::open_in_memory().unwrap();
        let catalog = Catalog::new(&db);
        let mut meals = parse_meal_text(SAMPLE_TEXT);
        meals[0].ingredients[1].quantity = String::new();

        let report = import_drafts(&catalog, &meals, false).unwrap();
        assert_eq!(report.imported, 1);
        assert_eq!(report.failed, 1);
        assert!(report.meals[0].error.as_deref().unwrap().contains("Quantity"));
        assert_eq!(report.ingredients_created, 2);

        let names: Vec<String> = catalog.list_meals().unwrap().into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["Ice Cream Sundae"]);
    }
}
