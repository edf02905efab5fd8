use anyhow::{Result, bail};
use serde::Serialize;
use tabled::{Table, Tabled, settings::Style};

use mealplan_core::catalog::Catalog;
use mealplan_core::db::Database;
use mealplan_core::history::History;
use mealplan_core::import::parse_ingredient_line;
use mealplan_core::models::{IngredientLine, Meal, MealDraft, Member};

use super::helpers::{exit_not_found, format_liked, or_not_found, print_json, truncate};

pub(crate) fn cmd_meal_add(
    db: &Database,
    name: &str,
    instructions: Option<&str>,
    ingredients: &[String],
    json: bool,
) -> Result<()> {
    let mut parsed = Vec::with_capacity(ingredients.len());
    for line in ingredients {
        match parse_ingredient_line(line) {
            Some(ingredient) => parsed.push(ingredient),
            None => bail!(
                "Invalid ingredient '{line}'. Use 'name - quantity - category [- shelf life]'"
            ),
        }
    }

    let catalog = Catalog::new(db);
    let draft = MealDraft {
        name: name.to_string(),
        instructions: instructions.unwrap_or_default().to_string(),
        ingredients: parsed,
    };
    let id = catalog.add_meal(&draft)?;

    if json {
        print_json(&catalog.get_meal(id)?)
    } else {
        let count = draft.ingredients.len();
        println!("Added meal {id}: {} ({count} ingredients)", draft.name.trim());
        Ok(())
    }
}

pub(crate) fn cmd_meal_list(db: &Database, json: bool) -> Result<()> {
    let meals = Catalog::new(db).list_meals()?;

    if json {
        return print_json(&meals);
    }
    if meals.is_empty() {
        println!("No meals yet. Add one with `mealplan meal add` or `mealplan import`.");
        return Ok(());
    }
    print_meal_table(&meals);
    Ok(())
}

fn print_meal_table(meals: &[Meal]) {
    #[derive(Tabled)]
    struct MealRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Brad")]
        brad: &'static str,
        #[tabled(rename = "Kayla")]
        kayla: &'static str,
        #[tabled(rename = "Skylar")]
        skylar: &'static str,
        #[tabled(rename = "Aubrey")]
        aubrey: &'static str,
    }

    let rows: Vec<MealRow> = meals
        .iter()
        .map(|m| MealRow {
            id: m.id,
            name: truncate(&m.name, 40),
            brad: format_liked(m.liked.brad),
            kayla: format_liked(m.liked.kayla),
            skylar: format_liked(m.liked.skylar),
            aubrey: format_liked(m.liked.aubrey),
        })
        .collect();

    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
}

pub(crate) fn cmd_meal_show(db: &Database, id: i64, json: bool) -> Result<()> {
    #[derive(Serialize)]
    struct MealDetail {
        #[serde(flatten)]
        meal: Meal,
        ingredients: Vec<IngredientLine>,
        times_planned: usize,
    }

    let catalog = Catalog::new(db);
    let meal = or_not_found(catalog.get_meal(id), json)?;
    let ingredients = catalog.ingredients_for(id)?;
    let times_planned = History::new(db).list_for_meal(id)?.len();

    if json {
        return print_json(&MealDetail {
            meal,
            ingredients,
            times_planned,
        });
    }

    println!("{} (#{})", meal.name, meal.id);
    if let Some(instructions) = &meal.instructions {
        println!("\n{instructions}");
    }
    if !ingredients.is_empty() {
        #[derive(Tabled)]
        struct IngredientRow {
            #[tabled(rename = "Ingredient")]
            name: String,
            #[tabled(rename = "Quantity")]
            quantity: String,
            #[tabled(rename = "Category")]
            category: String,
        }
        let rows: Vec<IngredientRow> = ingredients
            .iter()
            .map(|l| IngredientRow {
                name: l.ingredient_name.clone(),
                quantity: l.quantity.clone(),
                category: l.category.to_string(),
            })
            .collect();
        println!("\n{}", Table::new(&rows).with(Style::rounded()));
    }
    let liked: Vec<String> = meal
        .liked
        .iter()
        .filter_map(|(member, liked)| liked.map(|l| format!("{member}: {}", format_liked(Some(l)))))
        .collect();
    if !liked.is_empty() {
        println!("\nLikes: {}", liked.join(", "));
    }
    println!("Planned {times_planned} time(s)");
    Ok(())
}

pub(crate) fn cmd_meal_delete(db: &Database, id: i64, json: bool) -> Result<()> {
    if Catalog::new(db).delete_meal(id)? {
        if json {
            println!("{}", serde_json::json!({ "deleted": id }));
        } else {
            println!("Deleted meal {id} with its ingredient links and history");
        }
        Ok(())
    } else {
        exit_not_found(&format!("Meal {id} not found"), json)
    }
}

pub(crate) fn cmd_meal_like(
    db: &Database,
    id: i64,
    member: &str,
    liked: Option<bool>,
    json: bool,
) -> Result<()> {
    let member: Member = member.parse()?;
    let catalog = Catalog::new(db);
    or_not_found(catalog.set_preference(id, member, liked), json)?;

    if json {
        print_json(&catalog.get_meal(id)?)
    } else {
        match liked {
            Some(true) => println!("{member} likes meal {id}"),
            Some(false) => println!("{member} dislikes meal {id}"),
            None => println!("Cleared {member}'s preference for meal {id}"),
        }
        Ok(())
    }
}
