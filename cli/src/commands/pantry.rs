use anyhow::Result;
use tabled::{Table, Tabled, settings::Style};

use mealplan_core::catalog::Catalog;
use mealplan_core::db::Database;
use mealplan_core::models::{NewPantryItem, PantryItem};
use mealplan_core::pantry::Pantry;

use super::helpers::{exit_not_found, format_opt_date, parse_date, print_json, truncate};

pub(crate) fn cmd_pantry_add(
    db: &Database,
    ingredient: &str,
    quantity: Option<String>,
    purchased: Option<String>,
    expires: Option<String>,
    json: bool,
) -> Result<()> {
    let Some(found) = Catalog::new(db).find_ingredient_by_name(ingredient)? else {
        exit_not_found(&format!("Ingredient '{ingredient}' not found"), json)
    };
    let item = NewPantryItem {
        ingredient_id: found.id,
        quantity_remaining: quantity,
        date_purchased: parse_date(purchased)?,
        expiry_date: expires.map(Some).map(parse_date).transpose()?,
    };

    let pantry = Pantry::new(db);
    let id = pantry.add_item(&item)?;
    let stored = pantry.list_items()?.into_iter().find(|i| i.id == id);

    if json {
        print_json(&stored)
    } else {
        let expiry = stored.and_then(|i| i.expiry_date);
        println!(
            "Added {} to the pantry (item {id}, expires {})",
            found.name,
            format_opt_date(expiry)
        );
        Ok(())
    }
}

pub(crate) fn cmd_pantry_list(db: &Database, expiring_by: Option<String>, json: bool) -> Result<()> {
    let pantry = Pantry::new(db);
    let items = match expiring_by {
        Some(date) => pantry.expiring_by(parse_date(Some(date))?)?,
        None => pantry.list_items()?,
    };

    if json {
        return print_json(&items);
    }
    if items.is_empty() {
        println!("Pantry is empty.");
        return Ok(());
    }
    print_pantry_table(&items);
    Ok(())
}

fn print_pantry_table(items: &[PantryItem]) {
    #[derive(Tabled)]
    struct PantryRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Ingredient")]
        name: String,
        #[tabled(rename = "Category")]
        category: String,
        #[tabled(rename = "Quantity")]
        quantity: String,
        #[tabled(rename = "Purchased")]
        purchased: String,
        #[tabled(rename = "Expires")]
        expires: String,
    }

    let rows: Vec<PantryRow> = items
        .iter()
        .map(|i| PantryRow {
            id: i.id,
            name: truncate(&i.ingredient_name, 30),
            category: i.category.to_string(),
            quantity: i.quantity_remaining.clone().unwrap_or_default(),
            purchased: format_opt_date(i.date_purchased),
            expires: format_opt_date(i.expiry_date),
        })
        .collect();

    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
}

pub(crate) fn cmd_pantry_remove(db: &Database, id: i64, json: bool) -> Result<()> {
    if Pantry::new(db).remove_item(id)? {
        if json {
            println!("{}", serde_json::json!({ "deleted": id }));
        } else {
            println!("Removed pantry item {id}");
        }
        Ok(())
    } else {
        exit_not_found(&format!("Pantry item {id} not found"), json)
    }
}
