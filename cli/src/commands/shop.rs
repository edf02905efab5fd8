use anyhow::{Result, bail};

use mealplan_core::db::Database;
use mealplan_core::shopping::ShoppingListBuilder;

use super::helpers::print_json;

pub(crate) fn cmd_shop(db: &Database, meal_ids: &[i64], json: bool) -> Result<()> {
    if meal_ids.is_empty() {
        bail!("Give at least one meal ID");
    }
    let list = ShoppingListBuilder::new(db).build(meal_ids)?;

    if json {
        return print_json(&list.items);
    }
    if list.is_empty() {
        println!("Nothing to buy for those meals.");
        return Ok(());
    }
    for (category, items) in list.non_empty() {
        println!("{category}:");
        for item in items {
            println!("  - {item}");
        }
        println!();
    }
    println!("{} item(s)", list.len());
    Ok(())
}
