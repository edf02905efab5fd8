use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};
use tracing::debug;

use mealplan_core::db::Database;
use mealplan_core::ratings::{MealRatings, RatingAggregator, RatingFilter};

use super::helpers::{format_average, print_json, truncate};

pub(crate) fn cmd_ratings(db: &Database, filter: &str, json: bool) -> Result<()> {
    let parsed = RatingFilter::parse(filter);
    debug!(?parsed, "rating filter");
    let meals = RatingAggregator::new(db).filtered(parsed)?;

    if json {
        return print_json(&meals);
    }
    if meals.is_empty() {
        println!("No meals match '{filter}'.");
        return Ok(());
    }
    print_ratings_table(&meals);
    Ok(())
}

fn print_ratings_table(meals: &[MealRatings]) {
    #[derive(Tabled)]
    struct RatingRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Meal")]
        name: String,
        #[tabled(rename = "Brad")]
        brad: String,
        #[tabled(rename = "Kayla")]
        kayla: String,
        #[tabled(rename = "Skylar")]
        skylar: String,
        #[tabled(rename = "Aubrey")]
        aubrey: String,
        #[tabled(rename = "Overall")]
        overall: String,
    }

    let cell = |avg: Option<f64>, count: i64| match avg {
        Some(_) => format!("{} ({count})", format_average(avg)),
        None => "-".to_string(),
    };

    let rows: Vec<RatingRow> = meals
        .iter()
        .map(|m| RatingRow {
            id: m.meal.id,
            name: truncate(&m.meal.name, 35),
            brad: cell(m.average.brad, m.count.brad),
            kayla: cell(m.average.kayla, m.count.kayla),
            skylar: cell(m.average.skylar, m.count.skylar),
            aubrey: cell(m.average.aubrey, m.count.aubrey),
            overall: format_average(m.overall_average()),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..7)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}
