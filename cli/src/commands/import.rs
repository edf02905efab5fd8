use std::path::Path;

use anyhow::{Context, Result};
use clap::ValueEnum;

use mealplan_core::catalog::Catalog;
use mealplan_core::db::Database;
use mealplan_core::import::{import_drafts, parse_meal_csv, parse_meal_text};

use super::helpers::print_json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum ImportFormat {
    /// Numbered meal list with `Instructions:` and `Ingredients:` sections
    Text,
    /// `meal,instructions,ingredient,quantity,category,shelf_life`
    Csv,
}

impl ImportFormat {
    /// `.csv` files are CSV, everything else is the text format.
    fn detect(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => ImportFormat::Csv,
            _ => ImportFormat::Text,
        }
    }
}

pub(crate) fn cmd_import(
    db: &Database,
    path: &Path,
    format: Option<ImportFormat>,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let format = format.unwrap_or_else(|| ImportFormat::detect(path));
    let drafts = match format {
        ImportFormat::Csv => {
            let file = std::fs::File::open(path)
                .with_context(|| format!("Failed to open file: {}", path.display()))?;
            parse_meal_csv(file)?
        }
        ImportFormat::Text => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read file: {}", path.display()))?;
            parse_meal_text(&text)
        }
    };

    if drafts.is_empty() {
        if json {
            println!(
                "{}",
                serde_json::json!({ "error": "No meals with ingredients found in file" })
            );
        } else {
            eprintln!("No meals with ingredients found in file.");
        }
        return Ok(());
    }

    let report = import_drafts(&Catalog::new(db), &drafts, dry_run)?;

    if json {
        return print_json(&report);
    }

    if dry_run {
        println!("Dry run — no changes made.\n");
    }
    for outcome in &report.meals {
        match &outcome.error {
            None => println!("  ✓ {} ({} ingredients)", outcome.name, outcome.ingredients),
            Some(reason) => println!("  ✗ {}: {reason}", outcome.name),
        }
    }
    let verb = if dry_run { "Would import" } else { "Imported" };
    println!(
        "\n{verb} {} of {} meals ({} new ingredients, {} reused)",
        report.imported,
        report.meals.len(),
        report.ingredients_created,
        report.ingredients_reused
    );
    Ok(())
}
