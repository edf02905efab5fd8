use anyhow::Result;

use mealplan_core::db::Database;
use mealplan_core::maintenance::{Maintenance, MergeStrategy};

use super::helpers::print_json;

pub(crate) fn cmd_dedupe(db: &Database, union: bool, json: bool) -> Result<()> {
    let strategy = if union {
        MergeStrategy::Union
    } else {
        MergeStrategy::Discard
    };
    let report = Maintenance::new(db).consolidate_duplicates(strategy)?;

    if json {
        return print_json(&report);
    }
    if report.groups.is_empty() {
        println!("No duplicate meals found.");
        return Ok(());
    }
    for group in &report.groups {
        let dups: Vec<String> = group.duplicate_ids.iter().map(ToString::to_string).collect();
        match &group.error {
            None => println!(
                "  ✓ {}: kept {}, removed {}",
                group.name,
                group.kept_id,
                dups.join(", ")
            ),
            Some(reason) => println!("  ✗ {}: {reason}", group.name),
        }
    }
    println!(
        "\nRemoved {} duplicate meal(s); {} group(s) failed",
        report.removed, report.failed
    );
    if strategy == MergeStrategy::Discard && report.removed > 0 {
        println!("Links and history of removed meals were deleted. Use --union to keep them.");
    }
    Ok(())
}

pub(crate) fn cmd_renumber(db: &Database, discard_staging: bool, json: bool) -> Result<()> {
    let maintenance = Maintenance::new(db);

    if discard_staging {
        let dropped = maintenance.discard_staging()?;
        if json {
            println!("{}", serde_json::json!({ "discarded": dropped }));
        } else if dropped {
            println!("Dropped leftover renumbering tables");
        } else {
            println!("No leftover renumbering tables");
        }
        return Ok(());
    }

    let report = maintenance.renumber_meals()?;
    if json {
        return print_json(&report);
    }
    if report.meals == 0 {
        println!("No meals to renumber.");
        return Ok(());
    }
    println!(
        "Renumbered {} meal(s), {} changed id; {} ingredient link(s) and {} history entr(ies) remapped",
        report.meals, report.changed, report.links, report.history
    );
    if !report.dropped_links.is_empty() || !report.dropped_history.is_empty() {
        println!(
            "Dropped {} dangling link(s) and {} dangling history entr(ies)",
            report.dropped_links.len(),
            report.dropped_history.len()
        );
    }
    Ok(())
}
