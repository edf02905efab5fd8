use anyhow::Result;
use tabled::{Table, Tabled, settings::Style};

use mealplan_core::db::Database;
use mealplan_core::history::History;
use mealplan_core::models::{HistoryEntry, HistoryStatus, MemberRatings};

use super::helpers::{
    exit_not_found, format_average, format_opt_date, format_rating, or_not_found, parse_date,
    print_json, truncate,
};

pub(crate) fn cmd_plan(db: &Database, meal_id: i64, date: Option<String>, json: bool) -> Result<()> {
    let date = parse_date(date)?;
    let history = History::new(db);
    let id = or_not_found(history.schedule(meal_id, date), json)?;

    if json {
        print_json(&history.get_entry(id)?)
    } else {
        let entry = history.get_entry(id)?;
        println!(
            "Planned {} for {} (history entry {id})",
            entry.meal_name, entry.date_planned
        );
        Ok(())
    }
}

pub(crate) fn cmd_rate(
    db: &Database,
    history_id: i64,
    ratings: &MemberRatings,
    comments: Option<&str>,
    cooked: Option<String>,
    json: bool,
) -> Result<()> {
    let date_cooked = parse_date(cooked)?;
    let history = History::new(db);
    or_not_found(history.rate(history_id, ratings, comments, date_cooked), json)?;
    let entry = history.get_entry(history_id)?;

    if json {
        print_json(&entry)
    } else {
        println!(
            "Rated {} (cooked {}): average {}",
            entry.meal_name,
            format_opt_date(entry.date_cooked),
            format_average(entry.average_rating())
        );
        Ok(())
    }
}

pub(crate) fn cmd_history_list(
    db: &Database,
    meal_id: Option<i64>,
    rated: bool,
    unrated: bool,
    json: bool,
) -> Result<()> {
    let history = History::new(db);
    let entries = match meal_id {
        Some(id) => {
            let mut all = history.list_for_meal(id)?;
            all.retain(|e| keep(e.status, rated, unrated));
            all
        }
        None => {
            let mut all = Vec::new();
            if keep(HistoryStatus::Unrated, rated, unrated) {
                all.extend(history.list_unrated()?);
            }
            if keep(HistoryStatus::Rated, rated, unrated) {
                all.extend(history.list_rated()?);
            }
            all
        }
    };

    if json {
        return print_json(&entries);
    }
    if entries.is_empty() {
        println!("No history entries.");
        return Ok(());
    }
    print_history_table(&entries);
    Ok(())
}

/// With neither flag set, every status is shown.
fn keep(status: HistoryStatus, rated: bool, unrated: bool) -> bool {
    match status {
        HistoryStatus::Rated => rated || !unrated,
        HistoryStatus::Unrated => unrated || !rated,
    }
}

fn print_history_table(entries: &[HistoryEntry]) {
    #[derive(Tabled)]
    struct HistoryRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Meal")]
        meal: String,
        #[tabled(rename = "Planned")]
        planned: String,
        #[tabled(rename = "Cooked")]
        cooked: String,
        #[tabled(rename = "Status")]
        status: &'static str,
        #[tabled(rename = "B")]
        brad: String,
        #[tabled(rename = "K")]
        kayla: String,
        #[tabled(rename = "S")]
        skylar: String,
        #[tabled(rename = "A")]
        aubrey: String,
        #[tabled(rename = "Avg")]
        average: String,
        #[tabled(rename = "Comments")]
        comments: String,
    }

    let rows: Vec<HistoryRow> = entries
        .iter()
        .map(|e| HistoryRow {
            id: e.id,
            meal: truncate(&e.meal_name, 30),
            planned: e.date_planned.to_string(),
            cooked: format_opt_date(e.date_cooked),
            status: e.status.as_str(),
            brad: format_rating(e.ratings.brad),
            kayla: format_rating(e.ratings.kayla),
            skylar: format_rating(e.ratings.skylar),
            aubrey: format_rating(e.ratings.aubrey),
            average: format_average(e.average_rating()),
            comments: e
                .comments
                .as_deref()
                .map(|c| truncate(c, 30))
                .unwrap_or_default(),
        })
        .collect();

    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
}

pub(crate) fn cmd_history_delete(db: &Database, id: i64, json: bool) -> Result<()> {
    if History::new(db).delete_entry(id)? {
        if json {
            println!("{}", serde_json::json!({ "deleted": id }));
        } else {
            println!("Deleted history entry {id}");
        }
        Ok(())
    } else {
        exit_not_found(&format!("History entry {id} not found"), json)
    }
}

pub(crate) fn cmd_history_clear_unrated(db: &Database, json: bool) -> Result<()> {
    let removed = History::new(db).delete_all_unrated()?;
    if json {
        println!("{}", serde_json::json!({ "deleted": removed }));
    } else {
        println!("Deleted {removed} unrated history entries");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keep_status_flags() {
        assert!(keep(HistoryStatus::Rated, false, false));
        assert!(keep(HistoryStatus::Unrated, false, false));
        assert!(keep(HistoryStatus::Rated, true, false));
        assert!(!keep(HistoryStatus::Unrated, true, false));
        assert!(!keep(HistoryStatus::Rated, false, true));
        assert!(keep(HistoryStatus::Unrated, false, true));
        assert!(keep(HistoryStatus::Rated, true, true));
    }
}
