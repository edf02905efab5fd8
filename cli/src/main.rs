mod commands;
mod config;
mod logging;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing::debug;

use crate::commands::{
    ImportFormat, cmd_dedupe, cmd_history_clear_unrated, cmd_history_delete, cmd_history_list,
    cmd_import, cmd_meal_add, cmd_meal_delete, cmd_meal_like, cmd_meal_list, cmd_meal_show,
    cmd_pantry_add, cmd_pantry_list, cmd_pantry_remove, cmd_plan, cmd_rate, cmd_ratings,
    cmd_renumber, cmd_shop,
};
use crate::config::Config;
use mealplan_core::db::Database;
use mealplan_core::models::MemberRatings;

#[derive(Parser)]
#[command(
    name = "mealplan",
    version,
    about = "A household meal planner: meals, shopping lists and ratings"
)]
struct Cli {
    /// Database file (default: meal-planner.db in the user data directory)
    #[arg(long, global = true, env = "MEALPLAN_DB", value_name = "PATH")]
    db: Option<PathBuf>,
    /// Show debug logs on stderr (RUST_LOG overrides this)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage meals in the catalog
    Meal {
        #[command(subcommand)]
        command: MealCommands,
    },
    /// Import meals from a text or CSV file
    Import {
        /// File to import
        file: PathBuf,
        /// File format (default: csv for .csv files, text otherwise)
        #[arg(long, value_enum)]
        format: Option<ImportFormat>,
        /// Validate and count without writing anything
        #[arg(long)]
        dry_run: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Plan a meal for a date
    Plan {
        /// Meal ID
        meal_id: i64,
        /// Date to plan for (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Rate a planned meal after cooking it (ratings are 1-5; omit a member to skip)
    Rate {
        /// History entry ID
        history_id: i64,
        /// Brad's rating
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
        brad: Option<u8>,
        /// Kayla's rating
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
        kayla: Option<u8>,
        /// Skylar's rating
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
        skylar: Option<u8>,
        /// Aubrey's rating
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
        aubrey: Option<u8>,
        /// Free-text comments
        #[arg(short, long)]
        comments: Option<String>,
        /// Date the meal was cooked (default: today)
        #[arg(long)]
        cooked: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// View and clean up meal history
    History {
        #[command(subcommand)]
        command: HistoryCommands,
    },
    /// Show per-member rating averages for every meal
    Ratings {
        /// all, highly-rated, unrated, by-member:<name>, exclude-disliked-by:<name>
        #[arg(short, long, default_value = "all")]
        filter: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Build a shopping list for one or more meals
    Shop {
        /// Meal IDs
        #[arg(required = true)]
        meal_ids: Vec<i64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Track what is in stock
    Pantry {
        #[command(subcommand)]
        command: PantryCommands,
    },
    /// Merge meals that have exactly the same name into the lowest ID
    Dedupe {
        /// Keep the duplicates' ingredients and history on the surviving meal
        #[arg(long)]
        union: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Renumber meal IDs densely from 1, keeping their order
    Renumber {
        /// Only drop tables left behind by an interrupted renumbering
        #[arg(long)]
        discard_staging: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum MealCommands {
    /// Add a meal with its ingredients
    Add {
        /// Meal name
        name: String,
        /// Cooking instructions
        #[arg(short, long)]
        instructions: Option<String>,
        /// Ingredient as "name - quantity - category [- shelf life]" (repeatable)
        #[arg(long = "ingredient", value_name = "LINE")]
        ingredients: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List all meals
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a meal with its ingredients
    Show {
        /// Meal ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a meal with its ingredient links and history
    Delete {
        /// Meal ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Record whether a household member likes a meal
    Like {
        /// Meal ID
        id: i64,
        /// Household member (name or letter A-D)
        member: String,
        /// Record a dislike instead
        #[arg(long, conflicts_with = "clear")]
        dislike: bool,
        /// Forget the preference
        #[arg(long)]
        clear: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum HistoryCommands {
    /// List history entries (unrated first, then rated)
    List {
        /// Only entries for this meal
        #[arg(long)]
        meal: Option<i64>,
        /// Only rated entries
        #[arg(long)]
        rated: bool,
        /// Only unrated entries
        #[arg(long)]
        unrated: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a history entry by ID
    Delete {
        /// History entry ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete every unrated history entry
    ClearUnrated {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum PantryCommands {
    /// Add an ingredient to the pantry
    Add {
        /// Ingredient name (must already be in the catalog)
        ingredient: String,
        /// Quantity on hand
        #[arg(short, long)]
        quantity: Option<String>,
        /// Purchase date (default: today)
        #[arg(long)]
        purchased: Option<String>,
        /// Expiry date (default: purchase date + ingredient shelf life)
        #[arg(long)]
        expires: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List pantry items, soonest to expire first
    List {
        /// Only items expiring on or before this date
        #[arg(long)]
        expiring_by: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a pantry item by ID
    Remove {
        /// Pantry item ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.db)?;
    let db = Database::open(&config.db_path)?;
    debug!(path = %config.db_path.display(), "opened database");

    match cli.command {
        Commands::Meal { command } => match command {
            MealCommands::Add {
                name,
                instructions,
                ingredients,
                json,
            } => cmd_meal_add(&db, &name, instructions.as_deref(), &ingredients, json),
            MealCommands::List { json } => cmd_meal_list(&db, json),
            MealCommands::Show { id, json } => cmd_meal_show(&db, id, json),
            MealCommands::Delete { id, json } => cmd_meal_delete(&db, id, json),
            MealCommands::Like {
                id,
                member,
                dislike,
                clear,
                json,
            } => {
                let liked = if clear { None } else { Some(!dislike) };
                cmd_meal_like(&db, id, &member, liked, json)
            }
        },
        Commands::Import {
            file,
            format,
            dry_run,
            json,
        } => cmd_import(&db, &file, format, dry_run, json),
        Commands::Plan {
            meal_id,
            date,
            json,
        } => cmd_plan(&db, meal_id, date, json),
        Commands::Rate {
            history_id,
            brad,
            kayla,
            skylar,
            aubrey,
            comments,
            cooked,
            json,
        } => {
            let ratings = MemberRatings {
                brad,
                kayla,
                skylar,
                aubrey,
            };
            cmd_rate(&db, history_id, &ratings, comments.as_deref(), cooked, json)
        }
        Commands::History { command } => match command {
            HistoryCommands::List {
                meal,
                rated,
                unrated,
                json,
            } => cmd_history_list(&db, meal, rated, unrated, json),
            HistoryCommands::Delete { id, json } => cmd_history_delete(&db, id, json),
            HistoryCommands::ClearUnrated { json } => cmd_history_clear_unrated(&db, json),
        },
        Commands::Ratings { filter, json } => cmd_ratings(&db, &filter, json),
        Commands::Shop { meal_ids, json } => cmd_shop(&db, &meal_ids, json),
        Commands::Pantry { command } => match command {
            PantryCommands::Add {
                ingredient,
                quantity,
                purchased,
                expires,
                json,
            } => cmd_pantry_add(&db, &ingredient, quantity, purchased, expires, json),
            PantryCommands::List { expiring_by, json } => cmd_pantry_list(&db, expiring_by, json),
            PantryCommands::Remove { id, json } => cmd_pantry_remove(&db, id, json),
        },
        Commands::Dedupe { union, json } => cmd_dedupe(&db, union, json),
        Commands::Renumber {
            discard_staging,
            json,
        } => cmd_renumber(&db, discard_staging, json),
    }?;

    db.close()
}
