mod helpers;
mod history;
mod import;
mod maintenance;
mod meal;
mod pantry;
mod ratings;
mod shop;

pub(crate) use history::{
    cmd_history_clear_unrated, cmd_history_delete, cmd_history_list, cmd_plan, cmd_rate,
};
pub(crate) use import::{ImportFormat, cmd_import};
pub(crate) use maintenance::{cmd_dedupe, cmd_renumber};
pub(crate) use meal::{cmd_meal_add, cmd_meal_delete, cmd_meal_like, cmd_meal_list, cmd_meal_show};
pub(crate) use pantry::{cmd_pantry_add, cmd_pantry_list, cmd_pantry_remove};
pub(crate) use ratings::cmd_ratings;
pub(crate) use shop::cmd_shop;
