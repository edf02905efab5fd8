pub mod catalog;
pub mod db;
pub mod error;
pub mod history;
pub mod import;
pub mod maintenance;
pub mod models;
pub mod pantry;
pub mod ratings;
pub mod shopping;
