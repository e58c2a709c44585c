pub mod core;
pub mod locks;
pub mod market;
pub mod portfolio;
pub mod settlement;
pub mod user;
pub mod valuation;

pub use json_store_adapter::db::{DbError, JsonFileRepo, JsonFileStore, Repository};
