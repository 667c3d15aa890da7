//! In-memory execution of filters and aggregation pipelines built with
//! `flint-query`.

mod compare;
mod database;
mod error;
mod eval;
mod pipeline;

pub use database::{CollectionConfig, MemoryDatabase};
pub use error::MemoryError;
