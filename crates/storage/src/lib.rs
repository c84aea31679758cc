#![forbid(unsafe_code)]

pub mod repository;
pub mod sqlite;

pub use repository::{
    AccessRepository, InMemoryRepository, ProgressRepository, ResultId, ResultRepository,
    ResultRow, StatisticsRepository, Storage, StorageError,
};
