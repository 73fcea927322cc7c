pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod store;

pub use connection::{connect, connect_with_settings, DbPool};
pub use fixtures::{SeedDataset, SeedError, SeedResult, VerificationResult};
pub use store::{InMemoryProductStore, ProductStore, SqlProductStore, StoreError};
