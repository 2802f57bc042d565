pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_from_config, connect_with_settings, DbPool};
pub use fixtures::{DemoSeedDataset, EntitySeedInfo, SeedError, SeedResult, VerificationResult};
pub use repositories::{RepositoryError, SqlWorkflowStore};
