pub mod app_config;
pub mod config;
pub mod identity;
pub mod records;
pub mod stats;
pub mod store;
pub mod target;

use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use identity::IdentityKey;
pub use records::{
    CategoryRecord, ExtractedRecord, ItemRecord, MerchantRecord, PriceHistoryEntry,
    DEFAULT_ITEM_CATEGORY,
};
pub use stats::{
    DiagnosticSnapshot, ExtractionStats, FailureKind, PoolSummary, TargetFailure, TargetReport,
};
pub use store::{
    IdentityStore, KeyLocks, MemoryIdentityStore, PersistedEntity, SaveOutcome, StoreError,
};
pub use target::{HarvestTarget, TargetKind};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for environment variable {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
