use globid_sql::TreeError;
use globid_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RewriteError {
    #[error("no global id column configured for table {schema}.{table}")]
    ConfigurationMissing { schema: String, table: String },
    #[error("global id storage failure: {0}")]
    Storage(#[from] StoreError),
    #[error("structural inconsistency: {0}")]
    Structural(String),
    #[error("structural inconsistency: {0}")]
    Tree(#[from] TreeError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("hook '{0}' is already registered")]
    Duplicate(String),
    #[error("hook '{0}' is not registered")]
    Unknown(String),
}
