//! Data sources the repository persists to: in-memory (optionally file-backed) and PostgreSQL.

mod memory;
mod postgres;

pub use memory::MemoryDataSource;
pub use postgres::PgDataSource;

use crate::config::DataSourceConfig;
use crate::error::AppError;
use crate::filter::{Filter, Where};
use crate::model::{Pokemon, PokemonPatch};
use async_trait::async_trait;
use std::sync::Arc;

/// Storage operations for Pokemon records. Writes receive data the persist hooks already ran on.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Configured data source name.
    fn name(&self) -> &str;

    /// Connector kind: `memory` or `postgresql`.
    fn connector(&self) -> &'static str;

    /// Liveness check used by `/ready`.
    async fn ping(&self) -> Result<(), AppError>;

    /// Insert a new record. Fails with `Conflict` when the name is taken.
    async fn create(&self, record: Pokemon) -> Result<Pokemon, AppError>;

    /// Records matching the filter's where, ordered and paged. `fields` is not applied here.
    async fn find(&self, filter: &Filter) -> Result<Vec<Pokemon>, AppError>;

    async fn find_by_id(&self, name: &str) -> Result<Option<Pokemon>, AppError>;

    async fn count(&self, where_: Option<&Where>) -> Result<u64, AppError>;

    /// Merge the patch into every matching record; returns how many were updated.
    async fn update_all(&self, patch: &PokemonPatch, where_: Option<&Where>) -> Result<u64, AppError>;

    /// Returns false when no record has this name.
    async fn update_by_id(&self, name: &str, patch: &PokemonPatch) -> Result<bool, AppError>;

    /// Overwrite the record with the same name. Returns false when none exists.
    async fn replace_by_id(&self, record: Pokemon) -> Result<bool, AppError>;

    async fn delete_by_id(&self, name: &str) -> Result<bool, AppError>;
}

/// Build the configured data source. PostgreSQL sources create their database, schema and table
/// if missing.
pub async fn connect(config: &DataSourceConfig) -> Result<Arc<dyn DataSource>, AppError> {
    match config {
        DataSourceConfig::Memory { name, file } => {
            let ds = MemoryDataSource::open(name.clone(), file.clone()).await?;
            Ok(Arc::new(ds))
        }
        DataSourceConfig::Postgresql {
            name,
            url,
            schema,
            max_connections,
        } => {
            let ds = PgDataSource::connect(name.clone(), url, schema, *max_connections).await?;
            Ok(Arc::new(ds))
        }
    }
}
