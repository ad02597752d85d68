//! PostgreSQL data source: one table, free-form properties in a JSONB column.

use crate::datasource::DataSource;
use crate::error::AppError;
use crate::filter::{Filter, Where};
use crate::migration::{apply_migrations, ensure_database_exists, POKEMON_TABLE};
use crate::model::{Pokemon, PokemonPatch, MODEL_NAME};
use crate::sql::{self, QueryBuf, TableRef};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};

type RecordRow = (String, Option<DateTime<Utc>>, Value);

pub struct PgDataSource {
    name: String,
    pool: PgPool,
    table: TableRef,
}

impl PgDataSource {
    /// Create the database if needed, open a pool and apply the table migration.
    pub async fn connect(
        name: String,
        url: &str,
        schema: &str,
        max_connections: u32,
    ) -> Result<Self, AppError> {
        ensure_database_exists(url).await?;
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        let table = TableRef::new(schema, POKEMON_TABLE);
        apply_migrations(&pool, &table).await?;
        tracing::info!(datasource = %name, table = %table.qualified(), "postgresql data source ready");
        Ok(PgDataSource { name, pool, table })
    }

    async fn fetch_many(&self, q: &QueryBuf) -> Result<Vec<Pokemon>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query_as::<_, RecordRow>(&q.sql);
        for p in &q.params {
            query = query.bind(p.clone());
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(row_to_record).collect())
    }

    async fn fetch_optional(&self, q: &QueryBuf) -> Result<Option<Pokemon>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query_as::<_, RecordRow>(&q.sql);
        for p in &q.params {
            query = query.bind(p.clone());
        }
        let row = query.fetch_optional(&self.pool).await?;
        Ok(row.map(row_to_record))
    }

    async fn execute(&self, q: &QueryBuf) -> Result<u64, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "execute");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(p.clone());
        }
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

fn row_to_record((name, modified, properties): RecordRow) -> Pokemon {
    let properties = match properties {
        Value::Object(map) => map.into_iter().collect(),
        _ => Default::default(),
    };
    Pokemon {
        name,
        modified,
        properties,
    }
}

#[async_trait]
impl DataSource for PgDataSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn connector(&self) -> &'static str {
        "postgresql"
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn create(&self, record: Pokemon) -> Result<Pokemon, AppError> {
        let q = sql::insert(&self.table, &record);
        match self.fetch_optional(&q).await {
            Ok(Some(row)) => Ok(row),
            Ok(None) => Err(AppError::Db(sqlx::Error::RowNotFound)),
            Err(AppError::Db(sqlx::Error::Database(e))) if e.is_unique_violation() => Err(
                AppError::Conflict(format!("duplicate entry for {}.name: {}", MODEL_NAME, record.name)),
            ),
            Err(e) => Err(e),
        }
    }

    async fn find(&self, filter: &Filter) -> Result<Vec<Pokemon>, AppError> {
        self.fetch_many(&sql::select_list(&self.table, filter)).await
    }

    async fn find_by_id(&self, name: &str) -> Result<Option<Pokemon>, AppError> {
        self.fetch_optional(&sql::select_by_id(&self.table, name)).await
    }

    async fn count(&self, where_: Option<&Where>) -> Result<u64, AppError> {
        let q = sql::count(&self.table, where_);
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query_scalar::<_, i64>(&q.sql);
        for p in &q.params {
            query = query.bind(p.clone());
        }
        let n = query.fetch_one(&self.pool).await?;
        Ok(n.max(0) as u64)
    }

    async fn update_all(&self, patch: &PokemonPatch, where_: Option<&Where>) -> Result<u64, AppError> {
        self.execute(&sql::update_where(&self.table, patch, where_)).await
    }

    async fn update_by_id(&self, name: &str, patch: &PokemonPatch) -> Result<bool, AppError> {
        let n = self.execute(&sql::update_by_id(&self.table, name, patch)).await?;
        Ok(n > 0)
    }

    async fn replace_by_id(&self, record: Pokemon) -> Result<bool, AppError> {
        let n = self.execute(&sql::replace(&self.table, &record)).await?;
        Ok(n > 0)
    }

    async fn delete_by_id(&self, name: &str) -> Result<bool, AppError> {
        let n = self.execute(&sql::delete_by_id(&self.table, name)).await?;
        Ok(n > 0)
    }
}
