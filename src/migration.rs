//! Database bootstrap for the PostgreSQL data source: database, schema, table and index DDL.
//! Every statement is idempotent so it runs on each startup.

use crate::error::AppError;
use crate::sql::{quoted, TableRef};
use sqlx::ConnectOptions;
use sqlx::PgPool;
use std::str::FromStr;

pub const POKEMON_TABLE: &str = "pokemon";

/// Create the schema, the pokemon table and its `modified` index if they do not exist.
pub async fn apply_migrations(pool: &PgPool, table: &TableRef) -> Result<(), AppError> {
    for sql in migration_statements(table) {
        tracing::debug!(sql = %sql, "migration");
        sqlx::query(&sql).execute(pool).await?;
    }
    Ok(())
}

fn migration_statements(table: &TableRef) -> Vec<String> {
    let q_table = table.qualified();
    vec![
        format!("CREATE SCHEMA IF NOT EXISTS {}", quoted(&table.schema)),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                name TEXT PRIMARY KEY,
                modified TIMESTAMPTZ,
                properties JSONB NOT NULL DEFAULT '{{}}'::jsonb
            )
            "#,
            q_table
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} (modified)",
            quoted(&format!("{}_modified_idx", table.table)),
            q_table
        ),
    ]
}

/// Ensure the database in `database_url` exists; create it if not. Connects to the
/// default `postgres` database to run CREATE DATABASE. Call before creating the main pool.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), AppError> {
    let (admin_url, db_name) = parse_db_name_from_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = sqlx::postgres::PgConnectOptions::from_str(&admin_url)
        .map_err(|e| AppError::BadRequest(format!("invalid DATABASE_URL: {}", e)))?;
    let mut conn: sqlx::PgConnection = opts.connect().await.map_err(AppError::Db)?;
    let exists: (bool,) =
        sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
            .bind(&db_name)
            .fetch_one(&mut conn)
            .await
            .map_err(AppError::Db)?;
    if !exists.0 {
        tracing::info!(database = %db_name, "creating database");
        sqlx::query(&format!("CREATE DATABASE {}", quoted(&db_name)))
            .execute(&mut conn)
            .await
            .map_err(AppError::Db)?;
    }
    Ok(())
}

fn parse_db_name_from_url(url: &str) -> Result<(String, String), AppError> {
    let scheme_end = url.find("://").map(|i| i + 3).unwrap_or(0);
    let path_start = url[scheme_end..]
        .find('/')
        .map(|i| scheme_end + i + 1)
        .ok_or_else(|| AppError::BadRequest("DATABASE_URL: no path".into()))?;
    let path_and_query = url.get(path_start..).unwrap_or("");
    let (db_name, query) = match path_and_query.split_once('?') {
        Some((db, q)) => (db.trim(), Some(q)),
        None => (path_and_query.trim(), None),
    };
    let base = url.get(..path_start).unwrap_or(url);
    let admin_url = match query {
        Some(q) => format!("{}postgres?{}", base, q),
        None => format!("{}postgres", base),
    };
    Ok((admin_url, db_name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_database_name_from_url() {
        let (admin, db) = parse_db_name_from_url("postgres://u:p@localhost:5432/pokedex").unwrap();
        assert_eq!(admin, "postgres://u:p@localhost:5432/postgres");
        assert_eq!(db, "pokedex");
    }

    #[test]
    fn keeps_query_parameters_on_admin_url() {
        let (admin, db) =
            parse_db_name_from_url("postgresql://localhost/pokedex?sslmode=disable").unwrap();
        assert_eq!(admin, "postgresql://localhost/postgres?sslmode=disable");
        assert_eq!(db, "pokedex");
    }

    #[test]
    fn url_without_path_is_rejected() {
        assert!(parse_db_name_from_url("postgres://localhost").is_err());
    }

    #[test]
    fn statements_target_configured_schema() {
        let stmts = migration_statements(&TableRef::new("pokedex", POKEMON_TABLE));
        assert_eq!(stmts[0], "CREATE SCHEMA IF NOT EXISTS \"pokedex\"");
        assert!(stmts[1].contains("CREATE TABLE IF NOT EXISTS \"pokedex\".\"pokemon\""));
        assert!(stmts[1].contains("'{}'::jsonb"));
        assert_eq!(
            stmts[2],
            "CREATE INDEX IF NOT EXISTS \"pokemon_modified_idx\" ON \"pokedex\".\"pokemon\" (modified)"
        );
    }
}
