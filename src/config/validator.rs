//! Settings validation: datasource name, schema identifier, connection URL and pool size.

use crate::config::{DataSourceConfig, Settings};
use crate::error::ConfigError;
use regex::Regex;

const IDENTIFIER_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]{0,62}$";

pub fn validate(settings: &Settings) -> Result<(), ConfigError> {
    if settings.max_body_bytes == 0 {
        return Err(ConfigError::Validation("max body bytes must be greater than 0".into()));
    }
    validate_data_source(&settings.data_source)
}

pub fn validate_data_source(config: &DataSourceConfig) -> Result<(), ConfigError> {
    if config.name().trim().is_empty() {
        return Err(ConfigError::Validation("datasource name must not be empty".into()));
    }
    if let DataSourceConfig::Postgresql {
        url,
        schema,
        max_connections,
        ..
    } = config
    {
        if !(url.starts_with("postgres://") || url.starts_with("postgresql://")) {
            return Err(ConfigError::Validation(
                "datasource url must use the postgres:// or postgresql:// scheme".into(),
            ));
        }
        let re = Regex::new(IDENTIFIER_PATTERN)
            .map_err(|e| ConfigError::Validation(format!("identifier pattern: {}", e)))?;
        if !re.is_match(schema) {
            return Err(ConfigError::Validation(format!(
                "schema {:?} is not a valid identifier",
                schema
            )));
        }
        if *max_connections == 0 {
            return Err(ConfigError::Validation("max_connections must be greater than 0".into()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pg(url: &str, schema: &str, max_connections: u32) -> DataSourceConfig {
        DataSourceConfig::Postgresql {
            name: "pg".into(),
            url: url.into(),
            schema: schema.into(),
            max_connections,
        }
    }

    #[test]
    fn accepts_valid_postgresql() {
        assert!(validate_data_source(&pg("postgres://localhost/db", "pokedex", 5)).is_ok());
        assert!(validate_data_source(&pg("postgresql://localhost/db", "_dex2", 1)).is_ok());
    }

    #[test]
    fn rejects_empty_name() {
        let cfg = DataSourceConfig::Memory {
            name: "  ".into(),
            file: None,
        };
        assert!(matches!(validate_data_source(&cfg), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn rejects_non_postgres_scheme() {
        assert!(validate_data_source(&pg("mysql://localhost/db", "public", 5)).is_err());
    }

    #[test]
    fn rejects_schema_that_is_not_an_identifier() {
        assert!(validate_data_source(&pg("postgres://h/db", "dex; drop", 5)).is_err());
        assert!(validate_data_source(&pg("postgres://h/db", "1dex", 5)).is_err());
    }

    #[test]
    fn rejects_zero_pool_size() {
        assert!(validate_data_source(&pg("postgres://h/db", "public", 0)).is_err());
    }

    #[test]
    fn rejects_zero_body_limit() {
        let settings = Settings {
            max_body_bytes: 0,
            ..Settings::default()
        };
        assert!(validate(&settings).is_err());
    }
}
