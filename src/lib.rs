//! Pokedex API: Pokemon catalog REST service over a memory or PostgreSQL data source.

pub mod config;
pub mod datasource;
pub mod error;
pub mod filter;
pub mod handlers;
pub mod migration;
pub mod model;
pub mod openapi;
pub mod response;
pub mod routes;
pub mod service;
pub mod sql;
pub mod state;

pub use config::{DataSourceConfig, Settings};
pub use datasource::{connect, DataSource, MemoryDataSource, PgDataSource};
pub use error::{AppError, ConfigError};
pub use filter::{Filter, Where};
pub use model::{Pokemon, PokemonPatch};
pub use routes::{app, common_routes, common_routes_with_ready, pokemon_routes};
pub use service::{Operation, PersistContext, PersistObserver, PokemonRepository};
pub use state::AppState;
