//! Shared application state for all routes.

use crate::service::PokemonRepository;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<PokemonRepository>,
}

impl AppState {
    pub fn new(repository: PokemonRepository) -> Self {
        AppState {
            repository: Arc::new(repository),
        }
    }
}
