mod repository;
mod validation;

pub use repository::{stamp_modified, Operation, PersistContext, PersistObserver, PokemonRepository};
pub use validation::{JsonKind, RequestValidator, ValidationRule};
