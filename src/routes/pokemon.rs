//! Pokemon CRUD routes.

use crate::handlers::pokemon::{
    count, create, delete_by_id, find, find_by_id, replace_by_id, update_all, update_by_id,
};
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn pokemon_routes(state: AppState) -> Router {
    Router::new()
        .route("/pokemon", get(find).post(create).patch(update_all))
        .route("/pokemon/count", get(count))
        .route(
            "/pokemon/:name",
            get(find_by_id)
                .patch(update_by_id)
                .put(replace_by_id)
                .delete(delete_by_id),
        )
        .with_state(state)
}
