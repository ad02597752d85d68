//! OpenAPI document for the Pokemon routes, served at `/openapi.json`.

use crate::error::{ErrorBody, ErrorDetail};
use crate::handlers::pokemon;
use crate::model::{Pokemon, PokemonPartial};
use crate::response::CountBody;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(title = "pokedex-api", description = "Pokemon catalog REST API"),
    paths(
        pokemon::create,
        pokemon::count,
        pokemon::find,
        pokemon::update_all,
        pokemon::find_by_id,
        pokemon::update_by_id,
        pokemon::replace_by_id,
        pokemon::delete_by_id,
    ),
    components(schemas(Pokemon, PokemonPartial, CountBody, ErrorBody, ErrorDetail)),
    tags((name = "Pokemon", description = "Pokemon CRUD"))
)]
pub struct ApiDoc;
