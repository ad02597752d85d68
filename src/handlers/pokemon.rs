//! Pokemon CRUD handlers: create, count, find, bulk update, and by-name read/patch/replace/delete.

use crate::error::{AppError, ErrorBody};
use crate::filter::{Filter, Where};
use crate::model::{Pokemon, PokemonPartial};
use crate::response::{self, CountBody};
use crate::service::RequestValidator;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use utoipa::IntoParams;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct FilterQuery {
    /// JSON filter: `where`, `fields`, `order`, `limit`, `skip`/`offset`, `include`.
    pub filter: Option<String>,
}

impl FilterQuery {
    fn parse(&self) -> Result<Filter, AppError> {
        match self.filter.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(raw) => Filter::parse(raw),
            None => Ok(Filter::default()),
        }
    }

    fn parse_excluding_where(&self) -> Result<Option<Filter>, AppError> {
        self.filter
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(Filter::parse_excluding_where)
            .transpose()
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct WhereQuery {
    /// JSON where clause.
    #[serde(rename = "where")]
    pub where_: Option<String>,
}

impl WhereQuery {
    fn parse(&self) -> Result<Option<Where>, AppError> {
        self.where_
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(Where::parse)
            .transpose()
    }
}

fn partial_body(body: Value) -> Result<Map<String, Value>, AppError> {
    let data = RequestValidator::object_body(body)?;
    RequestValidator::validate_partial(&data, &Pokemon::validation_rules())?;
    Ok(data)
}

#[utoipa::path(
    post,
    path = "/pokemon",
    tag = "Pokemon",
    request_body = Pokemon,
    responses(
        (status = 200, description = "Pokemon model instance", body = Pokemon),
        (status = 409, description = "Name already taken", body = ErrorBody),
        (status = 422, description = "Invalid body", body = ErrorBody)
    )
)]
pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let data = RequestValidator::object_body(body)?;
    RequestValidator::validate(&data, &Pokemon::validation_rules())?;
    let record = state.repository.create(data).await?;
    Ok(response::one(record.to_value()))
}

#[utoipa::path(
    get,
    path = "/pokemon/count",
    tag = "Pokemon",
    params(WhereQuery),
    responses(
        (status = 200, description = "Pokemon model count", body = CountBody),
        (status = 400, description = "Invalid where", body = ErrorBody)
    )
)]
pub async fn count(
    State(state): State<AppState>,
    Query(q): Query<WhereQuery>,
) -> Result<impl IntoResponse, AppError> {
    let where_ = q.parse()?;
    let n = state.repository.count(where_.as_ref()).await?;
    Ok(response::count(n))
}

#[utoipa::path(
    get,
    path = "/pokemon",
    tag = "Pokemon",
    params(FilterQuery),
    responses(
        (status = 200, description = "Array of Pokemon model instances", body = [Pokemon]),
        (status = 400, description = "Invalid filter", body = ErrorBody)
    )
)]
pub async fn find(
    State(state): State<AppState>,
    Query(q): Query<FilterQuery>,
) -> Result<impl IntoResponse, AppError> {
    let filter = q.parse()?;
    let records = state.repository.find(&filter).await?;
    Ok(response::many(records.iter().map(|p| filter.project(p)).collect()))
}

#[utoipa::path(
    patch,
    path = "/pokemon",
    tag = "Pokemon",
    params(WhereQuery),
    request_body = PokemonPartial,
    responses(
        (status = 200, description = "Pokemon PATCH success count", body = CountBody),
        (status = 400, description = "Invalid where or name in body", body = ErrorBody),
        (status = 422, description = "Invalid body", body = ErrorBody)
    )
)]
pub async fn update_all(
    State(state): State<AppState>,
    Query(q): Query<WhereQuery>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let where_ = q.parse()?;
    let data = partial_body(body)?;
    let n = state.repository.update_all(data, where_.as_ref()).await?;
    Ok(response::count(n))
}

#[utoipa::path(
    get,
    path = "/pokemon/{name}",
    tag = "Pokemon",
    params(("name" = String, Path, description = "Pokemon name"), FilterQuery),
    responses(
        (status = 200, description = "Pokemon model instance", body = Pokemon),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn find_by_id(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(q): Query<FilterQuery>,
) -> Result<impl IntoResponse, AppError> {
    let filter = q.parse_excluding_where()?;
    let record = state.repository.find_by_id(&name, filter.as_ref()).await?;
    let body = match &filter {
        Some(f) => f.project(&record),
        None => record.to_value(),
    };
    Ok(response::one(body))
}

#[utoipa::path(
    patch,
    path = "/pokemon/{name}",
    tag = "Pokemon",
    params(("name" = String, Path, description = "Pokemon name")),
    request_body = PokemonPartial,
    responses(
        (status = 204, description = "Pokemon PATCH success"),
        (status = 400, description = "Name change", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn update_by_id(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let data = partial_body(body)?;
    state.repository.update_by_id(&name, data).await?;
    Ok(response::no_content())
}

#[utoipa::path(
    put,
    path = "/pokemon/{name}",
    tag = "Pokemon",
    params(("name" = String, Path, description = "Pokemon name")),
    request_body = PokemonPartial,
    responses(
        (status = 204, description = "Pokemon PUT success"),
        (status = 400, description = "Name change", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn replace_by_id(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let data = partial_body(body)?;
    state.repository.replace_by_id(&name, data).await?;
    Ok(response::no_content())
}

#[utoipa::path(
    delete,
    path = "/pokemon/{name}",
    tag = "Pokemon",
    params(("name" = String, Path, description = "Pokemon name")),
    responses(
        (status = 204, description = "Pokemon DELETE success"),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn delete_by_id(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state.repository.delete_by_id(&name).await?;
    Ok(response::no_content())
}
