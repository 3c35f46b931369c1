//! Per-entity endpoints: catalog, options, links, enrichment and edits.

use apexfield_core::catalog::ENTITY_TYPES;
use apexfield_core::{
    EntityResolutionMap, EntityView, FetchOutcome, FieldBehavior, HeaderFieldDescriptor, OptionMap,
    PreparedUpdate, Row, TableColumnDescriptor, UpdateOutcome,
};
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};

use crate::error::AppError;
use crate::json::{FetchRequest, HeaderRequest, RowsRequest, SuccessResponse, UpdateRequest};
use crate::AppState;

type ApiResult<T> = Result<Json<SuccessResponse<T>>, AppError>;

/// Entity routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/entities", get(handle_entity_types))
        .route("/entities/:entity/fields", get(handle_fields))
        .route("/entities/:entity/options", get(handle_options))
        .route("/entities/:entity/columns", get(handle_columns))
        .route("/entities/:entity/links", post(handle_links))
        .route("/entities/:entity/enrich", post(handle_enrich))
        .route("/entities/:entity/fetch", post(handle_fetch))
        .route("/entities/:entity/header", post(handle_header))
        .route("/entities/:entity/prepare", post(handle_prepare))
        .route("/entities/:entity/update", post(handle_update))
}

async fn handle_entity_types() -> Json<SuccessResponse<Vec<&'static str>>> {
    Json(SuccessResponse::new(ENTITY_TYPES.to_vec()))
}

async fn handle_fields(State(state): State<AppState>, Path(entity): Path<String>) -> ApiResult<Vec<FieldBehavior>> {
    let fields = state.service.field_definitions(&entity).await?;
    Ok(Json(SuccessResponse::new(fields)))
}

async fn handle_options(State(state): State<AppState>, Path(entity): Path<String>) -> ApiResult<OptionMap> {
    let options = state.service.load_options(&entity).await?;
    Ok(Json(SuccessResponse::new(options)))
}

async fn handle_columns(
    State(state): State<AppState>,
    Path(entity): Path<String>,
) -> ApiResult<Vec<TableColumnDescriptor>> {
    let columns = state.service.table_columns(&entity).await?;
    Ok(Json(SuccessResponse::new(columns)))
}

async fn handle_links(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Json(request): Json<RowsRequest>,
) -> ApiResult<EntityResolutionMap> {
    let links = state.service.resolve_links(&entity, &request.rows).await?;
    Ok(Json(SuccessResponse::new(links)))
}

async fn handle_enrich(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Json(request): Json<RowsRequest>,
) -> ApiResult<Vec<Row>> {
    let rows = state.service.enrich_rows(&entity, &request.rows).await?;
    Ok(Json(SuccessResponse::new(rows)))
}

/// Full fetch cycle. A superseded fetch answers `{"status": "superseded"}`.
async fn handle_fetch(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Json(request): Json<FetchRequest>,
) -> ApiResult<FetchOutcome<EntityView>> {
    let outcome = state.service.fetch(&request.view, &entity, request.rows).await?;
    Ok(Json(SuccessResponse::new(outcome)))
}

async fn handle_header(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Json(request): Json<HeaderRequest>,
) -> ApiResult<Vec<HeaderFieldDescriptor>> {
    let fields = state.service.header_fields(&entity, &request.row, request.info).await?;
    Ok(Json(SuccessResponse::new(fields)))
}

async fn handle_prepare(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Json(request): Json<UpdateRequest>,
) -> ApiResult<PreparedUpdate> {
    let prepared = state.service.prepare_update(&entity, &request.row, &request.edit).await?;
    Ok(Json(SuccessResponse::new(prepared)))
}

async fn handle_update(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Json(request): Json<UpdateRequest>,
) -> ApiResult<UpdateOutcome> {
    let outcome = state.service.update_field(&entity, &request.row, &request.edit).await?;
    Ok(Json(SuccessResponse::new(outcome)))
}
