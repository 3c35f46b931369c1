//! Custom field definition and choice-set endpoints.

use apexfield_core::{ChoiceSet, CustomFieldDefinition, FieldPatch, NewChoiceSet, NewField, RuntimeField};
use axum::{
    extract::{Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;

use crate::error::AppError;
use crate::json::{
    AttachRequest, BootstrapRequest, BootstrapResponse, CreatedResponse, DataTypeRequest, DeactivateRequest,
    SuccessResponse,
};
use crate::AppState;

type ApiResult<T> = Result<Json<SuccessResponse<T>>, AppError>;

/// Field routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/fields", get(handle_list_fields).post(handle_create))
        .route("/fields/definitions", get(handle_list_definitions))
        .route("/fields/bootstrap", post(handle_bootstrap))
        .route("/fields/:id", axum::routing::patch(handle_patch))
        .route("/fields/:id/attach", post(handle_attach))
        .route("/fields/:id/data-type", put(handle_change_data_type))
        .route("/fields/:id/deactivate", post(handle_deactivate))
        .route("/choice-sets", get(handle_list_choice_sets).post(handle_create_choice_set))
        .route("/choice-sets/:id", get(handle_choice_set))
}

/// Query parameters for listing runtime fields.
#[derive(Debug, Deserialize)]
pub struct ListFieldsParams {
    pub entity_type: Option<String>,
}

/// Query parameters for listings that hide inactive records by default.
#[derive(Debug, Deserialize)]
pub struct InactiveParams {
    #[serde(default)]
    pub include_inactive: bool,
}

async fn handle_list_fields(
    State(state): State<AppState>,
    Query(params): Query<ListFieldsParams>,
) -> ApiResult<Vec<RuntimeField>> {
    let fields = state
        .service
        .definitions()
        .list_fields(params.entity_type.as_deref())
        .await?;
    Ok(Json(SuccessResponse::new(fields)))
}

async fn handle_list_definitions(
    State(state): State<AppState>,
    Query(params): Query<InactiveParams>,
) -> ApiResult<Vec<CustomFieldDefinition>> {
    let definitions = state
        .service
        .definitions()
        .list_definitions(params.include_inactive)
        .await?;
    Ok(Json(SuccessResponse::new(definitions)))
}

async fn handle_create(State(state): State<AppState>, Json(input): Json<NewField>) -> ApiResult<CreatedResponse> {
    let id = state.service.definitions().create(input).await?;
    Ok(Json(SuccessResponse::new(CreatedResponse { id })))
}

async fn handle_attach(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<AttachRequest>,
) -> ApiResult<()> {
    state
        .service
        .definitions()
        .attach_to_entity(id, &request.entity_type, request.options)
        .await?;
    Ok(Json(SuccessResponse::new(())))
}

async fn handle_patch(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(patch): Json<FieldPatch>,
) -> ApiResult<()> {
    state.service.definitions().patch_meta(id, patch).await?;
    Ok(Json(SuccessResponse::new(())))
}

async fn handle_change_data_type(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<DataTypeRequest>,
) -> ApiResult<()> {
    state
        .service
        .definitions()
        .change_data_type(id, &request.data_type)
        .await?;
    Ok(Json(SuccessResponse::new(())))
}

async fn handle_deactivate(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<DeactivateRequest>,
) -> ApiResult<()> {
    state
        .service
        .definitions()
        .deactivate(id, request.reason.as_deref())
        .await?;
    Ok(Json(SuccessResponse::new(())))
}

async fn handle_bootstrap(
    State(state): State<AppState>,
    Json(request): Json<BootstrapRequest>,
) -> ApiResult<BootstrapResponse> {
    let count = state
        .service
        .definitions()
        .bootstrap(request.entity_type.as_deref())
        .await?;
    Ok(Json(SuccessResponse::new(BootstrapResponse { count })))
}

async fn handle_list_choice_sets(
    State(state): State<AppState>,
    Query(params): Query<InactiveParams>,
) -> ApiResult<Vec<ChoiceSet>> {
    let sets = state
        .service
        .definitions()
        .list_choice_sets(params.include_inactive)
        .await?;
    Ok(Json(SuccessResponse::new(sets)))
}

async fn handle_choice_set(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<ChoiceSet> {
    let set = state
        .service
        .definitions()
        .choice_set(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("choice set {id}")))?;
    Ok(Json(SuccessResponse::new(set)))
}

async fn handle_create_choice_set(
    State(state): State<AppState>,
    Json(input): Json<NewChoiceSet>,
) -> ApiResult<CreatedResponse> {
    let id = state.service.definitions().create_choice_set(input).await?;
    Ok(Json(SuccessResponse::new(CreatedResponse { id })))
}
