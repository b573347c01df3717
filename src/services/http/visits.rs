use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use super::{parse_id, parse_positive, AppState};
use crate::models::non_blank;
use crate::models::query::{Pagination, Sort, SortDirection};
use crate::models::visits::{
    NewVisit, NewVisitRequest, Visit, VisitListParams, VisitSortField, VisitUpdate,
    VisitUpdateRequest,
};
use crate::services::ServiceError;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitListQuery {
    client_id: Option<String>,
    search: Option<String>,
    sort_by: Option<String>,
    sort_direction: Option<String>,
    page: Option<String>,
    limit: Option<String>,
}

impl TryFrom<VisitListQuery> for VisitListParams {
    type Error = ServiceError;

    fn try_from(query: VisitListQuery) -> Result<Self, Self::Error> {
        let client_id = parse_positive("clientId", query.client_id.as_deref())?
            .map(|id| {
                i32::try_from(id)
                    .map_err(|_| ServiceError::Validation("clientId is out of range".to_string()))
            })
            .transpose()?;

        let sort = query
            .sort_by
            .as_deref()
            .and_then(VisitSortField::parse)
            .map(|field| Sort {
                field,
                direction: SortDirection::parse(query.sort_direction.as_deref()),
            });

        let page = parse_positive("page", query.page.as_deref())?;
        let limit = parse_positive("limit", query.limit.as_deref())?;

        Ok(VisitListParams {
            client_id,
            search: non_blank(query.search),
            sort,
            pagination: page
                .zip(limit)
                .map(|(page, limit)| Pagination { page, limit }),
        })
    }
}

async fn find_visit(state: &AppState, id: i32, context: &str) -> Result<Visit, ServiceError> {
    state
        .storage
        .get_visit(id)
        .await
        .map_err(|e| ServiceError::storage(context, e))?
        .ok_or_else(|| ServiceError::not_found("Visit"))
}

async fn ensure_client_exists(
    state: &AppState,
    client_id: i32,
    context: &str,
) -> Result<(), ServiceError> {
    let client = state
        .storage
        .get_client(client_id)
        .await
        .map_err(|e| ServiceError::storage(context, e))?;

    match client {
        Some(_) => Ok(()),
        None => Err(ServiceError::not_found("Client")),
    }
}

pub async fn list_visits(
    State(state): State<AppState>,
    query: Result<Query<VisitListQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    let Query(query) = query?;
    let params = VisitListParams::try_from(query)?;

    let page = state
        .storage
        .list_visits(&params)
        .await
        .map_err(|e| ServiceError::storage("Failed to fetch visits", e))?;

    Ok(Json(json!({ "visits": page.items, "total": page.total })))
}

pub async fn get_visit(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Visit>, ServiceError> {
    let id = parse_id(&id, "visit")?;

    Ok(Json(find_visit(&state, id, "Failed to fetch visit").await?))
}

pub async fn create_visit(
    State(state): State<AppState>,
    payload: Result<Json<NewVisitRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    let Json(request) = payload?;
    let new_visit = NewVisit::try_from(request)?;

    ensure_client_exists(&state, new_visit.client_id, "Failed to create visit").await?;

    let visit = state
        .storage
        .create_visit(new_visit)
        .await
        .map_err(|e| ServiceError::from_storage("Failed to create visit", e))?;

    log::info!("Recorded visit {} for client {}", visit.id, visit.client_id);

    Ok((StatusCode::CREATED, Json(visit)))
}

pub async fn update_visit(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<VisitUpdateRequest>, JsonRejection>,
) -> Result<Json<Visit>, ServiceError> {
    let id = parse_id(&id, "visit")?;
    let Json(request) = payload?;
    let changes = VisitUpdate::try_from(request)?;

    let current = find_visit(&state, id, "Failed to update visit").await?;
    if changes.is_empty() {
        return Ok(Json(current));
    }

    if let Some(client_id) = changes.client_id {
        ensure_client_exists(&state, client_id, "Failed to update visit").await?;
    }

    let visit = state
        .storage
        .update_visit(id, changes)
        .await
        .map_err(|e| ServiceError::from_storage("Failed to update visit", e))?
        .ok_or_else(|| ServiceError::not_found("Visit"))?;

    Ok(Json(visit))
}

pub async fn delete_visit(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ServiceError> {
    let id = parse_id(&id, "visit")?;

    let deleted = state
        .storage
        .delete_visit(id)
        .await
        .map_err(|e| ServiceError::storage("Failed to delete visit", e))?;
    if !deleted {
        return Err(ServiceError::not_found("Visit"));
    }

    Ok(StatusCode::NO_CONTENT)
}
