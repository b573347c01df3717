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
use crate::models::clients::{
    Client, ClientListParams, ClientSortField, ClientStatus, ClientUpdate, NewClient,
};
use crate::models::non_blank;
use crate::models::query::{Pagination, Sort, SortDirection};
use crate::services::ServiceError;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientListQuery {
    search: Option<String>,
    status: Option<String>,
    sort_by: Option<String>,
    sort_direction: Option<String>,
    page: Option<String>,
    limit: Option<String>,
}

impl TryFrom<ClientListQuery> for ClientListParams {
    type Error = ServiceError;

    fn try_from(query: ClientListQuery) -> Result<Self, Self::Error> {
        let status = non_blank(query.status)
            .map(|status| status.parse::<ClientStatus>())
            .transpose()?;

        let sort = query
            .sort_by
            .as_deref()
            .and_then(ClientSortField::parse)
            .map(|field| Sort {
                field,
                direction: SortDirection::parse(query.sort_direction.as_deref()),
            });

        let page = parse_positive("page", query.page.as_deref())?;
        let limit = parse_positive("limit", query.limit.as_deref())?;

        Ok(ClientListParams {
            search: non_blank(query.search),
            status,
            sort,
            pagination: page
                .zip(limit)
                .map(|(page, limit)| Pagination { page, limit }),
        })
    }
}

async fn find_client(state: &AppState, id: i32, context: &str) -> Result<Client, ServiceError> {
    state
        .storage
        .get_client(id)
        .await
        .map_err(|e| ServiceError::storage(context, e))?
        .ok_or_else(|| ServiceError::not_found("Client"))
}

pub async fn list_clients(
    State(state): State<AppState>,
    query: Result<Query<ClientListQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    let Query(query) = query?;
    let params = ClientListParams::try_from(query)?;

    let page = state
        .storage
        .list_clients(&params)
        .await
        .map_err(|e| ServiceError::storage("Failed to fetch clients", e))?;

    Ok(Json(json!({ "clients": page.items, "total": page.total })))
}

pub async fn get_client(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Client>, ServiceError> {
    let id = parse_id(&id, "client")?;

    Ok(Json(find_client(&state, id, "Failed to fetch client").await?))
}

pub async fn create_client(
    State(state): State<AppState>,
    payload: Result<Json<NewClient>, JsonRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    let Json(new_client) = payload?;
    let new_client = new_client.validated()?;

    let client = state
        .storage
        .create_client(new_client)
        .await
        .map_err(|e| ServiceError::storage("Failed to create client", e))?;

    log::info!("Created client {}", client.id);

    Ok((StatusCode::CREATED, Json(client)))
}

pub async fn update_client(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ClientUpdate>, JsonRejection>,
) -> Result<Json<Client>, ServiceError> {
    let id = parse_id(&id, "client")?;
    let Json(changes) = payload?;
    let changes = changes.validated()?;

    if changes.is_empty() {
        return Ok(Json(find_client(&state, id, "Failed to update client").await?));
    }

    let client = state
        .storage
        .update_client(id, changes)
        .await
        .map_err(|e| ServiceError::storage("Failed to update client", e))?
        .ok_or_else(|| ServiceError::not_found("Client"))?;

    Ok(Json(client))
}

pub async fn delete_client(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ServiceError> {
    let id = parse_id(&id, "client")?;

    let deleted = state
        .storage
        .delete_client(id)
        .await
        .map_err(|e| ServiceError::storage("Failed to delete client", e))?;
    if !deleted {
        return Err(ServiceError::not_found("Client"));
    }

    log::info!("Deleted client {} and its visits", id);

    Ok(StatusCode::NO_CONTENT)
}
