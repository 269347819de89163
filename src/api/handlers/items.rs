use crate::AppState;
use crate::api::error::AppError;
use crate::entities::items;
use crate::services::record_store::NewItem;
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ItemResponse {
    pub id: String,
    pub name: String,
    pub desc: Option<String>,
    pub cover: Option<String>,
    pub visible_to: Vec<String>,
    pub assigned_to: Vec<String>,
    pub int_users: Vec<String>,
    pub photos: Vec<String>,
    pub created_on: DateTime<Utc>,
}

impl From<items::Model> for ItemResponse {
    fn from(item: items::Model) -> Self {
        Self {
            id: item.id,
            name: item.name,
            desc: item.description,
            cover: item.cover,
            visible_to: item.visible_to.0,
            assigned_to: item.assigned_to.0,
            int_users: item.int_users.0,
            photos: item.photos.0,
            created_on: item.created_on,
        }
    }
}

#[derive(Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateItemRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: String,
    #[validate(length(max = 4000, message = "Description is too long"))]
    pub desc: Option<String>,
    #[validate(length(max = 2048))]
    pub cover: Option<String>,
    #[serde(default)]
    pub visible_to: Vec<String>,
    #[serde(default)]
    pub assigned_to: Vec<String>,
}

#[utoipa::path(
    get,
    path = "/items",
    responses(
        (status = 200, description = "All items, oldest first", body = [ItemResponse]),
        (status = 500, description = "Record store error")
    ),
    tag = "items"
)]
pub async fn list_items(
    State(state): State<AppState>,
) -> Result<Json<Vec<ItemResponse>>, AppError> {
    let items = state
        .records
        .list()
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(items.into_iter().map(ItemResponse::from).collect()))
}

#[utoipa::path(
    post,
    path = "/items",
    request_body = CreateItemRequest,
    responses(
        (status = 200, description = "Item created, body is the new id", body = String),
        (status = 400, description = "Validation or store error")
    ),
    tag = "items"
)]
pub async fn create_item(
    State(state): State<AppState>,
    payload: Result<Json<CreateItemRequest>, JsonRejection>,
) -> Result<Json<String>, AppError> {
    let Json(req) = payload.map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;

    req.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let id = state
        .records
        .create(NewItem {
            name: req.name,
            description: req.desc,
            cover: req.cover,
            visible_to: req.visible_to,
            assigned_to: req.assigned_to,
        })
        .await
        .map_err(|e| AppError::StoreRejected(e.to_string()))?;

    tracing::info!("Created item {}", id);
    Ok(Json(id))
}

/// Removes the item only. Its images are collected later by the background worker.
#[utoipa::path(
    delete,
    path = "/items/{id}",
    params(("id" = String, Path, description = "Item id")),
    responses(
        (status = 200, description = "Item deleted", body = String),
        (status = 400, description = "Store error")
    ),
    tag = "items"
)]
pub async fn delete_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<&'static str>, AppError> {
    state
        .records
        .delete(&id)
        .await
        .map_err(|e| AppError::StoreRejected(e.to_string()))?;

    tracing::info!("Deleted item {}", id);
    Ok(Json("Successfully deleted item"))
}
