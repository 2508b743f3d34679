//! Line item handlers: the spreadsheet edit surface.
//!
//! Mutations return an [`ItemMutationResponse`], carrying the row, any P&A
//! children the cascade recomputed, and the section with its fresh totals,
//! so clients never wait on cache invalidation to see consistent numbers.

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::calc::{self, RowKind};
use crate::models::{CreateLineItem, ItemHistoryEntry, LineItem, UpdateLineItem};
use crate::services::ItemMutation;
use crate::startup::AppState;
use account_core::error::AppError;

/// A line item together with its derived row category.
#[derive(Debug, Serialize)]
pub struct ClassifiedItem {
    #[serde(flatten)]
    pub item: LineItem,
    pub row_kind: RowKind,
}

impl From<LineItem> for ClassifiedItem {
    fn from(item: LineItem) -> Self {
        let row_kind = calc::classify(&item);
        ClassifiedItem { item, row_kind }
    }
}

/// Mutation response: the edited row, any P&A children the cascade touched,
/// and the section with fresh totals, all with derived categories.
#[derive(Debug, Serialize)]
pub struct ItemMutationResponse {
    pub item: ClassifiedItem,
    pub cascaded_children: Vec<ClassifiedItem>,
    pub section: crate::models::Section,
}

impl From<ItemMutation> for ItemMutationResponse {
    fn from(mutation: ItemMutation) -> Self {
        ItemMutationResponse {
            item: ClassifiedItem::from(mutation.item),
            cascaded_children: mutation
                .cascaded_children
                .into_iter()
                .map(ClassifiedItem::from)
                .collect(),
            section: mutation.section,
        }
    }
}

/// Bulk import request: pre-populated rows from a BOQ extraction.
#[derive(Debug, Deserialize)]
pub struct ImportItemsRequest {
    pub items: Vec<CreateLineItem>,
}

/// Bulk import response.
#[derive(Debug, Serialize)]
pub struct ImportItemsResponse {
    pub items: Vec<ClassifiedItem>,
    pub section: crate::models::Section,
}

/// List a section's items in display order, each with its derived category.
///
/// GET /sections/:section_id/items
pub async fn list_items(
    State(state): State<AppState>,
    Path(section_id): Path<Uuid>,
) -> Result<Json<Vec<ClassifiedItem>>, AppError> {
    state
        .db
        .get_section(section_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Section not found")))?;

    let items = state.db.list_items(section_id).await?;
    let classified: Vec<ClassifiedItem> = items.into_iter().map(ClassifiedItem::from).collect();

    Ok(Json(classified))
}

/// Get a line item.
///
/// GET /items/:item_id
pub async fn get_item(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
) -> Result<Json<ClassifiedItem>, AppError> {
    let item = state
        .db
        .get_item(item_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Item not found")))?;

    Ok(Json(ClassifiedItem::from(item)))
}

/// Add a row to a section.
///
/// POST /sections/:section_id/items
pub async fn create_item(
    State(state): State<AppState>,
    Path(section_id): Path<Uuid>,
    Json(req): Json<CreateLineItem>,
) -> Result<(StatusCode, Json<ItemMutationResponse>), AppError> {
    let mutation = state.db.create_item(section_id, &req).await?;

    Ok((StatusCode::CREATED, Json(mutation.into())))
}

/// Bulk-insert pre-populated rows into a section.
///
/// POST /sections/:section_id/items/import
pub async fn import_items(
    State(state): State<AppState>,
    Path(section_id): Path<Uuid>,
    Json(req): Json<ImportItemsRequest>,
) -> Result<(StatusCode, Json<ImportItemsResponse>), AppError> {
    if req.items.is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Import requires at least one item"
        )));
    }

    let (items, section) = state.db.import_items(section_id, &req.items).await?;
    let items = items.into_iter().map(ClassifiedItem::from).collect();

    Ok((
        StatusCode::CREATED,
        Json(ImportItemsResponse { items, section }),
    ))
}

/// Apply a per-cell edit. Amounts are recomputed, P&A children cascade, and
/// section totals are refreshed in the same transaction.
///
/// PATCH /items/:item_id
pub async fn update_item(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
    Json(req): Json<UpdateLineItem>,
) -> Result<Json<ItemMutationResponse>, AppError> {
    let mutation = state
        .db
        .update_item(item_id, &req)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Item not found")))?;

    Ok(Json(mutation.into()))
}

/// Delete a row and return the section with recomputed totals.
///
/// DELETE /items/:item_id
pub async fn delete_item(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
) -> Result<Json<crate::models::Section>, AppError> {
    let section = state
        .db
        .delete_item(item_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Item not found")))?;

    Ok(Json(section))
}

/// Fetch the edit history of an item.
///
/// GET /items/:item_id/history
pub async fn item_history(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
) -> Result<Json<Vec<ItemHistoryEntry>>, AppError> {
    state
        .db
        .get_item(item_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Item not found")))?;

    let entries = state.db.item_history(item_id).await?;

    Ok(Json(entries))
}
