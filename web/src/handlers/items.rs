//! `GET /api/v1/items/{id}`.

use crate::{error::AppError, state::AppState, WebResult};
use axum::{
    extract::{Path, State},
    Json,
};
use staysearch_core::item::{IndexedItem, ItemId};

/// Active item by id, fetched from the catalog on an index miss.
pub async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> WebResult<Json<IndexedItem>> {
    let item_id = ItemId::new(id);
    if item_id.is_blank() {
        return Err(AppError::bad_request("item id must not be blank"));
    }

    state
        .lookup
        .find(&item_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Item", &item_id))
}
