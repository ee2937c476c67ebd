use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use std::sync::Arc;

use crate::error::ApiError;
use crate::handlers::auth::current_user;
use crate::models::{Shop, ShopPayload};
use crate::AppState;

pub async fn create_shop(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<ShopPayload>,
) -> Result<Json<Shop>, ApiError> {
    let user = current_user(&state, &headers).await?;
    if payload.name.trim().is_empty() {
        return Err(ApiError::Validation("Shop name is required".to_string()));
    }

    let shop = sqlx::query_as::<_, Shop>(
        "INSERT INTO shops (name, address, fssai, phone, owner_id) \
         VALUES ($1, $2, $3, $4, $5) RETURNING *",
    )
    .bind(payload.name.trim())
    .bind(&payload.address)
    .bind(&payload.fssai)
    .bind(&payload.phone)
    .bind(user.id)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(shop))
}

pub async fn list_shops(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Shop>>, ApiError> {
    let user = current_user(&state, &headers).await?;

    let shops = sqlx::query_as::<_, Shop>(
        "SELECT * FROM shops WHERE owner_id = $1 ORDER BY created_at",
    )
    .bind(user.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(shops))
}

pub async fn update_shop(
    State(state): State<Arc<AppState>>,
    Path(shop_id): Path<i64>,
    headers: HeaderMap,
    Json(payload): Json<ShopPayload>,
) -> Result<Json<Shop>, ApiError> {
    let user = current_user(&state, &headers).await?;
    if payload.name.trim().is_empty() {
        return Err(ApiError::Validation("Shop name is required".to_string()));
    }

    // scoping the update to the owner makes another tenant's shop id a miss
    let shop = sqlx::query_as::<_, Shop>(
        "UPDATE shops SET name = $1, address = $2, fssai = $3, phone = $4 \
         WHERE id = $5 AND owner_id = $6 RETURNING *",
    )
    .bind(payload.name.trim())
    .bind(&payload.address)
    .bind(&payload.fssai)
    .bind(&payload.phone)
    .bind(shop_id)
    .bind(user.id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::NotFound("Shop not found".to_string()))?;

    Ok(Json(shop))
}

pub async fn delete_shop(
    State(state): State<Arc<AppState>>,
    Path(shop_id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = current_user(&state, &headers).await?;

    let result = sqlx::query("DELETE FROM shops WHERE id = $1 AND owner_id = $2")
        .bind(shop_id)
        .bind(user.id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Shop not found".to_string()));
    }
    Ok(Json(serde_json::json!({ "message": "Deleted" })))
}
