use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use sqlx::types::Json as SqlJson;
use std::sync::Arc;

use crate::alerts::{AlertAction, MaintenanceSchedule};
use crate::error::ApiError;
use crate::handlers::auth::{conflict_on_unique, current_user};
use crate::models::{AlertUpdateRequest, CreateBoxRequest, InventoryBox, OnionType, UpdateBoxRequest};
use crate::AppState;

fn validate_onion_type(raw: &str) -> Result<OnionType, ApiError> {
    OnionType::parse(raw)
        .ok_or_else(|| ApiError::Validation(format!("Unknown onion type: {}", raw)))
}

/// Creation-time rule: a box must hold stock. Zero is rejected here so a box
/// cannot be created and immediately vanish through the deletion-on-zero path.
fn validate_initial_quantity(quantity: f64) -> Result<(), ApiError> {
    if !quantity.is_finite() || quantity <= 0.0 {
        return Err(ApiError::Validation(
            "Box quantity must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

/// Stock at or below this counts as exhausted: fractional-kg sales can leave
/// a float residue that must still trigger the deletion coupling.
pub(crate) const STOCK_EPSILON: f64 = 1e-9;

pub(crate) fn stock_exhausted(quantity: f64) -> bool {
    quantity <= STOCK_EPSILON
}

#[derive(Debug, PartialEq)]
pub(crate) enum QuantityUpdate {
    /// The box is out of stock: delete it instead of keeping a husk.
    Remove,
    Set(f64),
}

pub(crate) fn classify_quantity_update(quantity: f64) -> Result<QuantityUpdate, ApiError> {
    if !quantity.is_finite() || quantity < 0.0 {
        return Err(ApiError::Validation("Box quantity must not be negative".to_string()));
    }
    if stock_exhausted(quantity) {
        Ok(QuantityUpdate::Remove)
    } else {
        Ok(QuantityUpdate::Set(quantity))
    }
}

fn validate_price(price_per_kg: f64) -> Result<(), ApiError> {
    if !price_per_kg.is_finite() || price_per_kg < 0.0 {
        return Err(ApiError::Validation("Price per kg must not be negative".to_string()));
    }
    Ok(())
}

async fn box_number_taken(
    state: &AppState,
    user_id: i64,
    box_number: &str,
    exclude_id: Option<i64>,
) -> Result<bool, ApiError> {
    let existing: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM boxes WHERE user_id = $1 AND box_number = $2 AND id <> $3",
    )
    .bind(user_id)
    .bind(box_number)
    .bind(exclude_id.unwrap_or(-1))
    .fetch_optional(&state.db)
    .await?;
    Ok(existing.is_some())
}

pub async fn create_box(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CreateBoxRequest>,
) -> Result<Json<InventoryBox>, ApiError> {
    let user = current_user(&state, &headers).await?;

    let box_number = payload.box_number.trim().to_string();
    if box_number.is_empty() {
        return Err(ApiError::Validation("Box number is required".to_string()));
    }
    let onion_type = validate_onion_type(&payload.onion_type)?;
    validate_initial_quantity(payload.quantity)?;
    validate_price(payload.price_per_kg)?;

    if box_number_taken(&state, user.id, &box_number, None).await? {
        return Err(ApiError::Conflict("Box number already in use".to_string()));
    }

    // The schedule is a pure function of the creation instant; compute it once
    // here and store it with the row.
    let created_at = Utc::now();
    let schedule = MaintenanceSchedule::new(created_at);

    let created = sqlx::query_as::<_, InventoryBox>(
        "INSERT INTO boxes (box_number, onion_type, quantity, price_per_kg, user_id, maintenance_alerts, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING *",
    )
    .bind(&box_number)
    .bind(onion_type.as_str())
    .bind(payload.quantity)
    .bind(payload.price_per_kg)
    .bind(user.id)
    .bind(SqlJson(&schedule))
    .bind(created_at)
    .fetch_one(&state.db)
    .await
    .map_err(|e| conflict_on_unique(e, "Box number already in use"))?;

    tracing::info!("box {} created for user {}", created.box_number, user.id);
    Ok(Json(created))
}

pub async fn list_boxes(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<InventoryBox>>, ApiError> {
    let user = current_user(&state, &headers).await?;

    let boxes = sqlx::query_as::<_, InventoryBox>(
        "SELECT * FROM boxes WHERE user_id = $1 ORDER BY created_at",
    )
    .bind(user.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(boxes))
}

pub async fn update_box(
    State(state): State<Arc<AppState>>,
    Path(box_id): Path<i64>,
    headers: HeaderMap,
    Json(payload): Json<UpdateBoxRequest>,
) -> Result<Response, ApiError> {
    let user = current_user(&state, &headers).await?;

    let existing = sqlx::query_as::<_, InventoryBox>(
        "SELECT * FROM boxes WHERE id = $1 AND user_id = $2",
    )
    .bind(box_id)
    .bind(user.id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::NotFound("Box not found".to_string()))?;

    let mut new_quantity = existing.quantity;
    if let Some(quantity) = payload.quantity {
        match classify_quantity_update(quantity)? {
            QuantityUpdate::Remove => {
                sqlx::query("DELETE FROM boxes WHERE id = $1 AND user_id = $2")
                    .bind(box_id)
                    .bind(user.id)
                    .execute(&state.db)
                    .await?;
                tracing::info!("box {} exhausted and deleted", existing.box_number);
                return Ok(Json(serde_json::json!({ "message": "Deleted" })).into_response());
            }
            QuantityUpdate::Set(quantity) => new_quantity = quantity,
        }
    }

    let box_number = match &payload.box_number {
        Some(raw) => {
            let trimmed = raw.trim().to_string();
            if trimmed.is_empty() {
                return Err(ApiError::Validation("Box number is required".to_string()));
            }
            if trimmed != existing.box_number
                && box_number_taken(&state, user.id, &trimmed, Some(box_id)).await?
            {
                return Err(ApiError::Conflict("Box number already in use".to_string()));
            }
            trimmed
        }
        None => existing.box_number.clone(),
    };

    let onion_type = match &payload.onion_type {
        Some(raw) => validate_onion_type(raw)?.as_str().to_string(),
        None => existing.onion_type.clone(),
    };

    if let Some(price) = payload.price_per_kg {
        validate_price(price)?;
    }

    let updated = sqlx::query_as::<_, InventoryBox>(
        "UPDATE boxes SET box_number = $1, onion_type = $2, quantity = $3, price_per_kg = $4 \
         WHERE id = $5 AND user_id = $6 RETURNING *",
    )
    .bind(&box_number)
    .bind(&onion_type)
    .bind(new_quantity)
    .bind(payload.price_per_kg.unwrap_or(existing.price_per_kg))
    .bind(box_id)
    .bind(user.id)
    .fetch_one(&state.db)
    .await
    .map_err(|e| conflict_on_unique(e, "Box number already in use"))?;

    Ok(Json(updated).into_response())
}

pub async fn delete_box(
    State(state): State<Arc<AppState>>,
    Path(box_id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = current_user(&state, &headers).await?;

    let result = sqlx::query("DELETE FROM boxes WHERE id = $1 AND user_id = $2")
        .bind(box_id)
        .bind(user.id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Box not found".to_string()));
    }
    Ok(Json(serde_json::json!({ "message": "Deleted" })))
}

pub async fn update_alert(
    State(state): State<Arc<AppState>>,
    Path(box_id): Path<i64>,
    headers: HeaderMap,
    Json(payload): Json<AlertUpdateRequest>,
) -> Result<Json<InventoryBox>, ApiError> {
    let user = current_user(&state, &headers).await?;

    let existing = sqlx::query_as::<_, InventoryBox>(
        "SELECT * FROM boxes WHERE id = $1 AND user_id = $2",
    )
    .bind(box_id)
    .bind(user.id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::NotFound("Box not found".to_string()))?;

    let action = AlertAction::parse(&payload.action)
        .ok_or_else(|| ApiError::Validation(format!("Invalid alert action: {}", payload.action)))?;

    let mut schedule = existing.maintenance_alerts.0.clone();
    schedule
        .apply(payload.alert_days, action, Utc::now())
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let updated = sqlx::query_as::<_, InventoryBox>(
        "UPDATE boxes SET maintenance_alerts = $1 WHERE id = $2 AND user_id = $3 RETURNING *",
    )
    .bind(SqlJson(&schedule))
    .bind(box_id)
    .bind(user.id)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(updated))
}
