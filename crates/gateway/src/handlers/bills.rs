use axum::{
    extract::State,
    http::HeaderMap,
    Json,
};
use std::sync::Arc;

use crate::error::ApiError;
use crate::handlers::auth::current_user;
use crate::handlers::boxes::stock_exhausted;
use crate::models::{Bill, CreateBillRequest, InventoryBox, Shop};
use crate::AppState;

fn validate_sale(quantity_sold: f64, selling_price: f64) -> Result<(), ApiError> {
    if !quantity_sold.is_finite() || quantity_sold <= 0.0 {
        return Err(ApiError::Validation("Quantity sold must be greater than zero".to_string()));
    }
    if !selling_price.is_finite() || selling_price < 0.0 {
        return Err(ApiError::Validation("Selling price must not be negative".to_string()));
    }
    Ok(())
}

fn bill_total(quantity_sold: f64, selling_price: f64) -> f64 {
    quantity_sold * selling_price
}

/// The conditional decrement returns no row when the guard did not apply:
/// the box held less stock than the sale asked for.
fn require_stock(remaining: Option<f64>) -> Result<f64, ApiError> {
    remaining.ok_or_else(|| ApiError::Validation("Insufficient stock".to_string()))
}

pub async fn create_bill(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CreateBillRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = current_user(&state, &headers).await?;
    validate_sale(payload.quantity_sold, payload.selling_price)?;

    let stock_box = sqlx::query_as::<_, InventoryBox>(
        "SELECT * FROM boxes WHERE id = $1 AND user_id = $2",
    )
    .bind(payload.box_id)
    .bind(user.id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::NotFound("Box not found".to_string()))?;

    let shop = sqlx::query_as::<_, Shop>("SELECT * FROM shops WHERE id = $1 AND owner_id = $2")
        .bind(payload.shop_id)
        .bind(user.id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::NotFound("Shop not found".to_string()))?;

    // Decrement, delete-on-exhaustion and bill insert commit or roll back as
    // one unit: stock never moves without an invoice recording the sale.
    let mut tx = state.db.begin().await?;

    // Single conditional decrement: the quantity check and the write are one
    // statement, so two concurrent sales cannot both pass a stale check.
    let remaining: Option<f64> = sqlx::query_scalar(
        "UPDATE boxes SET quantity = quantity - $1 \
         WHERE id = $2 AND user_id = $3 AND quantity >= $1 RETURNING quantity",
    )
    .bind(payload.quantity_sold)
    .bind(payload.box_id)
    .bind(user.id)
    .fetch_optional(&mut *tx)
    .await?;

    let remaining = require_stock(remaining)?;

    // A sale that exhausts the box removes it, same as an update to zero.
    if stock_exhausted(remaining) {
        sqlx::query("DELETE FROM boxes WHERE id = $1 AND user_id = $2")
            .bind(payload.box_id)
            .bind(user.id)
            .execute(&mut *tx)
            .await?;
        tracing::info!("box {} sold out and deleted", stock_box.box_number);
    }

    let total = bill_total(payload.quantity_sold, payload.selling_price);

    // Shop and box fields are snapshotted into the bill so later edits to
    // either never rewrite an issued invoice.
    let bill = sqlx::query_as::<_, Bill>(
        "INSERT INTO bills (box_number, onion_type, shop_name, shop_address, fssai_number, \
         quantity, cost_price, selling_price, total, created_by) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING *",
    )
    .bind(&stock_box.box_number)
    .bind(&stock_box.onion_type)
    .bind(&shop.name)
    .bind(&shop.address)
    .bind(&shop.fssai)
    .bind(payload.quantity_sold)
    .bind(stock_box.price_per_kg)
    .bind(payload.selling_price)
    .bind(total)
    .bind(user.id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(Json(serde_json::json!({
        "bill": bill,
        "billedBy": { "name": user.name, "address": user.address },
    })))
}

pub async fn list_bills(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Bill>>, ApiError> {
    let user = current_user(&state, &headers).await?;

    let bills = sqlx::query_as::<_, Bill>(
        "SELECT * FROM bills WHERE created_by = $1 ORDER BY created_at DESC",
    )
    .bind(user.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(bills))
}
