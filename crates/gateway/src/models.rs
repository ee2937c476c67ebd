use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;

use crate::alerts::MaintenanceSchedule;

// ── Stored rows ─────────────────────────────────────────────────

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub password_hash: String,
    pub address: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            address: self.address.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Shop {
    pub id: i64,
    pub name: String,
    pub address: Option<String>,
    pub fssai: Option<String>,
    pub phone: Option<String>,
    pub owner_id: i64,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct InventoryBox {
    pub id: i64,
    pub box_number: String,
    #[serde(rename = "type")]
    pub onion_type: String,
    pub quantity: f64,
    pub price_per_kg: f64,
    pub user_id: i64,
    pub maintenance_alerts: Json<MaintenanceSchedule>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Bill {
    pub id: i64,
    pub box_number: String,
    #[serde(rename = "type")]
    pub onion_type: String,
    pub shop_name: String,
    pub shop_address: Option<String>,
    pub fssai_number: Option<String>,
    pub quantity: f64,
    pub cost_price: f64,
    pub selling_price: f64,
    pub total: f64,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SensorReading {
    pub id: i64,
    pub sensor_id: String,
    pub temperature: f64,
    pub humidity: f64,
    pub ldr_value: f64,
    /// Source timestamp reported by the device, not the ingestion time.
    pub recorded_at: DateTime<Utc>,
}

/// The two stock types the warehouse tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnionType {
    Bulb,
    Shallot,
}

impl OnionType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "Bulb Onion" => Some(OnionType::Bulb),
            "Shallot Onion" => Some(OnionType::Shallot),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OnionType::Bulb => "Bulb Onion",
            OnionType::Shallot => "Shallot Onion",
        }
    }
}

// ── API payloads ────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ShopPayload {
    pub name: String,
    pub address: Option<String>,
    pub fssai: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBoxRequest {
    pub box_number: String,
    #[serde(rename = "type")]
    pub onion_type: String,
    pub quantity: f64,
    pub price_per_kg: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBoxRequest {
    pub box_number: Option<String>,
    #[serde(rename = "type")]
    pub onion_type: Option<String>,
    pub quantity: Option<f64>,
    pub price_per_kg: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertUpdateRequest {
    pub alert_days: i64,
    pub action: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBillRequest {
    pub box_id: i64,
    pub shop_id: i64,
    pub quantity_sold: f64,
    pub selling_price: f64,
}

/// JWT session claims: the user id and expiry.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub exp: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn onion_type_is_a_closed_set() {
        assert_eq!(OnionType::parse("Bulb Onion"), Some(OnionType::Bulb));
        assert_eq!(OnionType::parse("Shallot Onion"), Some(OnionType::Shallot));
        assert_eq!(OnionType::parse("Red Onion"), None);
        assert_eq!(OnionType::parse(""), None);
        assert_eq!(OnionType::Bulb.as_str(), "Bulb Onion");
    }
}
