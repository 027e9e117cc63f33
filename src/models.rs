use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Image record served by /images
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Image {
    pub id: i64,
    pub species_name: String,
    pub gps_long: f64,
    pub gps_lat: f64,
    pub image_path: String,
    pub user_id: i64,
}

// Issued API key, returned in full by the management endpoints
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ApiKey {
    pub id: i64,
    pub key: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
    pub revoked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_ip: Option<String>,
}

// POST /api/keys body
#[derive(Debug, Deserialize)]
pub struct CreateApiKeyRequest {
    #[serde(default)]
    pub name: String,
}
