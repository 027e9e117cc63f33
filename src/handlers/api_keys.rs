use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use std::sync::Arc;

use crate::error::AppError;
use crate::middleware::ClientAddress;
use crate::models::{ApiKey, CreateApiKeyRequest};
use crate::state::AppState;

pub async fn create_api_key_handler(
    State(state): State<Arc<AppState>>,
    Extension(ClientAddress(address)): Extension<ClientAddress>,
    Json(payload): Json<CreateApiKeyRequest>,
) -> Result<(StatusCode, Json<ApiKey>), AppError> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("Name is required".to_string()));
    }

    let api_key = state.store.generate_api_key(name, Some(address));
    Ok((StatusCode::CREATED, Json(api_key)))
}

pub async fn list_api_keys_handler(State(state): State<Arc<AppState>>) -> Json<Vec<ApiKey>> {
    Json(state.store.list_api_keys())
}

pub async fn revoke_api_key_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id: i64 = id
        .parse()
        .map_err(|_| AppError::BadRequest(format!("Invalid API key id: {id}")))?;

    if !state.store.revoke_api_key(id) {
        return Err(AppError::NotFound("API key not found".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}
