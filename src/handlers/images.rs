use axum::{
    Json,
    extract::{Path, State},
};
use std::sync::Arc;

use crate::error::AppError;
use crate::models::Image;
use crate::state::AppState;

pub async fn list_images_handler(State(state): State<Arc<AppState>>) -> Json<Vec<Image>> {
    Json(state.store.list_images().to_vec())
}

pub async fn get_image_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Image>, AppError> {
    let id: i64 = id
        .parse()
        .map_err(|_| AppError::BadRequest(format!("Invalid image id: {id}")))?;

    state
        .store
        .get_image(id)
        .cloned()
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Image not found".to_string()))
}
