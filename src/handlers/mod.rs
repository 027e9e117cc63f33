mod api_keys;
mod health;
mod images;
mod metrics;

pub use api_keys::{create_api_key_handler, list_api_keys_handler, revoke_api_key_handler};
pub use health::health_handler;
pub use images::{get_image_handler, list_images_handler};
pub use metrics::metrics_handler;
