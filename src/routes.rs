use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{delete, get, post},
};
use std::sync::Arc;

use crate::error::AppError;
use crate::handlers::{
    create_api_key_handler, get_image_handler, health_handler, list_api_keys_handler,
    list_images_handler, metrics_handler, revoke_api_key_handler,
};
use crate::middleware::{rate_limit_gate, require_api_key};
use crate::state::AppState;

// Every route, the fallback included, sits behind the rate limit gate.
// Image routes additionally need a valid API key.
pub fn router(state: Arc<AppState>) -> Router {
    let images = Router::new()
        .route("/images", get(list_images_handler))
        .route("/images/{id}", get(get_image_handler))
        .route_layer(from_fn_with_state(Arc::clone(&state), require_api_key));

    Router::new()
        .merge(images)
        .route(
            "/api/keys",
            post(create_api_key_handler).get(list_api_keys_handler),
        )
        .route("/api/keys/{id}", delete(revoke_api_key_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .fallback(not_found_handler)
        .layer(from_fn_with_state(Arc::clone(&state), rate_limit_gate))
        .with_state(state)
}

async fn not_found_handler() -> AppError {
    AppError::NotFound("Route not found".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use chrono::TimeDelta;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use crate::config::RateLimitConfig;
    use crate::models::Image;
    use crate::rate_limit::{RateLimiter, Scope};
    use crate::store::Store;

    fn test_state(config: RateLimitConfig) -> Arc<AppState> {
        let images = vec![Image {
            id: 1,
            species_name: "Quercus lobata".to_string(),
            gps_long: -121.9,
            gps_lat: 37.3,
            image_path: "/images/valley-oak.jpg".to_string(),
            user_id: 7,
        }];

        Arc::new(AppState {
            store: Store::new(images, TimeDelta::days(90)),
            rate_limiter: RateLimiter::new(&config),
        })
    }

    async fn send(state: &Arc<AppState>, req: Request<Body>) -> Response {
        router(Arc::clone(state)).oneshot(req).await.unwrap()
    }

    async fn body_json(resp: Response) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get_with(uri: &str, headers: &[(&str, &str)]) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn issue_key(state: &Arc<AppState>, name: &str) -> Value {
        let req = Request::builder()
            .method("POST")
            .uri("/api/keys")
            .header("content-type", "application/json")
            .header("x-forwarded-for", "198.51.100.4")
            .body(Body::from(json!({ "name": name }).to_string()))
            .unwrap();
        let resp = send(state, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        body_json(resp).await
    }

    #[tokio::test]
    async fn images_require_a_valid_key() {
        let state = test_state(RateLimitConfig::default());

        let resp = send(&state, get_with("/images", &[])).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(resp).await["error"], "Missing X-API-Key header");

        let resp = send(&state, get_with("/images", &[("x-api-key", "bogus")])).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(resp).await["error"], "Invalid or revoked API key");
    }

    #[tokio::test]
    async fn issued_key_unlocks_images() {
        let state = test_state(RateLimitConfig::default());
        let issued = issue_key(&state, "field app").await;
        let key = issued["key"].as_str().unwrap().to_string();
        assert_eq!(issued["created_ip"], "198.51.100.4");
        assert_eq!(issued["revoked"], false);

        let resp = send(&state, get_with("/images", &[("x-api-key", key.as_str())])).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await.as_array().unwrap().len(), 1);

        let resp = send(&state, get_with("/images/1", &[("x-api-key", key.as_str())])).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["species_name"], "Quercus lobata");

        let resp = send(&state, get_with("/images/99", &[("x-api-key", key.as_str())])).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = send(&state, get_with("/images/abc", &[("x-api-key", key.as_str())])).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn revoked_key_loses_access() {
        let state = test_state(RateLimitConfig::default());
        let issued = issue_key(&state, "temporary").await;
        let key = issued["key"].as_str().unwrap().to_string();
        let id = issued["id"].as_i64().unwrap();

        let req = Request::builder()
            .method("DELETE")
            .uri(format!("/api/keys/{id}"))
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(&state, req).await.status(), StatusCode::NO_CONTENT);

        let resp = send(&state, get_with("/images", &[("x-api-key", key.as_str())])).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = Request::builder()
            .method("DELETE")
            .uri("/api/keys/999")
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(&state, req).await.status(), StatusCode::NOT_FOUND);

        let resp = send(&state, get_with("/api/keys", &[])).await;
        let listed = body_json(resp).await;
        assert_eq!(listed[0]["revoked"], true);
    }

    #[tokio::test]
    async fn key_name_is_required() {
        let state = test_state(RateLimitConfig::default());
        let req = Request::builder()
            .method("POST")
            .uri("/api/keys")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "name": "  " }).to_string()))
            .unwrap();

        assert_eq!(send(&state, req).await.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn address_over_limit_gets_429_before_key_is_counted() {
        let state = test_state(RateLimitConfig {
            address_limit: 1,
            ..RateLimitConfig::default()
        });

        let first = get_with("/health", &[("x-forwarded-for", "1.2.3.4"), ("x-api-key", "k1")]);
        assert_eq!(send(&state, first).await.status(), StatusCode::OK);

        let second = get_with("/health", &[("x-forwarded-for", "1.2.3.4"), ("x-api-key", "k2")]);
        let resp = send(&state, second).await;
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        let error = body_json(resp).await["error"].as_str().unwrap().to_string();
        assert!(error.contains("address"), "{error}");
        assert!(error.contains("1 per day"), "{error}");

        assert!(state.rate_limiter.entry(Scope::Key, "k2").is_none());
    }

    #[tokio::test]
    async fn key_over_limit_gets_429_from_any_address() {
        let state = test_state(RateLimitConfig {
            key_limit: 1,
            ..RateLimitConfig::default()
        });

        let first = get_with("/health", &[("x-forwarded-for", "1.1.1.1"), ("x-api-key", "abc")]);
        assert_eq!(send(&state, first).await.status(), StatusCode::OK);

        let second = get_with("/health", &[("x-forwarded-for", "2.2.2.2"), ("x-api-key", "abc")]);
        let resp = send(&state, second).await;
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        let error = body_json(resp).await["error"].as_str().unwrap().to_string();
        assert!(error.contains("API key"), "{error}");
        assert!(error.contains("1 per hour"), "{error}");
    }

    #[tokio::test]
    async fn unknown_routes_are_still_rate_limited() {
        let state = test_state(RateLimitConfig {
            address_limit: 1,
            ..RateLimitConfig::default()
        });

        let resp = send(&state, get_with("/nope", &[("x-real-ip", "9.9.9.9")])).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let resp = send(&state, get_with("/nope", &[("x-real-ip", "9.9.9.9")])).await;
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn metrics_are_exposed() {
        let state = test_state(RateLimitConfig::default());

        let resp = send(&state, get_with("/metrics", &[])).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("naturedopes_requests_total"));
    }
}
