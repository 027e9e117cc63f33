use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::error::AppError;
use crate::metrics::{RATE_LIMITED_TOTAL, REQUEST_TOTAL};
use crate::rate_limit::{Decision, Scope};
use crate::state::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Client address resolved by the rate limit gate, available to handlers
/// through `Extension<ClientAddress>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientAddress(pub String);

fn header_value(req: &Request, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

// forwarded-for, then real-ip, then the peer address
pub fn client_address(req: &Request) -> String {
    header_value(req, "x-forwarded-for")
        .or_else(|| header_value(req, "x-real-ip"))
        .or_else(|| {
            req.extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn rate_limit_gate(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    REQUEST_TOTAL.inc();

    let address = client_address(&req);
    let api_key = header_value(&req, API_KEY_HEADER).unwrap_or_default();
    let limiter = &state.rate_limiter;

    match limiter.evaluate_request(&address, &api_key) {
        Decision::Admitted => {}
        Decision::RejectedAddress => {
            RATE_LIMITED_TOTAL
                .with_label_values(&[Scope::Address.label()])
                .inc();
            return Err(AppError::TooManyRequests(format!(
                "Rate limit exceeded: too many requests from this address ({})",
                limiter.address_policy()
            )));
        }
        Decision::RejectedKey => {
            RATE_LIMITED_TOTAL
                .with_label_values(&[Scope::Key.label()])
                .inc();
            return Err(AppError::TooManyRequests(format!(
                "Rate limit exceeded: too many requests with this API key ({})",
                limiter.key_policy()
            )));
        }
    }

    req.extensions_mut().insert(ClientAddress(address));
    Ok(next.run(req).await)
}

pub async fn require_api_key(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(api_key) = header_value(&req, API_KEY_HEADER) else {
        return Err(AppError::Unauthorized("Missing X-API-Key header".to_string()));
    };

    if !state.store.validate_api_key(&api_key) {
        tracing::debug!("Rejected invalid or revoked API key");
        return Err(AppError::Unauthorized(
            "Invalid or revoked API key".to_string(),
        ));
    }

    Ok(next.run(req).await)
}
