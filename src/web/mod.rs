//! HTTP surface: the reading list page, ranking gestures, refresh and
//! newsletter endpoints, and the chat webhook.

mod handlers;
mod slack;
pub mod views;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::app::App;
use crate::error::{AppError, Result};

use slack::WebhookGuard;

#[derive(Clone)]
pub struct WebState {
    app: Arc<App>,
    webhook: Arc<WebhookGuard>,
}

pub fn router(app: Arc<App>) -> Router {
    let state = WebState {
        webhook: Arc::new(WebhookGuard::from_config(&app.config)),
        app,
    };

    Router::new()
        .route("/", get(handlers::index))
        .route("/reorder", post(handlers::reorder))
        .route("/vote/{id}/{direction}", post(handlers::vote))
        .route("/refresh", get(handlers::refresh).post(handlers::refresh))
        .route("/download-newsletter", get(handlers::download_newsletter))
        .route("/update", post(handlers::update))
        .route("/slack/events", post(slack::events))
        .route("/health", get(handlers::health))
        .layer(middleware::from_fn_with_state(state.clone(), check_host))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(app: Arc<App>) -> Result<()> {
    let addr = format!("{}:{}", app.config.host, app.config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("listening on http://{}", addr);

    axum::serve(
        listener,
        router(app).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

/// Host name without any port; IPv6 literals keep their brackets.
fn host_name(raw: &str) -> &str {
    if raw.starts_with('[') {
        return raw.split_inclusive(']').next().unwrap_or(raw);
    }
    raw.split(':').next().unwrap_or(raw)
}

fn host_allowed(allowed: &[String], host: Option<&str>) -> bool {
    if allowed.iter().any(|h| h == "*") {
        return true;
    }
    let Some(host) = host else {
        return false;
    };
    let host = host_name(host);
    allowed.iter().any(|h| h.eq_ignore_ascii_case(host))
}

async fn check_host(State(state): State<WebState>, request: Request, next: Next) -> Response {
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .or_else(|| request.uri().host())
        .map(str::to_string);

    if host_allowed(&state.app.config.allowed_hosts, host.as_deref()) {
        next.run(request).await
    } else {
        tracing::warn!(host = ?host, "rejected request for unknown host");
        (StatusCode::BAD_REQUEST, "Invalid host header").into_response()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            e if e.is_external() => {
                tracing::error!("Upstream service failed: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            e => {
                tracing::error!("Internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, message).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_names_drop_ports() {
        assert_eq!(host_name("localhost:8000"), "localhost");
        assert_eq!(host_name("example.com"), "example.com");
        assert_eq!(host_name("[::1]:8000"), "[::1]");
    }

    #[test]
    fn host_allow_list() {
        let allowed = vec!["localhost".to_string(), "reading.example.com".to_string()];
        assert!(host_allowed(&allowed, Some("localhost:8000")));
        assert!(host_allowed(&allowed, Some("Reading.Example.com")));
        assert!(!host_allowed(&allowed, Some("evil.example.com")));
        assert!(!host_allowed(&allowed, None));
        assert!(host_allowed(&["*".to_string()], None));
    }

    #[test]
    fn errors_map_to_status_codes() {
        let status = |e: AppError| e.into_response().status();
        assert_eq!(status(AppError::NotFound(3)), StatusCode::NOT_FOUND);
        assert_eq!(status(AppError::Validation("bad".into())), StatusCode::BAD_REQUEST);
        assert_eq!(
            status(AppError::ClaudeApi("down".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status(AppError::Config("oops".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
