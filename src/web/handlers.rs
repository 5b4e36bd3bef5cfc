use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde_json::json;

use crate::error::{AppError, Result};
use crate::models::Article;
use crate::newsletter;
use crate::pipeline::RefreshOutcome;
use crate::ranking::{display_order, tiered, VoteDirection};

use super::{views, WebState};

pub(super) async fn index(State(state): State<WebState>) -> Result<Html<String>> {
    let app = &state.app;
    if let Err(e) = app.pipeline.ensure_fresh().await {
        tracing::warn!("Could not check freshness: {}", e);
    }

    let articles = display_order(app.engine.ranked().await?, &app.presentation, Utc::now());
    let last_update = app.repository().last_update().await?;
    let summary = app.repository().latest_newsletter_summary().await?;

    let tiers = tiered(
        &articles,
        app.presentation.long_count,
        app.presentation.short_count,
    );
    Ok(Html(views::index_page(
        &tiers,
        last_update,
        summary.as_ref().map(|s| s.summary.as_str()),
    )))
}

/// The list fragment swapped in after a gesture, in stored order so the
/// reader sees exactly the ranking they just made.
fn story_fragment(state: &WebState, articles: &[Article]) -> Html<String> {
    let presentation = &state.app.presentation;
    Html(views::story_list(&tiered(
        articles,
        presentation.long_count,
        presentation.short_count,
    )))
}

fn parse_id(raw: &str) -> Result<i64> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::Validation(format!("{raw:?} is not an article id")))
}

/// Accepts `ids=3,1,2` or repeated `id=` fields, in submitted order.
fn parse_order_form(body: &str) -> Result<Vec<i64>> {
    let mut ids = Vec::new();
    for (key, value) in url::form_urlencoded::parse(body.as_bytes()) {
        match key.as_ref() {
            "ids" => {
                for part in value.split(',').filter(|p| !p.trim().is_empty()) {
                    ids.push(parse_id(part)?);
                }
            }
            "id" => ids.push(parse_id(&value)?),
            _ => {}
        }
    }
    Ok(ids)
}

pub(super) async fn reorder(State(state): State<WebState>, body: String) -> Result<Html<String>> {
    let ids = parse_order_form(&body)?;
    let articles = state.app.engine.reorder(&ids).await?;
    Ok(story_fragment(&state, &articles))
}

pub(super) async fn vote(
    State(state): State<WebState>,
    Path((id, direction)): Path<(i64, String)>,
) -> Result<Html<String>> {
    let direction: VoteDirection = direction.parse()?;
    let articles = state.app.engine.vote(id, direction).await?;
    Ok(story_fragment(&state, &articles))
}

pub(super) async fn refresh(State(state): State<WebState>) -> Response {
    match state.app.pipeline.refresh().await {
        Ok(RefreshOutcome::Completed(report)) => {
            Json(json!({ "status": "ok", "report": report })).into_response()
        }
        Ok(RefreshOutcome::AlreadyRunning) => (
            StatusCode::CONFLICT,
            Json(json!({ "status": "already_running" })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Refresh failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": "error", "message": e.to_string() })),
            )
                .into_response()
        }
    }
}

pub(super) async fn download_newsletter(State(state): State<WebState>) -> Response {
    let app = &state.app;
    let (file_name, html) = match app.write_newsletter().await {
        Ok(rendered) => rendered,
        Err(e) => {
            tracing::warn!("Could not build newsletter, trying cached copy: {}", e);
            match newsletter::read_cache(&app.newsletter_path()).await {
                Some(html) => (format!("newsletter_{}.html", Utc::now().format("%Y-%m-%d")), html),
                None => return (StatusCode::NOT_FOUND, "Newsletter not found").into_response(),
            }
        }
    };

    (
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        html,
    )
        .into_response()
}

pub(super) async fn update(State(state): State<WebState>) -> Result<Json<serde_json::Value>> {
    let now = Utc::now();
    state.app.repository().record_update(now).await?;
    Ok(Json(json!({ "status": "ok", "last_update": now.to_rfc3339() })))
}

pub(super) async fn health() -> &'static str {
    "OK"
}
