use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use uuid::Uuid;

use crate::app::App;
use crate::config::Config;
use crate::error::Result;
use crate::services::{extract_url, ArticleSource, SlackMessage};

use super::WebState;

const MAX_BODY_BYTES: usize = 1024 * 1024;
const SIGNATURE_MAX_AGE_SECS: i64 = 5 * 60;
const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";
const SIGNATURE_HEADER: &str = "x-slack-signature";
const FORWARDED_HEADER: &str = "x-forwarded-for";
/// Idle clients are dropped from the limiter every this many checks.
const PRUNE_EVERY: usize = 1024;

/// Per-client rate limit and optional request signing for the webhook.
pub struct WebhookGuard {
    limiter: DefaultKeyedRateLimiter<IpAddr>,
    checks: AtomicUsize,
    trusted_proxies: Vec<IpAddr>,
    signing_secret: Option<String>,
}

impl WebhookGuard {
    pub fn from_config(config: &Config) -> Self {
        let per_minute = NonZeroU32::new(config.rate_limit_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            limiter: RateLimiter::keyed(Quota::per_minute(per_minute)),
            checks: AtomicUsize::new(0),
            trusted_proxies: config.trusted_proxies.clone(),
            signing_secret: config.slack_signing_secret.clone(),
        }
    }

    fn allow(&self, client: IpAddr) -> bool {
        let allowed = self.limiter.check_key(&client).is_ok();
        if self.checks.fetch_add(1, Ordering::Relaxed) % PRUNE_EVERY == PRUNE_EVERY - 1 {
            self.limiter.retain_recent();
            self.limiter.shrink_to_fit();
            tracing::debug!(clients = self.limiter.len(), "pruned webhook rate limiter");
        }
        allowed
    }

    /// The peer address, unless the peer is a trusted proxy, in which case
    /// the nearest `X-Forwarded-For` hop that is not one of ours.
    fn client_ip(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> IpAddr {
        let Some(peer) = peer.map(|p| p.ip()) else {
            return IpAddr::V4(Ipv4Addr::UNSPECIFIED);
        };
        if !self.trusted_proxies.contains(&peer) {
            return peer;
        }
        let hops: Vec<IpAddr> = headers
            .get_all(FORWARDED_HEADER)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .filter_map(|hop| hop.trim().parse().ok())
            .collect();
        hops.into_iter()
            .rev()
            .find(|hop| !self.trusted_proxies.contains(hop))
            .unwrap_or(peer)
    }

    fn verify(&self, headers: &HeaderMap, body: &[u8]) -> bool {
        let Some(secret) = &self.signing_secret else {
            return true;
        };
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
        match (header(TIMESTAMP_HEADER), header(SIGNATURE_HEADER)) {
            (Some(timestamp), Some(signature)) => {
                verify_signature(secret, timestamp, body, signature, Utc::now().timestamp())
            }
            _ => false,
        }
    }
}

/// Checks `v0=hex(HMAC-SHA256(secret, "v0:{timestamp}:{body}"))` and that
/// the timestamp is no more than five minutes from `now`.
pub fn verify_signature(secret: &str, timestamp: &str, body: &[u8], signature: &str, now: i64) -> bool {
    let Ok(sent_at) = timestamp.parse::<i64>() else {
        return false;
    };
    if (now - sent_at).abs() > SIGNATURE_MAX_AGE_SECS {
        return false;
    }
    let Some(expected) = signature.strip_prefix("v0=").and_then(|h| hex::decode(h).ok()) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(b"v0:");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Envelope {
    UrlVerification { challenge: String },
    EventCallback { event: ChatEvent },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ChatEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    reaction: String,
    item: Option<ReactionItem>,
}

#[derive(Debug, Deserialize)]
struct ReactionItem {
    channel: Option<String>,
    ts: Option<String>,
}

/// Channel and timestamp of the message a qualifying reaction points at.
fn reaction_target(triggers: Option<&[String]>, event: &ChatEvent) -> Option<(String, String)> {
    if event.event_type != "reaction_added" {
        return None;
    }
    if let Some(triggers) = triggers {
        if !triggers.iter().any(|t| t == &event.reaction) {
            tracing::debug!(reaction = %event.reaction, "ignoring reaction");
            return None;
        }
    }
    let item = event.item.as_ref()?;
    Some((item.channel.clone()?, item.ts.clone()?))
}

pub(super) async fn events(State(state): State<WebState>, request: Request) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = state.webhook.client_ip(request.headers(), peer);
    if !state.webhook.allow(client) {
        tracing::warn!(%client, "webhook rate limit exceeded");
        return (StatusCode::TOO_MANY_REQUESTS, "Too many requests").into_response();
    }

    let headers = request.headers().clone();
    let body = match axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!("Could not read webhook body: {}", e);
            return (StatusCode::BAD_REQUEST, "Unreadable body").into_response();
        }
    };

    if !state.webhook.verify(&headers, &body) {
        tracing::warn!(%client, "webhook signature rejected");
        return (StatusCode::UNAUTHORIZED, "Invalid signature").into_response();
    }

    let envelope: Envelope = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!("Malformed webhook payload: {}", e);
            return (StatusCode::BAD_REQUEST, "Malformed payload").into_response();
        }
    };

    match envelope {
        Envelope::UrlVerification { challenge } => Json(json!({ "challenge": challenge })).into_response(),
        Envelope::EventCallback { event } => {
            let triggers = state.app.config.trigger_emojis.as_deref();
            if let Some((channel, ts)) = reaction_target(triggers, &event) {
                let app = Arc::clone(&state.app);
                tokio::spawn(async move { handle_reaction(app, channel, ts).await });
            }
            StatusCode::OK.into_response()
        }
        Envelope::Other => StatusCode::OK.into_response(),
    }
}

async fn handle_reaction(app: Arc<App>, channel: String, ts: String) {
    let id = Uuid::new_v4();
    tracing::info!(uuid = ?id, %channel, %ts, "handling reaction");

    let (Some(slack), Some(source)) = (&app.slack, &app.source) else {
        tracing::warn!(uuid = ?id, "chat or article source not configured, ignoring reaction");
        return;
    };

    let message = match slack.message_at(&channel, &ts).await {
        Ok(Some(message)) => message,
        Ok(None) => {
            tracing::warn!(uuid = ?id, "reacted message no longer available");
            return;
        }
        Err(e) => {
            tracing::error!(uuid = ?id, "Failed to fetch message: {}", e);
            return;
        }
    };

    let reply = match save_link(source.as_ref(), &app.config.omnivore_label, &message).await {
        Ok(Some(url)) => format!("Saved {url} to Omnivore."),
        Ok(None) => {
            tracing::info!(uuid = ?id, "no link in reacted message");
            return;
        }
        Err(e) => {
            tracing::error!(uuid = ?id, "Failed to save link: {}", e);
            "Sorry, I couldn't save that link.".to_string()
        }
    };

    if let Err(e) = slack.reply_in_thread(&channel, &ts, &reply).await {
        tracing::warn!(uuid = ?id, "Failed to reply in thread: {}", e);
    }
}

/// Saves the first link in `message`, returning it, or `None` when there
/// is nothing to save.
async fn save_link(
    source: &dyn ArticleSource,
    label: &str,
    message: &SlackMessage,
) -> Result<Option<String>> {
    let Some(url) = extract_url(message) else {
        return Ok(None);
    };
    source.save_url(&url, label).await.map(Some)
}
