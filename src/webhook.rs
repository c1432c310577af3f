//! Webhook HTTP listener — turns inbound host-platform events into
//! `Scheduler::run()` calls.
//!
//! Signature verification uses the HMAC-SHA256 `X-Hub-Signature-256`
//! scheme.

use crate::config::Config;
use crate::scheduler::Scheduler;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Router,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tokio::sync::Notify;

type HmacSha256 = Hmac<Sha256>;

/// The four event kinds that trigger a scheduler run. Payload contents are
/// not otherwise consulted by the core: PR Step and Merge Context always
/// re-fetch authoritative state from the Gateway, so dispatch only needs
/// the discriminant to invoke `Scheduler::run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Push,
    PullRequest,
    PullRequestReview,
    Status,
}

impl EventKind {
    fn from_header(name: &str) -> Option<Self> {
        match name {
            "push" => Some(EventKind::Push),
            "pull_request" => Some(EventKind::PullRequest),
            "pull_request_review" => Some(EventKind::PullRequestReview),
            "status" => Some(EventKind::Status),
            _ => None,
        }
    }
}

struct AppState {
    webhook_secret: String,
    scheduler: Arc<Scheduler>,
}

/// Builds the axum router: the configured webhook path plus a liveness
/// endpoint.
pub fn router(config: &Config, scheduler: Arc<Scheduler>) -> Router {
    let state = Arc::new(AppState {
        webhook_secret: config.github_webhook_secret.clone(),
        scheduler,
    });

    Router::new()
        .route(&config.github_webhook_path, post(handle_webhook))
        .route("/healthz", get(health))
        .with_state(state)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn handle_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let signature = match headers
        .get("X-Hub-Signature-256")
        .and_then(|v| v.to_str().ok())
    {
        Some(s) => s,
        None => return StatusCode::BAD_REQUEST,
    };

    if !verify_signature(&state.webhook_secret, &body, signature) {
        tracing::warn!("rejected webhook with invalid signature");
        return StatusCode::UNAUTHORIZED;
    }

    let event = headers
        .get("X-GitHub-Event")
        .and_then(|v| v.to_str().ok())
        .and_then(EventKind::from_header);

    match event {
        Some(_kind) => {
            let scheduler = Arc::clone(&state.scheduler);
            tokio::spawn(async move { scheduler.run().await });
            StatusCode::ACCEPTED
        }
        // Unrecognized event (e.g. `ping`): acknowledge without triggering
        // a run.
        None => StatusCode::OK,
    }
}

fn verify_signature(secret: &str, body: &[u8], header_value: &str) -> bool {
    let hex_sig = match header_value.strip_prefix("sha256=") {
        Some(s) => s,
        None => return false,
    };
    let provided = match hex::decode(hex_sig) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(body);
    let expected = mac.finalize().into_bytes();

    expected.ct_eq(&provided).into()
}

/// Serves the webhook listener until `scheduler`'s `listener_close` signal
/// fires, asking the listener to stop accepting events while the scheduler
/// backs off from a failed run.
pub async fn serve(config: &Config, scheduler: Arc<Scheduler>) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port).parse()?;
    let close_signal: &Notify = scheduler.listener_close();
    let app = router(config, Arc::clone(&scheduler));

    tracing::info!(%addr, path = %config.github_webhook_path, "starting webhook listener");

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(close_signal.notified())
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn valid_signature_is_accepted() {
        let body = b"{\"action\":\"opened\"}";
        let sig = sign("shh", body);
        assert!(verify_signature("shh", body, &sig));
    }

    #[test]
    fn tampered_body_is_rejected() {
        let sig = sign("shh", b"{\"action\":\"opened\"}");
        assert!(!verify_signature("shh", b"{\"action\":\"closed\"}", &sig));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let body = b"{\"action\":\"opened\"}";
        let sig = sign("other-secret", body);
        assert!(!verify_signature("shh", body, &sig));
    }

    #[test]
    fn missing_prefix_is_rejected() {
        let body = b"{}";
        assert!(!verify_signature("shh", body, "deadbeef"));
    }

    #[test]
    fn event_kind_maps_known_names_only() {
        assert_eq!(EventKind::from_header("push"), Some(EventKind::Push));
        assert_eq!(
            EventKind::from_header("pull_request"),
            Some(EventKind::PullRequest)
        );
        assert_eq!(
            EventKind::from_header("pull_request_review"),
            Some(EventKind::PullRequestReview)
        );
        assert_eq!(EventKind::from_header("status"), Some(EventKind::Status));
        assert_eq!(EventKind::from_header("ping"), None);
    }
}
