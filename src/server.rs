use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use log::{error, info, warn};
use tokio::net::TcpListener;

use crate::webhook::{Webhook, WebhookError, WebhookRequest};

pub const HEALTH_ENDPOINT: &str = "/health";

pub fn router(webhook: Arc<Webhook>) -> Router {
    let endpoint = webhook.endpoint().to_owned();
    Router::new()
        .route(HEALTH_ENDPOINT, get(health))
        .route(&endpoint, post(post_receive))
        .with_state(webhook)
}

/// Serves until Ctrl-C.
pub async fn serve(host: &str, port: u16, webhook: Arc<Webhook>) -> anyhow::Result<()> {
    let listener = TcpListener::bind((host, port)).await?;
    info!(
        "Listening on {} at {}",
        listener.local_addr()?,
        webhook.endpoint()
    );
    axum::serve(listener, router(webhook))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn post_receive(
    State(webhook): State<Arc<Webhook>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, WebhookError> {
    webhook
        .receive(WebhookRequest {
            method,
            headers,
            body,
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        if self.is_client_error() {
            warn!("Rejected webhook request: {}", self);
            (StatusCode::BAD_REQUEST, self.to_string()).into_response()
        } else {
            error!("{}", self);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use pretty_assertions::assert_eq;

    use crate::webhook::{signature, WebhookEvent};

    const SECRET: &str = "s3cret";

    async fn spawn(webhook: Webhook) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let app = router(Arc::new(webhook));
        tokio::spawn(async move { axum::serve(listener, app).await });
        address
    }

    fn counting_webhook() -> (Webhook, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let webhook = Webhook::builder()
            .secret(SECRET)
            .hook("push", move |_: &WebhookEvent| -> anyhow::Result<()> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .try_build()
            .unwrap();
        (webhook, calls)
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (webhook, _) = counting_webhook();
        let address = spawn(webhook).await;

        let response = reqwest::get(format!("http://{address}/health"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.text().await.unwrap(), "OK");
    }

    #[tokio::test]
    async fn signed_form_push_is_accepted() {
        let (webhook, calls) = counting_webhook();
        let address = spawn(webhook).await;
        let body = "payload=%7B%22ref%22%3A%22refs%2Fheads%2Fmain%22%7D";

        let response = reqwest::Client::new()
            .post(format!("http://{address}/postreceive"))
            .header("content-type", "application/x-www-form-urlencoded")
            .header("x-github-event", "push")
            .header("x-github-delivery", "d-1")
            .header(
                "x-hub-signature",
                signature::sign_sha1(SECRET.as_bytes(), body.as_bytes()),
            )
            .body(body)
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.text().await.unwrap(), "");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn bad_signature_is_a_client_error() {
        let (webhook, calls) = counting_webhook();
        let address = spawn(webhook).await;
        let body = r#"{"ref":"refs/heads/main"}"#;

        let response = reqwest::Client::new()
            .post(format!("http://{address}/postreceive"))
            .header("content-type", "application/json")
            .header("x-github-event", "push")
            .header("x-github-delivery", "d-2")
            .header(
                "x-hub-signature",
                signature::sign_sha1(b"wrong", body.as_bytes()),
            )
            .body(body)
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(!response.text().await.unwrap().is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_event_header_is_a_client_error() {
        let webhook = Webhook::builder().try_build().unwrap();
        let address = spawn(webhook).await;

        let response = reqwest::Client::new()
            .post(format!("http://{address}/postreceive"))
            .header("content-type", "application/json")
            .body("{}")
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
