use std::time::Duration;

use axum::http::{
    header::{CONNECTION, CONTENT_LENGTH, HOST, TRANSFER_ENCODING},
    HeaderMap, HeaderName, HeaderValue, StatusCode,
};
use futures::future::join_all;
use log::{debug, error};
use thiserror::Error;

use super::WebhookRequest;

/// Marks a request relayed by another instance, which must not be relayed again.
pub const FORWARDED_BY_HEADER: &str = "x-forwarded-by";
pub const FORWARDED_BY_VALUE: &str = "webhook-server";

pub const DEFAULT_FORWARD_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum ForwardError {
    #[error("Status code: {0}")]
    Status(StatusCode),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug)]
pub struct ForwardOutcome {
    pub peer: String,
    pub result: Result<(), ForwardError>,
}

/// Relays deliveries to peer instances.
#[derive(Debug, Clone)]
pub struct Forwarder {
    client: reqwest::Client,
    peers: Vec<String>,
    endpoint: String,
}

impl Forwarder {
    /// `peers` are `host:port` addresses; each call is bounded by `timeout`.
    pub fn new(
        peers: Vec<String>,
        endpoint: &str,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            client,
            peers,
            endpoint: endpoint.trim_start_matches('/').to_owned(),
        })
    }

    pub fn peers(&self) -> &[String] {
        &self.peers
    }

    pub fn is_forwarded(headers: &HeaderMap) -> bool {
        headers.contains_key(FORWARDED_BY_HEADER)
    }

    /// Sends the request to every peer at once and waits for all of them.
    /// A failing peer never affects the others.
    pub async fn broadcast(&self, request: &WebhookRequest) -> Vec<ForwardOutcome> {
        let headers = forwarded_headers(&request.headers);
        let calls = self
            .peers
            .iter()
            .map(|peer| self.forward(peer, request, headers.clone()));
        join_all(calls).await
    }

    async fn forward(
        &self,
        peer: &str,
        request: &WebhookRequest,
        headers: HeaderMap,
    ) -> ForwardOutcome {
        let url = format!("http://{}/{}", peer, self.endpoint);
        let result = self
            .client
            .request(request.method.clone(), &url)
            .headers(headers)
            .body(request.body.clone())
            .send()
            .await
            .map_err(ForwardError::from)
            .and_then(|response| {
                if response.status() == StatusCode::NO_CONTENT {
                    Ok(())
                } else {
                    Err(ForwardError::Status(response.status()))
                }
            });

        match &result {
            Ok(()) => debug!("Forwarded request to {}", peer),
            Err(error) => error!("Failed to forward request to {}: {}", peer, error),
        }

        ForwardOutcome {
            peer: peer.to_owned(),
            result,
        }
    }
}

/// Original headers without `Host` and connection-level framing, plus the
/// forwarding marker.
fn forwarded_headers(original: &HeaderMap) -> HeaderMap {
    let mut headers = original.clone();
    for name in [HOST, CONTENT_LENGTH, TRANSFER_ENCODING, CONNECTION] {
        headers.remove(name);
    }
    headers.insert(
        HeaderName::from_static(FORWARDED_BY_HEADER),
        HeaderValue::from_static(FORWARDED_BY_VALUE),
    );
    headers
}
