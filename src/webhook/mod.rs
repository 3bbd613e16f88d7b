mod builder;
pub mod describe;
pub mod event;
pub mod forward;
pub mod signature;

use std::{collections::HashMap, sync::Arc};

use axum::{
    body::Bytes,
    http::{HeaderMap, Method},
};
use log::{error, info};
use thiserror::Error;

pub use builder::WebhookBuilder;
pub use event::WebhookEvent;
pub use forward::{ForwardOutcome, Forwarder};
pub use signature::{SignatureError, SignatureVerifier};

use self::{describe::describe, event::header_str, signature::SIGNATURE_HEADER};

pub const DEFAULT_ENDPOINT: &str = "/postreceive";

#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("Invalid signature: {0}")]
    Signature(#[from] SignatureError),
    #[error("Missing header: {0}")]
    MissingHeader(&'static str),
    #[error("Request body must contain json")]
    InvalidBody,
    #[error("Webhook processing was interrupted: {0}")]
    Interrupted(#[from] tokio::task::JoinError),
}

impl WebhookError {
    /// Whether the sender is at fault, as opposed to this instance.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, WebhookError::Interrupted(_))
    }
}

/// A raw inbound request, as received from the HTTP server.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Reacts to one type of event.
///
/// Errors are logged and never reach the sender of the event.
pub trait Hook: Send + Sync {
    fn handle(&self, event: &WebhookEvent) -> anyhow::Result<()>;
}

impl<F> Hook for F
where
    F: Fn(&WebhookEvent) -> anyhow::Result<()> + Send + Sync,
{
    fn handle(&self, event: &WebhookEvent) -> anyhow::Result<()> {
        self(event)
    }
}

/// Hooks by event type, filled before the server starts and read-only after.
#[derive(Default)]
pub struct HookRegistry {
    hooks: HashMap<String, Vec<Box<dyn Hook>>>,
}

impl HookRegistry {
    pub fn register(&mut self, event_type: impl Into<String>, hook: impl Hook + 'static) {
        self.hooks
            .entry(event_type.into())
            .or_default()
            .push(Box::new(hook));
    }

    pub fn hooks(&self, event_type: &str) -> &[Box<dyn Hook>] {
        self.hooks
            .get(event_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

#[derive(Debug)]
pub enum Delivery {
    /// Relayed to peers without local processing.
    Forwarded(Vec<ForwardOutcome>),
    /// Authenticated, parsed and passed to `hooks` registered hooks.
    Dispatched { hooks: usize },
}

/// The webhook ingress pipeline.
///
/// Unless the request was already relayed by a peer, a configured broadcast
/// list makes this instance a pure relay. Otherwise the request is
/// authenticated, parsed and dispatched to the hooks of its event type.
pub struct Webhook {
    endpoint: String,
    verifier: SignatureVerifier,
    hooks: HookRegistry,
    forwarder: Option<Forwarder>,
}

impl Webhook {
    pub fn builder() -> WebhookBuilder {
        WebhookBuilder::default()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn receive(
        self: Arc<Self>,
        request: WebhookRequest,
    ) -> Result<Delivery, WebhookError> {
        if let Some(forwarder) = &self.forwarder {
            if !Forwarder::is_forwarded(&request.headers) {
                return Ok(Delivery::Forwarded(forwarder.broadcast(&request).await));
            }
        }

        // Hooks do blocking git and process work.
        tokio::task::spawn_blocking(move || self.process(&request)).await?
    }

    /// Authenticates, parses and dispatches a request on the current thread.
    pub fn process(&self, request: &WebhookRequest) -> Result<Delivery, WebhookError> {
        let signature = header_str(&request.headers, SIGNATURE_HEADER);
        if let Err(error) = self.verifier.verify(signature, &request.body) {
            error!("Invalid signature {:?}: {}", signature, error);
            return Err(error.into());
        }

        let event = WebhookEvent::parse(&request.headers, &request.body)?;
        info!(
            "{} ({})",
            describe(&event.event_type, &event.payload),
            event.delivery
        );

        let hooks = self.hooks.hooks(&event.event_type);
        for hook in hooks {
            if let Err(error) = hook.handle(&event) {
                error!(
                    "Hook for {} event failed ({}): {:#}",
                    event.event_type, event.delivery, error
                );
            }
        }

        Ok(Delivery::Dispatched { hooks: hooks.len() })
    }
}
