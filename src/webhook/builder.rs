use std::time::Duration;

use log::{info, warn};

use super::{
    forward::DEFAULT_FORWARD_TIMEOUT, Forwarder, Hook, HookRegistry, SignatureVerifier, Webhook,
    DEFAULT_ENDPOINT,
};

#[derive(Default)]
pub struct WebhookBuilder {
    endpoint: Option<String>,
    secret: Option<Vec<u8>>,
    broadcast_instances: Vec<String>,
    forward_timeout: Option<Duration>,
    hooks: HookRegistry,
}

impl WebhookBuilder {
    /// Path the webhook is served at.
    ///
    /// Defaults to `/postreceive`.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Shared secret used to verify `X-Hub-Signature`.
    ///
    /// When no secret is set, signatures are not checked at all.
    pub fn secret(mut self, secret: impl Into<Vec<u8>>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    /// `host:port` of other instances that should receive every delivery.
    pub fn broadcast_instances(mut self, instances: Vec<String>) -> Self {
        self.broadcast_instances = instances;
        self
    }

    /// Timeout of each relayed request.
    ///
    /// Defaults to 10 seconds.
    pub fn forward_timeout(mut self, timeout: Duration) -> Self {
        self.forward_timeout = Some(timeout);
        self
    }

    /// Registers a hook for an event type, e.g. `push`.
    pub fn hook(mut self, event_type: impl Into<String>, hook: impl Hook + 'static) -> Self {
        self.hooks.register(event_type, hook);
        self
    }

    pub fn try_build(self) -> anyhow::Result<Webhook> {
        let Self {
            endpoint,
            secret,
            broadcast_instances,
            forward_timeout,
            hooks,
        } = self;

        let endpoint = endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_owned());
        let endpoint = format!("/{}", endpoint.trim_start_matches('/'));

        if secret.is_none() {
            warn!("No webhook secret configured, request signatures will not be verified");
        }
        let verifier = SignatureVerifier::new(secret);

        let forwarder = if broadcast_instances.is_empty() {
            None
        } else {
            info!("Broadcasting requests to {}", broadcast_instances.join(", "));
            Some(Forwarder::new(
                broadcast_instances,
                &endpoint,
                forward_timeout.unwrap_or(DEFAULT_FORWARD_TIMEOUT),
            )?)
        };

        Ok(Webhook {
            endpoint,
            verifier,
            hooks,
            forwarder,
        })
    }
}
