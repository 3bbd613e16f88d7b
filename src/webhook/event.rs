use axum::http::{header::CONTENT_TYPE, HeaderMap};
use log::error;
use serde_json::Value;

use super::WebhookError;

pub const EVENT_HEADER: &str = "X-GitHub-Event";
pub const DELIVERY_HEADER: &str = "X-GitHub-Delivery";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const FORM_PAYLOAD_FIELD: &str = "payload";

/// A delivery that passed authentication and carried a JSON payload.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    pub event_type: String,
    /// Only used to correlate log lines.
    pub delivery: String,
    pub payload: Value,
}

impl WebhookEvent {
    pub fn parse(headers: &HeaderMap, body: &[u8]) -> Result<Self, WebhookError> {
        let event_type = required_header(headers, EVENT_HEADER)?;
        let delivery = required_header(headers, DELIVERY_HEADER)?;

        let payload = if is_form(headers) {
            form_payload(body)
        } else {
            serde_json::from_slice(body).ok()
        };

        match payload {
            Some(payload) if !payload.is_null() => Ok(Self {
                event_type,
                delivery,
                payload,
            }),
            _ => {
                error!("Request body must contain json");
                Err(WebhookError::InvalidBody)
            }
        }
    }
}

pub(crate) fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn required_header(headers: &HeaderMap, name: &'static str) -> Result<String, WebhookError> {
    match header_str(headers, name) {
        Some(value) => Ok(value.to_owned()),
        None => {
            error!("Missing header {}", name);
            Err(WebhookError::MissingHeader(name))
        }
    }
}

fn is_form(headers: &HeaderMap) -> bool {
    header_str(headers, CONTENT_TYPE.as_str())
        .and_then(|content_type| content_type.split(';').next())
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case(FORM_CONTENT_TYPE))
}

fn form_payload(body: &[u8]) -> Option<Value> {
    let (_, payload) =
        url::form_urlencoded::parse(body).find(|(key, _)| key == FORM_PAYLOAD_FIELD)?;
    serde_json::from_str(&payload).ok()
}
