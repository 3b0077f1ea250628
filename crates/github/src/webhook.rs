//! Verification and parsing of inbound GitHub webhook deliveries.
//!
//! GitHub signs each payload with HMAC-SHA256 over the raw body using the
//! webhook secret and sends it as `X-Hub-Signature-256: sha256=<hex>`.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

use crate::types::{EventKind, WebhookEvent};

type HmacSha256 = Hmac<Sha256>;

pub const HEADER_EVENT: &str = "x-github-event";
pub const HEADER_SIGNATURE: &str = "x-hub-signature-256";
pub const HEADER_DELIVERY: &str = "x-github-delivery";

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("missing required header: {0}")]
    MissingHeader(&'static str),

    /// The event kind is valid GitHub traffic we simply don't subscribe to.
    #[error("unregistered event: {0}")]
    UnregisteredEvent(String),

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
}

pub struct WebhookValidator {
    secret: Vec<u8>,
}

impl WebhookValidator {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn validate_signature(&self, payload: &[u8], signature_header: &str) -> bool {
        verify_signature(payload, signature_header, &self.secret)
    }

    /// Turns a delivery into a typed event.
    ///
    /// The allow-list is consulted before the signature, so an unsubscribed
    /// event kind is reported as [`WebhookError::UnregisteredEvent`] whatever
    /// its signature.
    pub fn parse(
        &self,
        event_type: Option<&str>,
        signature_header: Option<&str>,
        payload: &[u8],
    ) -> Result<WebhookEvent, WebhookError> {
        let event_type = event_type.ok_or(WebhookError::MissingHeader(HEADER_EVENT))?;
        let kind = EventKind::from_header(event_type)
            .ok_or_else(|| WebhookError::UnregisteredEvent(event_type.to_string()))?;

        let signature_header =
            signature_header.ok_or(WebhookError::MissingHeader(HEADER_SIGNATURE))?;
        if !self.validate_signature(payload, signature_header) {
            return Err(WebhookError::InvalidSignature);
        }

        let event = match kind {
            EventKind::Release => WebhookEvent::Release(serde_json::from_slice(payload)?),
            EventKind::PullRequest => WebhookEvent::PullRequest(serde_json::from_slice(payload)?),
        };

        Ok(event)
    }
}

/// Parses `sha256=<hex>` into raw bytes. `None` for any other shape.
pub fn parse_signature_header(header: &str) -> Option<Vec<u8>> {
    let hex_sig = header.strip_prefix("sha256=")?;
    hex::decode(hex_sig).ok()
}

pub fn compute_signature(payload: &[u8], secret: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

pub fn format_signature_header(signature: &[u8]) -> String {
    format!("sha256={}", hex::encode(signature))
}

/// Constant-time check of `signature_header` against the payload's HMAC.
pub fn verify_signature(payload: &[u8], signature_header: &str, secret: &[u8]) -> bool {
    let expected = match parse_signature_header(signature_header) {
        Some(sig) => sig,
        None => return false,
    };

    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(payload);

    mac.verify_slice(&expected).is_ok()
}
