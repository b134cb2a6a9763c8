//! # Payment Gateway Adapter
//!
//! Translates what the external payment gateway sends into
//! [`GatewayEvent`]s:
//!
//! - client-side checkout confirmations, authenticated by
//!   `HMAC-SHA256(key_secret, "{order_id}|{payment_id}")` in lowercase hex
//! - server-to-server webhooks of the form
//!   `{"event": "payment.captured", "payload": {"payment": {"entity": {"id", "order_id"}}}}`,
//!   optionally signed with `HMAC-SHA256(webhook_secret, body)` in the
//!   `X-Gateway-Signature` header
//!
//! Signatures are compared in constant time. Checkout order ids are minted
//! here as `order_{uuid}`.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use uuid::Uuid;

use courier_state::GatewayEvent;

use crate::auth::constant_time_eq;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the webhook body signature.
pub const SIGNATURE_HEADER: &str = "x-gateway-signature";

/// Gateway secrets. `Debug` redacts both.
#[derive(Clone, Default)]
pub struct GatewayConfig {
    /// Key secret for checkout signatures. Verification is unavailable
    /// without it.
    pub key_secret: Option<String>,
    /// Secret for webhook body signatures. Webhooks are accepted unsigned
    /// when absent.
    pub webhook_secret: Option<String>,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("key_secret", &self.key_secret.as_ref().map(|_| "[REDACTED]"))
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

fn hmac_hex(secret: &str, message: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(message);
    Some(hex::encode(mac.finalize().into_bytes()))
}

fn matches_hex(signature: &str, expected: Option<String>) -> bool {
    match expected {
        Some(expected) => constant_time_eq(
            signature.trim().to_ascii_lowercase().as_bytes(),
            expected.as_bytes(),
        ),
        None => false,
    }
}

/// A fresh gateway order id for a checkout.
pub fn new_order_id() -> String {
    format!("order_{}", Uuid::new_v4().simple())
}

/// Signature the gateway attaches to a checkout confirmation.
pub fn checkout_signature(secret: &str, order_id: &str, payment_id: &str) -> Option<String> {
    hmac_hex(secret, format!("{order_id}|{payment_id}").as_bytes())
}

/// Check a checkout confirmation signature.
pub fn verify_checkout_signature(
    secret: &str,
    order_id: &str,
    payment_id: &str,
    signature: &str,
) -> bool {
    matches_hex(signature, checkout_signature(secret, order_id, payment_id))
}

/// Signature of a webhook body.
pub fn webhook_signature(secret: &str, body: &[u8]) -> Option<String> {
    hmac_hex(secret, body)
}

pub fn verify_webhook_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    matches_hex(signature, webhook_signature(secret, body))
}

#[derive(Deserialize)]
struct WebhookEnvelope {
    event: String,
    #[serde(default)]
    payload: Option<WebhookPayload>,
}

#[derive(Deserialize)]
struct WebhookPayload {
    payment: WebhookPayment,
}

#[derive(Deserialize)]
struct WebhookPayment {
    entity: PaymentEntity,
}

#[derive(Deserialize)]
struct PaymentEntity {
    id: String,
    #[serde(default)]
    order_id: Option<String>,
}

/// Parse a webhook body. Event types other than `payment.captured` and
/// `payment.failed`, and bodies that do not carry a payment entity, yield
/// `None`.
pub fn parse_webhook(body: &[u8]) -> Option<GatewayEvent> {
    let envelope: WebhookEnvelope = match serde_json::from_slice(body) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!(error = %e, "ignoring malformed gateway webhook");
            return None;
        }
    };
    let entity = match envelope.payload {
        Some(payload) => payload.payment.entity,
        None => {
            tracing::debug!(event = %envelope.event, "gateway webhook without payment entity");
            return None;
        }
    };
    match envelope.event.as_str() {
        "payment.captured" => Some(GatewayEvent::Captured {
            order_id: entity.order_id,
            payment_id: entity.id,
        }),
        "payment.failed" => Some(GatewayEvent::Failed {
            order_id: entity.order_id,
            payment_id: entity.id,
        }),
        other => {
            tracing::debug!(event = other, "ignoring unhandled gateway webhook event");
            None
        }
    }
}
