//! Payment-processor event envelope: signature verification and payload
//! shapes. Events arrive at-least-once; `event.id` is the idempotency key.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Signatures older than this are replays as far as we are concerned.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// The processor's webhook envelope: `{"id", "type", "data": {"object": ...}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessorEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

/// `checkout.session.completed` payload.
#[derive(Debug, Deserialize)]
pub struct CheckoutSession {
    pub mode: String,
    #[serde(default)]
    pub metadata: SessionMetadata,
    pub subscription: Option<String>,
    pub customer: Option<String>,
    /// Unix seconds. The processor contract includes the period end on
    /// subscription checkouts so activation needs no callback API fetch.
    pub current_period_end: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionMetadata {
    pub account_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub purchase_type: Option<String>,
}

/// `invoice.paid` payload.
#[derive(Debug, Deserialize)]
pub struct Invoice {
    pub subscription: Option<String>,
    /// Unix seconds — the end of the period this invoice paid for.
    pub period_end: Option<i64>,
}

/// `customer.subscription.deleted` payload.
#[derive(Debug, Deserialize)]
pub struct SubscriptionObject {
    pub id: String,
}

pub fn timestamp_from_unix(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

/// Verifies a `Stripe-Signature`-style header: `t=<unix>,v1=<hmac_hex>` where
/// the MAC covers `"{t}.{payload}"`. Comparison is constant-time via
/// `Mac::verify_slice`; stale timestamps are rejected to stop replays.
pub fn verify_signature(
    secret: &str,
    header: &str,
    payload: &[u8],
    now: DateTime<Utc>,
) -> Result<(), String> {
    let mut timestamp: Option<i64> = None;
    let mut signature_hex: Option<&str> = None;

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", v)) => timestamp = v.parse().ok(),
            Some(("v1", v)) => signature_hex = Some(v),
            _ => {} // future scheme versions are ignored, not errors
        }
    }

    let timestamp = timestamp.ok_or("missing timestamp in signature header")?;
    let signature_hex = signature_hex.ok_or("missing v1 signature in header")?;

    let age = (now.timestamp() - timestamp).abs();
    if age > SIGNATURE_TOLERANCE_SECS {
        return Err(format!("signature timestamp outside tolerance ({age}s old)"));
    }

    let signature =
        hex::decode(signature_hex).map_err(|_| "signature is not valid hex".to_string())?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| "webhook secret is unusable".to_string())?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    mac.verify_slice(&signature)
        .map_err(|_| "signature mismatch".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";

    fn sign(secret: &str, timestamp: i64, payload: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        let sig = hex::encode(mac.finalize().into_bytes());
        format!("t={timestamp},v1={sig}")
    }

    #[test]
    fn test_valid_signature_verifies() {
        let now = Utc::now();
        let payload = br#"{"id":"evt_1","type":"invoice.paid"}"#;
        let header = sign(SECRET, now.timestamp(), payload);
        assert!(verify_signature(SECRET, &header, payload, now).is_ok());
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let now = Utc::now();
        let payload = b"{}";
        let header = sign("whsec_other", now.timestamp(), payload);
        let err = verify_signature(SECRET, &header, payload, now).unwrap_err();
        assert!(err.contains("mismatch"));
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let now = Utc::now();
        let header = sign(SECRET, now.timestamp(), b"{\"amount\": 1}");
        assert!(verify_signature(SECRET, &header, b"{\"amount\": 9999}", now).is_err());
    }

    #[test]
    fn test_stale_timestamp_is_rejected() {
        let now = Utc::now();
        let stale = now.timestamp() - 600;
        let payload = b"{}";
        let header = sign(SECRET, stale, payload);
        let err = verify_signature(SECRET, &header, payload, now).unwrap_err();
        assert!(err.contains("tolerance"));
    }

    #[test]
    fn test_malformed_header_is_rejected() {
        let now = Utc::now();
        assert!(verify_signature(SECRET, "", b"{}", now).is_err());
        assert!(verify_signature(SECRET, "t=abc,v1=00", b"{}", now).is_err());
        assert!(verify_signature(SECRET, "v1=0011", b"{}", now).is_err());
    }

    #[test]
    fn test_unknown_scheme_parts_are_ignored() {
        let now = Utc::now();
        let payload = b"{}";
        let header = format!("{},v0=deadbeef", sign(SECRET, now.timestamp(), payload));
        assert!(verify_signature(SECRET, &header, payload, now).is_ok());
    }

    #[test]
    fn test_envelope_parses() {
        let raw = r#"{
            "id": "evt_123",
            "type": "checkout.session.completed",
            "data": {"object": {"mode": "subscription", "subscription": "sub_9",
                     "metadata": {"account_id": "6f0d5c2e-58df-4b2f-9a86-9c4e6b6a7e01"},
                     "current_period_end": 1767225600}}
        }"#;
        let event: ProcessorEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.id, "evt_123");
        assert_eq!(event.kind, "checkout.session.completed");

        let session: CheckoutSession = serde_json::from_value(event.data.object).unwrap();
        assert_eq!(session.mode, "subscription");
        assert!(session.metadata.account_id.is_some());
        assert_eq!(session.current_period_end, Some(1767225600));
    }

    #[test]
    fn test_checkout_session_tolerates_missing_metadata() {
        let session: CheckoutSession =
            serde_json::from_value(serde_json::json!({"mode": "payment"})).unwrap();
        assert!(session.metadata.account_id.is_none());
        assert!(session.subscription.is_none());
    }
}
