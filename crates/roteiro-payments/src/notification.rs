//! Webhook Notifications
//!
//! Mercado Pago delivers notifications at-least-once, possibly out of
//! order, and in more than one shape: query parameters (legacy IPN) or a
//! JSON body, with differing field names for the same concepts. Everything
//! is normalized into one [`PaymentNotification`] value before any
//! business logic runs; unrecognized shapes normalize to `Ignore` rather
//! than failing, so the endpoint never errors back at the provider.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;

type HmacSha256 = Hmac<Sha256>;

/// A normalized provider notification
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PaymentNotification {
    /// A payment event worth reconciling
    Payment { payment_id: String },

    /// Anything else: merchant orders, test pings, unknown shapes
    Ignore,
}

impl PaymentNotification {
    pub fn payment_id(&self) -> Option<&str> {
        match self {
            PaymentNotification::Payment { payment_id } => Some(payment_id),
            PaymentNotification::Ignore => None,
        }
    }

    /// Normalize from query parameters
    ///
    /// Accepted: `topic=payment&id=…` (IPN) and `type=payment&data.id=…`.
    pub fn from_query(params: &HashMap<String, String>) -> Self {
        let discriminator = params
            .get("topic")
            .or_else(|| params.get("type"))
            .map(String::as_str);

        if discriminator != Some("payment") {
            return PaymentNotification::Ignore;
        }

        let id = params
            .get("id")
            .or_else(|| params.get("data.id"))
            .filter(|id| !id.is_empty());

        match id {
            Some(id) => PaymentNotification::Payment {
                payment_id: id.clone(),
            },
            None => PaymentNotification::Ignore,
        }
    }

    /// Normalize from a JSON body
    ///
    /// Accepted: `{"type":"payment","data":{"id":…}}` and
    /// `{"topic":"payment","resource":…}` (resource may be a bare id or a
    /// URL ending in the id).
    pub fn from_json(body: &str) -> Self {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
            return PaymentNotification::Ignore;
        };

        let discriminator = value
            .get("type")
            .or_else(|| value.get("topic"))
            .and_then(|v| v.as_str());

        if discriminator != Some("payment") {
            return PaymentNotification::Ignore;
        }

        let id = value
            .get("data")
            .and_then(|data| data.get("id"))
            .and_then(json_id)
            .or_else(|| value.get("resource").and_then(|v| v.as_str()).and_then(resource_id));

        match id {
            Some(payment_id) => PaymentNotification::Payment { payment_id },
            None => PaymentNotification::Ignore,
        }
    }

    /// Normalize a delivery, whichever shape it arrived in
    pub fn parse(params: &HashMap<String, String>, body: &str) -> Self {
        let from_query = Self::from_query(params);
        if from_query != PaymentNotification::Ignore {
            return from_query;
        }

        if body.trim().is_empty() {
            PaymentNotification::Ignore
        } else {
            Self::from_json(body)
        }
    }
}

fn json_id(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn resource_id(resource: &str) -> Option<String> {
    resource
        .rsplit('/')
        .find(|segment| !segment.is_empty())
        .map(str::to_string)
}

/// Verify a Mercado Pago `x-signature` header
///
/// The header carries `ts=…,v1=…` where `v1` is an HMAC-SHA256 over the
/// manifest `id:{data_id};request-id:{request_id};ts:{ts};`. Returns false
/// on any malformed input; the caller logs and acknowledges without
/// processing.
pub fn verify_webhook_signature(
    secret: &str,
    x_signature: &str,
    x_request_id: &str,
    data_id: &str,
) -> bool {
    let mut ts = None;
    let mut v1 = None;

    for part in x_signature.split(',') {
        match part.trim().split_once('=') {
            Some(("ts", value)) => ts = Some(value),
            Some(("v1", value)) => v1 = Some(value),
            _ => {}
        }
    }

    let (Some(ts), Some(v1)) = (ts, v1) else {
        return false;
    };

    let Ok(expected) = hex::decode(v1) else {
        return false;
    };

    let manifest = format!("id:{data_id};request-id:{x_request_id};ts:{ts};");

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(manifest.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_ipn_query_shape() {
        let params = query(&[("topic", "payment"), ("id", "12345")]);
        assert_eq!(
            PaymentNotification::from_query(&params),
            PaymentNotification::Payment {
                payment_id: "12345".into()
            }
        );
    }

    #[test]
    fn test_typed_query_shape() {
        let params = query(&[("type", "payment"), ("data.id", "12345")]);
        assert_eq!(
            PaymentNotification::from_query(&params),
            PaymentNotification::Payment {
                payment_id: "12345".into()
            }
        );
    }

    #[test]
    fn test_merchant_order_ignored() {
        let params = query(&[("topic", "merchant_order"), ("id", "999")]);
        assert_eq!(
            PaymentNotification::from_query(&params),
            PaymentNotification::Ignore
        );
    }

    #[test]
    fn test_json_data_shape() {
        let body = r#"{"type":"payment","data":{"id":"12345"}}"#;
        assert_eq!(
            PaymentNotification::from_json(body),
            PaymentNotification::Payment {
                payment_id: "12345".into()
            }
        );
    }

    #[test]
    fn test_json_numeric_id() {
        let body = r#"{"type":"payment","data":{"id":12345}}"#;
        assert_eq!(
            PaymentNotification::from_json(body),
            PaymentNotification::Payment {
                payment_id: "12345".into()
            }
        );
    }

    #[test]
    fn test_json_resource_url_shape() {
        let body =
            r#"{"topic":"payment","resource":"https://api.mercadopago.com/v1/payments/777"}"#;
        assert_eq!(
            PaymentNotification::from_json(body),
            PaymentNotification::Payment {
                payment_id: "777".into()
            }
        );
    }

    #[test]
    fn test_unrecognized_shapes_normalize_to_ignore() {
        assert_eq!(
            PaymentNotification::from_json("not json at all"),
            PaymentNotification::Ignore
        );
        assert_eq!(
            PaymentNotification::from_json(r#"{"hello":"world"}"#),
            PaymentNotification::Ignore
        );
        assert_eq!(
            PaymentNotification::from_json(r#"{"type":"payment"}"#),
            PaymentNotification::Ignore
        );
    }

    #[test]
    fn test_parse_prefers_query_then_body() {
        let params = query(&[("topic", "payment"), ("id", "1")]);
        let body = r#"{"type":"payment","data":{"id":"2"}}"#;
        assert_eq!(
            PaymentNotification::parse(&params, body),
            PaymentNotification::Payment {
                payment_id: "1".into()
            }
        );

        let empty = query(&[]);
        assert_eq!(
            PaymentNotification::parse(&empty, body),
            PaymentNotification::Payment {
                payment_id: "2".into()
            }
        );
        assert_eq!(
            PaymentNotification::parse(&empty, ""),
            PaymentNotification::Ignore
        );
    }

    fn sign(secret: &str, request_id: &str, data_id: &str, ts: &str) -> String {
        let manifest = format!("id:{data_id};request-id:{request_id};ts:{ts};");
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(manifest.as_bytes());
        format!("ts={ts},v1={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn test_signature_accepts_valid() {
        let header = sign("secret", "req-1", "12345", "1704908010");
        assert!(verify_webhook_signature("secret", &header, "req-1", "12345"));
    }

    #[test]
    fn test_signature_rejects_tampering() {
        let header = sign("secret", "req-1", "12345", "1704908010");
        assert!(!verify_webhook_signature("secret", &header, "req-1", "99999"));
        assert!(!verify_webhook_signature("other", &header, "req-1", "12345"));
        assert!(!verify_webhook_signature("secret", "ts=1,v1=zz", "req-1", "12345"));
        assert!(!verify_webhook_signature("secret", "garbage", "req-1", "12345"));
    }
}
