//! Payment gateway client: webhook signature verification and hosted
//! checkout-session creation against the Stripe REST API.

use crate::error::{Result, StorefrontError};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use std::collections::HashMap;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the `t=<ts>,v1=<hmac>` signature on webhook deliveries.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

const API_BASE: &str = "https://api.stripe.com/v1";
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// A webhook event whose signature has been verified. Only
/// [`StripeClient::verify_event`] constructs these.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: Value,
}

/// The checkout-session object carried by `checkout.session.completed`
/// events. Everything except the id is optional on the wire; missing
/// sub-objects must never fail deserialization.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub customer: Option<CustomerField>,
    #[serde(default)]
    pub customer_details: Option<CustomerDetails>,
    #[serde(default)]
    pub shipping_details: Option<ShippingDetails>,
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub metadata: Option<HashMap<String, String>>,
    #[serde(default)]
    pub custom_fields: Vec<CustomField>,
}

/// `customer` is a bare id string unless the session was retrieved with
/// the customer expanded.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CustomerField {
    Expanded(CustomerObject),
    Id(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomerObject {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomerDetails {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<Address>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShippingDetails {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<Address>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default)]
    pub line1: Option<String>,
    #[serde(default)]
    pub line2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomField {
    pub key: String,
    #[serde(default)]
    pub text: Option<CustomFieldText>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomFieldText {
    #[serde(default)]
    pub value: Option<String>,
}

/// Validates a `t=...,v1=...` signature header against the shared
/// webhook secret, with a bounded timestamp tolerance.
pub fn verify_signature(payload: &[u8], signature_header: &str, secret: &str) -> Result<()> {
    verify_signature_at(payload, signature_header, secret, Utc::now().timestamp())
}

fn verify_signature_at(
    payload: &[u8],
    signature_header: &str,
    secret: &str,
    now: i64,
) -> Result<()> {
    let parts: HashMap<&str, &str> = signature_header
        .split(',')
        .filter_map(|part| {
            let mut kv = part.splitn(2, '=');
            Some((kv.next()?.trim(), kv.next()?))
        })
        .collect();

    let timestamp = parts
        .get("t")
        .ok_or_else(|| StorefrontError::Signature("missing timestamp".into()))?;
    let expected = parts
        .get("v1")
        .ok_or_else(|| StorefrontError::Signature("missing v1 signature".into()))?;

    let ts: i64 = timestamp
        .parse()
        .map_err(|_| StorefrontError::Signature("invalid timestamp".into()))?;
    if (now - ts).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(StorefrontError::Signature(
            "timestamp outside tolerance window".into(),
        ));
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| StorefrontError::Signature("invalid webhook secret".into()))?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    let computed = hex::encode(mac.finalize().into_bytes());

    if computed != **expected {
        return Err(StorefrontError::Signature("signature mismatch".into()));
    }

    Ok(())
}

/// Inputs for a hosted checkout session: one line item plus the
/// collection flags and the metadata bag echoed back on completion.
#[derive(Debug, Clone)]
pub struct CheckoutSessionRequest {
    pub currency: String,
    /// Unit amount in minor units (cents).
    pub unit_amount: i64,
    pub name: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
    pub shipping_countries: Vec<String>,
    pub collect_phone: bool,
    pub metadata: Vec<(String, String)>,
}

impl CheckoutSessionRequest {
    /// The gateway API takes form-encoded bodies with bracketed keys.
    fn to_form_params(&self) -> Vec<(String, String)> {
        let mut params = vec![
            ("mode".to_string(), "payment".to_string()),
            ("payment_method_types[0]".to_string(), "card".to_string()),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            (
                "line_items[0][price_data][currency]".to_string(),
                self.currency.clone(),
            ),
            (
                "line_items[0][price_data][unit_amount]".to_string(),
                self.unit_amount.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]".to_string(),
                self.name.clone(),
            ),
            ("success_url".to_string(), self.success_url.clone()),
            ("cancel_url".to_string(), self.cancel_url.clone()),
        ];

        if let Some(description) = &self.description {
            params.push((
                "line_items[0][price_data][product_data][description]".to_string(),
                description.clone(),
            ));
        }
        if let Some(image_url) = &self.image_url {
            params.push((
                "line_items[0][price_data][product_data][images][0]".to_string(),
                image_url.clone(),
            ));
        }

        for (i, country) in self.shipping_countries.iter().enumerate() {
            params.push((
                format!("shipping_address_collection[allowed_countries][{i}]"),
                country.clone(),
            ));
        }
        if self.collect_phone {
            params.push((
                "phone_number_collection[enabled]".to_string(),
                "true".to_string(),
            ));
        }

        // Optional free-text notes collected on the hosted page; echoed
        // back in the completion event's custom_fields.
        params.push(("custom_fields[0][key]".to_string(), "order_notes".to_string()));
        params.push(("custom_fields[0][label][type]".to_string(), "custom".to_string()));
        params.push((
            "custom_fields[0][label][custom]".to_string(),
            "Order notes".to_string(),
        ));
        params.push(("custom_fields[0][type]".to_string(), "text".to_string()));
        params.push(("custom_fields[0][optional]".to_string(), "true".to_string()));

        for (key, value) in &self.metadata {
            params.push((format!("metadata[{key}]"), value.clone()));
        }

        params
    }
}

#[derive(Debug, Deserialize)]
pub struct CreatedSession {
    pub id: String,
    /// Redirect URL of the hosted payment page.
    pub url: Option<String>,
}

#[derive(Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    secret_key: String,
    webhook_secret: String,
}

impl StripeClient {
    pub fn new(secret_key: &str, webhook_secret: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            secret_key: secret_key.to_string(),
            webhook_secret: webhook_secret.to_string(),
        }
    }

    /// Verifies the signature and parses the event envelope. An inbound
    /// payload that fails either step never becomes a [`StripeEvent`].
    pub fn verify_event(&self, payload: &[u8], signature_header: &str) -> Result<StripeEvent> {
        verify_signature(payload, signature_header, &self.webhook_secret)?;
        Ok(serde_json::from_slice(payload)?)
    }

    pub async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CreatedSession> {
        let response = self
            .http
            .post(format!("{API_BASE}/checkout/sessions"))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&request.to_form_params())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorefrontError::Api {
                message: format!("checkout session creation failed: {status} {body}"),
            });
        }

        Ok(response.json().await?)
    }

    /// Deep link to the gateway dashboard for a checkout session.
    pub fn dashboard_url(session_id: &str) -> String {
        format!("https://dashboard.stripe.com/payments/{session_id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";

    fn sign(payload: &str, secret: &str, timestamp: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{timestamp}.{payload}").as_bytes());
        format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn valid_signature_is_accepted() {
        let payload = r#"{"id":"evt_1","type":"checkout.session.completed"}"#;
        let header = sign(payload, SECRET, 1_700_000_000);
        verify_signature_at(payload.as_bytes(), &header, SECRET, 1_700_000_000).unwrap();
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let payload = r#"{"id":"evt_1"}"#;
        let header = sign(payload, "whsec_other", 1_700_000_000);
        let err =
            verify_signature_at(payload.as_bytes(), &header, SECRET, 1_700_000_000).unwrap_err();
        assert!(matches!(err, StorefrontError::Signature(_)));
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let header = sign(r#"{"amount":100}"#, SECRET, 1_700_000_000);
        let err = verify_signature_at(br#"{"amount":999}"#, &header, SECRET, 1_700_000_000)
            .unwrap_err();
        assert!(matches!(err, StorefrontError::Signature(_)));
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let payload = r#"{"id":"evt_1"}"#;
        let header = sign(payload, SECRET, 1_700_000_000);
        let err = verify_signature_at(
            payload.as_bytes(),
            &header,
            SECRET,
            1_700_000_000 + SIGNATURE_TOLERANCE_SECS + 1,
        )
        .unwrap_err();
        assert!(matches!(err, StorefrontError::Signature(_)));
    }

    #[test]
    fn timestamp_inside_tolerance_is_accepted() {
        let payload = r#"{"id":"evt_1"}"#;
        let header = sign(payload, SECRET, 1_700_000_000);
        verify_signature_at(
            payload.as_bytes(),
            &header,
            SECRET,
            1_700_000_000 + SIGNATURE_TOLERANCE_SECS,
        )
        .unwrap();
    }

    #[test]
    fn malformed_header_is_rejected() {
        let err = verify_signature_at(b"{}", "not-a-signature", SECRET, 1_700_000_000).unwrap_err();
        assert!(matches!(err, StorefrontError::Signature(_)));
    }

    #[test]
    fn form_params_cover_line_item_and_collection_flags() {
        let request = CheckoutSessionRequest {
            currency: "cad".into(),
            unit_amount: 4999,
            name: "Print".into(),
            description: Some("A nice print".into()),
            image_url: Some("http://localhost:1339/uploads/print.jpg".into()),
            success_url: "http://localhost:3000/success".into(),
            cancel_url: "http://localhost:3000/cancel".into(),
            shipping_countries: vec!["CA".into(), "US".into()],
            collect_phone: true,
            metadata: vec![("productSlug".into(), "print".into())],
        };

        let params = request.to_form_params();
        let get = |key: &str| {
            params
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };

        assert_eq!(get("mode"), Some("payment"));
        assert_eq!(get("line_items[0][price_data][unit_amount]"), Some("4999"));
        assert_eq!(
            get("shipping_address_collection[allowed_countries][1]"),
            Some("US")
        );
        assert_eq!(get("phone_number_collection[enabled]"), Some("true"));
        assert_eq!(get("custom_fields[0][key]"), Some("order_notes"));
        assert_eq!(get("metadata[productSlug]"), Some("print"));
    }

    #[test]
    fn form_params_omit_absent_description_and_image() {
        let request = CheckoutSessionRequest {
            currency: "cad".into(),
            unit_amount: 100,
            name: "Print".into(),
            description: None,
            image_url: None,
            success_url: "http://localhost:3000/success".into(),
            cancel_url: "http://localhost:3000/cancel".into(),
            shipping_countries: vec![],
            collect_phone: false,
            metadata: vec![],
        };

        let params = request.to_form_params();
        assert!(params
            .iter()
            .all(|(k, _)| !k.contains("description") && !k.contains("images")));
        assert!(params
            .iter()
            .all(|(k, _)| !k.starts_with("phone_number_collection")));
    }

    #[test]
    fn verified_event_parses_envelope() {
        let payload = r#"{"id":"evt_42","type":"payment_intent.succeeded","data":{"object":{"id":"pi_1"}}}"#;
        let client = StripeClient::new("sk_test", SECRET);
        let header = sign(payload, SECRET, Utc::now().timestamp());
        let event = client.verify_event(payload.as_bytes(), &header).unwrap();
        assert_eq!(event.id, "evt_42");
        assert_eq!(event.event_type, "payment_intent.succeeded");
    }
}
