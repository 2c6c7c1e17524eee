//! Normalizes a completed checkout session into an [`OrderRecord`].
//!
//! Extraction never fails on missing optional data: every customer
//! field resolves through an ordered fallback chain ending in an empty
//! string, and the shipping address resolves to `None` when neither
//! source on the event carries one.

use crate::stripe::{Address, CheckoutSession, CustomerField};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Key of the custom form field carrying free-text order notes.
pub const NOTES_FIELD_KEY: &str = "order_notes";

/// Immutable, normalized order derived from one completed checkout.
/// Serialized field names match the order log file format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRecord {
    pub stripe_session_id: String,
    pub stripe_customer_id: Option<String>,
    /// Processing time, not the gateway's event time.
    pub order_date: DateTime<Utc>,
    /// Decimal currency units; display only, never re-summed.
    pub order_total: f64,
    pub currency: String,
    pub payment_status: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub shipping_address: Option<ShippingAddress>,
    pub product_id: String,
    pub product_title: String,
    pub product_price: String,
    pub product_slug: String,
    pub order_notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub name: Option<String>,
    #[serde(flatten)]
    pub address: Address,
}

impl OrderRecord {
    /// Pure transformation; the caller guarantees the session came from
    /// a completed-payment event, so payment status is fixed to "paid".
    pub fn from_session(session: &CheckoutSession) -> Self {
        let expanded = match &session.customer {
            Some(CustomerField::Expanded(customer)) => Some(customer),
            _ => None,
        };
        let details = session.customer_details.as_ref();

        let customer_id = match &session.customer {
            Some(CustomerField::Id(id)) => Some(id.clone()),
            Some(CustomerField::Expanded(customer)) => Some(customer.id.clone()),
            None => None,
        };

        // Fallback order: expanded customer object, then the session's
        // customer_details, then empty.
        let customer_name = first_of(&[
            expanded.and_then(|c| c.name.as_deref()),
            details.and_then(|d| d.name.as_deref()),
        ]);
        let customer_email = first_of(&[
            expanded.and_then(|c| c.email.as_deref()),
            details.and_then(|d| d.email.as_deref()),
        ]);
        let customer_phone = first_of(&[
            expanded.and_then(|c| c.phone.as_deref()),
            details.and_then(|d| d.phone.as_deref()),
        ]);

        let metadata = |key: &str| -> String {
            session
                .metadata
                .as_ref()
                .and_then(|m| m.get(key))
                .cloned()
                .unwrap_or_default()
        };

        let order_notes = session
            .custom_fields
            .iter()
            .find(|field| field.key == NOTES_FIELD_KEY)
            .and_then(|field| field.text.as_ref())
            .and_then(|text| text.value.clone())
            .unwrap_or_default();

        OrderRecord {
            stripe_session_id: session.id.clone(),
            stripe_customer_id: customer_id,
            order_date: Utc::now(),
            order_total: session.amount_total.unwrap_or(0) as f64 / 100.0,
            currency: session
                .currency
                .clone()
                .unwrap_or_else(|| "cad".to_string()),
            payment_status: "paid".to_string(),
            customer_name,
            customer_email,
            customer_phone,
            shipping_address: resolve_shipping_address(session),
            product_id: metadata("productId"),
            product_title: metadata("productTitle"),
            product_price: metadata("productPrice"),
            product_slug: metadata("productSlug"),
            order_notes,
        }
    }
}

fn first_of(candidates: &[Option<&str>]) -> String {
    candidates
        .iter()
        .find_map(|candidate| *candidate)
        .unwrap_or_default()
        .to_string()
}

/// Shipping-address source preference, in order:
///   1. `customer_details.address` — where the gateway actually puts
///      the collected address in this integration,
///   2. `shipping_details.address` — the nominal field,
///   3. none.
fn resolve_shipping_address(session: &CheckoutSession) -> Option<ShippingAddress> {
    if let Some(details) = &session.customer_details {
        if let Some(address) = &details.address {
            return Some(ShippingAddress {
                name: details.name.clone(),
                address: address.clone(),
            });
        }
    }
    if let Some(shipping) = &session.shipping_details {
        if let Some(address) = &shipping.address {
            return Some(ShippingAddress {
                name: shipping.name.clone(),
                address: address.clone(),
            });
        }
    }
    None
}
