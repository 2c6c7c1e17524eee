//! Order notification email: one HTML + plaintext message per order to
//! the operator mailbox. Single attempt, no retry or queue; the
//! dispatcher decides what a delivery failure means.

use crate::config::SmtpConfig;
use crate::error::{Result, StorefrontError};
use crate::order::OrderRecord;
use crate::stripe::StripeClient;
use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

const NO_SHIPPING_ADDRESS: &str = "No shipping address provided";

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, order: &OrderRecord) -> Result<()>;
}

pub struct OrderMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
    store_name: String,
}

impl OrderMailer {
    pub fn new(smtp: &SmtpConfig, store_name: &str) -> Result<Self> {
        // Port 465 is implicit TLS; everything else goes through STARTTLS.
        let builder = if smtp.port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)
        }
        .map_err(|e| StorefrontError::Mail(e.to_string()))?;

        let transport = builder
            .port(smtp.port)
            .credentials(Credentials::new(smtp.user.clone(), smtp.pass.clone()))
            .build();

        Ok(Self {
            transport,
            from: parse_mailbox(&smtp.from)?,
            to: parse_mailbox(&smtp.to)?,
            store_name: store_name.to_string(),
        })
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox> {
    address
        .parse()
        .map_err(|e| StorefrontError::Config(format!("invalid mailbox '{address}': {e}")))
}

#[async_trait]
impl NotificationSink for OrderMailer {
    async fn deliver(&self, order: &OrderRecord) -> Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject(order))
            .multipart(MultiPart::alternative_plain_html(
                render_text(order, &self.store_name),
                render_html(order, &self.store_name),
            ))
            .map_err(|e| StorefrontError::Mail(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| StorefrontError::Mail(e.to_string()))?;
        Ok(())
    }
}

/// Total and product title up front for at-a-glance triage.
pub fn subject(order: &OrderRecord) -> String {
    format!(
        "New order: ${:.2} {} - {}",
        order.order_total,
        order.currency.to_uppercase(),
        order.product_title
    )
}

fn opt(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("")
}

fn or_not_provided(value: &str) -> &str {
    if value.is_empty() {
        "Not provided"
    } else {
        value
    }
}

fn customer_block(order: &OrderRecord) -> String {
    format!(
        "Name: {}\nEmail: {}\nPhone: {}",
        or_not_provided(&order.customer_name),
        or_not_provided(&order.customer_email),
        or_not_provided(&order.customer_phone),
    )
}

fn shipping_block(order: &OrderRecord) -> String {
    match &order.shipping_address {
        Some(shipping) => {
            let name = shipping
                .name
                .as_deref()
                .filter(|n| !n.is_empty())
                .unwrap_or(&order.customer_name);
            let a = &shipping.address;
            let mut lines = vec![name.to_string(), opt(&a.line1).to_string()];
            if let Some(line2) = a.line2.as_deref().filter(|l| !l.is_empty()) {
                lines.push(line2.to_string());
            }
            lines.push(format!(
                "{}, {} {}",
                opt(&a.city),
                opt(&a.state),
                opt(&a.postal_code)
            ));
            lines.push(opt(&a.country).to_string());
            lines.join("\n")
        }
        None => NO_SHIPPING_ADDRESS.to_string(),
    }
}

fn product_block(order: &OrderRecord) -> String {
    format!(
        "Product: {}\nPrice: ${} {}\nProduct ID: {}\nProduct slug: {}",
        order.product_title,
        order.product_price,
        order.currency.to_uppercase(),
        order.product_id,
        order.product_slug,
    )
}

pub fn render_text(order: &OrderRecord, store_name: &str) -> String {
    let notes = if order.order_notes.is_empty() {
        String::new()
    } else {
        format!("\nSpecial instructions:\n{}\n", order.order_notes)
    };

    format!(
        "New order received at {store_name}!\n\n\
         Order ID: {}\n\
         Total: ${:.2} {}\n\
         Order date: {}\n\n\
         Customer:\n{}\n\n\
         Shipping:\n{}\n\n\
         {}\n\
         {notes}\n\
         View in dashboard: {}\n",
        order.stripe_session_id,
        order.order_total,
        order.currency.to_uppercase(),
        order.order_date.to_rfc3339(),
        customer_block(order),
        shipping_block(order),
        product_block(order),
        StripeClient::dashboard_url(&order.stripe_session_id),
    )
}

pub fn render_html(order: &OrderRecord, store_name: &str) -> String {
    let notes_section = if order.order_notes.is_empty() {
        String::new()
    } else {
        format!(
            r#"<div class="section"><h2>Special Instructions</h2><pre>{}</pre></div>"#,
            order.order_notes
        )
    };

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<style>
    body {{ font-family: Arial, sans-serif; line-height: 1.6; color: #333; }}
    .header {{ background-color: #1f2430; color: #e8b23b; padding: 20px; text-align: center; }}
    .content {{ padding: 20px; background-color: #f9f9f9; }}
    .section {{ background-color: white; margin: 10px 0; padding: 15px; border-radius: 5px; border-left: 4px solid #e8b23b; }}
    .amount {{ font-size: 24px; font-weight: bold; color: #1f2430; }}
    .footer {{ text-align: center; padding: 20px; color: #666; font-size: 12px; }}
</style>
</head>
<body>
    <div class="header"><h1>New Order - {store_name}</h1></div>
    <div class="content">
        <div class="section">
            <h2>Order Summary</h2>
            <p><strong>Order ID:</strong> {session_id}</p>
            <p><strong>Total:</strong> <span class="amount">${total:.2} {currency}</span></p>
            <p><strong>Payment status:</strong> PAID</p>
            <p><strong>Order date:</strong> {date}</p>
        </div>
        <div class="section"><h2>Customer</h2><pre>{customer}</pre></div>
        <div class="section"><h2>Shipping</h2><pre>{shipping}</pre></div>
        <div class="section"><h2>Product</h2><pre>{product}</pre></div>
        {notes_section}
        <div class="section">
            <h2>Links</h2>
            <p><a href="{dashboard}" target="_blank">View in Stripe dashboard</a></p>
        </div>
    </div>
    <div class="footer"><p>This notification was generated automatically by the {store_name} storefront.</p></div>
</body>
</html>
"#,
        store_name = store_name,
        session_id = order.stripe_session_id,
        total = order.order_total,
        currency = order.currency.to_uppercase(),
        date = order.order_date.to_rfc3339(),
        customer = customer_block(order),
        shipping = shipping_block(order),
        product = product_block(order),
        notes_section = notes_section,
        dashboard = StripeClient::dashboard_url(&order.stripe_session_id),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::ShippingAddress;
    use crate::stripe::Address;
    use chrono::Utc;

    fn order() -> OrderRecord {
        OrderRecord {
            stripe_session_id: "cs_test_1".into(),
            stripe_customer_id: None,
            order_date: Utc::now(),
            order_total: 49.99,
            currency: "cad".into(),
            payment_status: "paid".into(),
            customer_name: "Ada Lovelace".into(),
            customer_email: "ada@example.com".into(),
            customer_phone: String::new(),
            shipping_address: None,
            product_id: "doc_1".into(),
            product_title: "Sunset Print".into(),
            product_price: "49.99".into(),
            product_slug: "sunset-print".into(),
            order_notes: String::new(),
        }
    }

    #[test]
    fn subject_carries_total_and_title() {
        let subject = subject(&order());
        assert!(subject.contains("$49.99 CAD"));
        assert!(subject.contains("Sunset Print"));
    }

    #[test]
    fn missing_address_renders_fallback_text_in_both_bodies() {
        let order = order();
        assert!(render_text(&order, "Test Store").contains("No shipping address provided"));
        assert!(render_html(&order, "Test Store").contains("No shipping address provided"));
    }

    #[test]
    fn present_address_is_rendered_with_customer_name_fallback() {
        let mut order = order();
        order.shipping_address = Some(ShippingAddress {
            name: None,
            address: Address {
                line1: Some("1 Main St".into()),
                line2: None,
                city: Some("Victoria".into()),
                state: Some("BC".into()),
                postal_code: Some("V8V 1A1".into()),
                country: Some("CA".into()),
            },
        });

        let text = render_text(&order, "Test Store");
        assert!(text.contains("1 Main St"));
        assert!(text.contains("Victoria, BC V8V 1A1"));
        // no shipping name on the address, so the customer name stands in
        assert!(text.contains("Ada Lovelace"));
        assert!(!text.contains("No shipping address provided"));
    }

    #[test]
    fn dashboard_link_points_at_the_session() {
        assert!(render_html(&order(), "Test Store")
            .contains("https://dashboard.stripe.com/payments/cs_test_1"));
    }

    #[test]
    fn notes_appear_only_when_present() {
        let mut order = order();
        assert!(!render_text(&order, "Test Store").contains("Special instructions"));
        order.order_notes = "leave at the back door".into();
        let text = render_text(&order, "Test Store");
        assert!(text.contains("Special instructions"));
        assert!(text.contains("leave at the back door"));
    }
}
