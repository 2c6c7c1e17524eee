//! Routes verified gateway events to the order pipeline.
//!
//! Only `checkout.session.completed` has side effects: extract the
//! order, email the operator, append to the local order log. The log
//! append is best-effort and swallowed here; a notification failure is
//! returned so the HTTP layer can log it. Neither changes the response
//! the gateway sees. Events are not deduplicated, so a redelivered
//! event produces a second notification.

use crate::error::Result;
use crate::notify::NotificationSink;
use crate::order::OrderRecord;
use crate::order_log::OrderStore;
use crate::stripe::{CheckoutSession, StripeEvent};
use std::sync::Arc;
use tracing::{info, warn};

pub struct WebhookContext {
    pub notifier: Arc<dyn NotificationSink>,
    pub orders: Arc<dyn OrderStore>,
}

pub async fn dispatch(ctx: &WebhookContext, event: &StripeEvent) -> Result<()> {
    match event.event_type.as_str() {
        "checkout.session.completed" => {
            let session: CheckoutSession = serde_json::from_value(event.data.object.clone())?;
            info!(session_id = %session.id, "processing completed checkout session");

            let order = OrderRecord::from_session(&session);
            let delivered = ctx.notifier.deliver(&order).await;

            if let Err(e) = ctx.orders.append(&order).await {
                warn!(session_id = %order.stripe_session_id, "order log append failed: {e}");
            }

            delivered?;
            info!(session_id = %order.stripe_session_id, "order notification sent");
            Ok(())
        }
        "payment_intent.succeeded" => {
            info!(event_id = %event.id, "payment succeeded");
            Ok(())
        }
        "payment_intent.payment_failed" => {
            info!(event_id = %event.id, "payment failed");
            Ok(())
        }
        other => {
            info!(event_type = other, "unhandled event type");
            Ok(())
        }
    }
}
