//! HTTP surface: health check, checkout-session creation, and the
//! order webhook receiver.

use crate::catalog::CatalogClient;
use crate::config::Config;
use crate::stripe::{CheckoutSessionRequest, StripeClient, SIGNATURE_HEADER};
use crate::webhook::{dispatch, WebhookContext};
use axum::{
    extract::State,
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use hyper::Server;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

pub struct AppState {
    pub config: Config,
    pub stripe: StripeClient,
    pub catalog: CatalogClient,
    pub webhook: WebhookContext,
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "storefront",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[derive(Deserialize)]
struct CheckoutRequest {
    #[serde(rename = "productSlug", default)]
    product_slug: String,
}

static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new("<[^>]*>").unwrap());

/// Catalog descriptions are rich text; the gateway wants plain text.
fn strip_html(input: &str) -> String {
    HTML_TAG.replace_all(input, "").trim().to_string()
}

async fn create_checkout(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CheckoutRequest>,
) -> impl IntoResponse {
    if request.product_slug.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Product slug is required"})),
        )
            .into_response();
    }

    let Some(product) = state.catalog.fetch_product_by_slug(&request.product_slug).await else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Product not found"})),
        )
            .into_response();
    };

    let base_url = state.config.store.base_url.trim_end_matches('/');
    let image_url = product
        .images
        .as_ref()
        .and_then(|images| images.first())
        .map(|image| state.catalog.image_url(&image.url));

    let session_request = CheckoutSessionRequest {
        currency: state.config.checkout.currency.clone(),
        unit_amount: (product.price * 100.0).round() as i64,
        name: product.title.clone(),
        description: product
            .description
            .as_deref()
            .map(strip_html)
            .filter(|d| !d.is_empty()),
        image_url,
        success_url: format!("{base_url}/success?session_id={{CHECKOUT_SESSION_ID}}"),
        cancel_url: format!("{base_url}/cancel"),
        shipping_countries: state.config.checkout.shipping_countries.clone(),
        collect_phone: state.config.checkout.collect_phone,
        metadata: vec![
            ("productId".to_string(), product.document_id.clone()),
            ("productSlug".to_string(), product.slug.clone()),
            ("productTitle".to_string(), product.title.clone()),
            ("productPrice".to_string(), format!("{:.2}", product.price)),
            (
                "analytics".to_string(),
                json!({
                    "source": "storefront",
                    "slug": product.slug,
                    "price": product.price,
                })
                .to_string(),
            ),
        ],
    };

    match state.stripe.create_checkout_session(&session_request).await {
        Ok(session) => match session.url {
            Some(url) => Json(json!({"url": url})).into_response(),
            None => {
                error!(session_id = %session.id, "created session has no redirect URL");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": "Internal server error"})),
                )
                    .into_response()
            }
        },
        Err(e) => {
            error!(slug = %request.product_slug, "checkout session creation failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Internal server error"})),
            )
                .into_response()
        }
    }
}

async fn stripe_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> impl IntoResponse {
    let Some(signature) = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Missing stripe-signature header"})),
        )
            .into_response();
    };

    let event = match state.stripe.verify_event(body.as_bytes(), signature) {
        Ok(event) => event,
        Err(e) => {
            error!("webhook verification failed: {e}");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "Webhook signature verification failed"})),
            )
                .into_response();
        }
    };

    info!(event_id = %event.id, event_type = %event.event_type, "verified webhook event");

    // Always acknowledge once the signature checks out. A non-2xx here
    // would make the gateway redeliver the event, and a duplicate
    // notification is worse than a missed one.
    if let Err(e) = dispatch(&state.webhook, &event).await {
        error!(event_id = %event.id, "webhook processing failed: {e}");
    }

    Json(json!({"received": true})).into_response()
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/checkout", post(create_checkout))
        .route("/api/webhooks/stripe", post(stripe_webhook))
        .with_state(state)
        .layer(cors)
}

/// Start the HTTP server on the specified port.
pub async fn start_server(state: Arc<AppState>, port: u16) -> anyhow::Result<()> {
    let app = create_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!("HTTP server running on http://localhost:{port}");
    Server::bind(&addr).serve(app.into_make_service()).await?;

    Ok(())
}
