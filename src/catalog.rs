//! Client for the headless content API that holds the product catalog.

use crate::error::{Result, StorefrontError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogImage {
    pub id: i64,
    pub url: String,
    #[serde(rename = "alternativeText", default)]
    pub alternative_text: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    #[serde(rename = "documentId")]
    pub document_id: String,
    pub title: String,
    pub price: f64,
    #[serde(default)]
    pub description: Option<String>,
    pub slug: String,
    #[serde(default)]
    pub featured: bool,
    #[serde(default)]
    pub images: Option<Vec<CatalogImage>>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    data: T,
}

#[derive(Clone)]
pub struct CatalogClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl CatalogClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path_and_query: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path_and_query);
        let mut request = self.http.get(&url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(StorefrontError::Api {
                message: format!("catalog request failed: {status} {url}"),
            });
        }

        let body: ApiResponse<T> = response.json().await?;
        Ok(body.data)
    }

    /// Full catalog, images populated. Errors propagate; batch jobs
    /// abort rather than run against an empty product list.
    pub async fn fetch_products(&self) -> Result<Vec<Product>> {
        self.get_json("/api/products?populate=*&pagination[limit]=100")
            .await
    }

    /// Single-product lookup for checkout. Tolerant: transport and API
    /// failures log a warning and resolve to "not found".
    pub async fn fetch_product_by_slug(&self, slug: &str) -> Option<Product> {
        let query = format!("/api/products?filters[slug][$eq]={slug}&populate=*");
        match self.get_json::<Vec<Product>>(&query).await {
            Ok(products) => products.into_iter().next(),
            Err(e) => {
                warn!(slug, "catalog unavailable for product lookup: {e}");
                None
            }
        }
    }

    /// Raw asset download (product images, logos). Returns the bytes
    /// and the content type when the server reports one.
    pub async fn download_asset(&self, url: &str) -> Result<(Vec<u8>, Option<String>)> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(StorefrontError::Api {
                message: format!("asset download failed: {status} {url}"),
            });
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let bytes = response.bytes().await?.to_vec();
        Ok((bytes, content_type))
    }

    /// Absolute URL for an image path the catalog returned. Upload
    /// paths are host-relative; anything already absolute passes through.
    pub fn image_url(&self, url: &str) -> String {
        if url.starts_with("http") {
            url.to_string()
        } else {
            format!("{}{}", self.base_url, url)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> CatalogClient {
        CatalogClient::new("http://localhost:1339/", None).unwrap()
    }

    #[test]
    fn relative_image_path_gets_catalog_host() {
        assert_eq!(
            client().image_url("/uploads/print.jpg"),
            "http://localhost:1339/uploads/print.jpg"
        );
    }

    #[test]
    fn absolute_image_url_passes_through() {
        assert_eq!(
            client().image_url("https://cdn.example.com/print.jpg"),
            "https://cdn.example.com/print.jpg"
        );
    }

    #[test]
    fn product_deserializes_from_catalog_shape() {
        let product: Product = serde_json::from_value(serde_json::json!({
            "id": 7,
            "documentId": "doc_7",
            "title": "Sunset Print",
            "price": 49.99,
            "slug": "sunset-print",
            "featured": true,
            "images": [
                { "id": 1, "url": "/uploads/sunset.jpg", "alternativeText": "A sunset", "width": 1200, "height": 800 }
            ]
        }))
        .unwrap();

        assert_eq!(product.document_id, "doc_7");
        assert_eq!(product.images.as_ref().unwrap().len(), 1);
        assert_eq!(
            product.images.unwrap()[0].alternative_text.as_deref(),
            Some("A sunset")
        );
    }
}
