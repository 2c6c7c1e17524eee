//! Mirrors catalog images into local static storage.
//!
//! Downloads every product image to `public/products/<slug>/` and the
//! configured fixed assets to `public/static/`, then writes
//! `image-map.json` describing what landed where. Individual download
//! failures are logged and counted; when the previous image map has an
//! entry for the same source the stale local copy is kept instead.

use crate::catalog::CatalogClient;
use crate::config::Config;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::fs;
use tracing::{info, warn};

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ImageMap {
    #[serde(default)]
    pub products: BTreeMap<String, Vec<MappedImage>>,
    #[serde(rename = "static", default)]
    pub static_assets: BTreeMap<String, MappedAsset>,
    #[serde(rename = "lastSync", default)]
    pub last_sync: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappedImage {
    /// Source path as the catalog reported it.
    pub original: String,
    /// Local path served from the public directory.
    #[serde(rename = "static")]
    pub static_path: String,
    pub alt: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappedAsset {
    #[serde(rename = "static")]
    pub static_path: String,
    pub description: String,
}

#[derive(Debug, Default)]
pub struct SyncSummary {
    pub products: usize,
    pub product_images: usize,
    pub static_assets: usize,
    pub failures: usize,
}

/// Extension for the local copy: URL path first, then content type,
/// then `.jpg`.
fn file_extension(url: &str, content_type: Option<&str>) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    if let Some((_, ext)) = path.rsplit_once('.') {
        if !ext.is_empty() && ext.len() <= 4 && !ext.contains('/') {
            return format!(".{ext}");
        }
    }

    match content_type {
        Some(ct) if ct.contains("jpeg") || ct.contains("jpg") => ".jpg".to_string(),
        Some(ct) if ct.contains("png") => ".png".to_string(),
        Some(ct) if ct.contains("webp") => ".webp".to_string(),
        Some(ct) if ct.contains("gif") => ".gif".to_string(),
        _ => ".jpg".to_string(),
    }
}

async fn load_previous_map(path: &Path) -> ImageMap {
    match fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
        Err(_) => ImageMap::default(),
    }
}

pub async fn run(config: &Config, catalog: &CatalogClient) -> Result<SyncSummary> {
    let public_dir = &config.paths.public_dir;
    let products_dir = public_dir.join("products");
    let static_dir = public_dir.join("static");
    fs::create_dir_all(&products_dir).await?;
    fs::create_dir_all(&static_dir).await?;

    let previous = load_previous_map(&config.paths.image_map_file).await;
    let mut map = ImageMap {
        last_sync: Some(Utc::now()),
        ..ImageMap::default()
    };
    let mut summary = SyncSummary::default();

    // A catalog failure aborts the whole job; an empty mirror is worse
    // than a stale one.
    let products = catalog.fetch_products().await?;
    info!(count = products.len(), "fetched products for image sync");

    for product in &products {
        let Some(images) = product.images.as_ref().filter(|i| !i.is_empty()) else {
            info!(slug = %product.slug, "product has no images");
            continue;
        };

        let product_dir = products_dir.join(&product.slug);
        fs::create_dir_all(&product_dir).await?;
        summary.products += 1;

        let mut mapped = Vec::with_capacity(images.len());
        for (index, image) in images.iter().enumerate() {
            let source_url = catalog.image_url(&image.url);

            match catalog.download_asset(&source_url).await {
                Ok((bytes, content_type)) => {
                    let extension = file_extension(&image.url, content_type.as_deref());
                    let filename = format!("image{}{}", index + 1, extension);
                    fs::write(product_dir.join(&filename), &bytes).await?;

                    mapped.push(MappedImage {
                        original: image.url.clone(),
                        static_path: format!("/products/{}/{}", product.slug, filename),
                        alt: image
                            .alternative_text
                            .clone()
                            .unwrap_or_else(|| product.title.clone()),
                        width: image.width,
                        height: image.height,
                    });
                    summary.product_images += 1;
                }
                Err(e) => {
                    summary.failures += 1;
                    // Keep the previous sync's copy when we have one.
                    let cached = previous
                        .products
                        .get(&product.slug)
                        .and_then(|entries| {
                            entries.iter().find(|entry| entry.original == image.url)
                        })
                        .cloned();
                    match cached {
                        Some(entry) => {
                            warn!(url = %source_url, "download failed, keeping cached copy: {e}");
                            mapped.push(entry);
                            summary.product_images += 1;
                        }
                        None => warn!(url = %source_url, "download failed: {e}"),
                    }
                }
            }
        }

        if !mapped.is_empty() {
            map.products.insert(product.slug.clone(), mapped);
        }
    }

    for asset in &config.static_assets {
        let source_url = catalog.image_url(&asset.url);
        match catalog.download_asset(&source_url).await {
            Ok((bytes, _)) => {
                fs::write(static_dir.join(&asset.filename), &bytes).await?;
                map.static_assets.insert(
                    asset.url.clone(),
                    MappedAsset {
                        static_path: format!("/static/{}", asset.filename),
                        description: asset.description.clone(),
                    },
                );
                summary.static_assets += 1;
            }
            Err(e) => {
                summary.failures += 1;
                match previous.static_assets.get(&asset.url).cloned() {
                    Some(entry) => {
                        warn!(url = %source_url, "download failed, keeping cached copy: {e}");
                        map.static_assets.insert(asset.url.clone(), entry);
                        summary.static_assets += 1;
                    }
                    None => warn!(url = %source_url, "download failed: {e}"),
                }
            }
        }
    }

    if let Some(parent) = config.paths.image_map_file.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    fs::write(
        &config.paths.image_map_file,
        serde_json::to_vec_pretty(&map)?,
    )
    .await?;
    info!(path = %config.paths.image_map_file.display(), "image map written");

    Ok(summary)
}
