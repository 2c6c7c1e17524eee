use crate::error::{Result, StorefrontError};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Non-secret settings, loaded from `config.toml` at the repo root.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub store: StoreConfig,
    pub checkout: CheckoutConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub static_assets: Vec<StaticAsset>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Display name used in notification emails.
    pub name: String,
    /// Public origin of the storefront, used for checkout redirect URLs.
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutConfig {
    /// ISO currency code passed to the payment gateway (e.g. "cad").
    pub currency: String,
    /// Countries the hosted checkout page may ship to.
    pub shipping_countries: Vec<String>,
    /// Ask the hosted page to collect a phone number.
    pub collect_phone: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_orders_file")]
    pub orders_file: PathBuf,
    #[serde(default = "default_public_dir")]
    pub public_dir: PathBuf,
    #[serde(default = "default_image_map_file")]
    pub image_map_file: PathBuf,
    #[serde(default = "default_products_export_file")]
    pub products_export_file: PathBuf,
}

/// A fixed remote asset (logo etc.) mirrored by the sync-images job.
#[derive(Debug, Clone, Deserialize)]
pub struct StaticAsset {
    /// Path relative to the catalog host, e.g. "/uploads/logo.png".
    pub url: String,
    /// File name under `public/static/`.
    pub filename: String,
    #[serde(default)]
    pub description: String,
}

fn default_orders_file() -> PathBuf {
    PathBuf::from("tmp/orders.json")
}

fn default_public_dir() -> PathBuf {
    PathBuf::from("public")
}

fn default_image_map_file() -> PathBuf {
    PathBuf::from("image-map.json")
}

fn default_products_export_file() -> PathBuf {
    PathBuf::from("public/products-data.json")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            orders_file: default_orders_file(),
            public_dir: default_public_dir(),
            image_map_file: default_image_map_file(),
            products_export_file: default_products_export_file(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("config.toml"))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            StorefrontError::Config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Environment variables the server refuses to start without.
pub const REQUIRED_ENV: &[&str] = &[
    "STRIPE_SECRET_KEY",
    "STRIPE_WEBHOOK_SECRET",
    "SMTP_USER",
    "SMTP_PASS",
    "ORDER_NOTIFY_TO",
];

/// Optional variables and the defaults applied when they are unset.
pub const OPTIONAL_ENV: &[(&str, &str)] = &[
    ("SMTP_HOST", "smtp.gmail.com"),
    ("SMTP_PORT", "587"),
    ("ORDER_NOTIFY_FROM", "orders@localhost"),
    ("CATALOG_URL", "http://localhost:1339"),
    ("CATALOG_API_TOKEN", "(unauthenticated)"),
    ("PORT", "3000"),
];

fn require(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| {
        StorefrontError::Config(format!("missing required environment variable {name}"))
    })
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Catalog API location and credentials. Needed by every subcommand
/// that talks to the content API, so it loads independently of the
/// server-only secrets.
#[derive(Debug, Clone)]
pub struct CatalogEnv {
    pub url: String,
    pub token: Option<String>,
}

impl CatalogEnv {
    pub fn from_env() -> Self {
        Self {
            url: var_or("CATALOG_URL", "http://localhost:1339"),
            token: std::env::var("CATALOG_API_TOKEN").ok(),
        }
    }
}

/// Secrets the `serve` subcommand requires. Missing required variables
/// fail fast with a descriptive error instead of surfacing mid-request.
#[derive(Debug, Clone)]
pub struct ServerSecrets {
    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    pub smtp: SmtpConfig,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
    /// Sender mailbox for order notifications.
    pub from: String,
    /// Operator mailbox that receives order notifications.
    pub to: String,
}

impl ServerSecrets {
    pub fn from_env() -> Result<Self> {
        let port_raw = var_or("SMTP_PORT", "587");
        let port: u16 = port_raw.parse().map_err(|_| {
            StorefrontError::Config(format!("SMTP_PORT is not a valid port number: {port_raw}"))
        })?;

        Ok(Self {
            stripe_secret_key: require("STRIPE_SECRET_KEY")?,
            stripe_webhook_secret: require("STRIPE_WEBHOOK_SECRET")?,
            smtp: SmtpConfig {
                host: var_or("SMTP_HOST", "smtp.gmail.com"),
                port,
                user: require("SMTP_USER")?,
                pass: require("SMTP_PASS")?,
                from: var_or("ORDER_NOTIFY_FROM", "orders@localhost"),
                to: require("ORDER_NOTIFY_TO")?,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_full_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[store]
name = "Test Store"
base_url = "http://localhost:3000"

[checkout]
currency = "cad"
shipping_countries = ["CA", "US"]
collect_phone = true

[paths]
orders_file = "tmp/orders.json"

[[static_assets]]
url = "/uploads/logo.png"
filename = "logo.png"
description = "Site logo"
"#
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.store.name, "Test Store");
        assert_eq!(config.checkout.shipping_countries, vec!["CA", "US"]);
        assert_eq!(config.paths.orders_file, PathBuf::from("tmp/orders.json"));
        // unspecified paths keep their defaults
        assert_eq!(config.paths.public_dir, PathBuf::from("public"));
        assert_eq!(config.static_assets.len(), 1);
        assert_eq!(config.static_assets[0].filename, "logo.png");
    }

    #[test]
    fn missing_config_file_is_descriptive() {
        let err = Config::load_from(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/config.toml"));
    }

    #[test]
    fn missing_required_env_names_the_variable() {
        let err = require("STOREFRONT_TEST_UNSET_VARIABLE").unwrap_err();
        assert!(err
            .to_string()
            .contains("STOREFRONT_TEST_UNSET_VARIABLE"));
    }
}
