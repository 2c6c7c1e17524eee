use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use storefront::catalog::CatalogClient;
use storefront::config::{CatalogEnv, Config, ServerSecrets, OPTIONAL_ENV, REQUIRED_ENV};
use storefront::notify::OrderMailer;
use storefront::order_log::JsonFileOrderStore;
use storefront::server::{start_server, AppState};
use storefront::stripe::StripeClient;
use storefront::webhook::WebhookContext;
use storefront::{logging, sync_images};

#[derive(Parser)]
#[command(name = "storefront")]
#[command(about = "Storefront order service and catalog sync jobs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (checkout endpoint + order webhook)
    Serve {
        /// Port to bind; falls back to the PORT env var, then 3000
        #[arg(long)]
        port: Option<u16>,
    },
    /// Mirror catalog images into local static storage
    SyncImages,
    /// Export the product catalog to a local JSON file
    ExportProducts {
        /// Output path (defaults to the configured export file)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Verify the deployment environment variables are present
    CheckEnv,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port } => {
            let config = Config::load()?;
            let secrets = ServerSecrets::from_env()?;
            let catalog_env = CatalogEnv::from_env();

            let port = port
                .or_else(|| std::env::var("PORT").ok().and_then(|p| p.parse().ok()))
                .unwrap_or(3000);

            let catalog = CatalogClient::new(&catalog_env.url, catalog_env.token)?;
            let stripe = StripeClient::new(&secrets.stripe_secret_key, &secrets.stripe_webhook_secret);
            let notifier = Arc::new(OrderMailer::new(&secrets.smtp, &config.store.name)?);
            let orders = Arc::new(JsonFileOrderStore::new(&config.paths.orders_file));

            let state = Arc::new(AppState {
                config,
                stripe,
                catalog,
                webhook: WebhookContext { notifier, orders },
            });

            start_server(state, port).await?;
        }
        Commands::SyncImages => {
            let config = Config::load()?;
            let catalog_env = CatalogEnv::from_env();
            let catalog = CatalogClient::new(&catalog_env.url, catalog_env.token)?;

            info!(catalog_url = %catalog_env.url, "starting image sync");
            let summary = sync_images::run(&config, &catalog).await?;

            println!("\n📊 Image sync results:");
            println!("   Products with images: {}", summary.products);
            println!("   Product images:       {}", summary.product_images);
            println!("   Static assets:        {}", summary.static_assets);
            println!("   Failures:             {}", summary.failures);
        }
        Commands::ExportProducts { out } => {
            let config = Config::load()?;
            let catalog_env = CatalogEnv::from_env();
            let catalog = CatalogClient::new(&catalog_env.url, catalog_env.token)?;

            let products = catalog.fetch_products().await?;
            let out = out.unwrap_or(config.paths.products_export_file);
            if let Some(parent) = out.parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
            tokio::fs::write(&out, serde_json::to_vec_pretty(&products)?).await?;

            println!("📦 Exported {} products to {}", products.len(), out.display());
        }
        Commands::CheckEnv => {
            println!("Environment variable check");
            println!("==========================");

            let mut missing = Vec::new();
            for name in REQUIRED_ENV {
                match std::env::var(name) {
                    Ok(_) => println!("  ✓ {name}"),
                    Err(_) => {
                        println!("  ✗ {name} (required, NOT SET)");
                        missing.push(*name);
                    }
                }
            }
            for (name, default) in OPTIONAL_ENV {
                match std::env::var(name) {
                    Ok(_) => println!("  ✓ {name}"),
                    Err(_) => println!("  - {name} (default: {default})"),
                }
            }

            if !missing.is_empty() {
                anyhow::bail!("missing required environment variables: {}", missing.join(", "));
            }
        }
    }

    Ok(())
}
