// ABOUTME: `product` command - edits the local catalog the way application code would
// ABOUTME: Mutations flow through the event bus into the change ledger

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tokio::sync::broadcast;

use crate::capture::{ChangeRecorder, EventBus};
use crate::catalog::{LocalProducts, ProductCatalog, ProductInput};
use crate::config::SyncConfig;
use crate::context::SyncContext;

#[derive(Args)]
pub struct ProductArgs {
    #[command(subcommand)]
    command: ProductCommands,
}

#[derive(Subcommand)]
enum ProductCommands {
    /// Create or update a product
    Upsert {
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        slug: String,
    },
    /// Soft-delete a product
    Delete {
        #[arg(long)]
        id: String,
    },
    /// List live products
    List,
}

pub async fn product(config: &SyncConfig, args: ProductArgs) -> Result<()> {
    let store = super::open_store(config)?;
    let bus = EventBus::default();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let listener = ChangeRecorder::new(store).spawn(&bus, shutdown_rx);

    let catalog_path = config.catalog_path()?;
    let catalog = ProductCatalog::open(&catalog_path, Some(bus))
        .with_context(|| format!("Failed to open catalog at {}", catalog_path.display()))?;
    let ctx = SyncContext::admin(Some("cli".to_string()));

    let result = run(&catalog, &ctx, args.command).await;

    let _ = shutdown_tx.send(());
    let recorded = listener.await.context("Change listener panicked")?;
    tracing::debug!(recorded, "Change listener drained");
    result
}

async fn run(catalog: &ProductCatalog, ctx: &SyncContext, command: ProductCommands) -> Result<()> {
    match command {
        ProductCommands::Upsert { id, name, slug } => {
            let product = catalog
                .upsert_product(ctx, &ProductInput { id, name, slug })
                .await?;
            println!("Saved product {} ({})", product.id, product.slug);
        }
        ProductCommands::Delete { id } => {
            if catalog.soft_delete_product(ctx, &id).await? {
                println!("Deleted product {}", id);
            } else {
                println!("Product {} not found or already deleted", id);
            }
        }
        ProductCommands::List => {
            for product in catalog.list_products().await? {
                println!(
                    "{:<12} {:<24} {:<24} {}",
                    product.id,
                    product.name,
                    product.slug,
                    product.updated_at.to_rfc3339()
                );
            }
        }
    }
    Ok(())
}
