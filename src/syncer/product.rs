// ABOUTME: Product syncer - mirrors the local product catalog to the remote admin API
// ABOUTME: Remote records carry the local id as externalId so pushes stay idempotent

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::{DeleteLocal, DeleteRemote, SyncRecord, Syncer};
use crate::catalog::{LocalProducts, Product, ProductInput, PRODUCT_ENTITY};
use crate::context::SyncContext;
use crate::remote::models::{
    CreateProductData, CreateProductInput, DeleteProductData, ProductsData, UpdateProductData,
    UpdateProductInput,
};
use crate::remote::{AdminClient, RemoteProduct};

/// Page size for the remote product listing.
pub const PAGE_SIZE: usize = 100;

const GET_PRODUCTS: &str = r#"
query AdminGetProducts($options: ProductListOptions) {
  products(options: $options) {
    items { id externalId name slug updatedAt }
    totalItems
  }
}
"#;

const CREATE_PRODUCT: &str = r#"
mutation AdminCreateProduct($input: CreateProductInput!) {
  createProduct(input: $input) { id externalId name slug updatedAt }
}
"#;

const UPDATE_PRODUCT: &str = r#"
mutation AdminUpdateProduct($input: UpdateProductInput!) {
  updateProduct(input: $input) { id externalId name slug updatedAt }
}
"#;

const DELETE_PRODUCT: &str = r#"
mutation AdminDeleteProduct($id: ID!) {
  deleteProduct(id: $id) { result message }
}
"#;

pub struct ProductSyncer {
    client: AdminClient,
    catalog: Arc<dyn LocalProducts>,
}

impl ProductSyncer {
    pub fn new(client: AdminClient, catalog: Arc<dyn LocalProducts>) -> Self {
        tracing::info!(
            endpoint = %client.endpoint(),
            "ProductSyncer initialized"
        );
        Self { client, catalog }
    }

    async fn create_remote(&self, product: &Product) -> Result<RemoteProduct> {
        tracing::info!(entity = PRODUCT_ENTITY, id = %product.id, "createRemote");
        let input = CreateProductInput {
            external_id: product.id.clone(),
            name: product.name.clone(),
            slug: product.slug.clone(),
        };
        let data: CreateProductData = self
            .client
            .graphql(CREATE_PRODUCT, serde_json::json!({ "input": input }))
            .await
            .with_context(|| format!("createProduct failed for {}", product.id))?;
        Ok(data.create_product)
    }

    async fn update_remote(&self, remote_id: &str, product: &Product) -> Result<RemoteProduct> {
        tracing::info!(
            entity = PRODUCT_ENTITY,
            id = %product.id,
            remote_id,
            "updateRemote"
        );
        let input = UpdateProductInput {
            id: remote_id.to_string(),
            external_id: product.id.clone(),
            name: product.name.clone(),
            slug: product.slug.clone(),
        };
        let data: UpdateProductData = self
            .client
            .graphql(UPDATE_PRODUCT, serde_json::json!({ "input": input }))
            .await
            .with_context(|| format!("updateProduct failed for {}", product.id))?;
        Ok(data.update_product)
    }
}

#[async_trait]
impl Syncer for ProductSyncer {
    type Local = Product;
    type Remote = RemoteProduct;

    fn entity_name(&self) -> &str {
        PRODUCT_ENTITY
    }

    async fn fetch_remote(&self, _ctx: &SyncContext) -> Result<Vec<RemoteProduct>> {
        let mut all = Vec::new();
        let mut skip = 0;
        loop {
            let data: ProductsData = self
                .client
                .graphql(
                    GET_PRODUCTS,
                    serde_json::json!({ "options": { "skip": skip, "take": PAGE_SIZE } }),
                )
                .await
                .with_context(|| format!("products query failed at skip={skip}"))?;

            let page = data.products;
            if page.items.is_empty() {
                break;
            }
            all.extend(page.items);
            skip += PAGE_SIZE;
            if all.len() >= page.total_items {
                break;
            }
        }
        tracing::info!(entity = PRODUCT_ENTITY, count = all.len(), "fetchRemote fetched");
        Ok(all)
    }

    async fn fetch_local(&self, _ctx: &SyncContext) -> Result<Vec<Product>> {
        let items = self.catalog.list_products().await?;
        tracing::debug!(entity = PRODUCT_ENTITY, count = items.len(), "fetchLocal fetched");
        Ok(items)
    }

    async fn push(&self, ctx: &SyncContext, locals: &[Product]) -> Result<()> {
        tracing::info!(entity = PRODUCT_ENTITY, count = locals.len(), "push");
        let remote_ids: HashMap<String, String> = self
            .fetch_remote(ctx)
            .await?
            .into_iter()
            .map(|r| (r.record_id(), r.id))
            .collect();

        for product in locals {
            match remote_ids.get(&product.id) {
                Some(remote_id) => self.update_remote(remote_id, product).await?,
                None => self.create_remote(product).await?,
            };
        }
        Ok(())
    }

    async fn pull(&self, _ctx: &SyncContext, remotes: &[RemoteProduct]) -> Result<()> {
        tracing::info!(entity = PRODUCT_ENTITY, count = remotes.len(), "pull");
        for remote in remotes {
            let input = ProductInput {
                id: remote.record_id(),
                name: remote.name.clone(),
                slug: remote.slug.clone(),
            };
            self.catalog
                .apply_remote(&input)
                .await
                .with_context(|| format!("failed to apply remote product {}", remote.id))?;
        }
        Ok(())
    }

    fn local_deletion(&self) -> Option<&dyn DeleteLocal> {
        Some(self)
    }

    fn remote_deletion(&self) -> Option<&dyn DeleteRemote> {
        Some(self)
    }
}

#[async_trait]
impl DeleteLocal for ProductSyncer {
    async fn delete_local(&self, ctx: &SyncContext, ids: &[String]) -> Result<()> {
        tracing::info!(entity = PRODUCT_ENTITY, ids = %ids.join(","), "deleteLocal");
        for id in ids {
            if !self.catalog.soft_delete_product(ctx, id).await? {
                tracing::debug!(entity = PRODUCT_ENTITY, id = %id, "Already deleted locally");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DeleteRemote for ProductSyncer {
    /// `ids` are remote ids.
    async fn delete_remote(&self, _ctx: &SyncContext, ids: &[String]) -> Result<()> {
        tracing::info!(entity = PRODUCT_ENTITY, ids = %ids.join(","), "deleteRemote");
        for id in ids {
            let data: DeleteProductData = self
                .client
                .graphql(DELETE_PRODUCT, serde_json::json!({ "id": id }))
                .await
                .with_context(|| format!("deleteProduct failed for {id}"))?;
            if data.delete_product.result != "DELETED" {
                anyhow::bail!(
                    "remote refused to delete product {id}: {}",
                    data.delete_product.message.unwrap_or_default()
                );
            }
        }
        Ok(())
    }
}
