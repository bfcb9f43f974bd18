//! # Reference Data Repository
//!
//! Server-authoritative reference data, replaced wholesale by the
//! incremental pull. Every upsert keys on the server id and is idempotent:
//! pulling the same page twice leaves the store byte-identical.
//!
//! Types without a dedicated table (categories, units, inventory
//! visibility, table layouts) land as JSON documents in
//! `reference_documents`.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use vela_core::docnum::DocumentKind;
use vela_core::{EntityType, MaterialRef, ProductRef, RecipeLine};

/// Repository for reference data and terminal settings.
#[derive(Debug, Clone)]
pub struct ReferenceRepository {
    pool: SqlitePool,
}

impl ReferenceRepository {
    /// Creates a new ReferenceRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ReferenceRepository { pool }
    }

    // =========================================================================
    // Products / Materials / Recipes
    // =========================================================================

    /// Upserts pulled products by server id.
    pub async fn upsert_products(&self, products: &[ProductRef]) -> DbResult<()> {
        for p in products {
            sqlx::query(
                r#"
                INSERT INTO products (server_id, name, category_id, price_cents, tax_rate_bps,
                                      is_prepared, track_inventory, unit, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ON CONFLICT (server_id) DO UPDATE SET
                    name = excluded.name, category_id = excluded.category_id,
                    price_cents = excluded.price_cents, tax_rate_bps = excluded.tax_rate_bps,
                    is_prepared = excluded.is_prepared, track_inventory = excluded.track_inventory,
                    unit = excluded.unit, updated_at = excluded.updated_at
                "#,
            )
            .bind(p.server_id)
            .bind(&p.name)
            .bind(p.category_id)
            .bind(p.price_cents)
            .bind(p.tax_rate_bps)
            .bind(p.is_prepared)
            .bind(p.track_inventory)
            .bind(&p.unit)
            .bind(p.updated_at)
            .execute(&self.pool)
            .await?;
        }

        debug!(count = products.len(), "Upserted products");
        Ok(())
    }

    /// Lists the product catalog by name.
    pub async fn list_products(&self) -> DbResult<Vec<ProductRef>> {
        let products = sqlx::query_as::<_, ProductRef>(
            r#"
            SELECT server_id, name, category_id, price_cents, tax_rate_bps,
                   is_prepared, track_inventory, unit, updated_at
            FROM products ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Upserts pulled materials by server id.
    pub async fn upsert_materials(&self, materials: &[MaterialRef]) -> DbResult<()> {
        for m in materials {
            sqlx::query(
                r#"
                INSERT INTO materials (server_id, name, unit, track_inventory, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT (server_id) DO UPDATE SET
                    name = excluded.name, unit = excluded.unit,
                    track_inventory = excluded.track_inventory, updated_at = excluded.updated_at
                "#,
            )
            .bind(m.server_id)
            .bind(&m.name)
            .bind(&m.unit)
            .bind(m.track_inventory)
            .bind(m.updated_at)
            .execute(&self.pool)
            .await?;
        }

        debug!(count = materials.len(), "Upserted materials");
        Ok(())
    }

    /// Lists tracked materials by name.
    pub async fn list_materials(&self) -> DbResult<Vec<MaterialRef>> {
        let materials = sqlx::query_as::<_, MaterialRef>(
            "SELECT server_id, name, unit, track_inventory, updated_at FROM materials ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(materials)
    }

    /// Upserts pulled recipe lines by server id.
    pub async fn upsert_recipes(&self, recipes: &[RecipeLine]) -> DbResult<()> {
        for r in recipes {
            sqlx::query(
                r#"
                INSERT INTO recipes (server_id, product_id, material_id, material_name, unit,
                                     yield_qty, material_qty, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT (server_id) DO UPDATE SET
                    product_id = excluded.product_id, material_id = excluded.material_id,
                    material_name = excluded.material_name, unit = excluded.unit,
                    yield_qty = excluded.yield_qty, material_qty = excluded.material_qty,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(r.server_id)
            .bind(r.product_id)
            .bind(r.material_id)
            .bind(&r.material_name)
            .bind(&r.unit)
            .bind(r.yield_qty)
            .bind(r.material_qty)
            .bind(r.updated_at)
            .execute(&self.pool)
            .await?;
        }

        debug!(count = recipes.len(), "Upserted recipes");
        Ok(())
    }

    /// Gets the recipe lines for one product.
    pub async fn recipes_for_product(&self, product_id: i64) -> DbResult<Vec<RecipeLine>> {
        let recipes = sqlx::query_as::<_, RecipeLine>(
            r#"
            SELECT server_id, product_id, material_id, material_name, unit,
                   yield_qty, material_qty, updated_at
            FROM recipes WHERE product_id = ?1
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(recipes)
    }

    // =========================================================================
    // Document Prefixes / Settings / Generic Documents
    // =========================================================================

    /// Upserts a pulled document prefix.
    pub async fn upsert_doc_prefix(
        &self,
        store_id: i64,
        kind: DocumentKind,
        prefix: &str,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO doc_prefixes (store_id, kind, prefix) VALUES (?1, ?2, ?3)
            ON CONFLICT (store_id, kind) DO UPDATE SET prefix = excluded.prefix
            "#,
        )
        .bind(store_id)
        .bind(kind.as_str())
        .bind(prefix)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Writes a terminal setting.
    pub async fn set_setting(&self, key: &str, value: &str) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value) VALUES (?1, ?2)
            ON CONFLICT (key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Reads a terminal setting.
    pub async fn get_setting(&self, key: &str) -> DbResult<Option<String>> {
        let value = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(value)
    }

    /// Upserts a generic reference document for types without a dedicated
    /// table.
    pub async fn upsert_document(
        &self,
        entity_type: EntityType,
        server_id: i64,
        payload: &str,
        updated_at: DateTime<Utc>,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO reference_documents (entity_type, server_id, payload, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (entity_type, server_id) DO UPDATE SET
                payload = excluded.payload, updated_at = excluded.updated_at
            "#,
        )
        .bind(entity_type.as_str())
        .bind(server_id)
        .bind(payload)
        .bind(updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Lists the stored documents for an entity type.
    pub async fn list_documents(&self, entity_type: EntityType) -> DbResult<Vec<String>> {
        let payloads: Vec<String> = sqlx::query_scalar(
            "SELECT payload FROM reference_documents WHERE entity_type = ?1 ORDER BY server_id",
        )
        .bind(entity_type.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(payloads)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn product(id: i64, name: &str, price: i64) -> ProductRef {
        ProductRef {
            server_id: id,
            name: name.to_string(),
            category_id: None,
            price_cents: price,
            tax_rate_bps: 0,
            is_prepared: false,
            track_inventory: false,
            unit: "unit".to_string(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_product_upsert_idempotent() {
        let db = test_db().await;
        let reference = db.reference();

        let batch = vec![product(1, "Espresso", 300), product(2, "Latte", 450)];
        reference.upsert_products(&batch).await.unwrap();
        reference.upsert_products(&batch).await.unwrap();

        let products = reference.list_products().await.unwrap();
        assert_eq!(products.len(), 2);

        // A changed record replaces the stored one in full
        reference
            .upsert_products(&[product(1, "Double Espresso", 350)])
            .await
            .unwrap();
        let products = reference.list_products().await.unwrap();
        assert_eq!(products.len(), 2);
        assert!(products.iter().any(|p| p.name == "Double Espresso"));
    }

    #[tokio::test]
    async fn test_generic_documents_and_settings() {
        let db = test_db().await;
        let reference = db.reference();

        let now = Utc::now();
        reference
            .upsert_document(EntityType::Categories, 1, r#"{"name":"Drinks"}"#, now)
            .await
            .unwrap();
        reference
            .upsert_document(EntityType::Categories, 1, r#"{"name":"Hot Drinks"}"#, now)
            .await
            .unwrap();

        let docs = reference.list_documents(EntityType::Categories).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert!(docs[0].contains("Hot Drinks"));

        reference.set_setting("store_name", "Vela Cafe").await.unwrap();
        assert_eq!(
            reference.get_setting("store_name").await.unwrap().as_deref(),
            Some("Vela Cafe")
        );
        assert_eq!(reference.get_setting("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_doc_prefix_feeds_number_generation() {
        let db = test_db().await;
        db.reference()
            .upsert_doc_prefix(0, DocumentKind::Shift, "SH")
            .await
            .unwrap();

        assert_eq!(
            db.numbers().prefix_for(DocumentKind::Shift).await.unwrap(),
            "SH"
        );
    }
}
