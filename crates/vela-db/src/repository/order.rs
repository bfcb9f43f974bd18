//! # Order Repository
//!
//! Database operations for orders and their line items.
//!
//! ## Order Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Order Lifecycle                                   │
//! │                                                                         │
//! │  1. CREATE DRAFT                                                        │
//! │     └── create_draft() → Order { status: Draft }                        │
//! │         number generated offline: <prefix><registerCode>-<b36(ts)>      │
//! │                                                                         │
//! │  2. EDIT                                                                │
//! │     └── add_item() → snapshot of product name/price                     │
//! │     └── set_quantity() / remove_item() → totals re-derived              │
//! │                                                                         │
//! │  3. PAY (single transaction)                                            │
//! │     └── mark_paid() → Order { status: Paid, sync_status: Pending }      │
//! │         + shift cash/bank running total                                 │
//! │         + shift ledger usage (recipes for prepared goods)               │
//! │         + exactly one sync_outbox 'create' item                         │
//! │                                                                         │
//! │  4. (DRAFTS ONLY) DELETE                                                │
//! │     └── delete_draft() → local removal, items cascade, no outbox        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Paid orders are terminal: never edited, never deleted locally. The
//! business key (`number`) is immutable; `mark_synced` backfills the server
//! id next to it without ever replacing it.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::numbers::DocNumberRepository;
use crate::repository::outbox::OutboxRepository;
use vela_core::docnum::DocumentKind;
use vela_core::{
    summary, validation, Order, OrderItem, OrderStatus, OutboxAction, OutboxEntityType,
    PaymentMethod, ProductRef, RecipeLine, SyncStatus,
};

const SELECT_ORDER: &str = r#"
    SELECT number, server_id, status, sync_status, register_id, shift_number,
           table_number, subtotal_cents, tax_cents, discount_cents, total_cents,
           payment_method, amount_paid_cents, created_at, updated_at, paid_at
    FROM orders
"#;

const SELECT_ITEMS: &str = r#"
    SELECT id, order_number, product_id, product_name, unit_price_cents,
           quantity, tax_rate_bps, line_total_cents, tax_cents, created_at
    FROM order_items
"#;

/// Repository for order database operations.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    /// Creates a new OrderRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Gets an order by its business key.
    pub async fn get(&self, number: &str) -> DbResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(&format!("{SELECT_ORDER} WHERE number = ?1"))
            .bind(number)
            .fetch_optional(&self.pool)
            .await?;

        Ok(order)
    }

    /// Gets all line items for an order, in insertion order.
    pub async fn get_items(&self, number: &str) -> DbResult<Vec<OrderItem>> {
        let items = sqlx::query_as::<_, OrderItem>(&format!(
            "{SELECT_ITEMS} WHERE order_number = ?1 ORDER BY created_at"
        ))
        .bind(number)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// Lists draft orders, newest first.
    pub async fn list_drafts(&self) -> DbResult<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(&format!(
            "{SELECT_ORDER} WHERE status = 'draft' ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }

    /// Creates a new draft order with an offline-generated number.
    pub async fn create_draft(
        &self,
        register_id: &str,
        register_code: &str,
        table_number: Option<&str>,
    ) -> DbResult<Order> {
        let now = Utc::now();
        let number = DocNumberRepository::new(self.pool.clone())
            .order_number(register_code, DocumentKind::Invoice, now)
            .await?;

        debug!(number = %number, "Creating draft order");

        let order = Order {
            number: number.clone(),
            server_id: None,
            status: OrderStatus::Draft,
            sync_status: SyncStatus::Pending,
            register_id: register_id.to_string(),
            shift_number: None,
            table_number: table_number.map(str::to_string),
            subtotal_cents: 0,
            tax_cents: 0,
            discount_cents: 0,
            total_cents: 0,
            payment_method: None,
            amount_paid_cents: None,
            created_at: now,
            updated_at: now,
            paid_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO orders (
                number, server_id, status, sync_status, register_id,
                shift_number, table_number,
                subtotal_cents, tax_cents, discount_cents, total_cents,
                payment_method, amount_paid_cents,
                created_at, updated_at, paid_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            "#,
        )
        .bind(&order.number)
        .bind(order.server_id)
        .bind(order.status)
        .bind(order.sync_status)
        .bind(&order.register_id)
        .bind(&order.shift_number)
        .bind(&order.table_number)
        .bind(order.subtotal_cents)
        .bind(order.tax_cents)
        .bind(order.discount_cents)
        .bind(order.total_cents)
        .bind(order.payment_method)
        .bind(order.amount_paid_cents)
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(order.paid_at)
        .execute(&self.pool)
        .await?;

        Ok(order)
    }

    /// Adds a product to a draft order.
    ///
    /// ## Snapshot Pattern
    /// Product name, price and tax rate are copied onto the line, so later
    /// catalog pulls never rewrite sale history.
    ///
    /// Adding the same product again increments the existing line's quantity
    /// instead of creating a duplicate row.
    pub async fn add_item(&self, order_number: &str, product_id: i64) -> DbResult<OrderItem> {
        let order = self.require(order_number).await?;
        validation::validate_order_editable(&order)?;

        let product = sqlx::query_as::<_, ProductRef>(
            r#"
            SELECT server_id, name, category_id, price_cents, tax_rate_bps,
                   is_prepared, track_inventory, unit, updated_at
            FROM products WHERE server_id = ?1
            "#,
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("Product", product_id.to_string()))?;

        let existing = sqlx::query_as::<_, OrderItem>(&format!(
            "{SELECT_ITEMS} WHERE order_number = ?1 AND product_id = ?2"
        ))
        .bind(order_number)
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        let item = match existing {
            Some(mut item) => {
                item.quantity += 1;
                item.rederive();
                sqlx::query(
                    "UPDATE order_items SET quantity = ?2, line_total_cents = ?3, tax_cents = ?4 WHERE id = ?1",
                )
                .bind(&item.id)
                .bind(item.quantity)
                .bind(item.line_total_cents)
                .bind(item.tax_cents)
                .execute(&self.pool)
                .await?;
                item
            }
            None => {
                let mut item = OrderItem {
                    id: Uuid::new_v4().to_string(),
                    order_number: order_number.to_string(),
                    product_id,
                    product_name: product.name,
                    unit_price_cents: product.price_cents,
                    quantity: 1,
                    tax_rate_bps: product.tax_rate_bps,
                    line_total_cents: 0,
                    tax_cents: 0,
                    created_at: Utc::now(),
                };
                item.rederive();
                sqlx::query(
                    r#"
                    INSERT INTO order_items (
                        id, order_number, product_id, product_name, unit_price_cents,
                        quantity, tax_rate_bps, line_total_cents, tax_cents, created_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                    "#,
                )
                .bind(&item.id)
                .bind(&item.order_number)
                .bind(item.product_id)
                .bind(&item.product_name)
                .bind(item.unit_price_cents)
                .bind(item.quantity)
                .bind(item.tax_rate_bps)
                .bind(item.line_total_cents)
                .bind(item.tax_cents)
                .bind(item.created_at)
                .execute(&self.pool)
                .await?;
                item
            }
        };

        self.recompute_totals(order_number).await?;
        Ok(item)
    }

    /// Sets the quantity of a line item and re-derives its totals.
    pub async fn set_quantity(&self, item_id: &str, quantity: i64) -> DbResult<()> {
        validation::validate_quantity(quantity)?;

        let mut item = sqlx::query_as::<_, OrderItem>(&format!("{SELECT_ITEMS} WHERE id = ?1"))
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("OrderItem", item_id))?;

        let order = self.require(&item.order_number).await?;
        validation::validate_order_editable(&order)?;

        item.quantity = quantity;
        item.rederive();

        sqlx::query(
            "UPDATE order_items SET quantity = ?2, line_total_cents = ?3, tax_cents = ?4 WHERE id = ?1",
        )
        .bind(item_id)
        .bind(item.quantity)
        .bind(item.line_total_cents)
        .bind(item.tax_cents)
        .execute(&self.pool)
        .await?;

        self.recompute_totals(&item.order_number).await
    }

    /// Removes a line item from a draft.
    pub async fn remove_item(&self, item_id: &str) -> DbResult<()> {
        let item = sqlx::query_as::<_, OrderItem>(&format!("{SELECT_ITEMS} WHERE id = ?1"))
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("OrderItem", item_id))?;

        let order = self.require(&item.order_number).await?;
        validation::validate_order_editable(&order)?;

        sqlx::query("DELETE FROM order_items WHERE id = ?1")
            .bind(item_id)
            .execute(&self.pool)
            .await?;

        self.recompute_totals(&item.order_number).await
    }

    /// Sets a whole-order discount on a draft.
    pub async fn set_discount(&self, number: &str, discount_cents: i64) -> DbResult<()> {
        let order = self.require(number).await?;
        validation::validate_order_editable(&order)?;

        sqlx::query("UPDATE orders SET discount_cents = ?2 WHERE number = ?1")
            .bind(number)
            .bind(discount_cents)
            .execute(&self.pool)
            .await?;

        self.recompute_totals(number).await
    }

    /// Recomputes the order's totals from its line items.
    pub async fn recompute_totals(&self, number: &str) -> DbResult<()> {
        let mut order = self.require(number).await?;
        let items = self.get_items(number).await?;
        order.apply_totals(&items);

        sqlx::query(
            r#"
            UPDATE orders SET
                subtotal_cents = ?2, tax_cents = ?3, total_cents = ?4, updated_at = ?5
            WHERE number = ?1
            "#,
        )
        .bind(number)
        .bind(order.subtotal_cents)
        .bind(order.tax_cents)
        .bind(order.total_cents)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Pays an order.
    ///
    /// ## Single Transaction
    /// 1. Fix the totals and mark the order `paid` + `pending`
    /// 2. Attach the shift and bump its cash/bank running total
    /// 3. Apply ledger usage to the shift summary (direct for tracked
    ///    products, through recipes for prepared goods)
    /// 4. Append exactly one outbox `create` item with the full snapshot
    ///
    /// All four land together or not at all; an offline terminal commits
    /// exactly the same transaction.
    pub async fn mark_paid(
        &self,
        number: &str,
        shift_number: &str,
        method: PaymentMethod,
        amount_paid_cents: i64,
    ) -> DbResult<Order> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let mut order =
            sqlx::query_as::<_, Order>(&format!("{SELECT_ORDER} WHERE number = ?1"))
                .bind(number)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| DbError::not_found("Order", number))?;

        let items = sqlx::query_as::<_, OrderItem>(&format!(
            "{SELECT_ITEMS} WHERE order_number = ?1 ORDER BY created_at"
        ))
        .bind(number)
        .fetch_all(&mut *tx)
        .await?;

        order.apply_totals(&items);
        validation::validate_payment(&order, items.len(), amount_paid_cents)?;

        order.status = OrderStatus::Paid;
        order.sync_status = SyncStatus::Pending;
        order.shift_number = Some(shift_number.to_string());
        order.payment_method = Some(method);
        order.amount_paid_cents = Some(amount_paid_cents);
        order.paid_at = Some(now);
        order.updated_at = now;

        debug!(number = %number, total_cents = order.total_cents, "Paying order");

        let result = sqlx::query(
            r#"
            UPDATE orders SET
                status = 'paid', sync_status = 'pending',
                shift_number = ?2, payment_method = ?3, amount_paid_cents = ?4,
                subtotal_cents = ?5, tax_cents = ?6, total_cents = ?7,
                paid_at = ?8, updated_at = ?8
            WHERE number = ?1 AND status = 'draft'
            "#,
        )
        .bind(number)
        .bind(shift_number)
        .bind(method)
        .bind(amount_paid_cents)
        .bind(order.subtotal_cents)
        .bind(order.tax_cents)
        .bind(order.total_cents)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Order (draft)", number));
        }

        // Shift running total, by payment method
        let total_column = match method {
            PaymentMethod::Cash => "cash_total_cents",
            PaymentMethod::Bank => "bank_total_cents",
        };
        sqlx::query(&format!(
            "UPDATE shifts SET {total_column} = {total_column} + ?2 WHERE number = ?1 AND status = 'open'"
        ))
        .bind(shift_number)
        .bind(order.total_cents)
        .execute(&mut *tx)
        .await?;

        // Ledger usage on the shift summary
        for item in &items {
            let product = sqlx::query_as::<_, ProductRef>(
                r#"
                SELECT server_id, name, category_id, price_cents, tax_rate_bps,
                       is_prepared, track_inventory, unit, updated_at
                FROM products WHERE server_id = ?1
                "#,
            )
            .bind(item.product_id)
            .fetch_optional(&mut *tx)
            .await?;

            let Some(product) = product else {
                // Snapshot line for a product removed from the catalog;
                // the sale still completes, just without ledger usage.
                continue;
            };

            if product.track_inventory && !product.is_prepared {
                sqlx::query(
                    r#"
                    UPDATE shift_summary SET material_usage = material_usage + ?4
                    WHERE shift_number = ?1 AND item_id = ?2 AND unit = ?3 AND is_material = 0
                    "#,
                )
                .bind(shift_number)
                .bind(item.product_id)
                .bind(&product.unit)
                .bind(item.quantity as f64)
                .execute(&mut *tx)
                .await?;
            }

            if product.is_prepared {
                let recipe = sqlx::query_as::<_, RecipeLine>(
                    r#"
                    SELECT server_id, product_id, material_id, material_name, unit,
                           yield_qty, material_qty, updated_at
                    FROM recipes WHERE product_id = ?1
                    "#,
                )
                .bind(item.product_id)
                .fetch_all(&mut *tx)
                .await?;

                for line in &recipe {
                    let usage = summary::recipe_usage(line, item.quantity as f64);
                    sqlx::query(
                        r#"
                        UPDATE shift_summary SET material_usage = material_usage + ?4
                        WHERE shift_number = ?1 AND item_id = ?2 AND unit = ?3 AND is_material = 1
                        "#,
                    )
                    .bind(shift_number)
                    .bind(line.material_id)
                    .bind(&line.unit)
                    .bind(usage)
                    .execute(&mut *tx)
                    .await?;
                }
            }
        }

        let payload = serde_json::to_string(&serde_json::json!({
            "order": order,
            "items": items,
        }))?;
        OutboxRepository::enqueue(
            &mut tx,
            OutboxEntityType::Order,
            OutboxAction::Create,
            number,
            &payload,
        )
        .await?;

        tx.commit().await?;
        Ok(order)
    }

    /// Deletes a draft order. Items cascade; no outbox item is written
    /// because drafts never left the terminal.
    pub async fn delete_draft(&self, number: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM orders WHERE number = ?1 AND status = 'draft'")
            .bind(number)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Order (draft)", number));
        }

        Ok(())
    }

    /// Backfills the server id after confirmed delivery and flips the row to
    /// `synced`. The business key is never touched.
    pub async fn mark_synced(&self, number: &str, server_id: i64) -> DbResult<()> {
        sqlx::query(
            "UPDATE orders SET server_id = ?2, sync_status = 'synced' WHERE number = ?1",
        )
        .bind(number)
        .bind(server_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Marks delivery as failed after the retry policy gives up.
    pub async fn mark_sync_error(&self, number: &str) -> DbResult<()> {
        sqlx::query("UPDATE orders SET sync_status = 'error' WHERE number = ?1")
            .bind(number)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn require(&self, number: &str) -> DbResult<Order> {
        self.get(number)
            .await?
            .ok_or_else(|| DbError::not_found("Order", number))
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
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        seed_catalog(&db).await;
        db
    }

    async fn seed_catalog(db: &Database) {
        let now = Utc::now();
        for (id, name, price, prepared, tracked) in [
            (1i64, "Espresso", 300i64, true, false),
            (2, "Bottled Water", 150, false, true),
        ] {
            sqlx::query(
                r#"
                INSERT INTO products (server_id, name, category_id, price_cents, tax_rate_bps,
                                      is_prepared, track_inventory, unit, updated_at)
                VALUES (?1, ?2, NULL, ?3, 0, ?4, ?5, 'unit', ?6)
                "#,
            )
            .bind(id)
            .bind(name)
            .bind(price)
            .bind(prepared)
            .bind(tracked)
            .bind(now)
            .execute(db.pool())
            .await
            .unwrap();
        }
        // Espresso consumes 8g of coffee beans per unit
        sqlx::query(
            r#"
            INSERT INTO recipes (server_id, product_id, material_id, material_name, unit,
                                 yield_qty, material_qty, updated_at)
            VALUES (10, 1, 100, 'Coffee Beans', 'g', 1.0, 8.0, ?1)
            "#,
        )
        .bind(now)
        .execute(db.pool())
        .await
        .unwrap();
    }

    async fn open_shift_row(db: &Database, number: &str) {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO shifts (number, status, sync_status, register_id,
                                initial_cash_cents, opened_at)
            VALUES (?1, 'open', 'pending', 'reg-1', 10000, ?2)
            "#,
        )
        .bind(number)
        .bind(now)
        .execute(db.pool())
        .await
        .unwrap();
        // Tracked ledger rows: the material behind espresso and the bottled water
        for (item_id, name, unit, is_material) in
            [(100i64, "Coffee Beans", "g", true), (2, "Bottled Water", "unit", false)]
        {
            sqlx::query(
                r#"
                INSERT INTO shift_summary (id, shift_number, item_id, item_name, unit,
                                           is_material, beg_balance, refills_json, material_usage)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, 100.0, '[]', 0)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(number)
            .bind(item_id)
            .bind(name)
            .bind(unit)
            .bind(is_material)
            .execute(db.pool())
            .await
            .unwrap();
        }
    }

    #[tokio::test]
    async fn test_draft_lifecycle_totals() {
        let db = test_db().await;
        let orders = db.orders();

        let draft = orders.create_draft("reg-1", "SAA-AAA", None).await.unwrap();
        assert_eq!(draft.status, OrderStatus::Draft);
        assert!(draft.number.starts_with("FSAA-AAA-"));

        let item = orders.add_item(&draft.number, 1).await.unwrap();
        assert_eq!(item.quantity, 1);

        // Same product again: existing line grows instead of a new one
        let item = orders.add_item(&draft.number, 1).await.unwrap();
        assert_eq!(item.quantity, 2);
        assert_eq!(orders.get_items(&draft.number).await.unwrap().len(), 1);

        let order = orders.get(&draft.number).await.unwrap().unwrap();
        assert_eq!(order.subtotal_cents, 600);
        assert_eq!(order.total_cents, 600);

        orders.set_quantity(&item.id, 3).await.unwrap();
        let order = orders.get(&draft.number).await.unwrap().unwrap();
        assert_eq!(order.total_cents, 900);

        orders.remove_item(&item.id).await.unwrap();
        let order = orders.get(&draft.number).await.unwrap().unwrap();
        assert_eq!(order.total_cents, 0);
    }

    #[tokio::test]
    async fn test_mark_paid_single_transaction() {
        let db = test_db().await;
        let orders = db.orders();
        open_shift_row(&db, "SSAA-AAA-X").await;

        let draft = orders.create_draft("reg-1", "SAA-AAA", None).await.unwrap();
        orders.add_item(&draft.number, 1).await.unwrap();
        orders.add_item(&draft.number, 2).await.unwrap();

        let paid = orders
            .mark_paid(&draft.number, "SSAA-AAA-X", PaymentMethod::Cash, 500)
            .await
            .unwrap();
        assert_eq!(paid.status, OrderStatus::Paid);
        assert_eq!(paid.total_cents, 450);
        assert_eq!(paid.sync_status, SyncStatus::Pending);

        // Exactly one outbox item
        let pending = db.outbox().list_pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].entity_type, OutboxEntityType::Order);
        assert_eq!(pending[0].data_id, draft.number);

        // Cash running total bumped by the order total
        let cash: i64 =
            sqlx::query_scalar("SELECT cash_total_cents FROM shifts WHERE number = 'SSAA-AAA-X'")
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert_eq!(cash, 450);

        // Recipe usage: one espresso = 8g of beans; tracked water = 1 unit
        let beans: f64 = sqlx::query_scalar(
            "SELECT material_usage FROM shift_summary WHERE item_id = 100 AND shift_number = 'SSAA-AAA-X'",
        )
        .fetch_one(db.pool())
        .await
        .unwrap();
        assert_eq!(beans, 8.0);

        let water: f64 = sqlx::query_scalar(
            "SELECT material_usage FROM shift_summary WHERE item_id = 2 AND shift_number = 'SSAA-AAA-X'",
        )
        .fetch_one(db.pool())
        .await
        .unwrap();
        assert_eq!(water, 1.0);
    }

    #[tokio::test]
    async fn test_paid_orders_are_terminal() {
        let db = test_db().await;
        let orders = db.orders();
        open_shift_row(&db, "SSAA-AAA-X").await;

        let draft = orders.create_draft("reg-1", "SAA-AAA", None).await.unwrap();
        let item = orders.add_item(&draft.number, 1).await.unwrap();
        orders
            .mark_paid(&draft.number, "SSAA-AAA-X", PaymentMethod::Bank, 300)
            .await
            .unwrap();

        assert!(orders.set_quantity(&item.id, 5).await.is_err());
        assert!(orders.add_item(&draft.number, 2).await.is_err());
        assert!(orders.delete_draft(&draft.number).await.is_err());
    }

    #[tokio::test]
    async fn test_underpayment_rejected_and_nothing_written() {
        let db = test_db().await;
        let orders = db.orders();
        open_shift_row(&db, "SSAA-AAA-X").await;

        let draft = orders.create_draft("reg-1", "SAA-AAA", None).await.unwrap();
        orders.add_item(&draft.number, 1).await.unwrap();

        let err = orders
            .mark_paid(&draft.number, "SSAA-AAA-X", PaymentMethod::Cash, 100)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Domain(_)));

        // Rolled back: still a draft and the outbox is untouched
        let order = orders.get(&draft.number).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Draft);
        assert_eq!(db.outbox().count_pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_business_key_survives_server_id_backfill() {
        let db = test_db().await;
        let orders = db.orders();
        open_shift_row(&db, "SSAA-AAA-X").await;

        let draft = orders.create_draft("reg-1", "SAA-AAA", None).await.unwrap();
        orders.add_item(&draft.number, 1).await.unwrap();
        orders
            .mark_paid(&draft.number, "SSAA-AAA-X", PaymentMethod::Cash, 300)
            .await
            .unwrap();

        orders.mark_synced(&draft.number, 4242).await.unwrap();

        let order = orders.get(&draft.number).await.unwrap().unwrap();
        assert_eq!(order.number, draft.number);
        assert_eq!(order.server_id, Some(4242));
        assert_eq!(order.sync_status, SyncStatus::Synced);
        // Items still join on the business key
        assert_eq!(orders.get_items(&draft.number).await.unwrap().len(), 1);
    }
}
