use async_trait::async_trait;
use platter_core::{CoreError, CoreResult};
use platter_order::models::Order;
use platter_order::repository::OrderRepository;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{query, PgPool, Row};
use uuid::Uuid;

use crate::database::{storage_error, version_from_db, version_to_db};

const INSERT_ORDER_SQL: &str = include_str!("sql/insert_order.sql");
const GET_ORDER_SQL: &str = include_str!("sql/get_order.sql");
const UPDATE_ORDER_SQL: &str = include_str!("sql/update_order.sql");
const ORDER_EXISTS_SQL: &str = include_str!("sql/order_exists.sql");
const LIST_CUSTOMER_ORDERS_SQL: &str = include_str!("sql/list_customer_orders.sql");
const LIST_VENDOR_ORDERS_SQL: &str = include_str!("sql/list_vendor_orders.sql");

/// Orders as one JSONB document each; the `version` column is the concurrency token.
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn decode(row: &PgRow) -> CoreResult<Order> {
    let Json(mut order): Json<Order> = row.try_get("document").map_err(storage_error)?;
    order.version = version_from_db(row.try_get("version").map_err(storage_error)?)?;
    Ok(order)
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn insert_order(&self, order: &Order) -> CoreResult<()> {
        query(INSERT_ORDER_SQL)
            .bind(order.id)
            .bind(order.customer_id)
            .bind(version_to_db(order.version)?)
            .bind(Json(order))
            .bind(order.created_at)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> CoreResult<Option<Order>> {
        let row = query(GET_ORDER_SQL)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;
        row.as_ref().map(decode).transpose()
    }

    async fn update_order(&self, order: &Order) -> CoreResult<Order> {
        let mut next = order.clone();
        next.version += 1;

        let updated = query(UPDATE_ORDER_SQL)
            .bind(order.id)
            .bind(version_to_db(order.version)?)
            .bind(Json(&next))
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        if updated.is_some() {
            return Ok(next);
        }

        let current = query(ORDER_EXISTS_SQL)
            .bind(order.id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;
        match current {
            Some(row) => {
                let stored: i64 = row.try_get("version").map_err(storage_error)?;
                Err(CoreError::ConflictError(format!(
                    "order {} is at version {}, write based on {}",
                    order.id, stored, order.version
                )))
            }
            None => Err(CoreError::StorageError(format!("order {} missing", order.id))),
        }
    }

    async fn list_customer_orders(&self, customer_id: Uuid) -> CoreResult<Vec<Order>> {
        let rows = query(LIST_CUSTOMER_ORDERS_SQL)
            .bind(customer_id)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;
        rows.iter().map(decode).collect()
    }

    async fn list_vendor_orders(&self, vendor_id: Uuid) -> CoreResult<Vec<Order>> {
        let containment = serde_json::json!([{ "vendor_id": vendor_id }]);
        let rows = query(LIST_VENDOR_ORDERS_SQL)
            .bind(Json(containment))
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;
        rows.iter().map(decode).collect()
    }
}
