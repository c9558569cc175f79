use async_trait::async_trait;
use platter_core::CoreResult;
use platter_order::models::Cart;
use platter_order::repository::CartRepository;
use sqlx::types::Json;
use sqlx::{query, PgPool, Row};
use uuid::Uuid;

use crate::database::storage_error;

const GET_CART_SQL: &str = include_str!("sql/get_cart.sql");
const SAVE_CART_SQL: &str = include_str!("sql/save_cart.sql");
const CLEAR_CART_SQL: &str = include_str!("sql/clear_cart.sql");

pub struct PgCartRepository {
    pool: PgPool,
}

impl PgCartRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CartRepository for PgCartRepository {
    async fn get_cart(&self, customer_id: Uuid) -> CoreResult<Option<Cart>> {
        let row = query(GET_CART_SQL)
            .bind(customer_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        match row {
            Some(row) => {
                let Json(cart): Json<Cart> = row.try_get("document").map_err(storage_error)?;
                Ok(Some(cart))
            }
            None => Ok(None),
        }
    }

    async fn save_cart(&self, cart: &Cart) -> CoreResult<()> {
        query(SAVE_CART_SQL)
            .bind(cart.customer_id)
            .bind(Json(cart))
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }

    async fn clear_cart(&self, customer_id: Uuid) -> CoreResult<()> {
        query(CLEAR_CART_SQL)
            .bind(customer_id)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }
}
