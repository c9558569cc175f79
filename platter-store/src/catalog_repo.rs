use async_trait::async_trait;
use platter_core::{CoreResult, ProductCatalog, ProductSnapshot};
use platter_shared::Money;
use rust_decimal::Decimal;
use sqlx::{query, PgPool, Row};
use uuid::Uuid;

use crate::database::storage_error;

const GET_PRODUCT_SQL: &str = include_str!("sql/get_product.sql");

/// Read side of the catalog; product CRUD lives in another service.
pub struct PgProductCatalog {
    pool: PgPool,
}

impl PgProductCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProductCatalog for PgProductCatalog {
    async fn get_product(&self, id: Uuid) -> CoreResult<Option<ProductSnapshot>> {
        let row = query(GET_PRODUCT_SQL)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(ProductSnapshot {
            id: row.try_get("id").map_err(storage_error)?,
            name: row.try_get("name").map_err(storage_error)?,
            price: Money::new(row.try_get::<Decimal, _>("price").map_err(storage_error)?),
            vendor_id: row.try_get("vendor_id").map_err(storage_error)?,
            vendor_name: row.try_get("vendor_name").map_err(storage_error)?,
            vendor_delivery_fee: Money::new(
                row.try_get::<Decimal, _>("delivery_fee").map_err(storage_error)?,
            ),
        }))
    }
}
