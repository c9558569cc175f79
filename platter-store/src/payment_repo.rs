use async_trait::async_trait;
use platter_core::{CoreError, CoreResult};
use platter_order::models::Payment;
use platter_order::repository::PaymentRepository;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{query, PgPool, Row};
use uuid::Uuid;

use crate::database::{status_label, storage_error, version_from_db, version_to_db};

const INSERT_PAYMENT_SQL: &str = include_str!("sql/insert_payment.sql");
const GET_PAYMENT_FOR_ORDER_SQL: &str = include_str!("sql/get_payment_for_order.sql");
const FIND_PAYMENT_BY_REFERENCE_SQL: &str = include_str!("sql/find_payment_by_reference.sql");
const UPDATE_PAYMENT_SQL: &str = include_str!("sql/update_payment.sql");

pub struct PgPaymentRepository {
    pool: PgPool,
}

impl PgPaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn decode(row: &PgRow) -> CoreResult<Payment> {
    let Json(mut payment): Json<Payment> = row.try_get("document").map_err(storage_error)?;
    payment.version = version_from_db(row.try_get("version").map_err(storage_error)?)?;
    Ok(payment)
}

#[async_trait]
impl PaymentRepository for PgPaymentRepository {
    async fn insert_payment(&self, payment: &Payment) -> CoreResult<()> {
        let result = query(INSERT_PAYMENT_SQL)
            .bind(payment.id)
            .bind(payment.order_id)
            .bind(&payment.transaction_id)
            .bind(status_label(&payment.status))
            .bind(version_to_db(payment.version)?)
            .bind(Json(payment))
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::ConflictError(format!(
                "order {} already has a payment",
                payment.order_id
            )));
        }
        Ok(())
    }

    async fn get_payment_for_order(&self, order_id: Uuid) -> CoreResult<Option<Payment>> {
        let row = query(GET_PAYMENT_FOR_ORDER_SQL)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;
        row.as_ref().map(decode).transpose()
    }

    async fn find_payment_by_reference(&self, reference: &str) -> CoreResult<Option<Payment>> {
        let row = query(FIND_PAYMENT_BY_REFERENCE_SQL)
            .bind(reference)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;
        row.as_ref().map(decode).transpose()
    }

    async fn update_payment(&self, payment: &Payment) -> CoreResult<bool> {
        let mut next = payment.clone();
        next.version += 1;

        let result = query(UPDATE_PAYMENT_SQL)
            .bind(payment.id)
            .bind(version_to_db(payment.version)?)
            .bind(&payment.transaction_id)
            .bind(status_label(&payment.status))
            .bind(Json(&next))
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(result.rows_affected() == 1)
    }
}
