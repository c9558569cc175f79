use async_trait::async_trait;
use platter_core::{CoreError, CoreResult};
use platter_order::models::{VendorProfile, WithdrawalRequest};
use platter_order::repository::VendorRepository;
use platter_shared::Money;
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{query, PgPool, Row};
use uuid::Uuid;

use crate::database::{status_label, storage_error};

const GET_VENDOR_SQL: &str = include_str!("sql/get_vendor.sql");
const LIST_WITHDRAWALS_SQL: &str = include_str!("sql/list_withdrawals.sql");
const INSERT_WITHDRAWAL_SQL: &str = include_str!("sql/insert_withdrawal.sql");
const GET_WITHDRAWAL_SQL: &str = include_str!("sql/get_withdrawal.sql");
const UPDATE_WITHDRAWAL_SQL: &str = include_str!("sql/update_withdrawal.sql");

/// Vendor profiles and their withdrawal history
pub struct PgVendorRepository {
    pool: PgPool,
}

impl PgVendorRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VendorRepository for PgVendorRepository {
    async fn get_vendor(&self, id: Uuid) -> CoreResult<Option<VendorProfile>> {
        let row = query(GET_VENDOR_SQL)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(VendorProfile {
            id: row.try_get("id").map_err(storage_error)?,
            name: row.try_get("name").map_err(storage_error)?,
            commission_rate: row.try_get::<Decimal, _>("commission_rate").map_err(storage_error)?,
            delivery_fee: Money::new(row.try_get::<Decimal, _>("delivery_fee").map_err(storage_error)?),
        }))
    }

    async fn list_withdrawals(&self, vendor_id: Uuid) -> CoreResult<Vec<WithdrawalRequest>> {
        let rows = query(LIST_WITHDRAWALS_SQL)
            .bind(vendor_id)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;

        rows.iter()
            .map(|row| {
                row.try_get::<Json<WithdrawalRequest>, _>("document")
                    .map(|Json(w)| w)
                    .map_err(storage_error)
            })
            .collect()
    }

    async fn insert_withdrawal(&self, request: &WithdrawalRequest) -> CoreResult<()> {
        query(INSERT_WITHDRAWAL_SQL)
            .bind(request.id)
            .bind(request.vendor_id)
            .bind(request.amount.amount())
            .bind(status_label(&request.status))
            .bind(request.requested_at)
            .bind(Json(request))
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }

    async fn get_withdrawal(&self, id: Uuid) -> CoreResult<Option<WithdrawalRequest>> {
        let row = query(GET_WITHDRAWAL_SQL)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        row.map(|row| {
            row.try_get::<Json<WithdrawalRequest>, _>("document")
                .map(|Json(w)| w)
                .map_err(storage_error)
        })
        .transpose()
    }

    async fn update_withdrawal(&self, request: &WithdrawalRequest) -> CoreResult<()> {
        let result = query(UPDATE_WITHDRAWAL_SQL)
            .bind(request.id)
            .bind(status_label(&request.status))
            .bind(Json(request))
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::StorageError(format!("withdrawal {} missing", request.id)));
        }
        Ok(())
    }
}
