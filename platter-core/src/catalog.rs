use async_trait::async_trait;
use platter_shared::Money;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::CoreResult;

/// What checkout needs to know about a product at the moment it is read
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductSnapshot {
    pub id: Uuid,
    pub name: String,
    pub price: Money,
    pub vendor_id: Uuid,
    pub vendor_name: String,
    pub vendor_delivery_fee: Money,
}

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// `None` when the product no longer exists or its vendor is gone
    async fn get_product(&self, id: Uuid) -> CoreResult<Option<ProductSnapshot>>;
}
