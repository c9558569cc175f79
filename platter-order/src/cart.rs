use chrono::Utc;
use platter_core::ProductCatalog;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::error::{OrderError, OrderResult};
use crate::models::{check_quantity, Cart, CartLine, SelectedOption};
use crate::repository::CartRepository;

/// Holds each shopper's pending lines until checkout
pub struct CartService {
    carts: Arc<dyn CartRepository>,
    catalog: Arc<dyn ProductCatalog>,
}

impl CartService {
    pub fn new(carts: Arc<dyn CartRepository>, catalog: Arc<dyn ProductCatalog>) -> Self {
        Self { carts, catalog }
    }

    pub async fn get_cart(&self, customer_id: Uuid) -> OrderResult<Cart> {
        Ok(self
            .carts
            .get_cart(customer_id)
            .await?
            .unwrap_or_else(|| Cart::new(customer_id)))
    }

    /// Snapshots the product's current price into the line
    #[instrument(skip(self, selected_options))]
    pub async fn add_item(
        &self,
        customer_id: Uuid,
        product_id: Uuid,
        quantity: u32,
        selected_options: Vec<SelectedOption>,
    ) -> OrderResult<Cart> {
        check_quantity(quantity)?;

        let product = self
            .catalog
            .get_product(product_id)
            .await?
            .ok_or(OrderError::ProductNotFound(product_id))?;

        let mut cart = self.get_cart(customer_id).await?;
        cart.add_line(CartLine {
            product_id,
            product_name: product.name,
            quantity,
            selected_options,
            unit_price: product.price,
            added_at: Utc::now(),
        })?;

        self.carts.save_cart(&cart).await?;
        tracing::debug!("Cart for {} now has {} lines", customer_id, cart.lines.len());
        Ok(cart)
    }

    pub async fn update_quantity(
        &self,
        customer_id: Uuid,
        line_index: usize,
        quantity: u32,
    ) -> OrderResult<Cart> {
        let mut cart = self.get_cart(customer_id).await?;
        cart.set_quantity(line_index, quantity)?;
        self.carts.save_cart(&cart).await?;
        Ok(cart)
    }

    pub async fn remove_item(&self, customer_id: Uuid, line_index: usize) -> OrderResult<Cart> {
        let mut cart = self.get_cart(customer_id).await?;
        cart.remove_line(line_index)?;
        self.carts.save_cart(&cart).await?;
        Ok(cart)
    }

    pub async fn clear(&self, customer_id: Uuid) -> OrderResult<()> {
        self.carts.clear_cart(customer_id).await?;
        Ok(())
    }
}
