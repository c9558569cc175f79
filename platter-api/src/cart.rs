use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    routing::{get, patch, post},
    Extension, Json, Router,
};
use platter_core::Identity;
use platter_order::{Cart, SelectedOption};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::customer_auth_middleware;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub product_id: Uuid,
    pub quantity: u32,
    #[serde(default)]
    pub selected_options: Vec<SelectedOption>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: u32,
}

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/v1/cart", get(get_cart).delete(clear_cart))
        .route("/v1/cart/items", post(add_item))
        .route("/v1/cart/items/{index}", patch(update_item).delete(remove_item))
        .route_layer(middleware::from_fn_with_state(state, customer_auth_middleware))
}

async fn get_cart(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Cart>, AppError> {
    Ok(Json(state.cart.get_cart(identity.id).await?))
}

async fn add_item(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<AddItemRequest>,
) -> Result<(StatusCode, Json<Cart>), AppError> {
    let cart = state
        .cart
        .add_item(identity.id, req.product_id, req.quantity, req.selected_options)
        .await?;
    Ok((StatusCode::CREATED, Json(cart)))
}

async fn update_item(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(index): Path<usize>,
    Json(req): Json<UpdateQuantityRequest>,
) -> Result<Json<Cart>, AppError> {
    Ok(Json(
        state.cart.update_quantity(identity.id, index, req.quantity).await?,
    ))
}

async fn remove_item(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(index): Path<usize>,
) -> Result<Json<Cart>, AppError> {
    Ok(Json(state.cart.remove_item(identity.id, index).await?))
}

async fn clear_cart(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<StatusCode, AppError> {
    state.cart.clear(identity.id).await?;
    Ok(StatusCode::NO_CONTENT)
}
