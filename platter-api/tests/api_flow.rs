use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use platter_api::middleware::auth::{Claims, JwtAuthenticator};
use platter_api::{app, AppState, Backends};
use platter_core::{InMemoryKeyedLock, RecordingNotifier};
use platter_order::{InMemoryStore, MockGateway, PaymentSettings, WalletSettings};
use platter_shared::models::NotificationKind;
use platter_shared::Money;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

const SECRET: &str = "test-secret";

struct Harness {
    app: Router,
    notifier: Arc<RecordingNotifier>,
    customer: Uuid,
    vendor_a: Uuid,
    vendor_b: Uuid,
    jollof: Uuid,
    suya: Uuid,
}

fn token(id: Uuid, role: &str) -> String {
    let claims = Claims {
        sub: id.to_string(),
        role: role.to_string(),
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

/// Two vendors: A sells jollof at 10.00 (fee 2.00, 10% commission), B sells suya at 5.00 (fee 1.50)
fn harness() -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let vendor_a = store
        .add_vendor("Mama Put", Decimal::new(10, 0), Money::from_major(2))
        .unwrap();
    let vendor_b = store
        .add_vendor("Suya Spot", Decimal::new(10, 0), "1.50".parse().unwrap())
        .unwrap();
    let jollof = store
        .add_product(vendor_a, "Jollof Rice", Money::from_major(10))
        .unwrap();
    let suya = store.add_product(vendor_b, "Beef Suya", Money::from_major(5)).unwrap();

    let notifier = Arc::new(RecordingNotifier::new());
    let backends = Backends {
        carts: store.clone(),
        orders: store.clone(),
        payments: store.clone(),
        vendors: store.clone(),
        catalog: store,
        gateway: Arc::new(MockGateway::new()),
        notifier: notifier.clone(),
        lock: Arc::new(InMemoryKeyedLock::new()),
    };
    let state = AppState::new(
        backends,
        Arc::new(JwtAuthenticator::new(SECRET)),
        PaymentSettings::default(),
        WalletSettings {
            minimum_withdrawal: Money::from_major(5),
            lock_ttl: Duration::from_secs(30),
        },
    )
    .unwrap();

    Harness {
        app: app(state),
        notifier,
        customer: Uuid::new_v4(),
        vendor_a,
        vendor_b,
        jollof,
        suya,
    }
}

async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    bearer: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}

fn money(value: &Value) -> Money {
    match value {
        Value::String(s) => s.parse().unwrap(),
        other => other.to_string().parse().unwrap(),
    }
}

fn checkout_body(method: &str, items: &str, shipping: &str, total: &str) -> Value {
    json!({
        "shipping_address": {
            "street": "12 Admiralty Way",
            "city": "Lagos",
            "state": "Lagos",
            "postal_code": null,
            "phone": "+2348000000000"
        },
        "payment_method": method,
        "price": {
            "items_price": items,
            "tax_price": "0",
            "shipping_price": shipping,
            "total_price": total
        },
        "special_instructions": "Extra pepper"
    })
}

/// Fills the customer's cart with 2 jollof and 1 suya and checks out
async fn place_order(h: &Harness, method: &str) -> Value {
    let customer = token(h.customer, "CUSTOMER");
    for (product, quantity) in [(h.jollof, 2), (h.suya, 1)] {
        let (status, _) = call(
            &h.app,
            Method::POST,
            "/v1/cart/items",
            Some(&customer),
            Some(json!({ "product_id": product, "quantity": quantity })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, order) = call(
        &h.app,
        Method::POST,
        "/v1/orders",
        Some(&customer),
        Some(checkout_body(method, "25.00", "3.50", "28.50")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", order);
    order
}

#[tokio::test]
async fn test_health_is_public() {
    let h = harness();
    let (status, body) = call(&h.app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_authentication_and_roles() {
    let h = harness();

    let (status, body) = call(&h.app, Method::GET, "/v1/cart", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let (status, _) = call(&h.app, Method::GET, "/v1/cart", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let vendor = token(h.vendor_a, "VENDOR");
    let (status, _) = call(&h.app, Method::GET, "/v1/cart", Some(&vendor), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let customer = token(h.customer, "CUSTOMER");
    let (status, _) = call(&h.app, Method::GET, "/v1/vendor/wallet", Some(&customer), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(
        &h.app,
        Method::PUT,
        &format!("/v1/admin/withdrawals/{}/status", Uuid::new_v4()),
        Some(&vendor),
        Some(json!({ "status": "COMPLETED" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_empty_cart_checkout_is_rejected() {
    let h = harness();
    let customer = token(h.customer, "CUSTOMER");

    let (status, body) = call(
        &h.app,
        Method::POST,
        "/v1/orders",
        Some(&customer),
        Some(checkout_body("GATEWAY", "0", "0", "0")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Cart is empty");
}

#[tokio::test]
async fn test_cart_line_editing() {
    let h = harness();
    let customer = token(h.customer, "CUSTOMER");

    call(
        &h.app,
        Method::POST,
        "/v1/cart/items",
        Some(&customer),
        Some(json!({ "product_id": h.jollof, "quantity": 1 })),
    )
    .await;

    let (status, cart) = call(
        &h.app,
        Method::PATCH,
        "/v1/cart/items/0",
        Some(&customer),
        Some(json!({ "quantity": 4 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["lines"][0]["quantity"], 4);

    let (status, _) = call(&h.app, Method::DELETE, "/v1/cart/items/3", Some(&customer), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, cart) = call(&h.app, Method::DELETE, "/v1/cart/items/0", Some(&customer), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["lines"].as_array().unwrap().len(), 0);

    let (status, _) = call(
        &h.app,
        Method::POST,
        "/v1/cart/items",
        Some(&customer),
        Some(json!({ "product_id": Uuid::new_v4(), "quantity": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_gateway_order_lifecycle() {
    let h = harness();
    let customer = token(h.customer, "CUSTOMER");
    let vendor_a = token(h.vendor_a, "VENDOR");
    let vendor_b = token(h.vendor_b, "VENDOR");

    let order = place_order(&h, "GATEWAY").await;
    let order_id = order["id"].as_str().unwrap().to_string();
    assert_eq!(order["order_status"], "PENDING");
    assert_eq!(order["vendor_orders"].as_array().unwrap().len(), 2);
    assert_eq!(money(&order["price"]["total_price"]), "28.50".parse().unwrap());

    // Cart survives until payment is confirmed
    let (_, cart) = call(&h.app, Method::GET, "/v1/cart", Some(&customer), None).await;
    assert_eq!(cart["lines"].as_array().unwrap().len(), 2);

    let (status, init) = call(
        &h.app,
        Method::POST,
        &format!("/v1/orders/{}/payment", order_id),
        Some(&customer),
        Some(json!({ "email": "ada@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", init);
    let reference = init["reference"].as_str().unwrap().to_string();
    assert!(init["authorization_url"].is_string());

    let (status, verified) = call(
        &h.app,
        Method::POST,
        &format!("/v1/orders/{}/payment/verify", order_id),
        Some(&customer),
        Some(json!({ "reference": reference })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", verified);
    assert_eq!(verified["payment"]["status"], "COMPLETED");
    assert_eq!(verified["order"]["is_paid"], true);
    assert_eq!(verified["order"]["order_status"], "CONFIRMED");

    let (_, cart) = call(&h.app, Method::GET, "/v1/cart", Some(&customer), None).await;
    assert_eq!(cart["lines"].as_array().unwrap().len(), 0);

    // Provider redelivers the callback; nothing happens twice
    let (status, ack) = call(
        &h.app,
        Method::POST,
        "/v1/webhooks/payments",
        None,
        Some(json!({ "event": "charge.success", "data": { "reference": reference } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["status"], "COMPLETED");
    let confirmations = h
        .notifier
        .sent()
        .iter()
        .filter(|e| e.kind == NotificationKind::PaymentConfirmed)
        .count();
    assert_eq!(confirmations, 1);

    // Vendors only see their own slice
    let (status, listed) = call(&h.app, Method::GET, "/v1/vendor/orders", Some(&vendor_a), None).await;
    assert_eq!(status, StatusCode::OK);
    let listed = listed.as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["vendor_order"]["vendor_id"], h.vendor_a.to_string());

    let (status, view) = call(
        &h.app,
        Method::PUT,
        &format!("/v1/vendor/orders/{}/status", order_id),
        Some(&vendor_a),
        Some(json!({ "status": "DELIVERED" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", view);
    assert_ne!(view["order_status"], "COMPLETED");

    let (status, _) = call(
        &h.app,
        Method::PUT,
        &format!("/v1/vendor/orders/{}/status", order_id),
        Some(&vendor_b),
        Some(json!({ "status": "DELIVERED" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, fetched) = call(
        &h.app,
        Method::GET,
        &format!("/v1/orders/{}", order_id),
        Some(&customer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["order_status"], "COMPLETED");
    assert_eq!(fetched["is_delivered"], true);

    // Delivered sub-orders cannot be cancelled any more
    let (status, _) = call(
        &h.app,
        Method::POST,
        &format!("/v1/orders/{}/cancel", order_id),
        Some(&customer),
        Some(json!({ "status": "CANCELLED" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // 20.00 of jollof at 10% commission
    let (status, wallet) = call(&h.app, Method::GET, "/v1/vendor/wallet", Some(&vendor_a), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(money(&wallet["available"]), Money::from_major(18));
    assert_eq!(money(&wallet["pending"]), Money::ZERO);

    let (status, statement) = call(
        &h.app,
        Method::GET,
        "/v1/vendor/wallet/statement",
        Some(&vendor_a),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(statement[0]["type"], "EARNING");
    assert_eq!(statement[0]["settlement"], "SETTLED");

    let withdrawal = json!({
        "amount": "10.00",
        "method": {
            "type": "BANK_TRANSFER",
            "bank_name": "First Bank",
            "account_number": "0123456789",
            "account_name": "Mama Put Ltd"
        }
    });
    let (status, request) = call(
        &h.app,
        Method::POST,
        "/v1/vendor/wallet/withdrawals",
        Some(&vendor_a),
        Some(withdrawal.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", request);
    assert_eq!(request["status"], "PENDING");

    // 8.00 left once the pending request is reserved
    let (status, body) = call(
        &h.app,
        Method::POST,
        "/v1/vendor/wallet/withdrawals",
        Some(&vendor_a),
        Some(withdrawal),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Insufficient balance"));

    let admin = token(Uuid::new_v4(), "ADMIN");
    let (status, updated) = call(
        &h.app,
        Method::PUT,
        &format!("/v1/admin/withdrawals/{}/status", request["id"].as_str().unwrap()),
        Some(&admin),
        Some(json!({ "status": "PROCESSING", "note": "batched" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], "PROCESSING");

    let (_, listed) = call(
        &h.app,
        Method::GET,
        "/v1/vendor/wallet/withdrawals",
        Some(&vendor_a),
        None,
    )
    .await;
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (status, metrics) = call(&h.app, Method::GET, "/metrics", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let metrics = metrics.as_str().unwrap();
    assert!(metrics.contains("platter_checkouts_total{method=\"GATEWAY\"} 1"));
    assert!(metrics.contains("platter_withdrawal_requests_total 1"));
}

#[tokio::test]
async fn test_cash_on_delivery_cancel() {
    let h = harness();
    let customer = token(h.customer, "CUSTOMER");

    let order = place_order(&h, "CASH_ON_DELIVERY").await;
    let order_id = order["id"].as_str().unwrap().to_string();

    let (_, cart) = call(&h.app, Method::GET, "/v1/cart", Some(&customer), None).await;
    assert_eq!(cart["lines"].as_array().unwrap().len(), 0);

    let (status, _) = call(
        &h.app,
        Method::POST,
        &format!("/v1/orders/{}/payment", order_id),
        Some(&customer),
        Some(json!({ "email": "ada@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Someone else's order
    let stranger = token(Uuid::new_v4(), "CUSTOMER");
    let (status, _) = call(
        &h.app,
        Method::GET,
        &format!("/v1/orders/{}", order_id),
        Some(&stranger),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, cancelled) = call(
        &h.app,
        Method::POST,
        &format!("/v1/orders/{}/cancel", order_id),
        Some(&customer),
        Some(json!({ "status": "CANCELLED" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["order_status"], "CANCELLED");
    for vo in cancelled["vendor_orders"].as_array().unwrap() {
        assert_eq!(vo["status"], "CANCELLED");
    }

    let (status, listed) = call(&h.app, Method::GET, "/v1/orders", Some(&customer), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_admin_refund() {
    let h = harness();
    let customer = token(h.customer, "CUSTOMER");
    let admin = token(Uuid::new_v4(), "ADMIN");

    let order = place_order(&h, "GATEWAY").await;
    let order_id = order["id"].as_str().unwrap().to_string();

    // Nothing to refund before payment
    let (status, _) = call(
        &h.app,
        Method::POST,
        &format!("/v1/admin/orders/{}/refund", order_id),
        Some(&admin),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, init) = call(
        &h.app,
        Method::POST,
        &format!("/v1/orders/{}/payment", order_id),
        Some(&customer),
        Some(json!({ "email": "ada@example.com" })),
    )
    .await;
    call(
        &h.app,
        Method::POST,
        &format!("/v1/orders/{}/payment/verify", order_id),
        Some(&customer),
        Some(json!({ "reference": init["reference"] })),
    )
    .await;

    let (status, payment) = call(
        &h.app,
        Method::POST,
        &format!("/v1/admin/orders/{}/refund", order_id),
        Some(&admin),
        Some(json!({ "amount": "8.50" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", payment);
    assert_eq!(payment["refund_status"], "partial");
    assert_eq!(payment["status"], "COMPLETED");

    let (status, payment) = call(
        &h.app,
        Method::POST,
        &format!("/v1/admin/orders/{}/refund", order_id),
        Some(&admin),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payment["refund_status"], "full");
    assert_eq!(payment["status"], "REFUNDED");
    assert_eq!(money(&payment["refund_amount"]), "28.50".parse().unwrap());

    let (_, fetched) = call(
        &h.app,
        Method::GET,
        &format!("/v1/orders/{}", order_id),
        Some(&customer),
        None,
    )
    .await;
    assert_eq!(fetched["order_status"], "REFUNDED");
}

#[tokio::test]
async fn test_webhook_with_unknown_reference() {
    let h = harness();
    let (status, _) = call(
        &h.app,
        Method::POST,
        "/v1/webhooks/payments",
        None,
        Some(json!({ "event": "charge.success", "data": { "reference": "nope" } })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
