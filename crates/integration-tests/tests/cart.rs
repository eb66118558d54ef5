//! Guest and user carts: stock checks, line merging, guest cart merge.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;
use serde_json::{Value, json};
use stitchery_integration_tests::{TestApp, amount};

fn quantity_of(cart: &Value, product_id: &str) -> Option<u64> {
    cart["items"]
        .as_array()?
        .iter()
        .find(|line| line["productId"] == json!(product_id))
        .and_then(|line| line["quantity"].as_u64())
}

async fn stocked_product(app: &TestApp, stock: i32) -> (String, String) {
    let admin = app.admin().await;
    let category = app.category(&admin, "Floss").await;
    let product = app.product(&admin, &category, "Stranded Floss", "1.25", stock).await;
    (admin, product)
}

#[tokio::test]
async fn test_guest_cart_respects_stock() {
    let app = TestApp::new();
    let (_, product) = stocked_product(&app, 5).await;

    let added = app
        .post("/cart/add")
        .session("guest-1")
        .json(json!({ "productId": product, "quantity": 5 }))
        .send()
        .await;
    assert_eq!(added.status, StatusCode::OK);
    assert_eq!(quantity_of(&added.body, &product), Some(5));
    assert_eq!(added.str("sessionId"), "guest-1");

    let over = app
        .post("/cart/add")
        .session("guest-1")
        .json(json!({ "productId": product, "quantity": 1 }))
        .send()
        .await;
    assert_eq!(over.status, StatusCode::BAD_REQUEST);

    let cart = app.get("/cart").session("guest-1").send().await;
    assert_eq!(quantity_of(&cart.body, &product), Some(5));
    assert_eq!(app.stock(&product).await, 5);
}

#[tokio::test]
async fn test_adding_same_product_twice_sums_one_line() {
    let app = TestApp::new();
    let (_, product) = stocked_product(&app, 10).await;
    let (token, _) = app.customer("sum@example.com").await;

    for quantity in [2, 3] {
        let response = app
            .post("/cart/add")
            .token(&token)
            .json(json!({ "productId": product, "quantity": quantity }))
            .send()
            .await;
        assert_eq!(response.status, StatusCode::OK);
    }

    let cart = app.get("/cart").token(&token).send().await;
    assert_eq!(cart.body["items"].as_array().unwrap().len(), 1);
    assert_eq!(quantity_of(&cart.body, &product), Some(5));
    assert_eq!(amount(&cart.body["items"][0]["product"]["price"]), 1.25);
}

#[tokio::test]
async fn test_cart_requires_an_identity() {
    let app = TestApp::new();
    let (_, product) = stocked_product(&app, 5).await;

    let anonymous = app
        .post("/cart/add")
        .json(json!({ "productId": product, "quantity": 1 }))
        .send()
        .await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.get("/cart").send().await.status, StatusCode::UNAUTHORIZED);

    let body_session = app
        .post("/cart/add")
        .json(json!({ "productId": product, "quantity": 1, "sessionId": "from-body" }))
        .send()
        .await;
    assert_eq!(body_session.status, StatusCode::OK);
    let cart = app.get("/cart").session("from-body").send().await;
    assert_eq!(quantity_of(&cart.body, &product), Some(1));
}

#[tokio::test]
async fn test_empty_cart_and_validation() {
    let app = TestApp::new();
    let (_, product) = stocked_product(&app, 5).await;

    let fresh = app.get("/cart").session("nobody-yet").send().await;
    assert_eq!(fresh.status, StatusCode::OK);
    assert_eq!(fresh.body["items"], json!([]));

    let zero = app
        .post("/cart/add")
        .session("nobody-yet")
        .json(json!({ "productId": product, "quantity": 0 }))
        .send()
        .await;
    assert_eq!(zero.status, StatusCode::BAD_REQUEST);

    let unknown = app
        .post("/cart/add")
        .session("nobody-yet")
        .json(json!({ "productId": "00000000-0000-0000-0000-000000000000", "quantity": 1 }))
        .send()
        .await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_remove_and_clear_lines() {
    let app = TestApp::new();
    let (_, product) = stocked_product(&app, 4).await;

    let added = app
        .post("/cart/add")
        .session("editor")
        .json(json!({ "productId": product, "quantity": 1 }))
        .send()
        .await;
    let item = added.body["items"][0]["id"].as_str().unwrap().to_owned();

    let updated = app
        .patch(&format!("/cart/items/{item}"))
        .session("editor")
        .json(json!({ "quantity": 4 }))
        .send()
        .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(quantity_of(&updated.body, &product), Some(4));

    let too_many = app
        .patch(&format!("/cart/items/{item}"))
        .session("editor")
        .json(json!({ "quantity": 5 }))
        .send()
        .await;
    assert_eq!(too_many.status, StatusCode::BAD_REQUEST);

    let stranger = app
        .delete(&format!("/cart/items/{item}"))
        .session("someone-else")
        .send()
        .await;
    assert_eq!(stranger.status, StatusCode::FORBIDDEN);

    let removed = app.delete(&format!("/cart/items/{item}")).session("editor").send().await;
    assert_eq!(removed.status, StatusCode::OK);
    assert_eq!(removed.body["items"], json!([]));

    app.post("/cart/add")
        .session("editor")
        .json(json!({ "productId": product, "quantity": 2 }))
        .send()
        .await;
    let cleared = app.delete("/cart/clear").session("editor").send().await;
    assert_eq!(cleared.status, StatusCode::OK);
    assert_eq!(cleared.str("message"), "Cart cleared successfully");
    let cart = app.get("/cart").session("editor").send().await;
    assert_eq!(cart.body["items"], json!([]));
}

#[tokio::test]
async fn test_merge_guest_cart_into_user_cart() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let category = app.category(&admin, "Patterns").await;
    let a = app.product(&admin, &category, "Sampler Pattern", "7.00", 10).await;
    let b = app.product(&admin, &category, "Floral Pattern", "9.00", 10).await;
    let (token, _) = app.customer("merge@example.com").await;

    for (product, quantity) in [(&a, 2), (&b, 1)] {
        app.post("/cart/add")
            .session("guest-merge")
            .json(json!({ "productId": product, "quantity": quantity }))
            .send()
            .await;
    }
    app.post("/cart/add")
        .token(&token)
        .json(json!({ "productId": a, "quantity": 1 }))
        .send()
        .await;

    let merged = app
        .post("/cart/merge")
        .token(&token)
        .json(json!({ "sessionId": "guest-merge" }))
        .send()
        .await;
    assert_eq!(merged.status, StatusCode::OK);
    assert_eq!(merged.body["items"].as_array().unwrap().len(), 2);
    assert_eq!(quantity_of(&merged.body, &a), Some(3));
    assert_eq!(quantity_of(&merged.body, &b), Some(1));

    let guest = app.get("/cart").session("guest-merge").send().await;
    assert_eq!(guest.body["items"], json!([]));

    let again = app
        .post("/cart/merge")
        .token(&token)
        .json(json!({ "sessionId": "guest-merge" }))
        .send()
        .await;
    assert_eq!(quantity_of(&again.body, &a), Some(3));
}

#[tokio::test]
async fn test_merge_requires_login() {
    let app = TestApp::new();
    let response = app
        .post("/cart/merge")
        .session("guest")
        .json(json!({ "sessionId": "guest" }))
        .send()
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}
