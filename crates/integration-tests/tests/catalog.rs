//! Categories, products, stock administration.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;
use serde_json::json;
use stitchery_integration_tests::{TestApp, amount};

#[tokio::test]
async fn test_category_crud_and_duplicate_names() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let id = app.category(&admin, "Threads").await;

    let duplicate = app
        .post("/categories")
        .token(&admin)
        .json(json!({ "name": "Threads" }))
        .send()
        .await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);

    let shown = app.get(&format!("/categories/{id}")).send().await;
    assert_eq!(shown.status, StatusCode::OK);
    assert_eq!(shown.body["productCount"], json!(0));

    let renamed = app
        .patch(&format!("/categories/{id}"))
        .token(&admin)
        .json(json!({ "name": "Embroidery Threads" }))
        .send()
        .await;
    assert_eq!(renamed.status, StatusCode::OK);
    assert_eq!(renamed.str("name"), "Embroidery Threads");

    let deleted = app.delete(&format!("/categories/{id}")).token(&admin).send().await;
    assert_eq!(deleted.status, StatusCode::OK);
    let missing = app.get(&format!("/categories/{id}")).send().await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_category_with_products_cannot_be_deleted() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let category = app.category(&admin, "Fabric").await;
    app.product(&admin, &category, "Linen", "9.50", 4).await;

    let response = app.delete(&format!("/categories/{category}")).token(&admin).send().await;
    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(app.get(&format!("/categories/{category}")).send().await.status, StatusCode::OK);
}

#[tokio::test]
async fn test_catalog_writes_require_admin() {
    let app = TestApp::new();
    let (customer, _) = app.customer("cust@example.com").await;

    let anonymous = app.post("/categories").json(json!({ "name": "Nope" })).send().await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);

    let customer_attempt = app
        .post("/categories")
        .token(&customer)
        .json(json!({ "name": "Nope" }))
        .send()
        .await;
    assert_eq!(customer_attempt.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_product_listing_filters_and_pages() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let threads = app.category(&admin, "Threads").await;
    let tools = app.category(&admin, "Tools").await;
    app.product(&admin, &threads, "Cotton Thread", "3.00", 10).await;
    app.product(&admin, &threads, "Silk Thread", "8.00", 10).await;
    app.product(&admin, &tools, "Thread Snips", "14.00", 10).await;

    let all = app.get("/products").send().await;
    assert_eq!(all.status, StatusCode::OK);
    assert_eq!(all.body["total"], json!(3));
    assert_eq!(all.body["page"], json!(1));

    let by_category = app.get(&format!("/products?categoryId={threads}")).send().await;
    assert_eq!(by_category.body["total"], json!(2));

    let search = app.get("/products?search=snips").send().await;
    assert_eq!(search.body["total"], json!(1));
    assert_eq!(search.body["products"][0]["name"], json!("Thread Snips"));
    assert_eq!(search.body["products"][0]["category"]["name"], json!("Tools"));

    let priced = app.get("/products?minPrice=5&maxPrice=10").send().await;
    assert_eq!(priced.body["total"], json!(1));
    assert_eq!(amount(&priced.body["products"][0]["price"]), 8.0);

    let paged = app.get("/products?page=2&limit=2").send().await;
    assert_eq!(paged.body["products"].as_array().unwrap().len(), 1);
    assert_eq!(paged.body["totalPages"], json!(2));

    let bad_page = app.get("/products?page=0").send().await;
    assert_eq!(bad_page.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_product_validation() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let category = app.category(&admin, "Kits").await;

    for body in [
        json!({ "name": "Free Kit", "price": "0", "stock": 1, "categoryId": category }),
        json!({ "name": "Kit", "price": "5.00", "stock": -1, "categoryId": category }),
        json!({ "name": "", "price": "5.00", "stock": 1, "categoryId": category }),
    ] {
        let response = app.post("/products").token(&admin).json(body.clone()).send().await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "{body}");
    }

    let orphan = app
        .post("/products")
        .token(&admin)
        .json(json!({
            "name": "Orphan Kit",
            "price": "5.00",
            "stock": 1,
            "categoryId": "00000000-0000-0000-0000-000000000000",
        }))
        .send()
        .await;
    assert_eq!(orphan.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stock_adjustment_and_check() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let category = app.category(&admin, "Needles").await;
    let product = app.product(&admin, &category, "Tapestry Needles", "2.50", 3).await;

    let check = app.get(&format!("/products/{product}/check-stock?quantity=3")).send().await;
    assert_eq!(check.status, StatusCode::OK);
    assert_eq!(check.body["available"], json!(true));
    assert_eq!(check.body["requestedQuantity"], json!(3));

    let too_many = app.get(&format!("/products/{product}/check-stock?quantity=4")).send().await;
    assert_eq!(too_many.body["available"], json!(false));

    let restocked = app
        .patch(&format!("/products/{product}/stock"))
        .token(&admin)
        .json(json!({ "quantity": 7 }))
        .send()
        .await;
    assert_eq!(restocked.status, StatusCode::OK);
    assert_eq!(app.stock(&product).await, 10);

    let overdrawn = app
        .patch(&format!("/products/{product}/stock"))
        .token(&admin)
        .json(json!({ "quantity": -11 }))
        .send()
        .await;
    assert_eq!(overdrawn.status, StatusCode::BAD_REQUEST);
    assert_eq!(app.stock(&product).await, 10);
}

#[tokio::test]
async fn test_removing_products() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let category = app.category(&admin, "Hoops").await;
    let unused = app.product(&admin, &category, "Wooden Hoop", "6.00", 5).await;
    let carted = app.product(&admin, &category, "Plastic Hoop", "4.00", 5).await;

    app.post("/cart/add")
        .session("guest-hoops")
        .json(json!({ "productId": carted, "quantity": 1 }))
        .send()
        .await;

    let deleted = app.delete(&format!("/products/{unused}")).token(&admin).send().await;
    assert_eq!(deleted.status, StatusCode::OK);
    assert_eq!(deleted.str("outcome"), "deleted");
    assert_eq!(app.get(&format!("/products/{unused}")).send().await.status, StatusCode::NOT_FOUND);

    let deactivated = app.delete(&format!("/products/{carted}")).token(&admin).send().await;
    assert_eq!(deactivated.status, StatusCode::OK);
    assert_eq!(deactivated.str("outcome"), "deactivated");
    assert_eq!(deactivated.body["product"]["isActive"], json!(false));

    let listing = app.get("/products").send().await;
    assert_eq!(listing.body["total"], json!(0));
    let inactive = app.get("/products?isActive=false").send().await;
    assert_eq!(inactive.body["total"], json!(1));
}
