//! Unreadable request bodies get the standard error envelope.

mod common;

use axum::body::Bytes;
use common::{register, spawn_app, with_token};
use serde_json::{Value, json};

fn assert_invalid_json(status: u16, body: Value) {
    assert_eq!(status, 400);
    assert_eq!(
        body,
        json!({ "error": { "code": "invalid_input", "message": "invalid json" } })
    );
}

#[tokio::test]
async fn wrongly_typed_order_fields_are_invalid_input() {
    let app = spawn_app();
    let buyer = register(&app, "types@example.com").await;

    let items_as_string = with_token(app.server.post("/api/orders"), &buyer.token)
        .json(&json!({ "items": "oops" }))
        .await;
    assert_invalid_json(items_as_string.status_code().as_u16(), items_as_string.json());

    let qty_too_large = with_token(app.server.post("/api/orders"), &buyer.token)
        .json(&json!({ "items": [{ "id": "p1", "qty": 3_000_000_000u64 }] }))
        .await;
    assert_invalid_json(qty_too_large.status_code().as_u16(), qty_too_large.json());
}

#[tokio::test]
async fn syntax_errors_are_invalid_input() {
    let app = spawn_app();

    let response = app
        .server
        .post("/api/auth/register")
        .bytes(Bytes::from_static(b"{email: 1"))
        .content_type("application/json")
        .await;

    assert_invalid_json(response.status_code().as_u16(), response.json());
}

#[tokio::test]
async fn missing_json_content_type_is_invalid_input() {
    let app = spawn_app();

    let response = app
        .server
        .post("/api/stats")
        .text("perfumeId=p1")
        .await;

    assert_invalid_json(response.status_code().as_u16(), response.json());
}

#[tokio::test]
async fn admin_bodies_use_the_same_contract() {
    let app = spawn_app();
    let root = register(&app, "root@example.com").await;
    let root_token = common::promote(&app, &root.user_id).await;

    let response = with_token(
        app.server.put(&format!("/api/users/{}/admin", root.user_id)),
        &root_token,
    )
    .json(&json!({ "isAdmin": "yes" }))
    .await;

    assert_invalid_json(response.status_code().as_u16(), response.json());
}
