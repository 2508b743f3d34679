//! Section review request integration tests.

mod common;

use serde_json::{json, Value};

#[tokio::test]
async fn create_review_issues_token_and_marks_section_in_review() {
    let Some(app) = common::TestApp::spawn().await else {
        return;
    };
    let section_id = app.create_section_fixture().await;

    let response = app
        .client
        .post(format!("{}/sections/{}/reviews", app.address, section_id))
        .json(&json!({
            "recipient_name": "Pat Surveyor",
            "recipient_email": "pat@example.com",
            "message": "Please check section A"
        }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 201);
    let review: Value = response.json().await.unwrap();
    assert_eq!(review["status"], "pending");
    assert!(!review["access_token"].as_str().unwrap().is_empty());

    let response = app
        .client
        .get(format!("{}/sections/{}", app.address, section_id))
        .send()
        .await
        .expect("Failed to execute request");
    let section: Value = response.json().await.unwrap();
    assert_eq!(section["review_status"], "in_review");

    app.cleanup().await;
}

#[tokio::test]
async fn create_review_rejects_invalid_email() {
    let Some(app) = common::TestApp::spawn().await else {
        return;
    };
    let section_id = app.create_section_fixture().await;

    let response = app
        .client
        .post(format!("{}/sections/{}/reviews", app.address, section_id))
        .json(&json!({
            "recipient_name": "Pat Surveyor",
            "recipient_email": "not-an-email"
        }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 422);

    app.cleanup().await;
}

#[tokio::test]
async fn review_is_resolvable_by_token() {
    let Some(app) = common::TestApp::spawn().await else {
        return;
    };
    let section_id = app.create_section_fixture().await;

    let response = app
        .client
        .post(format!("{}/sections/{}/reviews", app.address, section_id))
        .json(&json!({
            "recipient_name": "Pat Surveyor",
            "recipient_email": "pat@example.com"
        }))
        .send()
        .await
        .expect("Failed to execute request");
    let review: Value = response.json().await.unwrap();
    let token = review["access_token"].as_str().unwrap();

    let response = app
        .client
        .get(format!("{}/reviews/token/{}", app.address, token))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 200);
    let fetched: Value = response.json().await.unwrap();
    assert_eq!(fetched["review_id"], review["review_id"]);

    let response = app
        .client
        .get(format!("{}/reviews/token/{}", app.address, "no-such-token"))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 404);

    app.cleanup().await;
}

#[tokio::test]
async fn approving_review_mirrors_status_onto_section() {
    let Some(app) = common::TestApp::spawn().await else {
        return;
    };
    let section_id = app.create_section_fixture().await;

    let response = app
        .client
        .post(format!("{}/sections/{}/reviews", app.address, section_id))
        .json(&json!({
            "recipient_name": "Pat Surveyor",
            "recipient_email": "pat@example.com"
        }))
        .send()
        .await
        .expect("Failed to execute request");
    let review: Value = response.json().await.unwrap();
    let review_id = review["review_id"].as_str().unwrap();

    let response = app
        .client
        .patch(format!("{}/reviews/{}", app.address, review_id))
        .json(&json!({ "status": "approved" }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 200);
    let updated: Value = response.json().await.unwrap();
    assert_eq!(updated["status"], "approved");
    assert!(!updated["responded_utc"].is_null());

    let response = app
        .client
        .get(format!("{}/sections/{}", app.address, section_id))
        .send()
        .await
        .expect("Failed to execute request");
    let section: Value = response.json().await.unwrap();
    assert_eq!(section["review_status"], "approved");

    app.cleanup().await;
}
