//! Health check integration tests for final-account-service.

mod common;

use serial_test::serial;

#[tokio::test]
async fn health_check_works() {
    let Some(app) = common::TestApp::spawn().await else {
        return;
    };

    let response = app
        .client
        .get(format!("{}/health", app.address))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "final-account-service");

    app.cleanup().await;
}

#[tokio::test]
async fn readiness_check_works() {
    let Some(app) = common::TestApp::spawn().await else {
        return;
    };

    let response = app
        .client
        .get(format!("{}/ready", app.address))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());

    app.cleanup().await;
}

// Serialized: the prometheus registry is process-global.
#[tokio::test]
#[serial]
async fn metrics_endpoint_works() {
    let Some(app) = common::TestApp::spawn().await else {
        return;
    };

    let response = app
        .client
        .get(format!("{}/metrics", app.address))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());
    assert!(response
        .headers()
        .get("content-type")
        .map(|v| v.to_str().unwrap_or("").contains("text/plain"))
        .unwrap_or(false));

    app.cleanup().await;
}
