//! Account and bill CRUD integration tests.

mod common;

use serde_json::{json, Value};

#[tokio::test]
async fn create_and_get_account() {
    let Some(app) = common::TestApp::spawn().await else {
        return;
    };

    let response = app
        .client
        .post(format!("{}/accounts", app.address))
        .json(&json!({
            "project_name": "Riverside Apartments",
            "contract_reference": "CT-2024-001"
        }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 201);
    let created: Value = response.json().await.unwrap();
    assert_eq!(created["project_name"], "Riverside Apartments");
    assert_eq!(created["contract_reference"], "CT-2024-001");

    let account_id = created["account_id"].as_str().unwrap();
    let response = app
        .client
        .get(format!("{}/accounts/{}", app.address, account_id))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 200);
    let fetched: Value = response.json().await.unwrap();
    assert_eq!(fetched["account_id"], created["account_id"]);

    app.cleanup().await;
}

#[tokio::test]
async fn create_account_rejects_empty_name() {
    let Some(app) = common::TestApp::spawn().await else {
        return;
    };

    let response = app
        .client
        .post(format!("{}/accounts", app.address))
        .json(&json!({ "project_name": "" }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 422);

    app.cleanup().await;
}

#[tokio::test]
async fn get_missing_account_returns_404() {
    let Some(app) = common::TestApp::spawn().await else {
        return;
    };

    let response = app
        .client
        .get(format!(
            "{}/accounts/00000000-0000-0000-0000-000000000000",
            app.address
        ))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 404);

    app.cleanup().await;
}

#[tokio::test]
async fn update_and_delete_account() {
    let Some(app) = common::TestApp::spawn().await else {
        return;
    };

    let account_id = app.create_account("Old Name").await;

    let response = app
        .client
        .patch(format!("{}/accounts/{}", app.address, account_id))
        .json(&json!({ "project_name": "New Name" }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 200);
    let updated: Value = response.json().await.unwrap();
    assert_eq!(updated["project_name"], "New Name");

    let response = app
        .client
        .delete(format!("{}/accounts/{}", app.address, account_id))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 204);

    let response = app
        .client
        .get(format!("{}/accounts/{}", app.address, account_id))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 404);

    app.cleanup().await;
}

#[tokio::test]
async fn bills_are_ordered_by_creation() {
    let Some(app) = common::TestApp::spawn().await else {
        return;
    };

    let account_id = app.create_account("Ordering Test").await;
    app.create_bill(account_id, "Bill 1").await;
    app.create_bill(account_id, "Bill 2").await;
    app.create_bill(account_id, "Bill 3").await;

    let response = app
        .client
        .get(format!("{}/accounts/{}/bills", app.address, account_id))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 200);
    let bills: Vec<Value> = response.json().await.unwrap();
    assert_eq!(bills.len(), 3);
    assert_eq!(bills[0]["name"], "Bill 1");
    assert_eq!(bills[0]["display_order"], 1);
    assert_eq!(bills[2]["name"], "Bill 3");
    assert_eq!(bills[2]["display_order"], 3);

    app.cleanup().await;
}

#[tokio::test]
async fn deleting_account_cascades_to_bills() {
    let Some(app) = common::TestApp::spawn().await else {
        return;
    };

    let account_id = app.create_account("Cascade Test").await;
    let bill_id = app.create_bill(account_id, "Doomed Bill").await;
    app.create_section(bill_id, "Doomed Section").await;

    let response = app
        .client
        .delete(format!("{}/accounts/{}", app.address, account_id))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 204);

    // The bill went down with the account, so its section listing is gone too.
    let response = app
        .client
        .get(format!("{}/bills/{}/sections", app.address, bill_id))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 404);

    app.cleanup().await;
}
