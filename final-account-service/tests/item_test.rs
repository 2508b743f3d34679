//! Line item integration tests: amount derivation, classification,
//! the Prime Cost cascade, and section total maintenance.

mod common;

use serde_json::{json, Value};
use uuid::Uuid;

/// Parse a decimal field serialized as a JSON string.
fn dec(v: &Value) -> f64 {
    v.as_str()
        .unwrap_or_else(|| panic!("expected decimal string, got {}", v))
        .parse()
        .expect("decimal string did not parse")
}

#[tokio::test]
async fn standard_item_derives_amounts_from_quantity_and_rates() {
    let Some(app) = common::TestApp::spawn().await else {
        return;
    };
    let section_id = app.create_section_fixture().await;

    let mutation = app
        .create_item(
            section_id,
            json!({
                "item_code": "A1",
                "description": "Excavation",
                "unit": "m3",
                "contract_quantity": "10",
                "final_quantity": "12",
                "supply_rate": "100",
                "install_rate": "50"
            }),
        )
        .await;

    let item = &mutation["item"];
    assert_eq!(dec(&item["contract_amount"]), 1500.0);
    assert_eq!(dec(&item["final_amount"]), 1800.0);
    assert_eq!(dec(&item["variation_amount"]), 300.0);
    assert_eq!(item["row_kind"], "item");

    let section = &mutation["section"];
    assert_eq!(dec(&section["contract_total"]), 1500.0);
    assert_eq!(dec(&section["final_total"]), 1800.0);
    assert_eq!(dec(&section["variation_total"]), 300.0);

    app.cleanup().await;
}

#[tokio::test]
async fn rate_only_item_has_zero_amounts() {
    let Some(app) = common::TestApp::spawn().await else {
        return;
    };
    let section_id = app.create_section_fixture().await;

    let mutation = app
        .create_item(
            section_id,
            json!({
                "item_code": "A2",
                "description": "Rate only allowance",
                "unit": "m2",
                "contract_quantity": "10",
                "supply_rate": "100",
                "is_rate_only": true
            }),
        )
        .await;

    let item = &mutation["item"];
    assert_eq!(dec(&item["contract_amount"]), 0.0);
    assert_eq!(dec(&item["final_amount"]), 0.0);
    assert_eq!(dec(&item["variation_amount"]), 0.0);

    app.cleanup().await;
}

#[tokio::test]
async fn prime_cost_item_uses_allowance_and_actual_cost() {
    let Some(app) = common::TestApp::spawn().await else {
        return;
    };
    let section_id = app.create_section_fixture().await;

    let mutation = app
        .create_item(
            section_id,
            json!({
                "item_code": "A3",
                "description": "PC sum: sanitaryware",
                "unit": "sum",
                "is_prime_cost": true,
                "pc_allowance": "5000",
                "pc_actual_cost": "6200"
            }),
        )
        .await;

    let item = &mutation["item"];
    assert_eq!(item["row_kind"], "prime_cost");
    assert_eq!(dec(&item["contract_amount"]), 5000.0);
    assert_eq!(dec(&item["final_amount"]), 6200.0);
    assert_eq!(dec(&item["variation_amount"]), 1200.0);

    app.cleanup().await;
}

#[tokio::test]
async fn pa_item_derives_amounts_from_parent_prime_cost() {
    let Some(app) = common::TestApp::spawn().await else {
        return;
    };
    let section_id = app.create_section_fixture().await;

    let pc = app
        .create_item(
            section_id,
            json!({
                "item_code": "A3",
                "unit": "sum",
                "is_prime_cost": true,
                "pc_allowance": "5000",
                "pc_actual_cost": "6200"
            }),
        )
        .await;
    let pc_id = pc["item"]["item_id"].as_str().unwrap();

    let mutation = app
        .create_item(
            section_id,
            json!({
                "item_code": "A4",
                "description": "Profit and attendance",
                "unit": "%",
                "is_pa_item": true,
                "pa_parent_item_id": pc_id,
                "pa_percentage": "15"
            }),
        )
        .await;

    let item = &mutation["item"];
    assert_eq!(item["row_kind"], "pa_item");
    assert_eq!(dec(&item["contract_amount"]), 750.0);
    assert_eq!(dec(&item["final_amount"]), 930.0);
    assert_eq!(dec(&item["variation_amount"]), 180.0);

    // Section totals include both the PC row and its P&A child.
    let section = &mutation["section"];
    assert_eq!(dec(&section["contract_total"]), 5750.0);
    assert_eq!(dec(&section["final_total"]), 7130.0);
    assert_eq!(dec(&section["variation_total"]), 1380.0);

    app.cleanup().await;
}

#[tokio::test]
async fn editing_prime_cost_cascades_to_pa_children() {
    let Some(app) = common::TestApp::spawn().await else {
        return;
    };
    let section_id = app.create_section_fixture().await;

    let pc = app
        .create_item(
            section_id,
            json!({
                "item_code": "A3",
                "unit": "sum",
                "is_prime_cost": true,
                "pc_allowance": "5000",
                "pc_actual_cost": "6200"
            }),
        )
        .await;
    let pc_id = pc["item"]["item_id"].as_str().unwrap().to_string();

    app.create_item(
        section_id,
        json!({
            "item_code": "A4",
            "unit": "%",
            "is_pa_item": true,
            "pa_parent_item_id": pc_id,
            "pa_percentage": "15"
        }),
    )
    .await;

    // Bump the actual cost; the P&A child must be recomputed in the same
    // transaction and returned alongside the edited row.
    let response = app
        .client
        .patch(format!("{}/items/{}", app.address, pc_id))
        .json(&json!({ "pc_actual_cost": "8000" }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 200);

    let mutation: Value = response.json().await.unwrap();
    assert_eq!(dec(&mutation["item"]["final_amount"]), 8000.0);

    let children = mutation["cascaded_children"].as_array().unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(dec(&children[0]["contract_amount"]), 750.0);
    assert_eq!(dec(&children[0]["final_amount"]), 1200.0);
    assert_eq!(dec(&children[0]["variation_amount"]), 450.0);

    // Section totals reflect the new state: PC 5000/8000 + P&A 750/1200.
    let section = &mutation["section"];
    assert_eq!(dec(&section["contract_total"]), 5750.0);
    assert_eq!(dec(&section["final_total"]), 9200.0);
    assert_eq!(dec(&section["variation_total"]), 3450.0);

    app.cleanup().await;
}

#[tokio::test]
async fn converting_pa_item_to_standard_drops_the_parent_link() {
    let Some(app) = common::TestApp::spawn().await else {
        return;
    };
    let section_id = app.create_section_fixture().await;

    let pc = app
        .create_item(
            section_id,
            json!({
                "item_code": "A3",
                "unit": "sum",
                "is_prime_cost": true,
                "pc_allowance": "5000",
                "pc_actual_cost": "6200"
            }),
        )
        .await;
    let pc_id = pc["item"]["item_id"].as_str().unwrap().to_string();

    let pa = app
        .create_item(
            section_id,
            json!({
                "item_code": "A4",
                "unit": "%",
                "is_pa_item": true,
                "pa_parent_item_id": pc_id,
                "pa_percentage": "15"
            }),
        )
        .await;
    let pa_id = pa["item"]["item_id"].as_str().unwrap().to_string();

    // Flipping the flag alone must clear the parent reference, not leave the
    // row in an invalid half-converted state.
    let response = app
        .client
        .patch(format!("{}/items/{}", app.address, pa_id))
        .json(&json!({ "is_pa_item": false }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 200);

    let mutation: Value = response.json().await.unwrap();
    let item = &mutation["item"];
    assert_eq!(item["is_pa_item"], false);
    assert!(item["pa_parent_item_id"].is_null());
    assert!(item["pa_percentage"].is_null());
    assert_eq!(item["row_kind"], "item");
    assert_eq!(dec(&item["final_amount"]), 0.0);

    // Section totals drop back to the PC row alone.
    let section = &mutation["section"];
    assert_eq!(dec(&section["contract_total"]), 5000.0);
    assert_eq!(dec(&section["final_total"]), 6200.0);

    app.cleanup().await;
}

#[tokio::test]
async fn explicit_null_clears_quantity_back_to_unmeasured() {
    let Some(app) = common::TestApp::spawn().await else {
        return;
    };
    let section_id = app.create_section_fixture().await;

    let created = app
        .create_item(
            section_id,
            json!({
                "item_code": "A1",
                "unit": "m3",
                "contract_quantity": "10",
                "final_quantity": "12",
                "supply_rate": "100",
                "install_rate": "50"
            }),
        )
        .await;
    let item_id = created["item"]["item_id"].as_str().unwrap().to_string();

    let response = app
        .client
        .patch(format!("{}/items/{}", app.address, item_id))
        .json(&json!({ "final_quantity": null }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 200);

    // Cleared, not zeroed: the stored quantity is NULL again, and the final
    // amount falls back to zero while the contract side is untouched.
    let mutation: Value = response.json().await.unwrap();
    let item = &mutation["item"];
    assert!(item["final_quantity"].is_null());
    assert_eq!(dec(&item["contract_amount"]), 1500.0);
    assert_eq!(dec(&item["final_amount"]), 0.0);
    assert_eq!(dec(&item["variation_amount"]), -1500.0);

    app.cleanup().await;
}

#[tokio::test]
async fn header_and_subheader_rows_are_excluded_from_totals() {
    let Some(app) = common::TestApp::spawn().await else {
        return;
    };
    let section_id = app.create_section_fixture().await;

    // Header row: bare letter code, no unit, no values.
    app.create_item(
        section_id,
        json!({ "item_code": "A", "description": "GROUNDWORKS" }),
    )
    .await;
    // Subheader row: dotted code, no unit, no values.
    app.create_item(
        section_id,
        json!({ "item_code": "A1.1", "description": "Excavation" }),
    )
    .await;
    let mutation = app
        .create_item(
            section_id,
            json!({
                "item_code": "A1",
                "unit": "m3",
                "contract_quantity": "10",
                "final_quantity": "10",
                "supply_rate": "100"
            }),
        )
        .await;

    let section = &mutation["section"];
    assert_eq!(dec(&section["contract_total"]), 1000.0);
    assert_eq!(dec(&section["final_total"]), 1000.0);
    assert_eq!(dec(&section["variation_total"]), 0.0);

    // Classification is visible on the list endpoint.
    let response = app
        .client
        .get(format!("{}/sections/{}/items", app.address, section_id))
        .send()
        .await
        .expect("Failed to execute request");
    let items: Vec<Value> = response.json().await.unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(items[0]["row_kind"], "header");
    assert_eq!(items[1]["row_kind"], "subheader");
    assert_eq!(items[2]["row_kind"], "item");

    app.cleanup().await;
}

#[tokio::test]
async fn malformed_numeric_input_is_rejected() {
    let Some(app) = common::TestApp::spawn().await else {
        return;
    };
    let section_id = app.create_section_fixture().await;

    let response = app
        .client
        .post(format!("{}/sections/{}/items", app.address, section_id))
        .json(&json!({
            "item_code": "A1",
            "unit": "m3",
            "contract_quantity": "not a number"
        }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 422);

    app.cleanup().await;
}

#[tokio::test]
async fn pa_percentage_outside_range_is_rejected() {
    let Some(app) = common::TestApp::spawn().await else {
        return;
    };
    let section_id = app.create_section_fixture().await;

    let pc = app
        .create_item(
            section_id,
            json!({
                "item_code": "A3",
                "unit": "sum",
                "is_prime_cost": true,
                "pc_allowance": "5000"
            }),
        )
        .await;
    let pc_id = pc["item"]["item_id"].as_str().unwrap();

    let response = app
        .client
        .post(format!("{}/sections/{}/items", app.address, section_id))
        .json(&json!({
            "is_pa_item": true,
            "pa_parent_item_id": pc_id,
            "pa_percentage": "150"
        }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 400);

    app.cleanup().await;
}

#[tokio::test]
async fn pa_parent_must_be_prime_cost_in_same_section() {
    let Some(app) = common::TestApp::spawn().await else {
        return;
    };
    let section_id = app.create_section_fixture().await;

    let plain = app
        .create_item(
            section_id,
            json!({ "item_code": "A1", "unit": "m3", "contract_quantity": "1" }),
        )
        .await;
    let plain_id = plain["item"]["item_id"].as_str().unwrap();

    let response = app
        .client
        .post(format!("{}/sections/{}/items", app.address, section_id))
        .json(&json!({
            "is_pa_item": true,
            "pa_parent_item_id": plain_id,
            "pa_percentage": "10"
        }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 400);

    app.cleanup().await;
}

#[tokio::test]
async fn deleting_prime_cost_zeroes_orphaned_pa_children() {
    let Some(app) = common::TestApp::spawn().await else {
        return;
    };
    let section_id = app.create_section_fixture().await;

    let pc = app
        .create_item(
            section_id,
            json!({
                "unit": "sum",
                "is_prime_cost": true,
                "pc_allowance": "5000",
                "pc_actual_cost": "6200"
            }),
        )
        .await;
    let pc_id = pc["item"]["item_id"].as_str().unwrap().to_string();

    let pa = app
        .create_item(
            section_id,
            json!({
                "unit": "%",
                "is_pa_item": true,
                "pa_parent_item_id": pc_id,
                "pa_percentage": "15"
            }),
        )
        .await;
    let pa_id = pa["item"]["item_id"].as_str().unwrap().to_string();

    let response = app
        .client
        .delete(format!("{}/items/{}", app.address, pc_id))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 200);

    let section: Value = response.json().await.unwrap();
    assert_eq!(dec(&section["contract_total"]), 0.0);
    assert_eq!(dec(&section["final_total"]), 0.0);

    // The orphaned child survives with zeroed amounts and no parent link.
    let response = app
        .client
        .get(format!("{}/items/{}", app.address, pa_id))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 200);
    let child: Value = response.json().await.unwrap();
    assert_eq!(dec(&child["contract_amount"]), 0.0);
    assert_eq!(dec(&child["final_amount"]), 0.0);
    assert!(child["pa_parent_item_id"].is_null());

    app.cleanup().await;
}

#[tokio::test]
async fn import_inserts_rows_in_order_and_aggregates_once() {
    let Some(app) = common::TestApp::spawn().await else {
        return;
    };
    let section_id = app.create_section_fixture().await;

    let response = app
        .client
        .post(format!(
            "{}/sections/{}/items/import",
            app.address, section_id
        ))
        .json(&json!({
            "items": [
                { "item_code": "A", "description": "GROUNDWORKS" },
                {
                    "item_code": "A1",
                    "unit": "m3",
                    "contract_quantity": "10",
                    "final_quantity": "12",
                    "supply_rate": "100",
                    "install_rate": "50"
                },
                {
                    "item_code": "A2",
                    "unit": "m2",
                    "contract_quantity": "5",
                    "final_quantity": "5",
                    "supply_rate": "20"
                }
            ]
        }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.unwrap();
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(items[0]["display_order"], 1);
    assert_eq!(items[2]["display_order"], 3);

    let section = &body["section"];
    assert_eq!(dec(&section["contract_total"]), 1600.0);
    assert_eq!(dec(&section["final_total"]), 1900.0);
    assert_eq!(dec(&section["variation_total"]), 300.0);

    app.cleanup().await;
}

#[tokio::test]
async fn import_rejects_empty_payload() {
    let Some(app) = common::TestApp::spawn().await else {
        return;
    };
    let section_id = app.create_section_fixture().await;

    let response = app
        .client
        .post(format!(
            "{}/sections/{}/items/import",
            app.address, section_id
        ))
        .json(&json!({ "items": [] }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 400);

    app.cleanup().await;
}

#[tokio::test]
async fn item_updates_are_recorded_in_history() {
    let Some(app) = common::TestApp::spawn().await else {
        return;
    };
    let section_id = app.create_section_fixture().await;

    let created = app
        .create_item(
            section_id,
            json!({
                "item_code": "A1",
                "unit": "m3",
                "contract_quantity": "10",
                "supply_rate": "100"
            }),
        )
        .await;
    let item_id = created["item"]["item_id"].as_str().unwrap().to_string();

    let response = app
        .client
        .patch(format!("{}/items/{}", app.address, item_id))
        .json(&json!({ "final_quantity": "12" }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 200);

    let response = app
        .client
        .get(format!("{}/items/{}/history", app.address, item_id))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 200);

    let entries: Vec<Value> = response.json().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(
        Uuid::parse_str(entries[0]["item_id"].as_str().unwrap()).unwrap(),
        Uuid::parse_str(&item_id).unwrap()
    );

    app.cleanup().await;
}

#[tokio::test]
async fn create_item_in_missing_section_returns_404() {
    let Some(app) = common::TestApp::spawn().await else {
        return;
    };

    let response = app
        .client
        .post(format!(
            "{}/sections/00000000-0000-0000-0000-000000000000/items",
            app.address
        ))
        .json(&json!({ "item_code": "A1" }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 404);

    app.cleanup().await;
}
