//! Line item model: one billed unit of work within a section.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One row of the final-account spreadsheet.
///
/// `contract_amount`, `final_amount`, and `variation_amount` are derived by
/// the calculation core on every mutation; `variation == final - contract`
/// holds at all times. Quantity and rate fields stay nullable in storage so
/// "not yet entered" is distinguishable from an explicit zero.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LineItem {
    pub item_id: Uuid,
    pub section_id: Uuid,
    pub item_code: Option<String>,
    pub description: Option<String>,
    pub unit: Option<String>,
    pub contract_quantity: Option<Decimal>,
    pub final_quantity: Option<Decimal>,
    pub supply_rate: Option<Decimal>,
    pub install_rate: Option<Decimal>,
    pub contract_amount: Option<Decimal>,
    pub final_amount: Option<Decimal>,
    pub variation_amount: Option<Decimal>,
    /// Suppresses quantity-based calculation; amounts are forced to zero.
    pub is_rate_only: bool,
    pub is_prime_cost: bool,
    pub pc_allowance: Option<Decimal>,
    pub pc_actual_cost: Option<Decimal>,
    pub is_pa_item: bool,
    /// Prime Cost row this P&A item draws its percentage from.
    pub pa_parent_item_id: Option<Uuid>,
    pub pa_percentage: Option<Decimal>,
    pub display_order: i32,
    pub shop_subsection_id: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl LineItem {
    /// Build a new row from creation input. Derived amounts start unset and
    /// are filled in by the calculation core before the row is persisted.
    pub fn new(section_id: Uuid, display_order: i32, input: &CreateLineItem) -> Self {
        let now = Utc::now();
        LineItem {
            item_id: Uuid::new_v4(),
            section_id,
            item_code: input.item_code.clone(),
            description: input.description.clone(),
            unit: input.unit.clone(),
            contract_quantity: input.contract_quantity,
            final_quantity: input.final_quantity,
            supply_rate: input.supply_rate,
            install_rate: input.install_rate,
            contract_amount: None,
            final_amount: None,
            variation_amount: None,
            is_rate_only: input.is_rate_only,
            is_prime_cost: input.is_prime_cost,
            pc_allowance: input.pc_allowance,
            pc_actual_cost: input.pc_actual_cost,
            is_pa_item: input.is_pa_item,
            pa_parent_item_id: input.pa_parent_item_id,
            pa_percentage: input.pa_percentage,
            display_order,
            shop_subsection_id: input.shop_subsection_id,
            created_utc: now,
            updated_utc: now,
        }
    }

    /// Merge a partial update onto the stored row. Absent fields keep their
    /// current value; an explicit JSON `null` clears a nullable field back to
    /// "not yet entered".
    pub fn apply(&mut self, input: &UpdateLineItem) {
        if let Some(v) = &input.item_code {
            self.item_code = v.clone();
        }
        if let Some(v) = &input.description {
            self.description = v.clone();
        }
        if let Some(v) = &input.unit {
            self.unit = v.clone();
        }
        if let Some(v) = input.contract_quantity {
            self.contract_quantity = v;
        }
        if let Some(v) = input.final_quantity {
            self.final_quantity = v;
        }
        if let Some(v) = input.supply_rate {
            self.supply_rate = v;
        }
        if let Some(v) = input.install_rate {
            self.install_rate = v;
        }
        if let Some(v) = input.is_rate_only {
            self.is_rate_only = v;
        }
        if let Some(v) = input.is_prime_cost {
            self.is_prime_cost = v;
        }
        if let Some(v) = input.pc_allowance {
            self.pc_allowance = v;
        }
        if let Some(v) = input.pc_actual_cost {
            self.pc_actual_cost = v;
        }
        if let Some(v) = input.is_pa_item {
            self.is_pa_item = v;
        }
        if let Some(v) = input.pa_parent_item_id {
            self.pa_parent_item_id = v;
        }
        if let Some(v) = input.pa_percentage {
            self.pa_percentage = v;
        }
        if let Some(v) = input.display_order {
            self.display_order = v;
        }
        if let Some(v) = input.shop_subsection_id {
            self.shop_subsection_id = v;
        }

        // Converting a P&A row back to a plain row drops its parent link so
        // the merged row stays valid without the client spelling out nulls.
        if input.is_pa_item == Some(false) {
            self.pa_parent_item_id = None;
            self.pa_percentage = None;
        }
    }
}

/// Input for creating a line item. All fields beyond the row position are
/// optional so an "add row" click can insert a blank row.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CreateLineItem {
    pub item_code: Option<String>,
    pub description: Option<String>,
    pub unit: Option<String>,
    pub contract_quantity: Option<Decimal>,
    pub final_quantity: Option<Decimal>,
    pub supply_rate: Option<Decimal>,
    pub install_rate: Option<Decimal>,
    #[serde(default)]
    pub is_rate_only: bool,
    #[serde(default)]
    pub is_prime_cost: bool,
    pub pc_allowance: Option<Decimal>,
    pub pc_actual_cost: Option<Decimal>,
    #[serde(default)]
    pub is_pa_item: bool,
    pub pa_parent_item_id: Option<Uuid>,
    pub pa_percentage: Option<Decimal>,
    pub shop_subsection_id: Option<Uuid>,
}

/// Input for a per-cell partial update. Absent fields keep their stored
/// value; derived amounts are always recomputed from the merged row.
///
/// Nullable columns use a double `Option` so a field that is absent from the
/// body (outer `None`, keep) is distinguishable from an explicit `null`
/// (`Some(None)`, clear). "Row not measured yet" and "quantity of zero" are
/// different states, so a PATCH must be able to express both.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateLineItem {
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub item_code: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub unit: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub contract_quantity: Option<Option<Decimal>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub final_quantity: Option<Option<Decimal>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub supply_rate: Option<Option<Decimal>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub install_rate: Option<Option<Decimal>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_rate_only: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_prime_cost: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub pc_allowance: Option<Option<Decimal>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub pc_actual_cost: Option<Option<Decimal>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_pa_item: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub pa_parent_item_id: Option<Option<Uuid>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub pa_percentage: Option<Option<Decimal>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_order: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub shop_subsection_id: Option<Option<Uuid>>,
}

/// Deserialize a field that is present in the body into `Some(inner)`, where
/// `inner` is `None` for an explicit `null`. Absent fields never reach this
/// function; `#[serde(default)]` leaves them as the outer `None`.
fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: serde::Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn stored_pa_item(parent_id: Uuid) -> LineItem {
        let mut item = LineItem::new(
            Uuid::new_v4(),
            1,
            &CreateLineItem {
                description: Some("Attendance on services".to_string()),
                is_pa_item: true,
                pa_parent_item_id: Some(parent_id),
                pa_percentage: Some(dec!(15)),
                ..CreateLineItem::default()
            },
        );
        item.final_quantity = Some(dec!(12));
        item
    }

    #[test]
    fn absent_fields_keep_stored_values() {
        let parent_id = Uuid::new_v4();
        let mut item = stored_pa_item(parent_id);

        let input: UpdateLineItem =
            serde_json::from_value(serde_json::json!({ "unit": "m2" })).unwrap();
        item.apply(&input);

        assert_eq!(item.unit.as_deref(), Some("m2"));
        assert_eq!(item.pa_parent_item_id, Some(parent_id));
        assert_eq!(item.pa_percentage, Some(dec!(15)));
    }

    #[test]
    fn explicit_null_clears_a_nullable_field() {
        let mut item = stored_pa_item(Uuid::new_v4());
        assert_eq!(item.final_quantity, Some(dec!(12)));

        let input: UpdateLineItem =
            serde_json::from_value(serde_json::json!({ "final_quantity": null })).unwrap();
        assert_eq!(input.final_quantity, Some(None));
        assert!(input.contract_quantity.is_none());

        item.apply(&input);
        assert_eq!(item.final_quantity, None);
    }

    #[test]
    fn dropping_pa_flag_clears_parent_link_and_percentage() {
        let mut item = stored_pa_item(Uuid::new_v4());

        let input: UpdateLineItem =
            serde_json::from_value(serde_json::json!({ "is_pa_item": false })).unwrap();
        item.apply(&input);

        assert!(!item.is_pa_item);
        assert_eq!(item.pa_parent_item_id, None);
        assert_eq!(item.pa_percentage, None);
    }

    #[test]
    fn history_payload_records_only_supplied_fields() {
        let input: UpdateLineItem = serde_json::from_value(serde_json::json!({
            "supply_rate": "100",
            "install_rate": null,
        }))
        .unwrap();

        let payload = serde_json::to_value(&input).unwrap();
        let fields = payload.as_object().unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields["supply_rate"], serde_json::json!("100"));
        assert!(fields["install_rate"].is_null());
    }
}
