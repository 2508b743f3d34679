//! Calculation core for final-account line items.
//!
//! Everything here is a pure function of item state: row classification,
//! contract/final/variation amount derivation (including the Prime Cost and
//! P&A override rules), and section roll-up. Persistence lives in
//! `services::database`; handlers never compute amounts themselves.

use crate::models::LineItem;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

/// Row category derived from stored flags and code/unit heuristics.
///
/// Classification is re-derived from current field values on every call;
/// there is no stored "type" column, so editing `unit` can change a row's
/// category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowKind {
    Header,
    Subheader,
    Description,
    Item,
    PrimeCost,
    PaItem,
}

impl RowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RowKind::Header => "header",
            RowKind::Subheader => "subheader",
            RowKind::Description => "description",
            RowKind::Item => "item",
            RowKind::PrimeCost => "prime_cost",
            RowKind::PaItem => "pa_item",
        }
    }

    /// Rows excluded from section totals. This is the single exclusion
    /// predicate shared by display classification and the aggregator.
    pub fn excluded_from_totals(&self) -> bool {
        matches!(self, RowKind::Header | RowKind::Subheader)
    }
}

/// Code shaped like a section heading: one letter followed only by optional
/// digits, no dot (`A`, `B2`).
fn is_header_code(code: &str) -> bool {
    let mut chars = code.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => chars.all(|c| c.is_ascii_digit()),
        _ => false,
    }
}

/// Code shaped like a sub-heading: letter, digits, dot, digits (`A1.2`).
fn is_subheader_code(code: &str) -> bool {
    let Some(first) = code.chars().next() else {
        return false;
    };
    if !first.is_ascii_alphabetic() {
        return false;
    }
    let rest = &code[first.len_utf8()..];
    let Some((left, right)) = rest.split_once('.') else {
        return false;
    };
    !left.is_empty()
        && !right.is_empty()
        && left.chars().all(|c| c.is_ascii_digit())
        && right.chars().all(|c| c.is_ascii_digit())
}

fn is_positive(value: Option<Decimal>) -> bool {
    value.is_some_and(|v| v > Decimal::ZERO)
}

/// True when the row carries any positive quantity or amount, which
/// disqualifies it from the header/subheader patterns.
fn has_positive_value(item: &LineItem) -> bool {
    is_positive(item.contract_quantity)
        || is_positive(item.final_quantity)
        || is_positive(item.contract_amount)
        || is_positive(item.final_amount)
}

/// Classify a line item into exactly one [`RowKind`].
///
/// Precedence: P&A flag, Prime Cost flag, unit present (overrides any code
/// pattern), empty code, header pattern, subheader pattern, item.
pub fn classify(item: &LineItem) -> RowKind {
    if item.is_pa_item {
        return RowKind::PaItem;
    }
    if item.is_prime_cost {
        return RowKind::PrimeCost;
    }
    let unit = item.unit.as_deref().unwrap_or("").trim();
    if !unit.is_empty() {
        return RowKind::Item;
    }
    let code = item.item_code.as_deref().unwrap_or("").trim();
    if code.is_empty() {
        return RowKind::Description;
    }
    if is_header_code(code) && !has_positive_value(item) {
        return RowKind::Header;
    }
    if is_subheader_code(code) && !has_positive_value(item) {
        return RowKind::Subheader;
    }
    RowKind::Item
}

/// Derived amounts for one row. Invariant: `variation == final - contract`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Amounts {
    pub contract_amount: Decimal,
    pub final_amount: Decimal,
    pub variation_amount: Decimal,
}

impl Amounts {
    pub const ZERO: Amounts = Amounts {
        contract_amount: Decimal::ZERO,
        final_amount: Decimal::ZERO,
        variation_amount: Decimal::ZERO,
    };

    fn from_pair(contract: Decimal, fin: Decimal) -> Self {
        Amounts {
            contract_amount: contract,
            final_amount: fin,
            variation_amount: fin - contract,
        }
    }
}

fn or_zero(value: Option<Decimal>) -> Decimal {
    value.unwrap_or(Decimal::ZERO)
}

/// Contract-side base a P&A child draws its percentage from: the parent's
/// allowance, falling back to its stored contract amount.
fn pc_contract_base(parent: &LineItem) -> Decimal {
    parent
        .pc_allowance
        .or(parent.contract_amount)
        .unwrap_or(Decimal::ZERO)
}

/// Derive the three amounts for an item. For P&A items the parent must be
/// the row referenced by `pa_parent_item_id`; with no resolvable parent the
/// amounts are zero.
pub fn derive_amounts(item: &LineItem, parent: Option<&LineItem>) -> Amounts {
    if item.is_pa_item {
        let Some(parent) = parent else {
            return Amounts::ZERO;
        };
        let share = or_zero(item.pa_percentage) / Decimal::ONE_HUNDRED;
        return Amounts::from_pair(
            pc_contract_base(parent) * share,
            or_zero(parent.pc_actual_cost) * share,
        );
    }
    if item.is_prime_cost {
        return Amounts::from_pair(pc_contract_base(item), or_zero(item.pc_actual_cost));
    }
    if item.is_rate_only {
        return Amounts::ZERO;
    }
    let total_rate = or_zero(item.supply_rate) + or_zero(item.install_rate);
    Amounts::from_pair(
        or_zero(item.contract_quantity) * total_rate,
        or_zero(item.final_quantity) * total_rate,
    )
}

/// Rolled-up totals for a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SectionTotals {
    pub contract_total: Decimal,
    pub final_total: Decimal,
    pub variation_total: Decimal,
}

/// Sum amounts over a section's items, resolving P&A parents within the
/// section and skipping header/subheader rows. The variation total is the
/// running sum of per-item variations.
pub fn aggregate_section(items: &[LineItem]) -> SectionTotals {
    let by_id: HashMap<Uuid, &LineItem> = items.iter().map(|i| (i.item_id, i)).collect();

    let mut totals = SectionTotals {
        contract_total: Decimal::ZERO,
        final_total: Decimal::ZERO,
        variation_total: Decimal::ZERO,
    };

    for item in items {
        if classify(item).excluded_from_totals() {
            continue;
        }
        let parent = item
            .pa_parent_item_id
            .and_then(|id| by_id.get(&id).copied());
        let amounts = derive_amounts(item, parent);
        totals.contract_total += amounts.contract_amount;
        totals.final_total += amounts.final_amount;
        totals.variation_total += amounts.variation_amount;
    }

    totals
}
