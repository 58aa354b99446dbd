use std::collections::{HashMap, HashSet};
use std::fmt;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::menu::{MenuItemDetail, MenuItemId, VariantOptionId};
use crate::domain::order::{OrderLine, SelectedOption};

pub const MAX_LINE_QUANTITY: u32 = 99;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineRequest {
    pub item_id: MenuItemId,
    pub quantity: u32,
    #[serde(default)]
    pub option_ids: Vec<VariantOptionId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedOrder {
    pub lines: Vec<OrderLine>,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub currency: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrderIssue {
    EmptyOrder,
    InvalidQuantity { item_id: String, quantity: u32 },
    UnknownItem { item_id: String },
    ItemUnavailable { item_id: String },
    UnknownOption { item_id: String, option_id: String },
    OptionUnavailable { item_id: String, option_id: String },
    DuplicateOption { item_id: String, option_id: String },
    MissingRequiredGroup { item_id: String, group: String },
    TooManySelections { item_id: String, group: String, max_selections: u32 },
}

impl fmt::Display for OrderIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyOrder => write!(f, "order has no lines"),
            Self::InvalidQuantity { item_id, quantity } => write!(
                f,
                "item {item_id}: quantity {quantity} is outside 1..={MAX_LINE_QUANTITY}"
            ),
            Self::UnknownItem { item_id } => write!(f, "item {item_id} does not exist"),
            Self::ItemUnavailable { item_id } => write!(f, "item {item_id} is unavailable"),
            Self::UnknownOption { item_id, option_id } => {
                write!(f, "item {item_id}: option {option_id} does not belong to this item")
            }
            Self::OptionUnavailable { item_id, option_id } => {
                write!(f, "item {item_id}: option {option_id} is unavailable")
            }
            Self::DuplicateOption { item_id, option_id } => {
                write!(f, "item {item_id}: option {option_id} selected more than once")
            }
            Self::MissingRequiredGroup { item_id, group } => {
                write!(f, "item {item_id}: a selection from `{group}` is required")
            }
            Self::TooManySelections { item_id, group, max_selections } => write!(
                f,
                "item {item_id}: at most {max_selections} selection(s) allowed from `{group}`"
            ),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("order rejected: {}", summarize(.issues))]
pub struct OrderValidationError {
    pub issues: Vec<OrderIssue>,
}

fn summarize(issues: &[OrderIssue]) -> String {
    issues.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

/// Two decimal places, midpoint away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Validates every requested line against the menu and prices the order.
///
/// All problems are collected before returning so the caller can show them at once.
pub fn price_order(
    requests: &[OrderLineRequest],
    menu: &HashMap<MenuItemId, MenuItemDetail>,
    tax_rate_pct: Decimal,
    currency: &str,
) -> Result<PricedOrder, OrderValidationError> {
    let mut issues = Vec::new();
    if requests.is_empty() {
        issues.push(OrderIssue::EmptyOrder);
    }

    let mut lines = Vec::with_capacity(requests.len());
    for request in requests {
        if let Some(line) = price_line(request, menu, &mut issues) {
            lines.push(line);
        }
    }

    if !issues.is_empty() {
        return Err(OrderValidationError { issues });
    }

    let subtotal: Decimal = lines.iter().map(|line| line.line_total).sum();
    let tax = round_money(subtotal * tax_rate_pct / Decimal::ONE_HUNDRED);
    Ok(PricedOrder { lines, subtotal, tax, total: subtotal + tax, currency: currency.to_string() })
}

fn price_line(
    request: &OrderLineRequest,
    menu: &HashMap<MenuItemId, MenuItemDetail>,
    issues: &mut Vec<OrderIssue>,
) -> Option<OrderLine> {
    let item_id = request.item_id.0.clone();
    let before = issues.len();

    if request.quantity == 0 || request.quantity > MAX_LINE_QUANTITY {
        issues.push(OrderIssue::InvalidQuantity {
            item_id: item_id.clone(),
            quantity: request.quantity,
        });
    }

    let Some(detail) = menu.get(&request.item_id) else {
        issues.push(OrderIssue::UnknownItem { item_id });
        return None;
    };
    if !detail.item.available {
        issues.push(OrderIssue::ItemUnavailable { item_id: item_id.clone() });
    }

    let mut seen = HashSet::new();
    let mut per_group: HashMap<&str, u32> = HashMap::new();
    let mut selected = Vec::with_capacity(request.option_ids.len());

    for option_id in &request.option_ids {
        if !seen.insert(option_id) {
            issues.push(OrderIssue::DuplicateOption {
                item_id: item_id.clone(),
                option_id: option_id.0.clone(),
            });
            continue;
        }
        let Some((group, option)) = detail.find_option(option_id) else {
            issues.push(OrderIssue::UnknownOption {
                item_id: item_id.clone(),
                option_id: option_id.0.clone(),
            });
            continue;
        };
        if !option.available {
            issues.push(OrderIssue::OptionUnavailable {
                item_id: item_id.clone(),
                option_id: option_id.0.clone(),
            });
        }
        *per_group.entry(group.group.id.0.as_str()).or_default() += 1;
        selected.push(SelectedOption {
            option_id: option.id.clone(),
            group_name: group.group.name.clone(),
            option_name: option.name.clone(),
            price_delta: option.price_delta,
        });
    }

    for group in &detail.groups {
        let count = per_group.get(group.group.id.0.as_str()).copied().unwrap_or(0);
        if group.group.required && count == 0 {
            issues.push(OrderIssue::MissingRequiredGroup {
                item_id: item_id.clone(),
                group: group.group.name.clone(),
            });
        }
        if count > group.group.max_selections {
            issues.push(OrderIssue::TooManySelections {
                item_id: item_id.clone(),
                group: group.group.name.clone(),
                max_selections: group.group.max_selections,
            });
        }
    }

    if issues.len() > before {
        return None;
    }

    let unit_price =
        detail.item.base_price + selected.iter().map(|option| option.price_delta).sum::<Decimal>();
    Some(OrderLine {
        id: format!("OLN-{}", Uuid::new_v4()),
        item_id: detail.item.id.clone(),
        item_name: detail.item.name.clone(),
        quantity: request.quantity,
        unit_price,
        line_total: unit_price * Decimal::from(request.quantity),
        options: selected,
    })
}
