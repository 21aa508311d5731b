/// Ledger Kernel — Stock Movement Planning
///
/// Pure planning for purchase receipts and their reversals. The caller
/// reads every position first, asks for a plan, then performs all the
/// writes the plan describes. Nothing here touches storage.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::arithmetic::Quantity;
use crate::domain::{
    stock_history_id, stock_reversal_id, LineItem, MovementType, StockHistoryEntry, Transaction,
};
use crate::error::KernelError;

/// What the caller read for one material before planning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockPosition {
    /// `None` when the material document does not exist.
    pub stock: Option<Quantity>,
    /// The original `in` entry `{tx}_{material}` exists.
    pub receipt_exists: bool,
    /// The `{tx}_{material}_reversal` entry exists.
    pub reversal_exists: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "reason")]
pub enum SkipReason {
    MaterialMissing,
    NonPositiveQuantity { quantity: Quantity },
    AlreadyReceived,
    AlreadyReversed,
}

/// Writes for one material: new stock, one history entry, and for a
/// reversal the original entry to delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockMovement {
    pub material_id: String,
    pub new_stock: Quantity,
    pub entry_id: String,
    pub entry: StockHistoryEntry,
    pub delete_entry_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinePlan {
    Apply(StockMovement),
    Skip { material_id: String, reason: SkipReason },
}

/// Valid line items merged per material, in first-seen order. Invalid
/// items come back separately so the caller can log them.
pub fn consolidate_line_items(items: &[LineItem]) -> Result<(Vec<LineItem>, Vec<LinePlan>), KernelError> {
    let mut merged: Vec<LineItem> = Vec::new();
    let mut skipped = Vec::new();

    for item in items {
        if !item.quantity.is_positive() {
            skipped.push(LinePlan::Skip {
                material_id: item.material_id.clone(),
                reason: SkipReason::NonPositiveQuantity { quantity: item.quantity },
            });
            continue;
        }
        match merged.iter_mut().find(|m| m.material_id == item.material_id) {
            Some(existing) => existing.quantity = existing.quantity.checked_add(item.quantity)?,
            None => merged.push(item.clone()),
        }
    }

    Ok((merged, skipped))
}

/// Material IDs the caller must read before planning.
pub fn materials_touched(tx: &Transaction) -> Vec<String> {
    let mut ids: Vec<String> = tx
        .metadata
        .line_items
        .iter()
        .map(|item| item.material_id.clone())
        .collect();
    ids.sort();
    ids.dedup();
    ids
}

/// Plan the `in` movements for a newly created purchase.
///
/// With `idempotent` set, a line whose receipt entry already exists is skipped.
pub fn plan_receipt(
    tx: &Transaction,
    positions: &BTreeMap<String, StockPosition>,
    idempotent: bool,
) -> Result<Vec<LinePlan>, KernelError> {
    let (items, mut plans) = consolidate_line_items(&tx.metadata.line_items)?;

    for item in items {
        let Some((position, before)) = lookup(positions, &item.material_id) else {
            plans.push(missing(&item));
            continue;
        };
        if idempotent && position.receipt_exists {
            plans.push(LinePlan::Skip {
                material_id: item.material_id.clone(),
                reason: SkipReason::AlreadyReceived,
            });
            continue;
        }

        let after = before.checked_add(item.quantity)?;
        plans.push(LinePlan::Apply(StockMovement {
            material_id: item.material_id.clone(),
            new_stock: after,
            entry_id: stock_history_id(&tx.id, &item.material_id),
            entry: StockHistoryEntry {
                material_id: item.material_id.clone(),
                transaction_id: tx.id.clone(),
                movement: MovementType::In,
                quantity: item.quantity,
                balance_before: before,
                balance_after: after,
                reason: format!("purchase {}", tx.id),
                unit_of_measurement: item.unit_of_measurement.clone(),
            },
            delete_entry_id: None,
        }));
    }

    Ok(plans)
}

/// Plan the `out` movements reversing a deleted purchase.
///
/// Stock is clamped at zero. With `idempotent` set, a line whose reversal
/// entry already exists is skipped so duplicate delete delivery is a no-op.
pub fn plan_reversal(
    tx: &Transaction,
    positions: &BTreeMap<String, StockPosition>,
    idempotent: bool,
) -> Result<Vec<LinePlan>, KernelError> {
    let (items, mut plans) = consolidate_line_items(&tx.metadata.line_items)?;

    for item in items {
        let Some((position, before)) = lookup(positions, &item.material_id) else {
            plans.push(missing(&item));
            continue;
        };
        if idempotent && position.reversal_exists {
            plans.push(LinePlan::Skip {
                material_id: item.material_id.clone(),
                reason: SkipReason::AlreadyReversed,
            });
            continue;
        }

        let after = before.saturating_sub_floor_zero(item.quantity);
        plans.push(LinePlan::Apply(StockMovement {
            material_id: item.material_id.clone(),
            new_stock: after,
            entry_id: stock_reversal_id(&tx.id, &item.material_id),
            entry: StockHistoryEntry {
                material_id: item.material_id.clone(),
                transaction_id: tx.id.clone(),
                movement: MovementType::Out,
                quantity: item.quantity,
                balance_before: before,
                balance_after: after,
                reason: format!("purchase reversal {}", tx.id),
                unit_of_measurement: item.unit_of_measurement.clone(),
            },
            delete_entry_id: position
                .receipt_exists
                .then(|| stock_history_id(&tx.id, &item.material_id)),
        }));
    }

    Ok(plans)
}

fn lookup<'a>(
    positions: &'a BTreeMap<String, StockPosition>,
    material_id: &str,
) -> Option<(&'a StockPosition, Quantity)> {
    let position = positions.get(material_id)?;
    position.stock.map(|stock| (position, stock))
}

fn missing(item: &LineItem) -> LinePlan {
    LinePlan::Skip {
        material_id: item.material_id.clone(),
        reason: SkipReason::MaterialMissing,
    }
}
