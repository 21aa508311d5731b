//! Incremental stock mutator for purchase transactions.
//!
//! Every material and history entry a purchase touches is read first.
//! The kernel then plans the movements and all writes commit together:
//! stock, the history entry, and on reversal the deletion of the original
//! `in` entry.

use std::collections::BTreeMap;

use tracing::{info, warn};

use ledger_kernel::domain::{Material, Transaction};
use ledger_kernel::error::KernelError;
use ledger_kernel::events::ChangeKind;
use ledger_kernel::invariants::validate_stock;
use ledger_kernel::stock::{materials_touched, plan_receipt, plan_reversal, LinePlan, SkipReason, StockPosition};

use crate::config::EngineConfig;
use crate::documents;
use crate::error::ServiceError;
use crate::store::{run_transaction, DocumentStore};

/// Plans that were committed, one per consolidated line item.
pub fn apply_stock_change<S>(
    store: &S,
    config: &EngineConfig,
    kind: ChangeKind,
    tx: &Transaction,
) -> Result<Vec<LinePlan>, ServiceError>
where
    S: DocumentStore + ?Sized,
{
    let material_ids = materials_touched(tx);
    let idempotent = config.stock.idempotent_reversal;

    run_transaction(store, config.store.max_transaction_attempts, |txn| {
        let mut materials: BTreeMap<String, Material> = BTreeMap::new();
        let mut positions: BTreeMap<String, StockPosition> = BTreeMap::new();
        for material_id in &material_ids {
            let material: Option<Material> = txn.get(&documents::material(&tx.organization_id, material_id))?;
            let position = StockPosition {
                stock: material.as_ref().map(|m| m.stock),
                receipt_exists: txn.exists(&documents::receipt_entry(tx, material_id))?,
                reversal_exists: txn.exists(&documents::reversal_entry(tx, material_id))?,
            };
            positions.insert(material_id.clone(), position);
            if let Some(material) = material {
                materials.insert(material_id.clone(), material);
            }
        }

        let plans = match kind {
            ChangeKind::Created => plan_receipt(tx, &positions, idempotent)?,
            ChangeKind::Deleted => plan_reversal(tx, &positions, idempotent)?,
        };

        for plan in &plans {
            let LinePlan::Apply(movement) = plan else {
                continue;
            };
            let Some(material) = materials.get_mut(&movement.material_id) else {
                continue;
            };
            material.stock = movement.new_stock;
            validate_stock(material).map_err(KernelError::from)?;

            txn.put(documents::material(&tx.organization_id, &movement.material_id), &*material)?;
            txn.put(
                documents::history_entry(&tx.organization_id, &movement.entry_id),
                &movement.entry,
            )?;
            if let Some(original) = &movement.delete_entry_id {
                txn.delete(documents::history_entry(&tx.organization_id, original));
            }
        }
        Ok(plans)
    })
}

/// Log the outcome of each committed or skipped line.
pub fn log_plans(kind: ChangeKind, tx: &Transaction, plans: &[LinePlan]) {
    for plan in plans {
        match plan {
            LinePlan::Apply(movement) => {
                info!(
                    transaction_id = %tx.id,
                    material_id = %movement.material_id,
                    quantity = %movement.entry.quantity,
                    balance_before = %movement.entry.balance_before,
                    balance_after = %movement.entry.balance_after,
                    "Stock {}",
                    if kind == ChangeKind::Created { "received" } else { "reversed" }
                );
                if kind == ChangeKind::Deleted && movement.delete_entry_id.is_none() {
                    warn!(
                        transaction_id = %tx.id,
                        material_id = %movement.material_id,
                        "Original receipt entry missing, reversal applied anyway"
                    );
                }
            }
            LinePlan::Skip { material_id, reason } => match reason {
                SkipReason::MaterialMissing => {
                    warn!(transaction_id = %tx.id, material_id = %material_id, "Material not found, line item skipped");
                }
                SkipReason::NonPositiveQuantity { quantity } => {
                    warn!(
                        transaction_id = %tx.id,
                        material_id = %material_id,
                        quantity = %quantity,
                        "Non-positive quantity, line item skipped"
                    );
                }
                SkipReason::AlreadyReceived => {
                    info!(transaction_id = %tx.id, material_id = %material_id, "Receipt already recorded, skipped");
                }
                SkipReason::AlreadyReversed => {
                    info!(transaction_id = %tx.id, material_id = %material_id, "Reversal already recorded, skipped");
                }
            },
        }
    }
}
