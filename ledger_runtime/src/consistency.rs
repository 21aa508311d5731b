//! Ledger consistency checker and repair executor.
//!
//! Checking is read-only. Repair re-reads the aggregate and entity inside
//! one atomic transaction and applies each selected fix best-effort: a
//! failing fix is recorded and the rest still apply.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{info, warn};

use ledger_kernel::consistency::{check_ledger, check_missing_ledger, ConsistencyReport};
use ledger_kernel::domain::{EntityBalance, LedgerAggregate};
use ledger_kernel::fixes::{BalanceDirection, LedgerFix, LedgerRepairState, RebuildInput};
use ledger_kernel::rebuild::{rebuild_aggregate, LedgerKey};
use ledger_kernel::state::carried_opening_balance;

use crate::config::EngineConfig;
use crate::documents;
use crate::error::ServiceError;
use crate::rebuild::scan_transactions;
use crate::store::{load, run_transaction, DocumentStore};

/// Which fix kinds a repair may apply. Empty means all of them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixSelection {
    kinds: BTreeSet<String>,
}

impl FixSelection {
    pub fn all() -> Self {
        Self::default()
    }

    /// Reject names outside `known`.
    pub fn from_kinds<I, K>(kinds: I, known: &[&str]) -> Result<Self, ServiceError>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let mut selected = BTreeSet::new();
        for kind in kinds {
            let kind = kind.as_ref();
            if !known.contains(&kind) {
                return Err(ServiceError::Validation(format!(
                    "unknown fix type {kind:?}, expected one of {}",
                    known.join(", ")
                )));
            }
            selected.insert(kind.to_string());
        }
        Ok(Self { kinds: selected })
    }

    pub fn includes(&self, kind: &str) -> bool {
        self.kinds.is_empty() || self.kinds.contains(kind)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairReport<F> {
    /// At least one fix applied and none failed.
    pub repaired: bool,
    pub dry_run: bool,
    /// Selected fixes, whether or not they were applied.
    pub fixes: Vec<F>,
    pub fixes_applied: Vec<F>,
    pub errors: Vec<String>,
}

impl<F: Clone> RepairReport<F> {
    pub fn dry_run(fixes: Vec<F>) -> Self {
        Self {
            repaired: false,
            dry_run: true,
            fixes,
            fixes_applied: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn applied(fixes: Vec<F>, fixes_applied: Vec<F>, errors: Vec<String>) -> Self {
        Self {
            repaired: !fixes_applied.is_empty() && errors.is_empty(),
            dry_run: false,
            fixes,
            fixes_applied,
            errors,
        }
    }
}

pub fn check_consistency<S>(
    store: &S,
    config: &EngineConfig,
    key: &LedgerKey,
) -> Result<ConsistencyReport<LedgerFix>, ServiceError>
where
    S: DocumentStore + ?Sized,
{
    let aggregate: Option<LedgerAggregate> = load(store, &documents::ledger(key))?;
    let entity: Option<EntityBalance> =
        load(store, &documents::entity(key.ledger_type, &key.organization_id, &key.entity_id))?;
    let Some(aggregate) = aggregate else {
        // Compare the entity with what a recalculation would write.
        let previous: Option<LedgerAggregate> = load(store, &documents::previous_ledger(key))?;
        let transactions = scan_transactions(store, &key.organization_id)?;
        let rebuilt = rebuild_aggregate(key, carried_opening_balance(previous.as_ref()), &transactions)?;
        return Ok(check_missing_ledger(
            &key.ledger_id(),
            &rebuilt,
            entity.as_ref(),
            config.balance_policy(),
        ));
    };
    Ok(check_ledger(
        &key.ledger_id(),
        Some(&aggregate),
        entity.as_ref(),
        config.balance_policy(),
    ))
}

pub fn repair<S>(
    store: &S,
    config: &EngineConfig,
    key: &LedgerKey,
    selection: &FixSelection,
    auto_fix: bool,
) -> Result<RepairReport<LedgerFix>, ServiceError>
where
    S: DocumentStore + ?Sized,
{
    let report = check_consistency(store, config, key)?;
    let selected: Vec<LedgerFix> = report
        .fixes
        .into_iter()
        .filter(|fix| selection.includes(fix.kind()))
        .collect();
    if !auto_fix {
        return Ok(RepairReport::dry_run(selected));
    }
    if selected.is_empty() {
        return Ok(RepairReport::applied(selected, Vec::new(), Vec::new()));
    }

    let recalculate = selected.contains(&LedgerFix::RecalculateTotals);
    let ledger_doc = documents::ledger(key);
    let entity_doc = documents::entity(key.ledger_type, &key.organization_id, &key.entity_id);
    let (applied, errors) = run_transaction(store, config.store.max_transaction_attempts, |txn| {
        let aggregate: Option<LedgerAggregate> = txn.get(&ledger_doc)?;
        let entity: Option<EntityBalance> = txn.get(&entity_doc)?;

        // The log is scanned after the aggregate read so that a create
        // committing in between fails this attempt instead of being lost.
        let rebuild_input = if recalculate {
            let previous: Option<LedgerAggregate> = txn.get(&documents::previous_ledger(key))?;
            Some(RebuildInput {
                key: key.clone(),
                transactions: scan_transactions(store, &key.organization_id)?,
                seed_opening_balance: carried_opening_balance(previous.as_ref()),
            })
        } else {
            None
        };

        let mut state = LedgerRepairState::new(aggregate, entity);

        let mut applied = Vec::new();
        let mut errors = Vec::new();
        for fix in &selected {
            match state.apply(fix, rebuild_input.as_ref()) {
                Ok(()) => applied.push(fix.clone()),
                Err(e) => errors.push(format!("{}: {e}", fix.kind())),
            }
        }

        if let (true, Some(aggregate)) = (state.aggregate_dirty, &state.aggregate) {
            txn.put(ledger_doc.clone(), aggregate)?;
        }
        if let (true, Some(entity)) = (state.entity_dirty, &state.entity) {
            txn.put(entity_doc.clone(), entity)?;
        }
        Ok::<_, ServiceError>((applied, errors))
    })?;

    for fix in &applied {
        if let LedgerFix::SyncBalance {
            direction: BalanceDirection::LedgerFromEntity,
            entity_balance,
            ledger_balance,
        } = fix
        {
            warn!(
                ledger_id = %key.ledger_id(),
                %entity_balance,
                %ledger_balance,
                "Ledger opening balance overwritten from entity balance"
            );
        }
    }
    info!(
        ledger_id = %key.ledger_id(),
        applied = applied.len(),
        failed = errors.len(),
        "Ledger repair finished"
    );
    Ok(RepairReport::applied(selected, applied, errors))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_selection_means_everything() {
        let selection = FixSelection::all();
        assert!(LedgerFix::KINDS.iter().all(|kind| selection.includes(kind)));
    }

    #[test]
    fn selection_rejects_unknown_kinds() {
        let ok = FixSelection::from_kinds(["sync_balance"], &LedgerFix::KINDS).unwrap();
        assert!(ok.includes("sync_balance"));
        assert!(!ok.includes("recalculate_totals"));

        let err = FixSelection::from_kinds(["sync_everything"], &LedgerFix::KINDS).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn repaired_requires_an_applied_fix_and_no_errors() {
        let fix = LedgerFix::RecalculateTotals;
        assert!(RepairReport::applied(vec![fix.clone()], vec![fix.clone()], vec![]).repaired);
        assert!(!RepairReport::<LedgerFix>::applied(vec![], vec![], vec![]).repaired);
        assert!(!RepairReport::applied(vec![fix.clone()], vec![fix], vec!["x".to_string()]).repaired);
    }
}
