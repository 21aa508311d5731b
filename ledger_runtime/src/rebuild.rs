//! Rebuild engine: recompute ledger aggregates from the transaction log.
//!
//! Each attempt of the atomic transaction reads the aggregate first and
//! then scans the log. A create that commits to the aggregate after that
//! read fails the commit, and the retry rescans, so a rebuild never
//! writes over a transaction it did not see. `openingBalance` is read
//! from the existing aggregate and never recomputed.

use serde::Serialize;
use tracing::{error, info};

use ledger_kernel::domain::{FiscalPeriod, LedgerAggregate, LedgerType, Transaction};
use ledger_kernel::hashing::canonical_hash;
use ledger_kernel::rebuild::{ledger_keys, rebuild_aggregate, LedgerKey};
use ledger_kernel::state::carried_opening_balance;

use crate::config::EngineConfig;
use crate::documents;
use crate::drift::{compare_ledgers, LedgerDrift};
use crate::error::{ServiceError, StoreError};
use crate::store::{load_all, run_transaction, Collection, DocumentStore};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildReport {
    pub ledger_id: String,
    pub aggregate: LedgerAggregate,
    pub drift: LedgerDrift,
    /// `None` when no aggregate existed before the rebuild.
    pub fingerprint_before: Option<String>,
    pub fingerprint_after: String,
}

impl RebuildReport {
    pub fn changed(&self) -> bool {
        self.fingerprint_before.as_deref() != Some(self.fingerprint_after.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildAllReport {
    pub rebuilt: Vec<RebuildReport>,
    pub errors: Vec<String>,
}

/// The organization's full transaction log.
pub fn scan_transactions<S>(store: &S, organization_id: &str) -> Result<Vec<Transaction>, StoreError>
where
    S: DocumentStore + ?Sized,
{
    load_all(store, Collection::Transactions, organization_id)
}

pub fn rebuild_ledger<S>(store: &S, config: &EngineConfig, key: &LedgerKey) -> Result<RebuildReport, ServiceError>
where
    S: DocumentStore + ?Sized,
{
    rebuild_one(store, config, key)
}

/// Rebuild every ledger of one type and period in an organization: those
/// with transactions in the log and those with an existing aggregate.
pub fn rebuild_all<S>(
    store: &S,
    config: &EngineConfig,
    organization_id: &str,
    ledger_type: LedgerType,
    fiscal_period: &FiscalPeriod,
) -> Result<RebuildAllReport, ServiceError>
where
    S: DocumentStore + ?Sized,
{
    let transactions = scan_transactions(store, organization_id)?;
    let existing: Vec<LedgerAggregate> = load_all(store, Collection::ledgers(ledger_type), organization_id)?;

    let mut keys: Vec<LedgerKey> = ledger_keys(&transactions)
        .into_iter()
        .filter(|key| key.ledger_type == ledger_type && &key.fiscal_period == fiscal_period)
        .collect();
    keys.extend(
        existing
            .iter()
            .filter(|agg| &agg.fiscal_period == fiscal_period)
            .map(|agg| LedgerKey {
                ledger_type,
                organization_id: organization_id.to_string(),
                entity_id: agg.entity_id.clone(),
                fiscal_period: agg.fiscal_period.clone(),
            }),
    );
    keys.sort();
    keys.dedup();

    let mut report = RebuildAllReport::default();
    for key in &keys {
        match rebuild_one(store, config, key) {
            Ok(rebuilt) => report.rebuilt.push(rebuilt),
            Err(e) => {
                error!(ledger_id = %key.ledger_id(), error = %e, "Ledger rebuild failed");
                report.errors.push(format!("{}: {e}", key.ledger_id()));
            }
        }
    }
    info!(
        organization_id,
        ledger_type = %ledger_type,
        fiscal_period = %fiscal_period,
        rebuilt = report.rebuilt.len(),
        failed = report.errors.len(),
        "Ledger rebuild finished"
    );
    Ok(report)
}

fn rebuild_one<S>(store: &S, config: &EngineConfig, key: &LedgerKey) -> Result<RebuildReport, ServiceError>
where
    S: DocumentStore + ?Sized,
{
    let ledger_doc = documents::ledger(key);
    let report = run_transaction(store, config.store.max_transaction_attempts, |txn| {
        let existing: Option<LedgerAggregate> = txn.get(&ledger_doc)?;
        let opening = match &existing {
            Some(agg) => agg.opening_balance,
            None => {
                let previous: Option<LedgerAggregate> = txn.get(&documents::previous_ledger(key))?;
                carried_opening_balance(previous.as_ref())
            }
        };

        // Scanned after the aggregate read; see the module docs.
        let transactions = scan_transactions(store, &key.organization_id)?;
        let aggregate = rebuild_aggregate(key, opening, &transactions)?;
        let drift = compare_ledgers(existing.as_ref(), &aggregate)?;
        txn.put(ledger_doc.clone(), &aggregate)?;

        Ok::<_, ServiceError>(RebuildReport {
            ledger_id: key.ledger_id(),
            fingerprint_before: existing.as_ref().map(canonical_hash),
            fingerprint_after: canonical_hash(&aggregate),
            aggregate,
            drift,
        })
    })?;

    if report.changed() {
        info!(
            ledger_id = %report.ledger_id,
            balance_delta = %report.drift.current_balance_delta,
            added = report.drift.added_transactions.len(),
            removed = report.drift.removed_transactions.len(),
            "Ledger rebuilt with changes"
        );
    }
    Ok(report)
}
