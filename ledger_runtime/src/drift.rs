//! Drift detection: what a rebuild changed, and whether replay is
//! deterministic.
//!
//! All amounts are fixed-point i64 (SCALE = 10_000). No float arithmetic.

use std::collections::BTreeSet;

use serde::Serialize;

use ledger_kernel::arithmetic::Amount;
use ledger_kernel::domain::LedgerAggregate;
use ledger_kernel::error::KernelError;
use ledger_kernel::events::ChangeNotification;

use crate::config::EngineConfig;
use crate::error::ServiceError;
use crate::replay;

/// Field-by-field difference between a ledger before and after a rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerDrift {
    pub opening_balance_delta: Amount,
    pub current_balance_delta: Amount,
    pub total_credits_delta: Amount,
    pub total_debits_delta: Amount,
    pub transaction_count_delta: i64,
    pub credit_count_delta: i64,
    pub debit_count_delta: i64,
    pub added_transactions: Vec<String>,
    pub removed_transactions: Vec<String>,
}

impl LedgerDrift {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Compare `after` with `before`. A missing `before` counts as an empty
/// ledger with the same opening balance.
pub fn compare_ledgers(before: Option<&LedgerAggregate>, after: &LedgerAggregate) -> Result<LedgerDrift, KernelError> {
    let Some(before) = before else {
        let mut added: Vec<String> = after.transaction_ids.clone();
        added.sort();
        added.dedup();
        return Ok(LedgerDrift {
            opening_balance_delta: Amount::ZERO,
            current_balance_delta: after.current_balance.checked_sub(after.opening_balance)?,
            total_credits_delta: after.total_credits,
            total_debits_delta: after.total_debits,
            transaction_count_delta: count_delta(0, after.transaction_count),
            credit_count_delta: count_delta(0, after.credit_count),
            debit_count_delta: count_delta(0, after.debit_count),
            added_transactions: added,
            removed_transactions: Vec::new(),
        });
    };

    let ids_before: BTreeSet<&str> = before.transaction_ids.iter().map(String::as_str).collect();
    let ids_after: BTreeSet<&str> = after.transaction_ids.iter().map(String::as_str).collect();

    Ok(LedgerDrift {
        opening_balance_delta: after.opening_balance.checked_sub(before.opening_balance)?,
        current_balance_delta: after.current_balance.checked_sub(before.current_balance)?,
        total_credits_delta: after.total_credits.checked_sub(before.total_credits)?,
        total_debits_delta: after.total_debits.checked_sub(before.total_debits)?,
        transaction_count_delta: count_delta(before.transaction_count, after.transaction_count),
        credit_count_delta: count_delta(before.credit_count, after.credit_count),
        debit_count_delta: count_delta(before.debit_count, after.debit_count),
        added_transactions: ids_after.difference(&ids_before).map(|s| s.to_string()).collect(),
        removed_transactions: ids_before.difference(&ids_after).map(|s| s.to_string()).collect(),
    })
}

fn count_delta(before: u64, after: u64) -> i64 {
    let delta = i128::from(after) - i128::from(before);
    i64::try_from(delta).unwrap_or(if delta < 0 { i64::MIN } else { i64::MAX })
}

/// Fingerprints from two independent replays of the same journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeterminismCheck {
    pub first: String,
    pub second: String,
}

impl DeterminismCheck {
    pub fn is_deterministic(&self) -> bool {
        self.first == self.second
    }
}

/// Replay the notifications twice into fresh stores and compare the
/// resulting fingerprints.
pub fn verify_determinism(
    notifications: &[ChangeNotification],
    config: &EngineConfig,
) -> Result<DeterminismCheck, ServiceError> {
    let first = replay::state_fingerprint(&replay::rebuild_store(notifications, config)?)?;
    let second = replay::state_fingerprint(&replay::rebuild_store(notifications, config)?)?;
    Ok(DeterminismCheck { first, second })
}
