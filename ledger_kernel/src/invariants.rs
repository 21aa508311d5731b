/// Ledger Kernel — Invariant Checks
///
/// Every check returns a typed violation instead of aborting, so the
/// same rules serve both the transition guard (first failure) and the
/// consistency checker (all failures).

use std::collections::BTreeSet;

use crate::arithmetic::{Amount, ArithmeticError, Quantity};
use crate::domain::{LedgerAggregate, Material};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    #[error(
        "[INVARIANT:balance_equation] ledger {ledger_id}: currentBalance {actual} != expected {expected}"
    )]
    BalanceEquation {
        ledger_id: String,
        expected: Amount,
        actual: Amount,
    },
    #[error("[INVARIANT:balance_equation] ledger {ledger_id}: totals overflow ({source})")]
    BalanceOverflow {
        ledger_id: String,
        source: ArithmeticError,
    },
    #[error(
        "[INVARIANT:count_split] ledger {ledger_id}: creditCount {credit_count} + debitCount {debit_count} != transactionCount {transaction_count}"
    )]
    CountSplit {
        ledger_id: String,
        transaction_count: u64,
        credit_count: u64,
        debit_count: u64,
    },
    #[error(
        "[INVARIANT:id_set_size] ledger {ledger_id}: transactionCount {transaction_count} != {id_count} transaction IDs"
    )]
    IdSetSize {
        ledger_id: String,
        transaction_count: u64,
        id_count: u64,
    },
    #[error("[INVARIANT:duplicate_ids] ledger {ledger_id}: duplicate transaction IDs {duplicates:?}")]
    DuplicateIds {
        ledger_id: String,
        duplicates: Vec<String>,
    },
    #[error("[INVARIANT:negative_totals] ledger {ledger_id}: totals must be non-negative")]
    NegativeTotals { ledger_id: String },
    #[error("[INVARIANT:negative_stock] material {material_id}: stock {stock} is negative")]
    NegativeStock { material_id: String, stock: Quantity },
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// `opening + credits − debits` (payables) or `opening + debits − credits`
/// (receivables).
pub fn expected_balance(agg: &LedgerAggregate) -> Result<Amount, ArithmeticError> {
    let (plus, minus) = if agg.ledger_type.is_receivable() {
        (agg.total_debits, agg.total_credits)
    } else {
        (agg.total_credits, agg.total_debits)
    };
    agg.opening_balance.checked_add(plus)?.checked_sub(minus)
}

/// IDs that appear more than once, each reported once, in first-seen order.
pub fn duplicate_ids(ids: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut reported = BTreeSet::new();
    let mut duplicates = Vec::new();
    for id in ids {
        if !seen.insert(id.as_str()) && reported.insert(id.as_str()) {
            duplicates.push(id.clone());
        }
    }
    duplicates
}

/// Run all aggregate checks. Returns the first failure.
pub fn validate_aggregate(agg: &LedgerAggregate) -> Result<(), InvariantViolation> {
    match collect_violations(agg).into_iter().next() {
        Some(violation) => Err(violation),
        None => Ok(()),
    }
}

/// Run all aggregate checks and return every failure.
pub fn collect_violations(agg: &LedgerAggregate) -> Vec<InvariantViolation> {
    let ledger_id = agg.ledger_id();
    let mut violations = Vec::new();

    check_balance_equation(agg, &ledger_id, &mut violations);
    check_count_split(agg, &ledger_id, &mut violations);
    check_id_set_size(agg, &ledger_id, &mut violations);
    check_duplicate_ids(agg, &ledger_id, &mut violations);
    check_non_negative_totals(agg, &ledger_id, &mut violations);

    violations
}

pub fn validate_stock(material: &Material) -> Result<(), InvariantViolation> {
    if material.stock.is_negative() {
        return Err(InvariantViolation::NegativeStock {
            material_id: material.id.clone(),
            stock: material.stock,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Individual checks (private)
// ---------------------------------------------------------------------------

fn check_balance_equation(agg: &LedgerAggregate, ledger_id: &str, out: &mut Vec<InvariantViolation>) {
    match expected_balance(agg) {
        Ok(expected) if expected != agg.current_balance => {
            out.push(InvariantViolation::BalanceEquation {
                ledger_id: ledger_id.to_string(),
                expected,
                actual: agg.current_balance,
            });
        }
        Ok(_) => {}
        Err(source) => out.push(InvariantViolation::BalanceOverflow {
            ledger_id: ledger_id.to_string(),
            source,
        }),
    }
}

fn check_count_split(agg: &LedgerAggregate, ledger_id: &str, out: &mut Vec<InvariantViolation>) {
    let split = agg.credit_count.checked_add(agg.debit_count);
    if split != Some(agg.transaction_count) {
        out.push(InvariantViolation::CountSplit {
            ledger_id: ledger_id.to_string(),
            transaction_count: agg.transaction_count,
            credit_count: agg.credit_count,
            debit_count: agg.debit_count,
        });
    }
}

fn check_id_set_size(agg: &LedgerAggregate, ledger_id: &str, out: &mut Vec<InvariantViolation>) {
    let id_count = agg.transaction_ids.len() as u64;
    if agg.transaction_count != id_count {
        out.push(InvariantViolation::IdSetSize {
            ledger_id: ledger_id.to_string(),
            transaction_count: agg.transaction_count,
            id_count,
        });
    }
}

fn check_duplicate_ids(agg: &LedgerAggregate, ledger_id: &str, out: &mut Vec<InvariantViolation>) {
    let duplicates = duplicate_ids(&agg.transaction_ids);
    if !duplicates.is_empty() {
        out.push(InvariantViolation::DuplicateIds {
            ledger_id: ledger_id.to_string(),
            duplicates,
        });
    }
}

fn check_non_negative_totals(agg: &LedgerAggregate, ledger_id: &str, out: &mut Vec<InvariantViolation>) {
    if agg.total_credits.is_negative() || agg.total_debits.is_negative() {
        out.push(InvariantViolation::NegativeTotals {
            ledger_id: ledger_id.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FiscalPeriod, LedgerType};
    use crate::state::create_initial_aggregate;

    fn vendor_ledger() -> LedgerAggregate {
        let period: FiscalPeriod = "2024-25".parse().unwrap();
        create_initial_aggregate(LedgerType::Vendor, "org", "V1", &period, Amount::from_units(1000).unwrap())
    }

    #[test]
    fn fresh_aggregate_is_valid() {
        assert_eq!(validate_aggregate(&vendor_ledger()), Ok(()));
    }

    #[test]
    fn detects_balance_drift() {
        let mut agg = vendor_ledger();
        agg.current_balance = Amount::from_units(999).unwrap();
        assert!(matches!(
            validate_aggregate(&agg),
            Err(InvariantViolation::BalanceEquation { .. })
        ));
    }

    #[test]
    fn collects_every_violation() {
        let mut agg = vendor_ledger();
        agg.transaction_ids = vec!["T1".into(), "T1".into()];
        agg.transaction_count = 1;
        agg.credit_count = 0;

        let violations = collect_violations(&agg);
        assert!(violations.iter().any(|v| matches!(v, InvariantViolation::CountSplit { .. })));
        assert!(violations.iter().any(|v| matches!(v, InvariantViolation::IdSetSize { .. })));
        assert!(violations
            .iter()
            .any(|v| matches!(v, InvariantViolation::DuplicateIds { duplicates, .. } if duplicates == &["T1".to_string()])));
    }

    #[test]
    fn duplicate_ids_reported_once() {
        let ids: Vec<String> = ["a", "b", "a", "a", "c", "b"].iter().map(|s| s.to_string()).collect();
        assert_eq!(duplicate_ids(&ids), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn receivable_balance_uses_debits() {
        let period: FiscalPeriod = "2024-25".parse().unwrap();
        let mut agg = create_initial_aggregate(LedgerType::Client, "org", "C1", &period, Amount::ZERO);
        agg.total_debits = Amount::from_units(50).unwrap();
        agg.total_credits = Amount::from_units(20).unwrap();
        assert_eq!(expected_balance(&agg), Ok(Amount::from_units(30).unwrap()));
    }
}
