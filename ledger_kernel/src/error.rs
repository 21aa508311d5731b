//! Kernel error types.

use crate::arithmetic::ArithmeticError;
use crate::invariants::InvariantViolation;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unknown ledger type {0:?}: expected client, vendor, employee or organization")]
    UnknownLedgerType(String),
    #[error("invalid fiscal period {0:?}: expected YYYY-YY, e.g. 2024-25")]
    InvalidFiscalPeriod(String),
}

/// Failures of a single kernel transition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KernelError {
    #[error(transparent)]
    Arithmetic(#[from] ArithmeticError),
    #[error(
        "transaction {transaction_id} belongs to ledger {transaction_ledger}, not {aggregate_ledger}"
    )]
    LedgerMismatch {
        transaction_id: String,
        transaction_ledger: String,
        aggregate_ledger: String,
    },
    #[error("transaction {transaction_id} has negative amount {amount}")]
    NegativeAmount {
        transaction_id: String,
        amount: String,
    },
    #[error("line item for material {material_id} has non-positive quantity {quantity}")]
    NonPositiveQuantity { material_id: String, quantity: String },
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
}
