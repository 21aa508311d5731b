/// Ledger Kernel — Engine
///
/// Stateful wrapper around the pure transition layer for a single
/// ledger aggregate. Every applied change is followed by a full
/// invariant check; a failing check leaves the engine unchanged.

use tracing::debug;

use crate::domain::{LedgerAggregate, Transaction};
use crate::error::KernelError;
use crate::events::ChangeKind;
use crate::invariants::validate_aggregate;
use crate::transitions::{apply_change, TransitionResult};

pub struct LedgerEngine {
    aggregate: LedgerAggregate,
    applied: u64,
}

impl LedgerEngine {
    /// Start from an aggregate that already satisfies every invariant.
    pub fn new(seed: LedgerAggregate) -> Result<Self, KernelError> {
        validate_aggregate(&seed)?;
        Ok(Self {
            aggregate: seed,
            applied: 0,
        })
    }

    pub fn aggregate(&self) -> &LedgerAggregate {
        &self.aggregate
    }

    pub fn into_aggregate(self) -> LedgerAggregate {
        self.aggregate
    }

    /// Number of changes that actually mutated the aggregate.
    pub fn applied(&self) -> u64 {
        self.applied
    }

    /// Apply a single change:
    ///   1. Delegate to the transition layer
    ///   2. Validate invariants on the new aggregate
    ///   3. Store and return the result
    pub fn apply(&mut self, kind: ChangeKind, tx: &Transaction) -> Result<TransitionResult, KernelError> {
        let (next, result) = apply_change(&self.aggregate, kind, tx)?;
        validate_aggregate(&next)?;
        if result.applied {
            self.applied += 1;
        } else {
            debug!(transaction_id = %tx.id, reason = %result.reason, "Ledger change skipped");
        }
        self.aggregate = next;
        Ok(result)
    }

    /// Apply creations in order.
    pub fn apply_all<'a, I>(&mut self, transactions: I) -> Result<(), KernelError>
    where
        I: IntoIterator<Item = &'a Transaction>,
    {
        for tx in transactions {
            self.apply(ChangeKind::Created, tx)?;
        }
        Ok(())
    }
}
