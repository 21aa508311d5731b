/// Ledger Kernel — Change Notifications
///
/// A notification is pure data: what happened to which transaction, with
/// the full document snapshot. It carries zero transition logic.

use serde::{Deserialize, Serialize};

use crate::domain::Transaction;

/// Schema version for change notifications.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Deleted,
}

/// One entry of the transaction change feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeNotification {
    pub sequence: u64,
    pub kind: ChangeKind,
    pub transaction: Transaction,
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl ChangeNotification {
    pub fn created(sequence: u64, transaction: Transaction) -> Self {
        Self {
            sequence,
            kind: ChangeKind::Created,
            transaction,
            schema_version: SCHEMA_VERSION,
        }
    }

    pub fn deleted(sequence: u64, transaction: Transaction) -> Self {
        Self {
            sequence,
            kind: ChangeKind::Deleted,
            transaction,
            schema_version: SCHEMA_VERSION,
        }
    }

    pub fn transaction_id(&self) -> &str {
        &self.transaction.id
    }
}
