//! Proto ↔ kernel conversion for change notifications.
//!
//! Encoding is total. Decoding validates every enum, date and period and
//! reports the offending frame instead of guessing a default.

use chrono::NaiveDate;

use ledger_kernel::arithmetic::{Amount, Quantity};
use ledger_kernel::domain::{FiscalPeriod, LedgerType, LineItem, Transaction, TransactionMetadata, TransactionType};
use ledger_kernel::events::{ChangeKind, ChangeNotification};

use crate::error::JournalError;
use crate::proto_types::*;

pub fn kernel_to_proto(notification: &ChangeNotification) -> ProtoChangeEnvelope {
    let kind = match notification.kind {
        ChangeKind::Created => ProtoChangeKind::Created,
        ChangeKind::Deleted => ProtoChangeKind::Deleted,
    };
    ProtoChangeEnvelope {
        sequence: notification.sequence,
        schema_version: notification.schema_version,
        kind: kind as i32,
        transaction: Some(transaction_to_proto(&notification.transaction)),
    }
}

fn transaction_to_proto(tx: &Transaction) -> ProtoTransaction {
    let ledger_type = match tx.ledger_type {
        LedgerType::Client => ProtoLedgerType::Client,
        LedgerType::Vendor => ProtoLedgerType::Vendor,
        LedgerType::Employee => ProtoLedgerType::Employee,
        LedgerType::Organization => ProtoLedgerType::Organization,
    };
    let tx_type = match tx.tx_type {
        TransactionType::Credit => ProtoTransactionType::Credit,
        TransactionType::Debit => ProtoTransactionType::Debit,
    };
    ProtoTransaction {
        id: tx.id.clone(),
        organization_id: tx.organization_id.clone(),
        entity_id: tx.entity_id.clone(),
        ledger_type: ledger_type as i32,
        tx_type: tx_type as i32,
        category: tx.category.clone(),
        amount_scaled: tx.amount.scaled(),
        transaction_date: tx.transaction_date.format("%Y-%m-%d").to_string(),
        financial_year: tx.financial_year.as_ref().map(|p| p.as_str().to_string()),
        line_items: tx
            .metadata
            .line_items
            .iter()
            .map(|item| ProtoLineItem {
                material_id: item.material_id.clone(),
                quantity_scaled: item.quantity.scaled(),
                unit_of_measurement: item.unit_of_measurement.clone(),
            })
            .collect(),
        reference: tx.metadata.reference.clone(),
    }
}

pub fn proto_to_kernel(proto: &ProtoChangeEnvelope) -> Result<ChangeNotification, JournalError> {
    let invalid = |reason: String| JournalError::InvalidFrame {
        sequence: proto.sequence,
        reason,
    };

    let kind = match ProtoChangeKind::try_from(proto.kind) {
        Ok(ProtoChangeKind::Created) => ChangeKind::Created,
        Ok(ProtoChangeKind::Deleted) => ChangeKind::Deleted,
        _ => return Err(invalid(format!("unknown change kind {}", proto.kind))),
    };
    let tx = proto
        .transaction
        .as_ref()
        .ok_or_else(|| invalid("missing transaction".to_string()))?;

    let ledger_type = match ProtoLedgerType::try_from(tx.ledger_type) {
        Ok(ProtoLedgerType::Client) => LedgerType::Client,
        Ok(ProtoLedgerType::Vendor) => LedgerType::Vendor,
        Ok(ProtoLedgerType::Employee) => LedgerType::Employee,
        Ok(ProtoLedgerType::Organization) => LedgerType::Organization,
        _ => return Err(invalid(format!("unknown ledger type {}", tx.ledger_type))),
    };
    let tx_type = match ProtoTransactionType::try_from(tx.tx_type) {
        Ok(ProtoTransactionType::Credit) => TransactionType::Credit,
        Ok(ProtoTransactionType::Debit) => TransactionType::Debit,
        _ => return Err(invalid(format!("unknown transaction type {}", tx.tx_type))),
    };
    let transaction_date = NaiveDate::parse_from_str(&tx.transaction_date, "%Y-%m-%d")
        .map_err(|e| invalid(format!("bad transaction date {:?}: {e}", tx.transaction_date)))?;
    let financial_year = tx
        .financial_year
        .as_deref()
        .map(str::parse::<FiscalPeriod>)
        .transpose()
        .map_err(|e| invalid(format!("{e}")))?;

    Ok(ChangeNotification {
        sequence: proto.sequence,
        kind,
        schema_version: proto.schema_version,
        transaction: Transaction {
            id: tx.id.clone(),
            organization_id: tx.organization_id.clone(),
            entity_id: tx.entity_id.clone(),
            ledger_type,
            tx_type,
            category: tx.category.clone(),
            amount: Amount::from_scaled(tx.amount_scaled),
            transaction_date,
            financial_year,
            metadata: TransactionMetadata {
                line_items: tx
                    .line_items
                    .iter()
                    .map(|item| LineItem {
                        material_id: item.material_id.clone(),
                        quantity: Quantity::from_scaled(item.quantity_scaled),
                        unit_of_measurement: item.unit_of_measurement.clone(),
                    })
                    .collect(),
                reference: tx.reference.clone(),
            },
        },
    })
}
