//! Shared fixtures for the runtime integration suites.

#![allow(dead_code)]

use chrono::NaiveDate;

use ledger_kernel::arithmetic::{Amount, Quantity};
use ledger_kernel::domain::{
    EntityBalance, LedgerAggregate, LedgerType, LineItem, Material, Transaction, TransactionMetadata,
    TransactionType, PURCHASE_CATEGORY,
};
use ledger_kernel::rebuild::LedgerKey;

use ledger_runtime::documents;
use ledger_runtime::store::{load, save, DocumentStore};

pub const ORG: &str = "org-1";
pub const PERIOD: &str = "2024-25";

pub fn amount(text: &str) -> Amount {
    text.parse().unwrap()
}

pub fn qty(text: &str) -> Quantity {
    text.parse().unwrap()
}

pub fn tx(id: &str, ledger_type: LedgerType, entity_id: &str, tx_type: TransactionType, value: &str) -> Transaction {
    Transaction {
        id: id.to_string(),
        organization_id: ORG.to_string(),
        entity_id: entity_id.to_string(),
        ledger_type,
        tx_type,
        category: "general".to_string(),
        amount: amount(value),
        transaction_date: NaiveDate::from_ymd_opt(2024, 9, 10).unwrap(),
        financial_year: None,
        metadata: TransactionMetadata::default(),
    }
}

pub fn purchase(id: &str, vendor_id: &str, value: &str, lines: &[(&str, &str)]) -> Transaction {
    Transaction {
        category: PURCHASE_CATEGORY.to_string(),
        metadata: TransactionMetadata {
            line_items: lines
                .iter()
                .map(|(material_id, quantity)| LineItem {
                    material_id: material_id.to_string(),
                    quantity: qty(quantity),
                    unit_of_measurement: "bags".to_string(),
                })
                .collect(),
            reference: None,
        },
        ..tx(id, LedgerType::Vendor, vendor_id, TransactionType::Credit, value)
    }
}

pub fn key(ledger_type: LedgerType, entity_id: &str) -> LedgerKey {
    LedgerKey {
        ledger_type,
        organization_id: ORG.to_string(),
        entity_id: entity_id.to_string(),
        fiscal_period: PERIOD.parse().unwrap(),
    }
}

pub fn seed_entity<S: DocumentStore + ?Sized>(store: &S, ledger_type: LedgerType, id: &str, balance: &str) {
    let entity = EntityBalance {
        id: id.to_string(),
        organization_id: ORG.to_string(),
        name: Some(format!("{ledger_type} {id}")),
        current_balance: amount(balance),
    };
    save(store, documents::entity(ledger_type, ORG, id), &entity).unwrap();
}

pub fn seed_material<S: DocumentStore + ?Sized>(store: &S, id: &str, stock: &str) {
    let material = Material {
        id: id.to_string(),
        organization_id: ORG.to_string(),
        name: format!("material {id}"),
        unit_of_measurement: "bags".to_string(),
        stock: qty(stock),
    };
    save(store, documents::material(ORG, id), &material).unwrap();
}

pub fn stock<S: DocumentStore + ?Sized>(store: &S, id: &str) -> Quantity {
    load::<_, Material>(store, &documents::material(ORG, id))
        .unwrap()
        .expect("material exists")
        .stock
}

pub fn entity_balance<S: DocumentStore + ?Sized>(store: &S, ledger_type: LedgerType, id: &str) -> Amount {
    load::<_, EntityBalance>(store, &documents::entity(ledger_type, ORG, id))
        .unwrap()
        .expect("entity exists")
        .current_balance
}

pub fn ledger<S: DocumentStore + ?Sized>(store: &S, ledger_type: LedgerType, entity_id: &str) -> Option<LedgerAggregate> {
    load(store, &documents::ledger(&key(ledger_type, entity_id))).unwrap()
}
