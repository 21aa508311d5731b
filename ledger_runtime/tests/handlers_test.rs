//! Change handlers against an in-memory store: ledger and stock effects
//! of creates, deletes and redelivered events.

mod common;

use std::sync::Arc;

use proptest::prelude::*;
use tracing_test::traced_test;

use ledger_kernel::arithmetic::Amount;
use ledger_kernel::domain::{FiscalPeriod, LedgerType, MovementType, StockHistoryEntry, TransactionType};
use ledger_kernel::state::create_initial_aggregate;

use ledger_runtime::config::EngineConfig;
use ledger_runtime::documents;
use ledger_runtime::handlers::{on_transaction_created, on_transaction_deleted};
use ledger_runtime::store::{load, save, MemoryStore};

use common::*;

fn history(store: &MemoryStore, entry_id: &str) -> Option<StockHistoryEntry> {
    load(store, &documents::history_entry(ORG, entry_id)).unwrap()
}

fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    seed_entity(&store, LedgerType::Vendor, "V1", "1000");
    seed_material(&store, "M1", "100");
    seed_material(&store, "M2", "20");
    store
}

#[test]
fn purchase_create_then_delete_restores_everything() {
    let store = seeded_store();
    let config = EngineConfig::default();
    let tx = purchase("T1", "V1", "500", &[("M1", "50")]);

    on_transaction_created(&store, &config, &tx);

    assert_eq!(stock(&store, "M1"), qty("150"));
    let receipt = history(&store, "T1_M1").expect("receipt entry");
    assert_eq!(receipt.movement, MovementType::In);
    assert_eq!(receipt.quantity, qty("50"));
    assert_eq!(receipt.balance_before, qty("100"));
    assert_eq!(receipt.balance_after, qty("150"));

    let agg = ledger(&store, LedgerType::Vendor, "V1").expect("ledger created");
    assert_eq!(agg.opening_balance, Amount::ZERO);
    assert_eq!(agg.current_balance, amount("500"));
    assert_eq!(agg.transaction_ids, vec!["T1".to_string()]);
    assert_eq!(entity_balance(&store, LedgerType::Vendor, "V1"), amount("1500"));

    on_transaction_deleted(&store, &config, &tx);

    assert_eq!(stock(&store, "M1"), qty("100"));
    assert!(history(&store, "T1_M1").is_none());
    let reversal = history(&store, "T1_M1_reversal").expect("reversal entry");
    assert_eq!(reversal.movement, MovementType::Out);
    assert_eq!(reversal.balance_before, qty("150"));
    assert_eq!(reversal.balance_after, qty("100"));

    let agg = ledger(&store, LedgerType::Vendor, "V1").unwrap();
    assert_eq!(agg.current_balance, Amount::ZERO);
    assert_eq!(agg.transaction_count, 0);
    assert!(agg.transaction_ids.is_empty());
    assert_eq!(entity_balance(&store, LedgerType::Vendor, "V1"), amount("1000"));
}

#[test]
fn redelivered_delete_is_a_no_op_when_hardened() {
    let store = seeded_store();
    let config = EngineConfig::default();
    let tx = purchase("T1", "V1", "500", &[("M1", "50")]);

    on_transaction_created(&store, &config, &tx);
    on_transaction_deleted(&store, &config, &tx);
    on_transaction_deleted(&store, &config, &tx);

    assert_eq!(stock(&store, "M1"), qty("100"));
    assert_eq!(entity_balance(&store, LedgerType::Vendor, "V1"), amount("1000"));
}

#[test]
fn redelivered_delete_decrements_twice_without_hardening() {
    let store = seeded_store();
    let mut config = EngineConfig::default();
    config.stock.idempotent_reversal = false;
    let tx = purchase("T1", "V1", "500", &[("M1", "50")]);

    on_transaction_created(&store, &config, &tx);
    on_transaction_deleted(&store, &config, &tx);
    on_transaction_deleted(&store, &config, &tx);

    assert_eq!(stock(&store, "M1"), qty("50"));
    // The ledger side is idempotent regardless of the stock setting.
    assert_eq!(entity_balance(&store, LedgerType::Vendor, "V1"), amount("1000"));
}

#[test]
fn redelivered_create_counts_once() {
    let store = seeded_store();
    let config = EngineConfig::default();
    let tx = purchase("T1", "V1", "500", &[("M1", "50")]);

    on_transaction_created(&store, &config, &tx);
    on_transaction_created(&store, &config, &tx);

    let agg = ledger(&store, LedgerType::Vendor, "V1").unwrap();
    assert_eq!(agg.transaction_count, 1);
    assert_eq!(agg.credit_count, 1);
    assert_eq!(entity_balance(&store, LedgerType::Vendor, "V1"), amount("1500"));
    assert_eq!(stock(&store, "M1"), qty("150"));
}

#[traced_test]
#[test]
fn missing_material_skips_only_its_line() {
    let store = seeded_store();
    let config = EngineConfig::default();
    let tx = purchase("T1", "V1", "500", &[("M1", "10"), ("GONE", "5"), ("M2", "3")]);

    on_transaction_created(&store, &config, &tx);

    assert_eq!(stock(&store, "M1"), qty("110"));
    assert_eq!(stock(&store, "M2"), qty("23"));
    assert!(history(&store, "T1_GONE").is_none());
    assert!(logs_contain("Material not found, line item skipped"));
}

#[test]
fn duplicate_lines_for_one_material_are_merged() {
    let store = seeded_store();
    let config = EngineConfig::default();
    let tx = purchase("T1", "V1", "500", &[("M1", "10"), ("M1", "2.5")]);

    on_transaction_created(&store, &config, &tx);

    assert_eq!(stock(&store, "M1"), qty("112.5"));
    assert_eq!(history(&store, "T1_M1").unwrap().quantity, qty("12.5"));
}

#[test]
fn non_purchase_transactions_leave_stock_alone() {
    let store = seeded_store();
    let config = EngineConfig::default();
    let mut tx = purchase("T1", "V1", "500", &[("M1", "10")]);
    tx.category = "payment".to_string();

    on_transaction_created(&store, &config, &tx);

    assert_eq!(stock(&store, "M1"), qty("100"));
    assert_eq!(entity_balance(&store, LedgerType::Vendor, "V1"), amount("1500"));
}

#[test]
fn client_debits_raise_and_credits_lower_the_balance() {
    let store = MemoryStore::new();
    let config = EngineConfig::default();
    seed_entity(&store, LedgerType::Client, "C1", "0");

    on_transaction_created(&store, &config, &tx("T1", LedgerType::Client, "C1", TransactionType::Debit, "800"));
    on_transaction_created(&store, &config, &tx("T2", LedgerType::Client, "C1", TransactionType::Credit, "300"));

    let agg = ledger(&store, LedgerType::Client, "C1").unwrap();
    assert_eq!(agg.current_balance, amount("500"));
    assert_eq!(agg.total_debits, amount("800"));
    assert_eq!(agg.total_credits, amount("300"));
    assert_eq!((agg.debit_count, agg.credit_count), (1, 1));
    assert_eq!(entity_balance(&store, LedgerType::Client, "C1"), amount("500"));
}

#[test]
fn new_ledger_opens_with_previous_period_closing_balance() {
    let store = seeded_store();
    let config = EngineConfig::default();
    let previous_period: FiscalPeriod = "2023-24".parse().unwrap();
    let previous = create_initial_aggregate(LedgerType::Vendor, ORG, "V1", &previous_period, amount("800"));
    save(&store, documents::previous_ledger(&key(LedgerType::Vendor, "V1")), &previous).unwrap();

    on_transaction_created(&store, &config, &tx("T1", LedgerType::Vendor, "V1", TransactionType::Credit, "200"));

    let agg = ledger(&store, LedgerType::Vendor, "V1").unwrap();
    assert_eq!(agg.opening_balance, amount("800"));
    assert_eq!(agg.current_balance, amount("1000"));
}

#[test]
fn delete_without_a_ledger_creates_nothing() {
    let store = seeded_store();
    let config = EngineConfig::default();

    on_transaction_deleted(&store, &config, &tx("T9", LedgerType::Vendor, "V1", TransactionType::Credit, "200"));

    assert!(ledger(&store, LedgerType::Vendor, "V1").is_none());
    assert_eq!(entity_balance(&store, LedgerType::Vendor, "V1"), amount("1000"));
}

#[traced_test]
#[test]
fn missing_entity_still_updates_the_ledger() {
    let store = MemoryStore::new();
    let config = EngineConfig::default();

    on_transaction_created(&store, &config, &tx("T1", LedgerType::Employee, "E1", TransactionType::Credit, "75"));

    let agg = ledger(&store, LedgerType::Employee, "E1").expect("ledger written");
    assert_eq!(agg.current_balance, amount("75"));
    assert!(logs_contain("Entity not found, balance not updated"));
}

#[traced_test]
#[test]
fn corrupt_ledger_is_left_for_repair() {
    let store = seeded_store();
    let config = EngineConfig::default();
    let mut corrupt = create_initial_aggregate(
        LedgerType::Vendor,
        ORG,
        "V1",
        &PERIOD.parse::<FiscalPeriod>().unwrap(),
        amount("1000"),
    );
    corrupt.transaction_ids = vec!["T0".to_string(), "T0".to_string()];
    save(&store, documents::ledger(&key(LedgerType::Vendor, "V1")), &corrupt).unwrap();

    on_transaction_created(&store, &config, &tx("T1", LedgerType::Vendor, "V1", TransactionType::Credit, "50"));

    assert_eq!(ledger(&store, LedgerType::Vendor, "V1").unwrap(), corrupt);
    assert_eq!(entity_balance(&store, LedgerType::Vendor, "V1"), amount("1000"));
    assert!(logs_contain("Ledger update failed"));
}

#[test]
fn concurrent_creates_on_one_ledger_are_all_counted() {
    let store = Arc::new(seeded_store());
    let mut config = EngineConfig::default();
    config.store.max_transaction_attempts = 1_000;

    std::thread::scope(|scope| {
        for worker in 0..8 {
            let store = Arc::clone(&store);
            let config = config.clone();
            scope.spawn(move || {
                for n in 0..25 {
                    let id = format!("T{worker}-{n}");
                    on_transaction_created(
                        store.as_ref(),
                        &config,
                        &tx(&id, LedgerType::Vendor, "V1", TransactionType::Credit, "1"),
                    );
                }
            });
        }
    });

    let agg = ledger(store.as_ref(), LedgerType::Vendor, "V1").unwrap();
    assert_eq!(agg.transaction_count, 200);
    assert_eq!(agg.transaction_ids.len(), 200);
    assert_eq!(agg.current_balance, amount("200"));
    assert_eq!(entity_balance(store.as_ref(), LedgerType::Vendor, "V1"), amount("1200"));
}

// ---------------------------------------------------------------------------
// Model check
// ---------------------------------------------------------------------------

const QUANTITIES: [i64; 4] = [5, 12, 40, 3];

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Each purchase is created at most once. Deletes may be redelivered.
    /// Stock and the vendor ledger must match the set of live purchases.
    #[test]
    fn stock_and_ledger_track_live_purchases(ops in prop::collection::vec((0..QUANTITIES.len(), any::<bool>()), 1..40)) {
        let store = seeded_store();
        let config = EngineConfig::default();
        let mut created = [false; QUANTITIES.len()];
        let mut reversed = [false; QUANTITIES.len()];

        for (i, is_create) in ops {
            let q = QUANTITIES[i].to_string();
            let tx = purchase(&format!("P{i}"), "V1", &q, &[("M1", &q)]);
            if is_create {
                if created[i] {
                    continue;
                }
                on_transaction_created(&store, &config, &tx);
                created[i] = true;
            } else {
                if !created[i] {
                    continue;
                }
                on_transaction_deleted(&store, &config, &tx);
                reversed[i] = true;
            }
        }

        let live: i64 = (0..QUANTITIES.len())
            .filter(|&i| created[i] && !reversed[i])
            .map(|i| QUANTITIES[i])
            .sum();
        let live_count = (0..QUANTITIES.len()).filter(|&i| created[i] && !reversed[i]).count() as u64;

        prop_assert_eq!(stock(&store, "M1"), qty(&(100 + live).to_string()));
        prop_assert_eq!(entity_balance(&store, LedgerType::Vendor, "V1"), amount(&(1000 + live).to_string()));
        if let Some(agg) = ledger(&store, LedgerType::Vendor, "V1") {
            prop_assert_eq!(agg.transaction_count, live_count);
            prop_assert_eq!(agg.current_balance, amount(&live.to_string()));
        } else {
            prop_assert_eq!(live_count, 0);
        }
    }
}
