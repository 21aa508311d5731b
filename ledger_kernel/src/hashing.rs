/// Ledger Kernel — Canonical Fingerprints
///
/// Deterministic canonical serialization + SHA-256 hashing of derived
/// state, used to tell whether a rebuild or replay changed anything.
///
/// Rules:
///   - Fields in fixed order, kernel_version first
///   - Transaction IDs sorted (application order is not significant)
///   - UTF-8 JSON, no whitespace, integers only

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::domain::{LedgerAggregate, Material};
use crate::KERNEL_VERSION;

/// Canonical serialization of a ledger aggregate to UTF-8 JSON bytes.
pub fn canonical_serialize(agg: &LedgerAggregate) -> Vec<u8> {
    canonical_value(agg).to_string().into_bytes()
}

/// SHA-256 of the canonical serialization. Lowercase hex.
pub fn canonical_hash(agg: &LedgerAggregate) -> String {
    hex_digest(&canonical_serialize(agg))
}

/// Order-independent fingerprint over many aggregates and materials.
pub fn state_hash<'a, A, M>(aggregates: A, materials: M) -> String
where
    A: IntoIterator<Item = &'a LedgerAggregate>,
    M: IntoIterator<Item = &'a Material>,
{
    let mut ledger_values: Vec<(String, Value)> = aggregates
        .into_iter()
        .map(|agg| (format!("{}/{}", agg.ledger_type, agg.ledger_id()), canonical_value(agg)))
        .collect();
    ledger_values.sort_by(|a, b| a.0.cmp(&b.0));

    let mut stock: Vec<(String, i64)> = materials
        .into_iter()
        .map(|m| (format!("{}/{}", m.organization_id, m.id), m.stock.scaled()))
        .collect();
    stock.sort();

    let mut root = Map::new();
    root.insert("kernel_version".to_string(), Value::from(KERNEL_VERSION));
    root.insert(
        "ledgers".to_string(),
        Value::Array(ledger_values.into_iter().map(|(_, v)| v).collect()),
    );
    root.insert(
        "stock".to_string(),
        Value::Array(
            stock
                .into_iter()
                .map(|(key, qty)| Value::Array(vec![Value::String(key), Value::from(qty)]))
                .collect(),
        ),
    );
    hex_digest(Value::Object(root).to_string().as_bytes())
}

fn hex_digest(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Field order: kernel_version, ledger_type, organization_id, entity_id,
/// fiscal_period, opening_balance, current_balance, total_credits,
/// total_debits, transaction_count, credit_count, debit_count,
/// transaction_ids.
fn canonical_value(agg: &LedgerAggregate) -> Value {
    let mut ids = agg.transaction_ids.clone();
    ids.sort();

    let mut map = Map::new();
    map.insert("kernel_version".to_string(), Value::from(KERNEL_VERSION));
    map.insert("ledger_type".to_string(), Value::from(agg.ledger_type.as_str()));
    map.insert("organization_id".to_string(), Value::from(agg.organization_id.as_str()));
    map.insert("entity_id".to_string(), Value::from(agg.entity_id.as_str()));
    map.insert("fiscal_period".to_string(), Value::from(agg.fiscal_period.as_str()));
    map.insert("opening_balance".to_string(), Value::from(agg.opening_balance.scaled()));
    map.insert("current_balance".to_string(), Value::from(agg.current_balance.scaled()));
    map.insert("total_credits".to_string(), Value::from(agg.total_credits.scaled()));
    map.insert("total_debits".to_string(), Value::from(agg.total_debits.scaled()));
    map.insert("transaction_count".to_string(), Value::from(agg.transaction_count));
    map.insert("credit_count".to_string(), Value::from(agg.credit_count));
    map.insert("debit_count".to_string(), Value::from(agg.debit_count));
    map.insert(
        "transaction_ids".to_string(),
        Value::Array(ids.into_iter().map(Value::String).collect()),
    );
    Value::Object(map)
}
