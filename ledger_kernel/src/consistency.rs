/// Ledger Kernel — Consistency Checks
///
/// Read-only comparison of derived state with its authoritative source.
/// Every check returns a report with human-readable errors and the typed
/// fixes that would resolve them. Nothing is applied here.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::arithmetic::Amount;
use crate::domain::{EntityBalance, LedgerAggregate, Order, Trip};
use crate::fixes::{BalanceDirection, LedgerFix, OrderFix, OrderRepairState};
use crate::invariants::{collect_violations, InvariantViolation};

/// Default balance tolerance: 0.01.
pub const DEFAULT_BALANCE_TOLERANCE: Amount = Amount::from_scaled(100);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyReport<F> {
    pub consistent: bool,
    pub errors: Vec<String>,
    pub fixes: Vec<F>,
}

impl<F> ConsistencyReport<F> {
    fn from_parts(errors: Vec<String>, fixes: Vec<F>) -> Self {
        Self {
            consistent: errors.is_empty(),
            errors,
            fixes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalancePolicy {
    pub tolerance: Amount,
    pub prefer_ledger: bool,
}

impl Default for BalancePolicy {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_BALANCE_TOLERANCE,
            prefer_ledger: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Ledger variant
// ---------------------------------------------------------------------------

/// Compare an entity's denormalized balance with its ledger aggregate and
/// check the aggregate's own bookkeeping.
pub fn check_ledger(
    ledger_id: &str,
    aggregate: Option<&LedgerAggregate>,
    entity: Option<&EntityBalance>,
    policy: BalancePolicy,
) -> ConsistencyReport<LedgerFix> {
    let mut errors = Vec::new();
    let mut fixes = Vec::new();

    let Some(agg) = aggregate else {
        errors.push(format!("ledger aggregate {ledger_id} not found"));
        fixes.push(LedgerFix::RecalculateTotals);
        if entity.is_none() {
            errors.push(format!("entity for ledger {ledger_id} not found"));
        }
        return ConsistencyReport::from_parts(errors, fixes);
    };

    match entity {
        Some(entity) => fixes.extend(balance_drift(ledger_id, entity, agg.current_balance, policy, &mut errors)),
        None => errors.push(format!("entity {} for ledger {ledger_id} not found", agg.entity_id)),
    }

    let mut needs_recalculation = false;
    for violation in collect_violations(agg) {
        if let InvariantViolation::DuplicateIds { duplicates, .. } = &violation {
            fixes.push(LedgerFix::RemoveDuplicateTransactionIds {
                duplicates: duplicates.clone(),
            });
        }
        needs_recalculation = true;
        errors.push(violation.to_string());
    }
    if needs_recalculation {
        fixes.push(LedgerFix::RecalculateTotals);
    }

    crate::fixes::sort_ledger_fixes(&mut fixes);
    ConsistencyReport::from_parts(errors, fixes)
}

/// Check a ledger whose aggregate document is missing.
///
/// `rebuilt` is the aggregate `RecalculateTotals` would write. The entity is
/// compared with it so that one repair pass also settles the balance.
pub fn check_missing_ledger(
    ledger_id: &str,
    rebuilt: &LedgerAggregate,
    entity: Option<&EntityBalance>,
    policy: BalancePolicy,
) -> ConsistencyReport<LedgerFix> {
    let mut errors = vec![format!("ledger aggregate {ledger_id} not found")];
    let mut fixes = vec![LedgerFix::RecalculateTotals];
    match entity {
        Some(entity) => fixes.extend(balance_drift(ledger_id, entity, rebuilt.current_balance, policy, &mut errors)),
        None => errors.push(format!("entity for ledger {ledger_id} not found")),
    }
    crate::fixes::sort_ledger_fixes(&mut fixes);
    ConsistencyReport::from_parts(errors, fixes)
}

fn balance_drift(
    ledger_id: &str,
    entity: &EntityBalance,
    ledger_balance: Amount,
    policy: BalancePolicy,
    errors: &mut Vec<String>,
) -> Option<LedgerFix> {
    let drift = entity.current_balance.abs_diff(ledger_balance);
    if drift <= policy.tolerance {
        return None;
    }
    errors.push(format!(
        "balance drift on {ledger_id}: entity {} vs ledger {ledger_balance} (diff {drift})",
        entity.current_balance
    ));
    Some(LedgerFix::SyncBalance {
        direction: if policy.prefer_ledger {
            BalanceDirection::EntityFromLedger
        } else {
            BalanceDirection::LedgerFromEntity
        },
        entity_balance: entity.current_balance,
        ledger_balance,
    })
}

// ---------------------------------------------------------------------------
// Order / trip variant
// ---------------------------------------------------------------------------

/// Check an order's embedded trip list against the trip documents.
///
/// `embedded` holds the lookup result for every trip ID embedded in the
/// order. `referencing` holds every trip document whose `orderId` is this
/// order.
pub fn check_order_trips(
    order: &Order,
    embedded: &BTreeMap<String, Option<Trip>>,
    referencing: &[Trip],
) -> ConsistencyReport<OrderFix> {
    let mut errors = Vec::new();
    let mut fixes = Vec::new();

    let mut seen: BTreeSet<&str> = BTreeSet::new();
    let mut orphaned: BTreeSet<&str> = BTreeSet::new();
    let mut duplicated: BTreeSet<&str> = BTreeSet::new();

    for r in &order.scheduled_trips {
        let trip_id = r.trip_id.as_str();
        if !seen.insert(trip_id) {
            if !orphaned.contains(trip_id) && duplicated.insert(trip_id) {
                errors.push(format!("trip {trip_id} is embedded more than once"));
                fixes.push(OrderFix::RemoveDuplicateTripRef {
                    trip_id: trip_id.to_string(),
                });
            }
            continue;
        }

        let Some(trip) = embedded.get(trip_id).and_then(Option::as_ref) else {
            errors.push(format!("embedded trip {trip_id} does not exist"));
            fixes.push(OrderFix::RemoveOrphanedTripRef {
                trip_id: trip_id.to_string(),
            });
            orphaned.insert(trip_id);
            continue;
        };

        if trip.is_unassigned() {
            errors.push(format!("trip {trip_id} has no orderId"));
            fixes.push(OrderFix::SyncTripOrderId {
                trip_id: trip_id.to_string(),
            });
        } else if trip.order_id.as_deref() != Some(order.id.as_str()) {
            errors.push(format!(
                "trip {trip_id} belongs to order {}",
                trip.order_id.as_deref().unwrap_or_default()
            ));
            fixes.push(OrderFix::RemoveOrphanedTripRef {
                trip_id: trip_id.to_string(),
            });
            orphaned.insert(trip_id);
            continue;
        }

        if trip.item_index != r.item_index {
            errors.push(format!(
                "trip {trip_id} itemIndex {} != embedded {}",
                trip.item_index, r.item_index
            ));
            fixes.push(OrderFix::SyncTripItemIndex {
                trip_id: trip_id.to_string(),
                item_index: trip.item_index,
            });
        }
        if trip.product_id != r.product_id {
            errors.push(format!(
                "trip {trip_id} productId {} != embedded {}",
                trip.product_id, r.product_id
            ));
            fixes.push(OrderFix::SyncTripProductId {
                trip_id: trip_id.to_string(),
                product_id: trip.product_id.clone(),
            });
        }
        if trip.trip_status != r.trip_status {
            errors.push(format!(
                "trip {trip_id} status {} != embedded {}",
                trip.trip_status, r.trip_status
            ));
            fixes.push(OrderFix::SyncTripStatus {
                trip_id: trip_id.to_string(),
                trip_status: trip.trip_status.clone(),
            });
        }
    }

    let mut missing: Vec<&Trip> = referencing
        .iter()
        .filter(|t| t.order_id.as_deref() == Some(order.id.as_str()))
        .filter(|t| !seen.contains(t.id.as_str()))
        .collect();
    missing.sort_by(|a, b| a.id.cmp(&b.id));
    missing.dedup_by(|a, b| a.id == b.id);
    for trip in missing {
        errors.push(format!("trip {} references this order but is not embedded", trip.id));
        fixes.push(OrderFix::AddMissingTripRef {
            trip_id: trip.id.clone(),
            item_index: trip.item_index,
            product_id: trip.product_id.clone(),
            trip_status: trip.trip_status.clone(),
        });
    }

    let count_fixes = check_counts(order, embedded, referencing, &fixes, &mut errors);
    fixes.extend(count_fixes);

    ConsistencyReport::from_parts(errors, fixes)
}

/// Counter checks run against the list as it will look once the reference
/// fixes are applied, so a single repair pass converges.
fn check_counts(
    order: &Order,
    embedded: &BTreeMap<String, Option<Trip>>,
    referencing: &[Trip],
    reference_fixes: &[OrderFix],
    errors: &mut Vec<String>,
) -> Vec<OrderFix> {
    let mut trips = embedded.clone();
    for trip in referencing {
        trips.entry(trip.id.clone()).or_insert_with(|| Some(trip.clone()));
    }
    let mut projected = OrderRepairState::new(order.clone(), trips);
    for fix in reference_fixes {
        // Each reference fix was derived from this exact state.
        let _ = projected.apply(fix);
    }

    let mut fixes = Vec::new();
    let expected_total = projected.embedded_count(None);
    if order.total_scheduled_trips != expected_total {
        errors.push(format!(
            "totalScheduledTrips {} != {expected_total} embedded trips",
            order.total_scheduled_trips
        ));
        fixes.push(OrderFix::SyncTripCount {
            expected: expected_total,
            actual: order.total_scheduled_trips,
        });
    }

    for (index, item) in order.items.iter().enumerate() {
        let Ok(item_index) = u32::try_from(index) else {
            break;
        };
        let expected = projected.embedded_count(Some(item_index));
        if item.scheduled_trips != expected {
            errors.push(format!(
                "item {item_index} scheduledTrips {} != {expected} embedded trips",
                item.scheduled_trips
            ));
            fixes.push(OrderFix::SyncItemTripCount {
                item_index,
                expected,
                actual: item.scheduled_trips,
            });
        }
    }
    fixes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FiscalPeriod, LedgerType, OrderItem, TripRef};
    use crate::state::create_initial_aggregate;

    fn units(n: i64) -> Amount {
        Amount::from_units(n).unwrap()
    }

    fn ledger(balance: i64) -> LedgerAggregate {
        let period: FiscalPeriod = "2024-25".parse().unwrap();
        create_initial_aggregate(LedgerType::Vendor, "org", "V1", &period, units(balance))
    }

    fn entity(balance: Amount) -> EntityBalance {
        EntityBalance {
            id: "V1".to_string(),
            organization_id: "org".to_string(),
            name: None,
            current_balance: balance,
        }
    }

    #[test]
    fn balances_within_tolerance_are_consistent() {
        let agg = ledger(100);
        let near = Amount(agg.current_balance.0 + 100);
        let report = check_ledger("V1_2024-25", Some(&agg), Some(&entity(near)), BalancePolicy::default());
        assert!(report.consistent, "{:?}", report.errors);
        assert!(report.fixes.is_empty());
    }

    #[test]
    fn drift_beyond_tolerance_yields_sync_balance() {
        let agg = ledger(100);
        let far = Amount(agg.current_balance.0 + 101);
        let report = check_ledger("V1_2024-25", Some(&agg), Some(&entity(far)), BalancePolicy::default());
        assert!(!report.consistent);
        assert_eq!(
            report.fixes,
            vec![LedgerFix::SyncBalance {
                direction: BalanceDirection::EntityFromLedger,
                entity_balance: far,
                ledger_balance: agg.current_balance,
            }]
        );
    }

    #[test]
    fn duplicates_yield_dedup_then_recalculate() {
        let mut agg = ledger(0);
        agg.transaction_ids = vec!["T1".to_string(), "T1".to_string()];
        agg.transaction_count = 2;
        agg.credit_count = 2;
        let report = check_ledger("V1_2024-25", Some(&agg), Some(&entity(Amount::ZERO)), BalancePolicy::default());
        let kinds: Vec<_> = report.fixes.iter().map(LedgerFix::kind).collect();
        assert_eq!(kinds, vec!["remove_duplicate_transaction_ids", "recalculate_totals"]);
    }

    #[test]
    fn missing_aggregate_needs_rebuild() {
        let report = check_ledger("V1_2024-25", None, Some(&entity(Amount::ZERO)), BalancePolicy::default());
        assert_eq!(report.fixes, vec![LedgerFix::RecalculateTotals]);
    }

    #[test]
    fn missing_aggregate_with_drifted_entity_also_syncs_balance() {
        let rebuilt = ledger(250);
        let report = check_missing_ledger("V1_2024-25", &rebuilt, Some(&entity(units(100))), BalancePolicy::default());
        assert!(!report.consistent);
        assert_eq!(
            report.fixes,
            vec![
                LedgerFix::RecalculateTotals,
                LedgerFix::SyncBalance {
                    direction: BalanceDirection::EntityFromLedger,
                    entity_balance: units(100),
                    ledger_balance: rebuilt.current_balance,
                },
            ]
        );

        let matching = check_missing_ledger("V1_2024-25", &rebuilt, Some(&entity(rebuilt.current_balance)), BalancePolicy::default());
        assert_eq!(matching.fixes, vec![LedgerFix::RecalculateTotals]);
        assert_eq!(matching.errors.len(), 1);
    }

    fn trip(id: &str, order: Option<&str>, item_index: u32, status: &str) -> Trip {
        Trip {
            id: id.to_string(),
            organization_id: "org".to_string(),
            order_id: order.map(str::to_string),
            item_index,
            product_id: "P1".to_string(),
            trip_status: status.to_string(),
        }
    }

    fn tref(id: &str, item_index: u32, status: &str) -> TripRef {
        TripRef {
            trip_id: id.to_string(),
            item_index,
            product_id: "P1".to_string(),
            trip_status: status.to_string(),
        }
    }

    fn order(refs: Vec<TripRef>, total: u32, per_item: [u32; 2]) -> Order {
        Order {
            id: "O1".to_string(),
            organization_id: "org".to_string(),
            items: vec![
                OrderItem { product_id: "P1".to_string(), scheduled_trips: per_item[0] },
                OrderItem { product_id: "P1".to_string(), scheduled_trips: per_item[1] },
            ],
            scheduled_trips: refs,
            total_scheduled_trips: total,
        }
    }

    #[test]
    fn mirrored_order_is_consistent() {
        let a = trip("A", Some("O1"), 0, "scheduled");
        let o = order(vec![a.as_ref_entry()], 1, [1, 0]);
        let embedded = BTreeMap::from([("A".to_string(), Some(a.clone()))]);
        let report = check_order_trips(&o, &embedded, &[a]);
        assert!(report.consistent, "{:?}", report.errors);
    }

    #[test]
    fn detects_every_reference_problem() {
        let b = trip("B", Some("O1"), 1, "delivered");
        let c = trip("C", Some("O1"), 0, "scheduled");
        let d = trip("D", None, 0, "scheduled");
        let e = trip("E", Some("O9"), 0, "scheduled");
        let o = order(
            vec![
                tref("GONE", 0, "scheduled"),
                tref("B", 0, "scheduled"),
                tref("D", 0, "scheduled"),
                tref("D", 0, "scheduled"),
                tref("E", 0, "scheduled"),
            ],
            5,
            [5, 0],
        );
        let embedded = BTreeMap::from([
            ("GONE".to_string(), None),
            ("B".to_string(), Some(b.clone())),
            ("D".to_string(), Some(d)),
            ("E".to_string(), Some(e)),
        ]);
        let report = check_order_trips(&o, &embedded, &[b, c]);
        let kinds: Vec<_> = report.fixes.iter().map(OrderFix::kind).collect();
        assert_eq!(
            kinds,
            vec![
                "remove_orphaned_trip_ref",
                "sync_trip_item_index",
                "sync_trip_status",
                "sync_trip_order_id",
                "remove_duplicate_trip_ref",
                "remove_orphaned_trip_ref",
                "add_missing_trip_ref",
                "sync_trip_count",
                "sync_item_trip_count",
                "sync_item_trip_count",
            ]
        );
        // After repair: B (item 1), D (item 0), C (item 0).
        assert!(report.fixes.contains(&OrderFix::SyncTripCount { expected: 3, actual: 5 }));
        assert!(report
            .fixes
            .contains(&OrderFix::SyncItemTripCount { item_index: 0, expected: 2, actual: 5 }));
        assert!(report
            .fixes
            .contains(&OrderFix::SyncItemTripCount { item_index: 1, expected: 1, actual: 0 }));
    }
}
