/// Ledger Kernel — Fix Descriptors and Pure Fix Application
///
/// Fixes are closed enums, one variant per repair action. The wire form is
/// tagged by `type` with snake_case names (`sync_balance`,
/// `remove_orphaned_trip_ref`, ...). Application works on in-memory copies;
/// the runtime decides what to persist.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::arithmetic::Amount;
use crate::domain::{EntityBalance, LedgerAggregate, Order, Transaction, Trip, TripRef};
use crate::error::KernelError;
use crate::rebuild::{rebuild_aggregate, LedgerKey};
use crate::state::create_initial_aggregate;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FixError {
    #[error("ledger aggregate does not exist")]
    MissingAggregate,
    #[error("entity document does not exist")]
    MissingEntity,
    #[error("trip {0} does not exist")]
    MissingTrip(String),
    #[error("fix no longer applies: {0}")]
    Stale(String),
    #[error("order has no item at index {0}")]
    ItemOutOfRange(u32),
    #[error("rebuild failed: {0}")]
    Rebuild(#[from] KernelError),
}

// ---------------------------------------------------------------------------
// Ledger fixes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceDirection {
    /// Overwrite the entity's `currentBalance` from the ledger.
    EntityFromLedger,
    /// Shift the ledger's opening balance so it lands on the entity's balance.
    LedgerFromEntity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerFix {
    RemoveDuplicateTransactionIds {
        duplicates: Vec<String>,
    },
    RecalculateTotals,
    SyncBalance {
        direction: BalanceDirection,
        entity_balance: Amount,
        ledger_balance: Amount,
    },
}

impl LedgerFix {
    pub const KINDS: [&'static str; 3] = [
        "remove_duplicate_transaction_ids",
        "recalculate_totals",
        "sync_balance",
    ];

    pub fn kind(&self) -> &'static str {
        match self {
            Self::RemoveDuplicateTransactionIds { .. } => Self::KINDS[0],
            Self::RecalculateTotals => Self::KINDS[1],
            Self::SyncBalance { .. } => Self::KINDS[2],
        }
    }

    /// Application order: dedup, then recompute, then balance sync so the
    /// sync sees the repaired ledger balance.
    fn rank(&self) -> u8 {
        match self {
            Self::RemoveDuplicateTransactionIds { .. } => 0,
            Self::RecalculateTotals => 1,
            Self::SyncBalance { .. } => 2,
        }
    }
}

pub fn sort_ledger_fixes(fixes: &mut [LedgerFix]) {
    fixes.sort_by_key(LedgerFix::rank);
}

/// Transaction log scan used by `RecalculateTotals`.
#[derive(Debug, Clone)]
pub struct RebuildInput {
    pub key: LedgerKey,
    pub transactions: Vec<Transaction>,
    /// Opening balance to seed with when no aggregate exists.
    pub seed_opening_balance: Amount,
}

/// Documents a ledger repair works on, re-read inside the transaction.
#[derive(Debug, Clone)]
pub struct LedgerRepairState {
    pub aggregate: Option<LedgerAggregate>,
    pub entity: Option<EntityBalance>,
    pub aggregate_dirty: bool,
    pub entity_dirty: bool,
}

impl LedgerRepairState {
    pub fn new(aggregate: Option<LedgerAggregate>, entity: Option<EntityBalance>) -> Self {
        Self {
            aggregate,
            entity,
            aggregate_dirty: false,
            entity_dirty: false,
        }
    }

    pub fn apply(&mut self, fix: &LedgerFix, rebuild: Option<&RebuildInput>) -> Result<(), FixError> {
        match fix {
            LedgerFix::RemoveDuplicateTransactionIds { .. } => self.dedup_ids(),
            LedgerFix::RecalculateTotals => self.recalculate(rebuild),
            LedgerFix::SyncBalance { direction, .. } => self.sync_balance(*direction),
        }
    }

    fn dedup_ids(&mut self) -> Result<(), FixError> {
        let agg = self.aggregate.as_mut().ok_or(FixError::MissingAggregate)?;
        let mut seen = BTreeSet::new();
        let before = agg.transaction_ids.len();
        agg.transaction_ids.retain(|id| seen.insert(id.clone()));
        if agg.transaction_ids.len() == before {
            return Err(FixError::Stale("no duplicate transaction IDs remain".to_string()));
        }
        self.aggregate_dirty = true;
        Ok(())
    }

    fn recalculate(&mut self, rebuild: Option<&RebuildInput>) -> Result<(), FixError> {
        let input = rebuild.ok_or_else(|| FixError::Stale("no transaction log scan available".to_string()))?;
        let opening = match &self.aggregate {
            Some(agg) => agg.opening_balance,
            None => input.seed_opening_balance,
        };
        let rebuilt = rebuild_aggregate(&input.key, opening, &input.transactions)?;
        self.aggregate = Some(rebuilt);
        self.aggregate_dirty = true;
        Ok(())
    }

    fn sync_balance(&mut self, direction: BalanceDirection) -> Result<(), FixError> {
        let agg = self.aggregate.as_mut().ok_or(FixError::MissingAggregate)?;
        let entity = self.entity.as_mut().ok_or(FixError::MissingEntity)?;
        match direction {
            BalanceDirection::EntityFromLedger => {
                entity.current_balance = agg.current_balance;
                self.entity_dirty = true;
            }
            BalanceDirection::LedgerFromEntity => {
                let shift = entity
                    .current_balance
                    .checked_sub(agg.current_balance)
                    .map_err(KernelError::from)?;
                agg.opening_balance = agg.opening_balance.checked_add(shift).map_err(KernelError::from)?;
                agg.current_balance = entity.current_balance;
                self.aggregate_dirty = true;
            }
        }
        Ok(())
    }
}

/// Seeded aggregate for a ledger that has never been written.
pub fn empty_aggregate(key: &LedgerKey, opening_balance: Amount) -> LedgerAggregate {
    create_initial_aggregate(
        key.ledger_type,
        &key.organization_id,
        &key.entity_id,
        &key.fiscal_period,
        opening_balance,
    )
}

// ---------------------------------------------------------------------------
// Order / trip fixes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderFix {
    RemoveOrphanedTripRef {
        trip_id: String,
    },
    RemoveDuplicateTripRef {
        trip_id: String,
    },
    SyncTripOrderId {
        trip_id: String,
    },
    SyncTripItemIndex {
        trip_id: String,
        item_index: u32,
    },
    SyncTripProductId {
        trip_id: String,
        product_id: String,
    },
    SyncTripStatus {
        trip_id: String,
        trip_status: String,
    },
    AddMissingTripRef {
        trip_id: String,
        item_index: u32,
        product_id: String,
        trip_status: String,
    },
    SyncTripCount {
        expected: u32,
        actual: u32,
    },
    SyncItemTripCount {
        item_index: u32,
        expected: u32,
        actual: u32,
    },
}

impl OrderFix {
    pub const KINDS: [&'static str; 9] = [
        "remove_orphaned_trip_ref",
        "remove_duplicate_trip_ref",
        "sync_trip_order_id",
        "sync_trip_item_index",
        "sync_trip_product_id",
        "sync_trip_status",
        "add_missing_trip_ref",
        "sync_trip_count",
        "sync_item_trip_count",
    ];

    pub fn kind(&self) -> &'static str {
        Self::KINDS[self.rank() as usize]
    }

    fn rank(&self) -> u8 {
        match self {
            Self::RemoveOrphanedTripRef { .. } => 0,
            Self::RemoveDuplicateTripRef { .. } => 1,
            Self::SyncTripOrderId { .. } => 2,
            Self::SyncTripItemIndex { .. } => 3,
            Self::SyncTripProductId { .. } => 4,
            Self::SyncTripStatus { .. } => 5,
            Self::AddMissingTripRef { .. } => 6,
            Self::SyncTripCount { .. } => 7,
            Self::SyncItemTripCount { .. } => 8,
        }
    }
}

/// Reference fixes first, counters last so they see the final list.
pub fn sort_order_fixes(fixes: &mut [OrderFix]) {
    fixes.sort_by_key(OrderFix::rank);
}

/// An order plus every trip document the repair may touch.
#[derive(Debug, Clone)]
pub struct OrderRepairState {
    pub order: Order,
    /// Lookup results by trip ID; `None` means the document is missing.
    pub trips: BTreeMap<String, Option<Trip>>,
    pub order_dirty: bool,
    pub dirty_trips: BTreeSet<String>,
}

impl OrderRepairState {
    pub fn new(order: Order, trips: BTreeMap<String, Option<Trip>>) -> Self {
        Self {
            order,
            trips,
            order_dirty: false,
            dirty_trips: BTreeSet::new(),
        }
    }

    pub fn apply(&mut self, fix: &OrderFix) -> Result<(), FixError> {
        match fix {
            OrderFix::RemoveOrphanedTripRef { trip_id } => self.remove_refs(trip_id),
            OrderFix::RemoveDuplicateTripRef { trip_id } => self.remove_duplicates(trip_id),
            OrderFix::SyncTripOrderId { trip_id } => self.assign_trip(trip_id),
            OrderFix::SyncTripItemIndex { trip_id, .. } => {
                self.sync_ref(trip_id, |r, trip| r.item_index = trip.item_index)
            }
            OrderFix::SyncTripProductId { trip_id, .. } => {
                self.sync_ref(trip_id, |r, trip| r.product_id = trip.product_id.clone())
            }
            OrderFix::SyncTripStatus { trip_id, .. } => {
                self.sync_ref(trip_id, |r, trip| r.trip_status = trip.trip_status.clone())
            }
            OrderFix::AddMissingTripRef {
                trip_id,
                item_index,
                product_id,
                trip_status,
            } => {
                let fallback = TripRef {
                    trip_id: trip_id.clone(),
                    item_index: *item_index,
                    product_id: product_id.clone(),
                    trip_status: trip_status.clone(),
                };
                self.add_ref(fallback)
            }
            OrderFix::SyncTripCount { .. } => {
                self.order.total_scheduled_trips = self.embedded_count(None);
                self.order_dirty = true;
                Ok(())
            }
            OrderFix::SyncItemTripCount { item_index, .. } => {
                let count = self.embedded_count(Some(*item_index));
                let item = self
                    .order
                    .items
                    .get_mut(*item_index as usize)
                    .ok_or(FixError::ItemOutOfRange(*item_index))?;
                item.scheduled_trips = count;
                self.order_dirty = true;
                Ok(())
            }
        }
    }

    /// Embedded references, optionally restricted to one item index.
    pub fn embedded_count(&self, item_index: Option<u32>) -> u32 {
        let count = self
            .order
            .scheduled_trips
            .iter()
            .filter(|r| item_index.map_or(true, |i| r.item_index == i))
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    fn remove_refs(&mut self, trip_id: &str) -> Result<(), FixError> {
        let before = self.order.scheduled_trips.len();
        self.order.scheduled_trips.retain(|r| r.trip_id != trip_id);
        if self.order.scheduled_trips.len() == before {
            return Err(FixError::Stale(format!("trip {trip_id} is not referenced")));
        }
        self.order_dirty = true;
        Ok(())
    }

    fn remove_duplicates(&mut self, trip_id: &str) -> Result<(), FixError> {
        let before = self.order.scheduled_trips.len();
        let mut kept = false;
        self.order.scheduled_trips.retain(|r| {
            if r.trip_id != trip_id {
                return true;
            }
            !std::mem::replace(&mut kept, true)
        });
        if self.order.scheduled_trips.len() == before {
            return Err(FixError::Stale(format!("trip {trip_id} is not duplicated")));
        }
        self.order_dirty = true;
        Ok(())
    }

    fn assign_trip(&mut self, trip_id: &str) -> Result<(), FixError> {
        let order_id = self.order.id.clone();
        let trip = self
            .trips
            .get_mut(trip_id)
            .and_then(Option::as_mut)
            .ok_or_else(|| FixError::MissingTrip(trip_id.to_string()))?;
        if !trip.is_unassigned() {
            return Err(FixError::Stale(format!("trip {trip_id} is already assigned")));
        }
        trip.order_id = Some(order_id);
        self.dirty_trips.insert(trip_id.to_string());
        Ok(())
    }

    fn sync_ref<F>(&mut self, trip_id: &str, update: F) -> Result<(), FixError>
    where
        F: Fn(&mut TripRef, &Trip),
    {
        let trip = self
            .trips
            .get(trip_id)
            .and_then(Option::as_ref)
            .ok_or_else(|| FixError::MissingTrip(trip_id.to_string()))?;
        let mut touched = false;
        for r in self.order.scheduled_trips.iter_mut().filter(|r| r.trip_id == trip_id) {
            update(r, trip);
            touched = true;
        }
        if !touched {
            return Err(FixError::Stale(format!("trip {trip_id} is not referenced")));
        }
        self.order_dirty = true;
        Ok(())
    }

    fn add_ref(&mut self, fallback: TripRef) -> Result<(), FixError> {
        if self.order.scheduled_trips.iter().any(|r| r.trip_id == fallback.trip_id) {
            return Err(FixError::Stale(format!("trip {} is already referenced", fallback.trip_id)));
        }
        let entry = match self.trips.get(&fallback.trip_id).and_then(Option::as_ref) {
            Some(trip) => trip.as_ref_entry(),
            None => fallback,
        };
        self.order.scheduled_trips.push(entry);
        self.order_dirty = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LedgerType, OrderItem};

    fn trip(id: &str, order: Option<&str>, item_index: u32) -> Trip {
        Trip {
            id: id.to_string(),
            organization_id: "org".to_string(),
            order_id: order.map(str::to_string),
            item_index,
            product_id: "P1".to_string(),
            trip_status: "scheduled".to_string(),
        }
    }

    fn order(refs: Vec<TripRef>) -> Order {
        Order {
            id: "O1".to_string(),
            organization_id: "org".to_string(),
            items: vec![
                OrderItem { product_id: "P1".to_string(), scheduled_trips: 0 },
                OrderItem { product_id: "P2".to_string(), scheduled_trips: 0 },
            ],
            scheduled_trips: refs,
            total_scheduled_trips: 0,
        }
    }

    #[test]
    fn fix_wire_names_are_snake_case_tags() {
        let fix = OrderFix::RemoveOrphanedTripRef { trip_id: "X".to_string() };
        let value = serde_json::to_value(&fix).unwrap();
        assert_eq!(value["type"], "remove_orphaned_trip_ref");
        assert_eq!(fix.kind(), "remove_orphaned_trip_ref");

        let sync = LedgerFix::SyncBalance {
            direction: BalanceDirection::EntityFromLedger,
            entity_balance: Amount::ZERO,
            ledger_balance: Amount::ZERO,
        };
        assert_eq!(serde_json::to_value(&sync).unwrap()["type"], "sync_balance");
        assert_eq!(sync.kind(), "sync_balance");
    }

    #[test]
    fn duplicate_removal_keeps_first_reference() {
        let t = trip("T1", Some("O1"), 0);
        let mut state = OrderRepairState::new(
            order(vec![t.as_ref_entry(), t.as_ref_entry()]),
            BTreeMap::from([("T1".to_string(), Some(t))]),
        );
        state
            .apply(&OrderFix::RemoveDuplicateTripRef { trip_id: "T1".to_string() })
            .unwrap();
        assert_eq!(state.order.scheduled_trips.len(), 1);
        assert!(state
            .apply(&OrderFix::RemoveDuplicateTripRef { trip_id: "T1".to_string() })
            .is_err());
    }

    #[test]
    fn counts_are_recomputed_from_current_list() {
        let a = trip("A", Some("O1"), 0);
        let b = trip("B", Some("O1"), 1);
        let mut state = OrderRepairState::new(
            order(vec![a.as_ref_entry()]),
            BTreeMap::from([("A".to_string(), Some(a)), ("B".to_string(), Some(b))]),
        );
        state
            .apply(&OrderFix::AddMissingTripRef {
                trip_id: "B".to_string(),
                item_index: 1,
                product_id: "P1".to_string(),
                trip_status: "scheduled".to_string(),
            })
            .unwrap();
        // Stale expected value in the descriptor is ignored.
        state.apply(&OrderFix::SyncTripCount { expected: 1, actual: 0 }).unwrap();
        state
            .apply(&OrderFix::SyncItemTripCount { item_index: 1, expected: 0, actual: 0 })
            .unwrap();
        assert_eq!(state.order.total_scheduled_trips, 2);
        assert_eq!(state.order.items[1].scheduled_trips, 1);
        assert!(matches!(
            state.apply(&OrderFix::SyncItemTripCount { item_index: 7, expected: 0, actual: 0 }),
            Err(FixError::ItemOutOfRange(7))
        ));
    }

    #[test]
    fn assigning_an_owned_trip_is_stale() {
        let t = trip("T1", Some("O2"), 0);
        let mut state = OrderRepairState::new(order(vec![]), BTreeMap::from([("T1".to_string(), Some(t))]));
        assert!(matches!(
            state.apply(&OrderFix::SyncTripOrderId { trip_id: "T1".to_string() }),
            Err(FixError::Stale(_))
        ));
        assert!(state.dirty_trips.is_empty());
    }

    #[test]
    fn ledger_from_entity_shifts_opening_balance() {
        let key = LedgerKey {
            ledger_type: LedgerType::Vendor,
            organization_id: "org".to_string(),
            entity_id: "V1".to_string(),
            fiscal_period: "2024-25".parse().unwrap(),
        };
        let agg = empty_aggregate(&key, Amount::from_units(100).unwrap());
        let entity = EntityBalance {
            id: "V1".to_string(),
            organization_id: "org".to_string(),
            name: None,
            current_balance: Amount::from_units(120).unwrap(),
        };
        let mut state = LedgerRepairState::new(Some(agg), Some(entity));
        state
            .apply(
                &LedgerFix::SyncBalance {
                    direction: BalanceDirection::LedgerFromEntity,
                    entity_balance: Amount::ZERO,
                    ledger_balance: Amount::ZERO,
                },
                None,
            )
            .unwrap();
        let agg = state.aggregate.unwrap();
        assert_eq!(agg.opening_balance, Amount::from_units(120).unwrap());
        assert_eq!(agg.current_balance, Amount::from_units(120).unwrap());
        assert!(state.aggregate_dirty && !state.entity_dirty);
    }

    #[test]
    fn sort_puts_counts_last() {
        let mut fixes = vec![
            OrderFix::SyncTripCount { expected: 0, actual: 1 },
            OrderFix::RemoveOrphanedTripRef { trip_id: "X".to_string() },
        ];
        sort_order_fixes(&mut fixes);
        assert_eq!(fixes[0].kind(), "remove_orphaned_trip_ref");
    }
}
