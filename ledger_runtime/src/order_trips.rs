//! Order/trip reference checker and repairer.
//!
//! Trip documents are authoritative for trip state. The order's embedded
//! list and counters are brought in line with them; the only trip field
//! ever written is an empty `orderId`.

use std::collections::{BTreeMap, BTreeSet};

use tracing::info;

use ledger_kernel::consistency::{check_order_trips, ConsistencyReport};
use ledger_kernel::domain::{Order, Trip};
use ledger_kernel::fixes::{sort_order_fixes, OrderFix, OrderRepairState};

use crate::config::EngineConfig;
use crate::consistency::{FixSelection, RepairReport};
use crate::documents;
use crate::error::ServiceError;
use crate::store::{load, load_all, run_transaction, Collection, DocumentStore};

pub fn check_order_trip_consistency<S>(
    store: &S,
    organization_id: &str,
    order_id: &str,
) -> Result<ConsistencyReport<OrderFix>, ServiceError>
where
    S: DocumentStore + ?Sized,
{
    let order: Order = load(store, &documents::order(organization_id, order_id))?
        .ok_or_else(|| ServiceError::NotFound(format!("order {order_id}")))?;

    let mut embedded: BTreeMap<String, Option<Trip>> = BTreeMap::new();
    for r in &order.scheduled_trips {
        if !embedded.contains_key(&r.trip_id) {
            let trip: Option<Trip> = load(store, &documents::trip(organization_id, &r.trip_id))?;
            embedded.insert(r.trip_id.clone(), trip);
        }
    }

    let referencing: Vec<Trip> = load_all::<_, Trip>(store, Collection::Trips, organization_id)?
        .into_iter()
        .filter(|trip| trip.order_id.as_deref() == Some(order_id))
        .collect();

    Ok(check_order_trips(&order, &embedded, &referencing))
}

pub fn repair_order<S>(
    store: &S,
    config: &EngineConfig,
    organization_id: &str,
    order_id: &str,
    selection: &FixSelection,
    auto_fix: bool,
) -> Result<RepairReport<OrderFix>, ServiceError>
where
    S: DocumentStore + ?Sized,
{
    let report = check_order_trip_consistency(store, organization_id, order_id)?;
    let mut selected: Vec<OrderFix> = report
        .fixes
        .into_iter()
        .filter(|fix| selection.includes(fix.kind()))
        .collect();
    sort_order_fixes(&mut selected);
    if !auto_fix {
        return Ok(RepairReport::dry_run(selected));
    }
    if selected.is_empty() {
        return Ok(RepairReport::applied(selected, Vec::new(), Vec::new()));
    }

    let order_doc = documents::order(organization_id, order_id);
    let named_trips: BTreeSet<String> = selected.iter().filter_map(fix_trip_id).map(str::to_string).collect();

    let (applied, errors) = run_transaction(store, config.store.max_transaction_attempts, |txn| {
        let order: Order = txn
            .get(&order_doc)?
            .ok_or_else(|| ServiceError::NotFound(format!("order {order_id}")))?;

        let mut trip_ids: BTreeSet<String> = order.scheduled_trips.iter().map(|r| r.trip_id.clone()).collect();
        trip_ids.extend(named_trips.iter().cloned());
        let mut trips = BTreeMap::new();
        for trip_id in trip_ids {
            let trip: Option<Trip> = txn.get(&documents::trip(organization_id, &trip_id))?;
            trips.insert(trip_id, trip);
        }

        let mut state = OrderRepairState::new(order, trips);
        let mut applied = Vec::new();
        let mut errors = Vec::new();
        for fix in &selected {
            match state.apply(fix) {
                Ok(()) => applied.push(fix.clone()),
                Err(e) => errors.push(format!("{}: {e}", fix.kind())),
            }
        }

        if state.order_dirty {
            txn.put(order_doc.clone(), &state.order)?;
        }
        for trip_id in &state.dirty_trips {
            if let Some(Some(trip)) = state.trips.get(trip_id) {
                txn.put(documents::trip(organization_id, trip_id), trip)?;
            }
        }
        Ok::<_, ServiceError>((applied, errors))
    })?;

    info!(
        organization_id,
        order_id,
        applied = applied.len(),
        failed = errors.len(),
        "Order repair finished"
    );
    Ok(RepairReport::applied(selected, applied, errors))
}

fn fix_trip_id(fix: &OrderFix) -> Option<&str> {
    match fix {
        OrderFix::RemoveOrphanedTripRef { trip_id }
        | OrderFix::RemoveDuplicateTripRef { trip_id }
        | OrderFix::SyncTripOrderId { trip_id }
        | OrderFix::SyncTripItemIndex { trip_id, .. }
        | OrderFix::SyncTripProductId { trip_id, .. }
        | OrderFix::SyncTripStatus { trip_id, .. }
        | OrderFix::AddMissingTripRef { trip_id, .. } => Some(trip_id.as_str()),
        OrderFix::SyncTripCount { .. } | OrderFix::SyncItemTripCount { .. } => None,
    }
}
