//! Document store with an optimistic multi-document transaction.
//!
//! Rules:
//!   - Every document lives under a tenant-scoped `DocKey`
//!   - Each committed write bumps a store-wide monotonic version
//!   - Deleted documents keep a tombstone version so re-creation is detected
//!   - A commit fails with `Conflict` if any document it read has moved
//!   - Within one transaction all reads happen before the first write

use std::collections::BTreeMap;
use std::fmt;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use ledger_kernel::domain::LedgerType;

use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Collection {
    Clients,
    Vendors,
    Employees,
    Organizations,
    ClientLedgers,
    VendorLedgers,
    EmployeeLedgers,
    OrganizationLedgers,
    Materials,
    StockHistory,
    Transactions,
    Orders,
    Trips,
}

impl Collection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Clients => "clients",
            Self::Vendors => "vendors",
            Self::Employees => "employees",
            Self::Organizations => "organizations",
            Self::ClientLedgers => "clientLedgers",
            Self::VendorLedgers => "vendorLedgers",
            Self::EmployeeLedgers => "employeeLedgers",
            Self::OrganizationLedgers => "organizationLedgers",
            Self::Materials => "materials",
            Self::StockHistory => "stockHistory",
            Self::Transactions => "transactions",
            Self::Orders => "orders",
            Self::Trips => "trips",
        }
    }

    /// Collection holding the entities a ledger type belongs to.
    pub fn entities(ledger_type: LedgerType) -> Self {
        match ledger_type {
            LedgerType::Client => Self::Clients,
            LedgerType::Vendor => Self::Vendors,
            LedgerType::Employee => Self::Employees,
            LedgerType::Organization => Self::Organizations,
        }
    }

    pub fn ledgers(ledger_type: LedgerType) -> Self {
        match ledger_type {
            LedgerType::Client => Self::ClientLedgers,
            LedgerType::Vendor => Self::VendorLedgers,
            LedgerType::Employee => Self::EmployeeLedgers,
            LedgerType::Organization => Self::OrganizationLedgers,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocKey {
    pub collection: Collection,
    pub organization_id: String,
    pub id: String,
}

impl DocKey {
    pub fn new(collection: Collection, organization_id: &str, id: &str) -> Self {
        Self {
            collection,
            organization_id: organization_id.to_string(),
            id: id.to_string(),
        }
    }
}

impl fmt::Display for DocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.organization_id, self.collection, self.id)
    }
}

/// Zero means the document has never existed.
pub type Version = u64;

#[derive(Debug, Clone, PartialEq)]
pub struct Versioned {
    pub version: Version,
    pub value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Put(Value),
    Delete,
}

pub trait DocumentStore: Send + Sync {
    fn get(&self, key: &DocKey) -> Result<Versioned, StoreError>;

    /// Every live document of one collection for one organization, by ID.
    fn scan(&self, collection: Collection, organization_id: &str) -> Result<Vec<(String, Value)>, StoreError>;

    /// Apply `writes` atomically if every key in `reads` is still at the
    /// recorded version.
    fn commit(&self, reads: &BTreeMap<DocKey, Version>, writes: BTreeMap<DocKey, WriteOp>) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
struct Slot {
    version: Version,
    value: Option<Value>,
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    docs: BTreeMap<DocKey, Slot>,
    clock: Version,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live documents across all collections.
    pub fn len(&self) -> usize {
        self.inner.read().docs.values().filter(|s| s.value.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Organizations with at least one live document.
    pub fn organizations(&self) -> Vec<String> {
        let inner = self.inner.read();
        let mut orgs: Vec<String> = inner
            .docs
            .iter()
            .filter(|(_, slot)| slot.value.is_some())
            .map(|(key, _)| key.organization_id.clone())
            .collect();
        orgs.sort();
        orgs.dedup();
        orgs
    }
}

impl DocumentStore for MemoryStore {
    fn get(&self, key: &DocKey) -> Result<Versioned, StoreError> {
        let inner = self.inner.read();
        Ok(match inner.docs.get(key) {
            Some(slot) => Versioned {
                version: slot.version,
                value: slot.value.clone(),
            },
            None => Versioned {
                version: 0,
                value: None,
            },
        })
    }

    fn scan(&self, collection: Collection, organization_id: &str) -> Result<Vec<(String, Value)>, StoreError> {
        let inner = self.inner.read();
        Ok(inner
            .docs
            .iter()
            .filter(|(key, _)| key.collection == collection && key.organization_id == organization_id)
            .filter_map(|(key, slot)| slot.value.clone().map(|v| (key.id.clone(), v)))
            .collect())
    }

    fn commit(&self, reads: &BTreeMap<DocKey, Version>, writes: BTreeMap<DocKey, WriteOp>) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        for (key, seen) in reads {
            let current = inner.docs.get(key).map_or(0, |slot| slot.version);
            if current != *seen {
                return Err(StoreError::Conflict(key.clone()));
            }
        }

        inner.clock += 1;
        let version = inner.clock;
        for (key, op) in writes {
            let value = match op {
                WriteOp::Put(value) => Some(value),
                WriteOp::Delete => None,
            };
            inner.docs.insert(key, Slot { version, value });
        }
        Ok(())
    }
}

/// One attempt of an atomic multi-document transaction.
pub struct Txn<'s, S: ?Sized> {
    store: &'s S,
    reads: BTreeMap<DocKey, Version>,
    writes: BTreeMap<DocKey, WriteOp>,
}

impl<'s, S: DocumentStore + ?Sized> Txn<'s, S> {
    fn new(store: &'s S) -> Self {
        Self {
            store,
            reads: BTreeMap::new(),
            writes: BTreeMap::new(),
        }
    }

    pub fn get_raw(&mut self, key: &DocKey) -> Result<Option<Value>, StoreError> {
        if !self.writes.is_empty() {
            return Err(StoreError::ReadAfterWrite(key.clone()));
        }
        let doc = self.store.get(key)?;
        // The first observed version is the one the commit must match.
        self.reads.entry(key.clone()).or_insert(doc.version);
        Ok(doc.value)
    }

    pub fn get<T: DeserializeOwned>(&mut self, key: &DocKey) -> Result<Option<T>, StoreError> {
        self.get_raw(key)?.map(|value| decode(key, value)).transpose()
    }

    pub fn exists(&mut self, key: &DocKey) -> Result<bool, StoreError> {
        Ok(self.get_raw(key)?.is_some())
    }

    pub fn put<T: Serialize>(&mut self, key: DocKey, doc: &T) -> Result<(), StoreError> {
        let value = encode(&key, doc)?;
        self.writes.insert(key, WriteOp::Put(value));
        Ok(())
    }

    pub fn delete(&mut self, key: DocKey) {
        self.writes.insert(key, WriteOp::Delete);
    }
}

/// Run `body` as one atomic transaction, retrying on conflict.
///
/// The body may run several times and must not have side effects beyond
/// the transaction it is given. A body error aborts without writing.
pub fn run_transaction<S, T, E, F>(store: &S, max_attempts: u32, mut body: F) -> Result<T, E>
where
    S: DocumentStore + ?Sized,
    E: From<StoreError>,
    F: FnMut(&mut Txn<'_, S>) -> Result<T, E>,
{
    let attempts = max_attempts.max(1);
    for attempt in 1..=attempts {
        let mut txn = Txn::new(store);
        let out = body(&mut txn)?;
        if txn.writes.is_empty() {
            return Ok(out);
        }
        match store.commit(&txn.reads, txn.writes) {
            Ok(()) => return Ok(out),
            Err(StoreError::Conflict(key)) => {
                debug!(attempt, key = %key, "Transaction conflict, retrying");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(StoreError::Contention { attempts }.into())
}

/// Read one document outside any transaction.
pub fn load<S, T>(store: &S, key: &DocKey) -> Result<Option<T>, StoreError>
where
    S: DocumentStore + ?Sized,
    T: DeserializeOwned,
{
    store.get(key)?.value.map(|value| decode(key, value)).transpose()
}

/// Unconditional single-document write.
pub fn save<S, T>(store: &S, key: DocKey, doc: &T) -> Result<(), StoreError>
where
    S: DocumentStore + ?Sized,
    T: Serialize,
{
    let value = encode(&key, doc)?;
    store.commit(&BTreeMap::new(), BTreeMap::from([(key, WriteOp::Put(value))]))
}

/// Unconditional single-document delete.
pub fn remove<S>(store: &S, key: DocKey) -> Result<(), StoreError>
where
    S: DocumentStore + ?Sized,
{
    store.commit(&BTreeMap::new(), BTreeMap::from([(key, WriteOp::Delete)]))
}

/// Scan and decode a whole collection for one organization.
pub fn load_all<S, T>(store: &S, collection: Collection, organization_id: &str) -> Result<Vec<T>, StoreError>
where
    S: DocumentStore + ?Sized,
    T: DeserializeOwned,
{
    store
        .scan(collection, organization_id)?
        .into_iter()
        .map(|(id, value)| decode(&DocKey::new(collection, organization_id, &id), value))
        .collect()
}

fn decode<T: DeserializeOwned>(key: &DocKey, value: Value) -> Result<T, StoreError> {
    serde_json::from_value(value).map_err(|source| StoreError::Malformed {
        key: key.clone(),
        source,
    })
}

fn encode<T: Serialize>(key: &DocKey, doc: &T) -> Result<Value, StoreError> {
    serde_json::to_value(doc).map_err(|source| StoreError::Encode {
        key: key.clone(),
        source,
    })
}
