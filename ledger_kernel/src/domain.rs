/// Ledger Kernel — Core Domain Types
///
/// Pure data. No behaviour beyond identity and classification helpers.
/// All numeric values: i64 fixed-point (SCALE = 10_000).

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::arithmetic::{Amount, Quantity};
use crate::error::ParseError;

/// Category marking a vendor credit as a stock-bearing purchase.
pub const PURCHASE_CATEGORY: &str = "purchase";

// ── Classification ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerType {
    Client,
    Vendor,
    Employee,
    Organization,
}

impl LedgerType {
    pub const ALL: [LedgerType; 4] = [
        LedgerType::Client,
        LedgerType::Vendor,
        LedgerType::Employee,
        LedgerType::Organization,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Vendor => "vendor",
            Self::Employee => "employee",
            Self::Organization => "organization",
        }
    }

    /// Client ledgers track receivables: debits bill the client, credits
    /// are payments received. Every other ledger tracks payables.
    pub fn is_receivable(self) -> bool {
        matches!(self, Self::Client)
    }

    /// Signed effect of one transaction on `currentBalance`.
    pub fn balance_effect(self, tx_type: TransactionType, amount: Amount) -> Amount {
        let increases = match tx_type {
            TransactionType::Credit => !self.is_receivable(),
            TransactionType::Debit => self.is_receivable(),
        };
        if increases {
            amount
        } else {
            Amount(-amount.0)
        }
    }
}

impl fmt::Display for LedgerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LedgerType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client" => Ok(Self::Client),
            "vendor" => Ok(Self::Vendor),
            "employee" => Ok(Self::Employee),
            "organization" => Ok(Self::Organization),
            other => Err(ParseError::UnknownLedgerType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Credit,
    Debit,
}

/// Financial-year label `YYYY-YY` for an April–March year.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FiscalPeriod(String);

impl FiscalPeriod {
    /// Period starting in April of `start_year`.
    pub fn starting(start_year: i32) -> Self {
        Self(format!("{start_year}-{:02}", (start_year + 1).rem_euclid(100)))
    }

    pub fn from_date(date: NaiveDate) -> Self {
        let start_year = if date.month() >= 4 {
            date.year()
        } else {
            date.year() - 1
        };
        Self::starting(start_year)
    }

    pub fn start_year(&self) -> i32 {
        // `starting` always writes `{start_year}-{yy}`; the start year may
        // itself be negative or wider than four digits.
        self.0
            .rsplit_once('-')
            .and_then(|(start, _)| start.parse().ok())
            .unwrap_or_default()
    }

    pub fn previous(&self) -> Self {
        Self::starting(self.start_year() - 1)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for FiscalPeriod {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::InvalidFiscalPeriod(s.to_string());
        let (start, end) = s.split_once('-').ok_or_else(invalid)?;
        if start.len() != 4 || end.len() != 2 {
            return Err(invalid());
        }
        let start_year: i32 = start.parse().map_err(|_| invalid())?;
        let period = Self::starting(start_year);
        if period.0 != s {
            return Err(invalid());
        }
        Ok(period)
    }
}

impl TryFrom<String> for FiscalPeriod {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FiscalPeriod> for String {
    fn from(value: FiscalPeriod) -> Self {
        value.0
    }
}

impl fmt::Display for FiscalPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Transaction Log ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub material_id: String,
    pub quantity: Quantity,
    #[serde(default)]
    pub unit_of_measurement: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMetadata {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub line_items: Vec<LineItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

/// Immutable financial transaction. Corrections are new transactions,
/// never edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub organization_id: String,
    pub entity_id: String,
    pub ledger_type: LedgerType,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub category: String,
    pub amount: Amount,
    pub transaction_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub financial_year: Option<FiscalPeriod>,
    #[serde(default)]
    pub metadata: TransactionMetadata,
}

impl Transaction {
    /// Explicit `financialYear` wins over the one derived from the date.
    pub fn fiscal_period(&self) -> FiscalPeriod {
        self.financial_year
            .clone()
            .unwrap_or_else(|| FiscalPeriod::from_date(self.transaction_date))
    }

    pub fn is_purchase(&self) -> bool {
        self.ledger_type == LedgerType::Vendor
            && self.tx_type == TransactionType::Credit
            && self.category == PURCHASE_CATEGORY
            && !self.metadata.line_items.is_empty()
    }

    pub fn ledger_id(&self) -> String {
        ledger_id(&self.entity_id, &self.fiscal_period())
    }
}

// ── Aggregates ─────────────────────────────────────────────────────

/// `{entityId}_{fiscalPeriod}`
pub fn ledger_id(entity_id: &str, period: &FiscalPeriod) -> String {
    format!("{entity_id}_{period}")
}

/// `{transactionId}_{materialId}`
pub fn stock_history_id(transaction_id: &str, material_id: &str) -> String {
    format!("{transaction_id}_{material_id}")
}

/// `{transactionId}_{materialId}_reversal`
pub fn stock_reversal_id(transaction_id: &str, material_id: &str) -> String {
    format!("{transaction_id}_{material_id}_reversal")
}

/// Running totals for one entity in one fiscal period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerAggregate {
    pub ledger_type: LedgerType,
    pub entity_id: String,
    pub organization_id: String,
    pub fiscal_period: FiscalPeriod,
    pub opening_balance: Amount,
    pub current_balance: Amount,
    /// Payables for vendor-style ledgers.
    pub total_credits: Amount,
    /// Payments for vendor-style ledgers.
    pub total_debits: Amount,
    pub transaction_count: u64,
    pub credit_count: u64,
    pub debit_count: u64,
    /// Applied transaction IDs in application order.
    #[serde(default)]
    pub transaction_ids: Vec<String>,
}

impl LedgerAggregate {
    pub fn ledger_id(&self) -> String {
        ledger_id(&self.entity_id, &self.fiscal_period)
    }

    pub fn contains(&self, transaction_id: &str) -> bool {
        self.transaction_ids.iter().any(|id| id == transaction_id)
    }
}

/// Denormalized balance held on an entity document (client, vendor, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityBalance {
    pub id: String,
    pub organization_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub current_balance: Amount,
}

/// Material document; `stock` is the Stock Aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Material {
    pub id: String,
    pub organization_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub unit_of_measurement: String,
    pub stock: Quantity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    In,
    Out,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockHistoryEntry {
    pub material_id: String,
    pub transaction_id: String,
    #[serde(rename = "type")]
    pub movement: MovementType,
    pub quantity: Quantity,
    pub balance_before: Quantity,
    pub balance_after: Quantity,
    pub reason: String,
    #[serde(default)]
    pub unit_of_measurement: String,
}

// ── Orders and scheduled trips ─────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: String,
    /// Per-item scheduled trip counter.
    #[serde(default)]
    pub scheduled_trips: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripRef {
    pub trip_id: String,
    pub item_index: u32,
    pub product_id: String,
    pub trip_status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub organization_id: String,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    #[serde(default)]
    pub scheduled_trips: Vec<TripRef>,
    #[serde(default)]
    pub total_scheduled_trips: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    pub id: String,
    pub organization_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    pub item_index: u32,
    pub product_id: String,
    pub trip_status: String,
}

impl Trip {
    pub fn as_ref_entry(&self) -> TripRef {
        TripRef {
            trip_id: self.id.clone(),
            item_index: self.item_index,
            product_id: self.product_id.clone(),
            trip_status: self.trip_status.clone(),
        }
    }

    /// `orderId` absent or blank.
    pub fn is_unassigned(&self) -> bool {
        self.order_id.as_deref().map_or(true, str::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn fiscal_period_starts_in_april() {
        assert_eq!(FiscalPeriod::from_date(date(2024, 4, 1)).as_str(), "2024-25");
        assert_eq!(FiscalPeriod::from_date(date(2025, 3, 31)).as_str(), "2024-25");
        assert_eq!(FiscalPeriod::from_date(date(2099, 12, 1)).as_str(), "2099-00");
    }

    #[test]
    fn fiscal_period_parse_and_previous() {
        let p: FiscalPeriod = "2024-25".parse().unwrap();
        assert_eq!(p.previous().as_str(), "2023-24");
        assert!("2024-26".parse::<FiscalPeriod>().is_err());
        assert!("FY24".parse::<FiscalPeriod>().is_err());
    }

    #[test]
    fn fiscal_period_handles_five_digit_years() {
        let p = FiscalPeriod::from_date(date(10_000, 6, 1));
        assert_eq!(p.as_str(), "10000-01");
        assert_eq!(p.start_year(), 10_000);
        assert_eq!(p.previous().as_str(), "9999-00");
        assert_eq!(FiscalPeriod::from_date(date(10_000, 2, 1)).start_year(), 9_999);
    }

    #[test]
    fn balance_effect_follows_ledger_convention() {
        let amt = Amount::from_units(10).unwrap();
        let neg = Amount(-amt.0);
        assert_eq!(LedgerType::Vendor.balance_effect(TransactionType::Credit, amt), amt);
        assert_eq!(LedgerType::Vendor.balance_effect(TransactionType::Debit, amt), neg);
        assert_eq!(LedgerType::Client.balance_effect(TransactionType::Debit, amt), amt);
        assert_eq!(LedgerType::Client.balance_effect(TransactionType::Credit, amt), neg);
    }

    #[test]
    fn transaction_document_shape() {
        let raw = serde_json::json!({
            "id": "T1",
            "organizationId": "org",
            "entityId": "V1",
            "ledgerType": "vendor",
            "type": "credit",
            "category": "purchase",
            "amount": 5_000_000,
            "transactionDate": "2024-06-01",
            "metadata": {
                "lineItems": [{"materialId": "M1", "quantity": 500_000, "unitOfMeasurement": "kg"}]
            }
        });
        let tx: Transaction = serde_json::from_value(raw).unwrap();
        assert!(tx.is_purchase());
        assert_eq!(tx.ledger_id(), "V1_2024-25");
        assert_eq!(tx.metadata.line_items[0].quantity, Quantity::from_units(50).unwrap());
    }

    #[test]
    fn history_ids() {
        assert_eq!(stock_history_id("T1", "M1"), "T1_M1");
        assert_eq!(stock_reversal_id("T1", "M1"), "T1_M1_reversal");
    }
}
