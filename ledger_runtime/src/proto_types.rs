//! Hand-written protobuf types for the change journal.
//!
//! Uses prost derive macros for encode/decode without prost-build.
//! Amounts and quantities travel as scaled i64, dates as ISO-8601 text.
//! Tag numbers are frozen once written to a journal.

use prost::Message;

// ── Envelope ───────────────────────────────────────────────────

#[derive(Clone, PartialEq, Message)]
pub struct ProtoChangeEnvelope {
    #[prost(uint64, tag = "1")]
    pub sequence: u64,
    #[prost(uint32, tag = "2")]
    pub schema_version: u32,
    #[prost(enumeration = "ProtoChangeKind", tag = "3")]
    pub kind: i32,
    #[prost(message, optional, tag = "4")]
    pub transaction: Option<ProtoTransaction>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum ProtoChangeKind {
    Unspecified = 0,
    Created = 1,
    Deleted = 2,
}

// ── Transaction ────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum ProtoLedgerType {
    Unspecified = 0,
    Client = 1,
    Vendor = 2,
    Employee = 3,
    Organization = 4,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum ProtoTransactionType {
    Unspecified = 0,
    Credit = 1,
    Debit = 2,
}

#[derive(Clone, PartialEq, Message)]
pub struct ProtoTransaction {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub organization_id: String,
    #[prost(string, tag = "3")]
    pub entity_id: String,
    #[prost(enumeration = "ProtoLedgerType", tag = "4")]
    pub ledger_type: i32,
    #[prost(enumeration = "ProtoTransactionType", tag = "5")]
    pub tx_type: i32,
    #[prost(string, tag = "6")]
    pub category: String,
    #[prost(int64, tag = "7")]
    pub amount_scaled: i64,
    #[prost(string, tag = "8")]
    pub transaction_date: String,
    #[prost(string, optional, tag = "9")]
    pub financial_year: Option<String>,
    #[prost(message, repeated, tag = "10")]
    pub line_items: Vec<ProtoLineItem>,
    #[prost(string, optional, tag = "11")]
    pub reference: Option<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ProtoLineItem {
    #[prost(string, tag = "1")]
    pub material_id: String,
    #[prost(int64, tag = "2")]
    pub quantity_scaled: i64,
    #[prost(string, tag = "3")]
    pub unit_of_measurement: String,
}
