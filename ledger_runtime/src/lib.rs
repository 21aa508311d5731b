#![forbid(unsafe_code)]

//! Ledger runtime.
//!
//! Wraps the kernel with a document store and its atomic transaction
//! primitive, change handlers, rebuild, consistency checking and repair,
//! a durable change journal, configuration and logging.
//!
//! Balance arithmetic, invariants and fix semantics are delegated to
//! the kernel. This crate only reads, plans and persists.

pub mod config;
pub mod consistency;
pub mod documents;
pub mod drift;
pub mod error;
pub mod handlers;
pub mod journal;
pub mod ledger_mutator;
pub mod order_trips;
pub mod proto_bridge;
pub mod proto_types;
pub mod rebuild;
pub mod replay;
pub mod service;
pub mod session;
pub mod stock_mutator;
pub mod store;
pub mod telemetry;
