#![forbid(unsafe_code)]

//! Ledger & inventory consistency kernel.
//!
//! Pure, deterministic domain logic: ledger transitions, stock movement
//! planning, rebuild from the transaction log, invariant and consistency
//! checks, and typed fixes. No I/O lives here.

/// Bumped whenever canonical fingerprints change shape.
pub const KERNEL_VERSION: u32 = 1;

pub mod arithmetic;
pub mod consistency;
pub mod domain;
pub mod engine;
pub mod error;
pub mod events;
pub mod fixes;
pub mod hashing;
pub mod invariants;
pub mod rebuild;
pub mod state;
pub mod stock;
pub mod transitions;
