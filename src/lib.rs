//! LMSR Market Engine — Library Root
//!
//! Backend core for a binary (YES/NO) prediction market: trade requests are
//! priced by a logarithmic market scoring rule, serialized per market, and
//! recorded through an append-only ledger that is the source of truth for
//! balances. Re-exports all modules for integration tests and benchmarks.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
pub mod usecases;
