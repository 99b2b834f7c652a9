//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` and hosts the
//! process boundaries (HTTP, metrics). Each sub-module groups adapters by
//! infrastructure concern:
//!
//! - `http`: axum router, handlers, and the rate-limit middleware
//! - `metrics`: Prometheus registry and text rendering
//! - `persistence`: in-memory reference storage and the JSONL/snapshot
//!   file storage

pub mod http;
pub mod metrics;
pub mod persistence;
