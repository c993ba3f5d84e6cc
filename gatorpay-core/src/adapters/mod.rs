//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - DuckDB for persistence, units of work and unique-identity guards
//! - Keyed in-process locks for per-record exclusive access
//! - Console and HTTP relay transports for CodeDelivery

pub mod delivery;
pub mod duckdb;
pub mod locks;
