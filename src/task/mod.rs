//! Task lifecycle management for Jot.
//!
//! At most one task is meant to be active at a time. The rule lives in
//! the command layer ([`services`]), not in the store: the domain state
//! machine validates individual transitions and the repositories persist
//! each mutation atomically with its audit event. The module follows
//! hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
