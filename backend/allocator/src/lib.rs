//! Quadratic-funding allocator.
//!
//! Normalizes a round's contributions to USD, summarizes them per project,
//! computes matching amounts with the round's declared strategy, and
//! commits the result to a Merkle distribution that recipients can claim
//! against.

pub mod amount;
pub mod api;
pub mod config;
pub mod db;
pub mod distribution;
pub mod errors;
pub mod normalizer;
pub mod rpc;
pub mod service;
pub mod sources;
pub mod strategy;
pub mod summary;
pub mod tokens;
pub mod types;

#[cfg(test)]
mod test_end_to_end;
#[cfg(test)]
mod test_support;
