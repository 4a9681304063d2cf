//! Shared helpers for the load generator integration tests.

pub mod mocks;
