//! Persistent memory document shared across workflow runs.

pub mod manager;
