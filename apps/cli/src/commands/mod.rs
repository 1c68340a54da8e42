//! Command implementations for the Reverie CLI.

pub mod dream;
pub mod models;
