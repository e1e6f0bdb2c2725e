//! Shared error types for the veriscan crates.

pub mod errors;
