//! `everkeep-driver` library crate.
//!
//! Holds the configuration loader and the end-to-end run loop so they
//! can be exercised from tests. The binary entrypoint lives in
//! `main.rs`.

pub mod config;
pub mod run;
