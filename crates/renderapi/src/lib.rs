//! HTTP client library for the Everkeep rendering backend.
//!
//! Provides typed request/response wire types, interpretation of the
//! backend's status-discriminated responses into closed outcome enums,
//! and a [`reqwest`]-based client covering the catalog, upload,
//! start-frame, render, and support endpoints.

pub mod api;
pub mod wire;
