//! Render workflow engine for the Everkeep client.
//!
//! Provides the workflow session (catalog, selection, photos, render and
//! payment state behind one mutex), a reusable bounded poller, and the
//! broadcast event stream a UI subscribes to.

pub mod events;
pub mod poll;
pub mod session;
