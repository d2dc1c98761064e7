//! Domain model for the Everkeep render client.
//!
//! Pure catalog, selection-rule, and photo-set logic shared by the
//! workflow engine and the driver binary. No I/O lives here.

pub mod catalog;
pub mod photos;
pub mod rules;
