//! Shared utilities for docmerge integration tests.
//!
//! - `TestHarness` owns isolated input/output directories and runs merges
//! - `builders` writes PDF, DOCX, ZIP and EML fixtures on the fly

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
