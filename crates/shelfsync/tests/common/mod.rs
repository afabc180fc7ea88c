//! Shared test utilities for shelfsync integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated runs with a temp workspace and an in-memory database
//! - scripted converter/uploader fakes and an observable store wrapper

pub mod fakes;
pub mod harness;

pub use fakes::*;
pub use harness::TestHarness;
