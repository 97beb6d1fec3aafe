//! Shared helpers for the black-box HTTP and storage tests.

pub mod fixtures;
pub mod setup;
