#![forbid(unsafe_code)]
//! Hashing and logging utilities for Keel.

pub mod error;
pub mod hash;
pub mod logging;
