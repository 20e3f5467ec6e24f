//! Shared test utilities for auth-platform Rust crates.
//!
//! This crate provides:
//! - Proptest generators for subjects and token lifetimes
//! - RSA key fixtures and sample data

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

pub use fixtures::*;
pub use generators::*;
