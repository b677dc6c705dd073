// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # ephys-observability
//!
//! Logging infrastructure for the ephys pipeline crates.
//!
//! Provides a single `tracing` subscriber setup with per-crate debug flag support.
//!
//! ## Features
//! - `file-logging`: per-run log folders with one JSON file per crate

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cli;
pub mod config;
pub mod init;

pub use cli::*;
pub use config::*;
pub use init::*;

/// Known crate names for debug flags
///
/// Filter directives use the Rust target name, so flags are given with dashes
/// (`--debug-ephys-psth`) and translated to `ephys_psth=debug`.
pub const KNOWN_CRATES: &[&str] = &[
    "ephys",
    "ephys-config",
    "ephys-observability",
    "ephys-structures",
    "ephys-psth",
];
