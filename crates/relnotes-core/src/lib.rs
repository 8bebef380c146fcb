//! Core library for relnotes.
//!
//! Turns the commits since the last tag into a version, release notes and a
//! Keep a Changelog entry, and keeps `CHANGELOG.md` free of duplicate
//! sections and link definitions across repeated runs.
//!
//! # Modules
//!
//! - [`version`] - Commit classification and semantic-version arithmetic
//! - [`release`] - The per-release aggregate and planning from history
//! - [`stats`] - Diff statistics and contributors
//! - [`git`] - The [`History`] seam and its `git` CLI implementation
//! - [`notes`] - Release notes synthesis (external generator or fallback)
//! - [`prompt`] - Localized prompt templates for generators
//! - [`changelog`] - Changelog document merging and validation
//! - [`publish`] - Publishing releases to the forge
//! - [`cut`] - End-to-end release cutting
//! - [`config`] - Configuration loading and management
//! - [`error`] - Configuration error types
//!
//! # Quick Start
//!
//! ```no_run
//! use camino::Utf8Path;
//! use relnotes_core::cut::{CutOptions, cut_release};
//! use relnotes_core::git::GitCli;
//!
//! let history = GitCli::new(".");
//! let outcome = cut_release(
//!     &history,
//!     None,
//!     None,
//!     Utf8Path::new("CHANGELOG.md"),
//!     CutOptions::default(),
//!     &mut |_| {},
//! )
//! .expect("release cut");
//! println!("released {}", outcome.version);
//! ```
#![deny(unsafe_code)]

pub mod changelog;

pub mod config;

pub mod cut;

pub mod error;

pub mod git;

pub mod notes;

pub mod prompt;

pub mod publish;

pub mod release;

pub mod stats;

pub mod version;

pub use config::{Config, ConfigLoader, LogLevel};

pub use error::{ConfigError, ConfigResult};

pub use git::History;

pub use release::Release;

// Re-export semver so downstream crates don't need a direct dependency.
pub use semver;
