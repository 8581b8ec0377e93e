// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Template driven project scaffolding that stays mergeable.
//!
//! A project keeps a __template directory__, `.magicspace` by default, that
//! names the template bundles it is built from. Bundles extend other bundles,
//! and every template entry of the resulting tree is loaded and merged into
//! its destination file, e.g., several bundles can all contribute to one
//! `package.json`.
//!
//! Generated output is never written over the project directly. It is
//! committed to an orphan git branch and merged, so the project can keep
//! local edits to generated files and still receive template updates.
//!
//! # Layout
//!
//! - [`path`]: module specifiers and path placeholders.
//! - [`structured`]: structured values, property paths, and merge primitives.
//! - [`config`]: bundle definitions, template entries, options, and settings.
//! - [`source`]: loaders producing template content.
//! - [`destination`]: destination files folding content and writing it out.
//! - [`bundle`]: project discovery and bundle tree resolution.
//! - [`builder`]: one build pass over a template directory.
//! - [`sync`]: git synchronization protocol.

pub mod builder;
pub mod bundle;
pub mod config;
pub mod destination;
pub mod path;
pub mod source;
pub mod structured;
pub mod sync;

pub use builder::{BuildError, BuildReport, Builder, Registry, DEFAULT_TEMPLATE_DIR};
pub use sync::{git::GitCli, SyncError, SyncOutcome, Synchronizer};
