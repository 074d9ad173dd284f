// Copyright (c) 2025 - Cowboy AI, Inc.
//! Reconciliation Engine
//!
//! ```text
//! CanonicalRecord ──▶ Reconciler ──▶ Resolver ──▶ Upsert ──▶ Registry
//!                         │              ▲
//!                         └──▶ Linker ───┘
//! ```
//!
//! - [`reconciler`] maps records onto entities, dependency entities first
//! - [`resolver`] is the generic "ensure exists" primitive with the per-run
//!   dependency cache
//! - [`upsert`] computes minimal diffs and merges marked text sections
//! - [`linker`] handles interface ownership, address assignment and prefix
//!   policy
//!
//! Every registry call is awaited before the next one is issued; the engine
//! is a single writer.

pub mod convert;
pub mod desired;
pub mod linker;
pub mod reconciler;
pub mod resolver;
pub mod upsert;

pub use convert::{memory_mb_from_bytes, slugify, vcpus_from_quota};
pub use desired::{Desired, Section};
pub use linker::{normalize_address, InterfaceSpec, PrefixPolicy};
pub use reconciler::{ReconcileOptions, Reconciler};
pub use resolver::{Resolved, Resolver};
pub use upsert::{merge_section, SECTION_LINE_LIMIT};
