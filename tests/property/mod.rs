// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests Module
//!
//! Idempotence, natural-key uniqueness and order independence of
//! reconciliation against the in-memory registry.

mod idempotence;
