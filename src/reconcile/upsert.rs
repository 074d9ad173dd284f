// Copyright (c) 2025 - Cowboy AI, Inc.
//! Diff/Upsert Engine
//!
//! Decides whether an existing entity differs from its [`Desired`] state
//! and, if so, persists exactly the differing fields.
//!
//! Field policies:
//!
//! - **scalars** (status, vcpus, memory, enabled, MAC, MTU, ...) are
//!   overwritten when the normalized current value differs; identical values
//!   produce no write, which is what makes repeated runs idempotent
//! - **custom fields** are compared per key and written back merged with the
//!   keys already present
//! - **sections** replace the lines between a fixed marker and the next
//!   marker, keeping whatever a human wrote before it and any other sections
//!
//! ```text
//! "Note: keep\n=== Volumes ===\nold-line"  +  "new-line"
//!     => "Note: keep\n\n=== Volumes ===\nnew-line"
//! ```

use serde_json::Value;
use tracing::debug;

use super::desired::Desired;
use crate::errors::{SyncError, SyncResult};
use crate::registry::{scalar_of, Entity, Fields, Registry};

/// Lines kept in one marked section
pub const SECTION_LINE_LIMIT: usize = 50;

/// Replace the marked section of `existing` with `content`
///
/// A section runs from its marker line up to the next line that is another
/// `=== ... ===` marker, or to the end of the text.
///
/// - empty text: the section alone
/// - marker present: the text before the marker and any sections after it
///   are kept, the marked section is replaced
/// - marker absent: the section is appended after a blank line
pub fn merge_section(existing: &str, marker: &str, content: &str) -> String {
    let section = format!("{}\n{}", marker, content);
    let lines: Vec<&str> = existing.lines().collect();

    let Some(start) = lines.iter().position(|line| line.trim() == marker) else {
        let existing = existing.trim_end();
        return if existing.trim().is_empty() {
            section
        } else {
            format!("{}\n\n{}", existing, section)
        };
    };
    let end = lines[start + 1..]
        .iter()
        .position(|line| is_section_marker(line))
        .map_or(lines.len(), |offset| start + 1 + offset);

    let before = lines[..start].join("\n");
    let after = lines[end..].join("\n");
    [before.trim(), section.as_str(), after.trim()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// A line of the form `=== Title ===`
fn is_section_marker(line: &str) -> bool {
    let line = line.trim();
    line.len() > 6 && line.starts_with("===") && line.ends_with("===")
}

/// Join section lines, keeping at most [`SECTION_LINE_LIMIT`]
pub fn section_content<S: AsRef<str>>(lines: &[S]) -> String {
    lines
        .iter()
        .take(SECTION_LINE_LIMIT)
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join("\n")
}

fn values_equal(field: &str, current: &Value, desired: &Value) -> bool {
    match (field, current, desired) {
        ("mac_address", Value::String(a), Value::String(b)) => a.eq_ignore_ascii_case(b),
        (_, Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => current == desired,
    }
}

fn current_value(entity: &Entity, field: &str) -> Value {
    entity.field(field).map(scalar_of).unwrap_or(Value::Null)
}

/// Text of every sectioned field after applying the desired sections,
/// starting from `base` for each field
fn render_sections<F>(desired: &Desired, base: F) -> Fields
where
    F: Fn(&str) -> String,
{
    let mut rendered = Fields::new();
    for section in &desired.sections {
        let current = match rendered.get(&section.field).and_then(Value::as_str) {
            Some(text) => text.to_string(),
            None => base(&section.field),
        };
        let merged = merge_section(&current, &section.marker, &section.content);
        rendered.insert(section.field.clone(), Value::from(merged));
    }
    rendered
}

/// Fields to send when `desired` does not exist yet
pub fn create_fields(desired: &Desired) -> Fields {
    let mut fields = desired.create_only.clone();
    for (field, value) in &desired.attributes {
        fields.insert(field.clone(), value.clone());
    }
    if !desired.custom_fields.is_empty() {
        fields.insert(
            "custom_fields".to_string(),
            Value::Object(desired.custom_fields.clone()),
        );
    }

    let sections = render_sections(desired, |field| {
        desired
            .attributes
            .get(field)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    });
    fields.extend(sections);
    fields
}

/// Minimal set of changes that brings `existing` to `desired`
pub fn diff(existing: &Entity, desired: &Desired) -> Fields {
    let mut changes = Fields::new();

    for (field, want) in &desired.attributes {
        if desired.sections.iter().any(|s| &s.field == field) {
            continue;
        }
        let current = current_value(existing, field);
        if !values_equal(field, &current, want) {
            changes.insert(field.clone(), want.clone());
        }
    }

    if !desired.custom_fields.is_empty() {
        let current = existing
            .field("custom_fields")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let stale = desired.custom_fields.iter().any(|(key, want)| {
            let have = current.get(key).map(scalar_of).unwrap_or(Value::Null);
            !values_equal(key, &have, want)
        });
        if stale {
            let mut merged = current;
            for (key, value) in &desired.custom_fields {
                merged.insert(key.clone(), value.clone());
            }
            changes.insert("custom_fields".to_string(), Value::Object(merged));
        }
    }

    let sections = render_sections(desired, |field| {
        // A desired attribute on the same field replaces the human text
        match desired.attributes.get(field).and_then(Value::as_str) {
            Some(text) => text.to_string(),
            None => existing.text(field).unwrap_or_default().to_string(),
        }
    });
    for (field, merged) in sections {
        if existing.field(field.as_str()) != Some(&merged) {
            changes.insert(field, merged);
        }
    }

    changes
}

/// Persist the difference between `existing` and `desired`
///
/// Returns `true` when an update was written, `false` for a no-op.
pub async fn apply<R>(registry: &R, existing: &Entity, desired: &Desired) -> SyncResult<bool>
where
    R: Registry + ?Sized,
{
    let changes = diff(existing, desired);
    if changes.is_empty() {
        return Ok(false);
    }

    debug!(
        kind = %desired.kind,
        key = %desired.label(),
        fields = ?changes.keys().collect::<Vec<_>>(),
        "updating entity"
    );

    registry
        .save(desired.kind, existing.id, &changes)
        .await
        .map_err(|e| SyncError::from_registry(e, desired.kind, desired.label()))?;
    Ok(true)
}
