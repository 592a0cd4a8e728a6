//! Common type definitions.
//!
//! Entity identifiers are UUIDs behind type aliases, plus a couple of
//! logging helpers shared across modules.

use uuid::Uuid;

/// Identifier of a ranked principal (a `profiles` row).
pub type UserId = Uuid;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}
