//! Identifier generation.

use uuid::Uuid;

/// Generates a new time-ordered identifier (UUID v7).
///
/// Used for request contexts, assertion results and anything else that
/// needs a unique, sortable uid.
#[must_use]
pub fn generate_id() -> String {
    Uuid::now_v7().to_string()
}
