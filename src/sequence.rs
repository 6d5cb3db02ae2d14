//! Per-entity sequence identifiers.
//!
//! Each entity type maps to a short prefix. Identifiers are
//! `{prefix}-{sequence}` with the sequence zero-padded to four digits, and
//! the sequence comes from one atomic increment-or-create on the counter
//! collection.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{McpError, Result};
use crate::store::DocumentStore;

/// Entity types and their identifier prefixes.
pub const ENTITY_PREFIXES: &[(&str, &str)] = &[
    ("task", "TSK"),
    ("lesson", "LSN"),
    ("course", "CRS"),
    ("experiment", "EXP"),
];

/// Default name of the counter collection.
pub const DEFAULT_COUNTERS_COLLECTION: &str = "counters";

/// Prefix for an entity type, if it is recognized.
pub fn prefix_for(entity_type: &str) -> Option<&'static str> {
    ENTITY_PREFIXES
        .iter()
        .find(|(name, _)| *name == entity_type)
        .map(|(_, prefix)| *prefix)
}

/// All recognized entity types, in table order.
pub fn entity_types() -> Vec<String> {
    ENTITY_PREFIXES
        .iter()
        .map(|(name, _)| name.to_string())
        .collect()
}

/// Format an identifier. The width is a minimum; large sequences are never truncated.
pub fn format_id(prefix: &str, sequence: i64) -> String {
    format!("{}-{:04}", prefix, sequence)
}

/// Hands out identifiers backed by a counter collection.
#[derive(Clone)]
pub struct SequenceGenerator {
    store: Arc<dyn DocumentStore>,
    collection: String,
}

impl SequenceGenerator {
    /// Create a generator storing counters in `collection`.
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    /// Name of the counter collection.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Generate the next identifier for `entity_type`.
    ///
    /// Unknown entity types fail before the store is touched. `max_time`
    /// bounds the increment on the store side.
    pub async fn generate(&self, entity_type: &str, max_time: Duration) -> Result<String> {
        let prefix = prefix_for(entity_type).ok_or_else(|| McpError::UnknownEntityType {
            entity_type: entity_type.to_string(),
            expected: entity_types(),
        })?;

        let sequence = self
            .store
            .next_sequence(&self.collection, prefix, max_time)
            .await?;
        tracing::debug!(entity_type, prefix, sequence, "generated sequence id");
        Ok(format_id(prefix, sequence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_table() {
        assert_eq!(prefix_for("task"), Some("TSK"));
        assert_eq!(prefix_for("experiment"), Some("EXP"));
        assert_eq!(prefix_for("Task"), None);
        assert_eq!(entity_types(), vec!["task", "lesson", "course", "experiment"]);
    }

    #[test]
    fn test_format_id_minimum_width() {
        assert_eq!(format_id("TSK", 1), "TSK-0001");
        assert_eq!(format_id("LSN", 9999), "LSN-9999");
        assert_eq!(format_id("CRS", 12345), "CRS-12345");
    }
}
