//! Correlation id generation.

use uuid::Uuid;

use super::types::CorrelationId;

/// Pure function returning a string unique for the lifetime of the process.
pub trait CorrelationIdGenerator: Send + Sync + 'static {
    /// Generate a fresh correlation id.
    fn generate(&self) -> CorrelationId;
}

/// Generates correlation ids from random v4 UUIDs.
pub struct UuidCorrelationIdGenerator;

impl CorrelationIdGenerator for UuidCorrelationIdGenerator {
    fn generate(&self) -> CorrelationId {
        Uuid::new_v4().to_string()
    }
}
