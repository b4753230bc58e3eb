//! Unique identifiers for participants and lock holders.

use std::fmt::Debug;

/// Source of fresh identifiers.
pub trait IdGenerator: Send + Sync + Debug {
    fn next_id(&self) -> String;
}

/// Random v4 UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}
