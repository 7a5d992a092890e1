// ============================================================================
// delta-sets - Core Module
// Change payloads, structural equality, and the error surface
// ============================================================================

pub mod changes;
pub mod equality;
pub mod error;

// Re-export commonly used items
pub use changes::{
    CellChange, CellDelta, CellOverwrite, MapDelta, SetChange, SetDelta, SetOverwrite, ValueBox,
};
pub use equality::{always_equals, by_field, deep_equals, never_equals, EqualsFn};
pub use error::{ReactiveError, Result};
