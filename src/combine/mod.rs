// ============================================================================
// delta-sets - Combine Module
// Derived collections over an occurrence-count index
// ============================================================================

pub mod lifecycle;
mod difference;
mod intersection;
mod union;
mod variadic;

pub use difference::{difference, DifferenceSet};
pub use intersection::{intersection, IntersectionSet};
pub use lifecycle::CombinationNode;
pub use union::{union, UnionSet};
pub use variadic::{DifferenceOptions, VariadicOptions};
