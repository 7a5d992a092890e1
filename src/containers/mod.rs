// ============================================================================
// delta-sets - Containers Module
// Mutable leaves of the reactive graph
// ============================================================================

mod cell;
mod set;

pub use cell::{cell, CellOptions, ReactiveCell};
pub use set::{set, ReactiveSet, SetOptions};
