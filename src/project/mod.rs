// ============================================================================
// delta-sets - Project Module
// Delta buffers, the projection engine, and its concrete configurations
// ============================================================================

mod cell_buffer;
mod derive;
mod engine;
mod set_buffer;

pub use cell_buffer::CellDeltaBuffer;
pub use derive::{
    complement_via_cell, complement_via_collection, mapped_set, subset_via_cell,
    subset_via_collection, CellProjection, DeltaMapper, KeyProjection, MappedSetOptions,
    ProjectViaCellOptions, ProjectViaSetOptions,
};
pub use engine::{
    BoxError, CommittedState, DependencyDelta, DependencySource, EngineOptions, ProjectionEngine,
    Resolver, ResolverContext, ResolverFuture,
};
pub use set_buffer::SetDeltaBuffer;
