// ============================================================================
// delta-sets - Errors
// The exhaustive error surface of the reactive graph
// ============================================================================

use thiserror::Error;

/// Every failure a reactive node can report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// Caller tried to mutate a derived collection.
    #[error("cannot mutate a derived collection")]
    ReadonlyAccess,

    /// Caller tried to mutate a container whose reactivity has been turned
    /// off.
    #[error("reactivity is disabled for this container")]
    ReactivityDisabled,

    /// Attempt to register the same source twice in a variadic combinator.
    #[error("source is already registered with this combinator")]
    DuplicateSource,

    /// A projection engine was wired with a dependency name that has no
    /// matching source/resolver pairing.
    #[error("dependency `{0}` has no matching source and resolver")]
    InvalidDependencyKind(String),

    /// A cell delta buffer was asked to commit with no pending change.
    #[error("no pending change to commit")]
    CommitWithoutPending,

    /// Extraction or commit was called on a disabled buffer.
    #[error("delta buffer is disabled")]
    BufferDisabled,

    /// A resolver returned an error or its future failed.
    #[error("resolver failed: {0}")]
    ResolverFailure(String),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, ReactiveError>;

// =============================================================================
// TESTS
// =============================================================================
