// ============================================================================
// delta-sets - Transport Module
// The typed broadcast every reactive node emits through
// ============================================================================

mod cancel;
mod signal;

pub use cancel::CancelToken;
pub use signal::{Signal, SignalController, SignalHandler, Subscription};
