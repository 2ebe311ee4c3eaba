//! Resource state tracking and transition barriers.
//!
//! Every GPU resource has a declared access state. Changing how a resource is
//! accessed requires a barrier recorded into a command list before the access.
//! [`StateTracker`] keeps the declared state per resource so callers can ask
//! for a state instead of spelling out both ends of each transition.

mod state;
mod tracker;

pub use state::{Barrier, ResourceState};
pub use tracker::StateTracker;
