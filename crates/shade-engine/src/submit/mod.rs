//! Command submission.
//!
//! [`SubmissionEngine`] owns the frame's recording units and the fence, and is
//! the single path by which command lists reach the queue.

mod engine;

pub use engine::SubmissionEngine;
