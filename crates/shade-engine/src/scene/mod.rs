//! Per-frame scene data: the camera and the constant blocks shaders read.

mod camera;
mod constants;

pub use camera::Camera;
pub use constants::{FrameConstants, ObjectConstants};
