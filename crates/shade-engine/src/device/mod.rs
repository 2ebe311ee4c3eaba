//! Device + surface bootstrap.
//!
//! This module is responsible for:
//! - creating the wgpu Instance/Adapter/Device/Queue
//! - creating & configuring the double-buffered Surface (swapchain)
//! - acquiring surface textures and mapping surface errors to actions

mod gpu;
mod init;
mod surface;

pub use gpu::Gpu;
pub use init::DeviceInit;
pub use surface::SurfaceErrorAction;
pub(crate) use surface::{from_wgpu_format, to_wgpu_format};
