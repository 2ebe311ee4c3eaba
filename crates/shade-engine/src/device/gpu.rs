use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use wgpu::SurfaceError;
use winit::dpi::PhysicalSize;
use winit::window::Window;

use crate::error::{EngineError, EngineResult};

use super::DeviceInit;
use super::surface::{self, SurfaceErrorAction};

/// Device, queue and the window's swapchain.
///
/// Everything the native backend submits goes through the one queue held here.
/// The surface borrows the window, so the window outlives the `Gpu`.
pub struct Gpu<'w> {
    _instance: wgpu::Instance,
    surface: wgpu::Surface<'w>,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,

    /// Drawable size in physical pixels. May be zero while minimized.
    size: PhysicalSize<u32>,

    /// Set from the device-lost callback.
    lost: Arc<AtomicBool>,
}

impl<'w> Gpu<'w> {
    /// Creates the device and configures a double-buffered surface on `window`.
    ///
    /// Every failure here is an [`EngineError::Init`].
    pub async fn new(window: &'w Window, init: DeviceInit) -> EngineResult<Self> {
        let size = window.inner_size();
        if size.width == 0 || size.height == 0 {
            return Err(EngineError::Init("window has zero size".into()));
        }

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(window)
            .map_err(|e| EngineError::Init(format!("surface creation failed: {e}")))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: init.power_preference,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| EngineError::Init(format!("no suitable adapter: {e}")))?;

        let info = adapter.get_info();
        log::info!("adapter: {} ({:?}, {:?})", info.name, info.backend, info.device_type);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("shade device"),
                required_features: init.required_features,
                required_limits: init.required_limits.clone(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| EngineError::Init(format!("device creation failed: {e}")))?;

        let lost = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&lost);
        device.set_device_lost_callback(move |reason, message| {
            log::error!("device lost ({reason:?}): {message}");
            flag.store(true, Ordering::Release);
        });

        let config = swapchain_config(&surface, &adapter, &init, size)?;
        surface.configure(&device, &config);
        log::debug!(
            "swapchain: {}x{} {:?}, usage {:?}, {:?}",
            config.width,
            config.height,
            config.format,
            config.usage,
            config.present_mode
        );

        Ok(Gpu {
            _instance: instance,
            surface,
            adapter,
            device,
            queue,
            config,
            size,
            lost,
        })
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    /// Usages the swapchain images were configured with.
    pub fn surface_usage(&self) -> wgpu::TextureUsages {
        self.config.usage
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    pub fn adapter(&self) -> &wgpu::Adapter {
        &self.adapter
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Whether the driver reported the device as removed.
    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    /// Reconfigures the swapchain. A zero size is remembered but not applied.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        surface::apply_resize(
            &self.surface,
            &self.device,
            &mut self.config,
            &mut self.size,
            new_size,
        );
    }

    /// Next swapchain image. Presenting it hands it back to the surface.
    pub fn acquire(&self) -> Result<wgpu::SurfaceTexture, SurfaceError> {
        self.surface.get_current_texture()
    }

    pub fn handle_surface_error(&mut self, err: SurfaceError) -> SurfaceErrorAction {
        surface::map_surface_error(&self.surface, &self.device, &self.config, self.size, err)
    }
}

fn swapchain_config(
    surface: &wgpu::Surface<'_>,
    adapter: &wgpu::Adapter,
    init: &DeviceInit,
    size: PhysicalSize<u32>,
) -> EngineResult<wgpu::SurfaceConfiguration> {
    let caps = surface.get_capabilities(adapter);
    let format = surface::choose_surface_format(&caps, init.prefer_srgb)
        .ok_or_else(|| EngineError::Init(format!("no usable surface format in {:?}", caps.formats)))?;

    Ok(wgpu::SurfaceConfiguration {
        usage: surface::surface_usage(&caps),
        format,
        width: size.width,
        height: size.height,
        present_mode: init.present_mode,
        alpha_mode: surface::choose_alpha_mode(&caps, init.alpha_mode),
        view_formats: vec![],
        desired_maximum_frame_latency: init.desired_maximum_frame_latency,
    })
}
