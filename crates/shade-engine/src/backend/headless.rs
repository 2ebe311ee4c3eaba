use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::cmd::{Command, CommandList};
use crate::error::{EngineError, EngineResult};
use crate::pipeline::PipelineDesc;
use crate::sync::{FenceValue, Timeline};

use super::GpuBackend;
use super::types::{
    BACK_BUFFER_COUNT, BufferDesc, DescriptorHeapInfo, Extent, GpuAddress, MemoryKind, PipelineId,
    ResourceId, SwapchainInfo, TextureDesc, TextureFormat, ViewDesc,
};

const BUFFER_ADDRESS_BASE: u64 = 0x1_0000_0000;
const BUFFER_ADDRESS_ALIGNMENT: u64 = 0x1_0000;
const DESCRIPTOR_CPU_BASE: u64 = 0x7000_0000;
const DESCRIPTOR_GPU_BASE: u64 = 0x8000_0000_0000;

/// How long the simulated GPU takes to run one list.
#[derive(Debug, Clone, Default)]
pub enum LatencyModel {
    #[default]
    Immediate,
    Fixed(Duration),
    /// Delays consumed one per list, then zero.
    Scripted(Vec<Duration>),
    /// Uniform in `[0, max]`, reproducible from `seed`.
    Random { max: Duration, seed: u64 },
}

/// Headless backend configuration.
#[derive(Debug, Clone)]
pub struct HeadlessConfig {
    /// Size of the simulated swapchain images.
    pub extent: Extent,

    /// Format of the simulated swapchain images.
    pub format: TextureFormat,

    /// Per-list execution delay on the GPU thread.
    pub latency: LatencyModel,

    /// Bytes between descriptor slots.
    pub descriptor_stride: u32,

    /// Executed lists kept for [`HeadlessBackend::executed`]. The oldest are
    /// dropped first; zero keeps none.
    pub executed_log: usize,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            extent: Extent::new(1280, 720),
            format: TextureFormat::Bgra8UnormSrgb,
            latency: LatencyModel::Immediate,
            descriptor_stride: 32,
            executed_log: 256,
        }
    }
}

/// A list as it was handed to the simulated queue.
#[derive(Debug, Clone)]
pub struct ExecutedList {
    pub label: String,
    pub commands: Vec<Command>,
}

#[derive(Debug)]
enum Resource {
    Buffer {
        label: String,
        memory: MemoryKind,
        address: GpuAddress,
        data: Vec<u8>,
    },
    Texture {
        label: String,
        extent: Extent,
        format: TextureFormat,
    },
    Released,
}

#[derive(Debug, Default)]
struct TimelineState {
    completed: u64,
    lost: bool,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<TimelineState>,
    signaled: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, TimelineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

enum Job {
    Execute(Duration),
    Signal(u64),
    Lose,
}

/// Software GPU.
///
/// A worker thread plays the GPU: it runs lists in submission order, sleeping
/// for the configured latency, and completes fence signals in order. Buffer
/// contents are kept on the CPU so copies can be checked after the fact.
pub struct HeadlessBackend {
    config: HeadlessConfig,
    resources: Vec<Resource>,
    next_address: u64,
    heap: Option<DescriptorHeapInfo>,
    descriptors: Vec<Option<(ResourceId, ViewDesc)>>,
    pipelines: Vec<String>,
    executed: Vec<ExecutedList>,
    executed_count: u64,
    rng: StdRng,
    scripted: usize,

    swapchain: SwapchainInfo,
    current_back_buffer: usize,
    acquired: bool,
    presents: u64,

    shared: Arc<Shared>,
    jobs: Option<mpsc::Sender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl HeadlessBackend {
    pub fn new(config: HeadlessConfig) -> Self {
        let shared = Arc::new(Shared::default());
        let (jobs, rx) = mpsc::channel();
        let worker = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("headless-gpu".to_string())
                .spawn(move || run_gpu(shared, rx))
                .ok()
        };
        if worker.is_none() {
            log::error!("failed to spawn headless GPU thread; device starts lost");
            shared.lock().lost = true;
        }

        let seed = match config.latency {
            LatencyModel::Random { seed, .. } => seed,
            _ => 0,
        };

        let mut backend = Self {
            resources: Vec::new(),
            next_address: BUFFER_ADDRESS_BASE,
            heap: None,
            descriptors: Vec::new(),
            pipelines: Vec::new(),
            executed: Vec::new(),
            executed_count: 0,
            rng: StdRng::seed_from_u64(seed),
            scripted: 0,
            swapchain: SwapchainInfo {
                extent: config.extent,
                format: config.format,
                back_buffers: [ResourceId::from_index(0); BACK_BUFFER_COUNT],
            },
            current_back_buffer: 0,
            acquired: false,
            presents: 0,
            shared,
            jobs: Some(jobs),
            worker,
            config,
        };

        for (i, slot) in backend.swapchain.back_buffers.iter_mut().enumerate() {
            *slot = ResourceId::from_index(backend.resources.len() as u32);
            backend.resources.push(Resource::Texture {
                label: format!("back buffer {i}"),
                extent: backend.config.extent,
                format: backend.config.format,
            });
        }

        backend
    }

    /// The most recently executed lists, in queue order.
    pub fn executed(&self) -> &[ExecutedList] {
        &self.executed
    }

    /// Lists executed since creation, including those no longer logged.
    pub fn executed_count(&self) -> u64 {
        self.executed_count
    }

    pub fn presents(&self) -> u64 {
        self.presents
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    /// Contents of a buffer as the GPU will see them once pending work completes.
    pub fn read_buffer(&self, resource: ResourceId) -> Option<&[u8]> {
        match self.resources.get(resource.index()) {
            Some(Resource::Buffer { data, .. }) => Some(data),
            _ => None,
        }
    }

    pub fn texture_info(&self, resource: ResourceId) -> Option<(Extent, TextureFormat)> {
        match self.resources.get(resource.index()) {
            Some(Resource::Texture { extent, format, .. }) => Some((*extent, *format)),
            _ => None,
        }
    }

    pub fn buffer_memory(&self, resource: ResourceId) -> Option<MemoryKind> {
        match self.resources.get(resource.index()) {
            Some(Resource::Buffer { memory, .. }) => Some(*memory),
            _ => None,
        }
    }

    /// Debug label a live resource was created with.
    pub fn label(&self, resource: ResourceId) -> Option<&str> {
        match self.resources.get(resource.index()) {
            Some(Resource::Buffer { label, .. } | Resource::Texture { label, .. }) => Some(label),
            _ => None,
        }
    }

    pub fn descriptor(&self, slot: u32) -> Option<(ResourceId, ViewDesc)> {
        self.descriptors.get(slot as usize).copied().flatten()
    }

    /// Simulates device removal once all previously queued work has run.
    pub fn lose_device(&mut self) {
        self.send(Job::Lose).ok();
    }

    fn send(&self, job: Job) -> EngineResult<()> {
        self.jobs
            .as_ref()
            .and_then(|tx| tx.send(job).ok())
            .ok_or_else(|| EngineError::Submit("headless GPU thread is gone".into()))
    }

    fn next_latency(&mut self) -> Duration {
        match &self.config.latency {
            LatencyModel::Immediate => Duration::ZERO,
            LatencyModel::Fixed(d) => *d,
            LatencyModel::Scripted(delays) => {
                let d = delays.get(self.scripted).copied().unwrap_or_default();
                self.scripted += 1;
                d
            }
            LatencyModel::Random { max, .. } => {
                let max = max.as_micros() as u64;
                Duration::from_micros(self.rng.random_range(0..=max))
            }
        }
    }

    fn resource(&self, id: ResourceId) -> EngineResult<&Resource> {
        match self.resources.get(id.index()) {
            Some(Resource::Released) | None => Err(EngineError::UnknownResource(id)),
            Some(r) => Ok(r),
        }
    }

    fn buffer_mut(&mut self, id: ResourceId) -> EngineResult<&mut Vec<u8>> {
        match self.resources.get_mut(id.index()) {
            Some(Resource::Buffer { data, .. }) => Ok(data),
            _ => Err(EngineError::UnknownResource(id)),
        }
    }

    fn copy_buffer(
        &mut self,
        dst: ResourceId,
        dst_offset: u64,
        src: ResourceId,
        src_offset: u64,
        size: u64,
    ) -> EngineResult<()> {
        let bytes = {
            let data = self.buffer_mut(src)?;
            let range = src_offset as usize..(src_offset + size) as usize;
            data.get(range)
                .map(<[u8]>::to_vec)
                .ok_or_else(|| EngineError::Submit(format!("copy reads past end of {src:?}")))?
        };
        let data = self.buffer_mut(dst)?;
        let range = dst_offset as usize..(dst_offset + size) as usize;
        data.get_mut(range)
            .ok_or_else(|| EngineError::Submit(format!("copy writes past end of {dst:?}")))?
            .copy_from_slice(&bytes);
        Ok(())
    }

    /// Rejects lists that reference resources this device does not own.
    fn validate(&self, list: &CommandList) -> EngineResult<()> {
        let check = |id: ResourceId| {
            self.resource(id)
                .map(|_| ())
                .map_err(|_| EngineError::Submit(format!("`{}` uses unknown {id:?}", list.label())))
        };

        for command in list.commands() {
            match command {
                Command::Barrier(b) => check(b.resource)?,
                Command::SetPipeline(p) => {
                    if p.index() >= self.pipelines.len() {
                        return Err(EngineError::Submit(format!(
                            "`{}` binds unknown {p:?}",
                            list.label()
                        )));
                    }
                }
                Command::SetRenderTargets { color, depth } => {
                    check(*color)?;
                    if let Some(depth) = depth {
                        check(*depth)?;
                    }
                }
                Command::ClearColor { target, .. } | Command::ClearDepth { target, .. } => check(*target)?,
                Command::SetConstants { span, .. } => check(span.resource)?,
                Command::SetVertexBuffer { view, .. } => check(view.span.resource)?,
                Command::SetIndexBuffer(view) => check(view.span.resource)?,
                Command::CopyResource { dst, src } => {
                    check(*dst)?;
                    check(*src)?;
                }
                Command::CopyBufferRegion { dst, src, .. } => {
                    check(*dst)?;
                    check(*src)?;
                }
                Command::SetViewport(_) | Command::SetScissor(_) | Command::DrawIndexed(_) => {}
            }
        }
        Ok(())
    }
}

impl Timeline for HeadlessBackend {
    fn signal(&mut self, value: FenceValue) -> EngineResult<()> {
        if self.shared.lock().lost {
            return Err(EngineError::Submit("device lost".into()));
        }
        self.send(Job::Signal(value.get()))
    }

    fn completed_value(&self) -> FenceValue {
        FenceValue::new(self.shared.lock().completed)
    }

    fn wait_for(&self, value: FenceValue) -> EngineResult<()> {
        let mut state = self.shared.lock();
        while state.completed < value.get() {
            if state.lost {
                return Err(EngineError::DeviceLost { value });
            }
            state = self
                .shared
                .signaled
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        Ok(())
    }
}

impl GpuBackend for HeadlessBackend {
    fn name(&self) -> &str {
        "headless"
    }

    fn create_buffer(&mut self, desc: &BufferDesc<'_>) -> EngineResult<ResourceId> {
        let id = ResourceId::from_index(self.resources.len() as u32);
        let address = GpuAddress(self.next_address);
        self.next_address += crate::arena::align_up(desc.size.max(1), BUFFER_ADDRESS_ALIGNMENT);

        self.resources.push(Resource::Buffer {
            label: desc.label.to_string(),
            memory: desc.memory,
            address,
            data: vec![0; desc.size as usize],
        });
        Ok(id)
    }

    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> EngineResult<ResourceId> {
        if desc.extent.is_empty() {
            return Err(EngineError::Init(format!("texture `{}` has zero size", desc.label)));
        }
        let id = ResourceId::from_index(self.resources.len() as u32);
        self.resources.push(Resource::Texture {
            label: desc.label.to_string(),
            extent: desc.extent,
            format: desc.format,
        });
        Ok(id)
    }

    fn destroy(&mut self, resource: ResourceId) -> EngineResult<()> {
        self.resource(resource)?;
        if self.swapchain.back_buffers.contains(&resource) {
            return Err(EngineError::Frame("swapchain images belong to the surface"));
        }
        self.resources[resource.index()] = Resource::Released;
        Ok(())
    }

    fn gpu_address(&self, resource: ResourceId) -> EngineResult<GpuAddress> {
        match self.resource(resource)? {
            Resource::Buffer { address, .. } => Ok(*address),
            _ => Err(EngineError::UnknownResource(resource)),
        }
    }

    fn write_buffer(&mut self, resource: ResourceId, offset: u64, data: &[u8]) -> EngineResult<()> {
        let buffer = self.buffer_mut(resource)?;
        let end = offset as usize + data.len();
        if end > buffer.len() {
            return Err(EngineError::OutOfBounds {
                offset,
                end: end as u64,
                size: buffer.len() as u64,
            });
        }
        buffer[offset as usize..end].copy_from_slice(data);
        Ok(())
    }

    fn create_descriptor_heap(&mut self, capacity: u32) -> EngineResult<DescriptorHeapInfo> {
        if self.heap.is_some() {
            return Err(EngineError::Init("descriptor heap already created".into()));
        }
        let heap = DescriptorHeapInfo {
            capacity,
            stride: self.config.descriptor_stride,
            cpu_base: DESCRIPTOR_CPU_BASE,
            gpu_base: GpuAddress(DESCRIPTOR_GPU_BASE),
        };
        self.descriptors = vec![None; capacity as usize];
        self.heap = Some(heap);
        Ok(heap)
    }

    fn write_descriptor(
        &mut self,
        slot: u32,
        resource: ResourceId,
        view: &ViewDesc,
    ) -> EngineResult<()> {
        self.resource(resource)?;
        let entry = self
            .descriptors
            .get_mut(slot as usize)
            .ok_or(EngineError::Frame("descriptor slot outside the heap"))?;
        *entry = Some((resource, *view));
        Ok(())
    }

    fn create_pipeline(&mut self, desc: &PipelineDesc<'_>) -> EngineResult<PipelineId> {
        if desc.shader.wgsl.trim().is_empty() {
            return Err(crate::error::AssetError::ShaderCompile {
                label: desc.shader.label.clone(),
                diagnostics: "empty shader source".into(),
            }
            .into());
        }
        let id = PipelineId::from_index(self.pipelines.len() as u32);
        self.pipelines.push(desc.label.to_string());
        Ok(id)
    }

    fn execute(&mut self, list: &CommandList) -> EngineResult<()> {
        self.validate(list)?;

        for command in list.commands() {
            match *command {
                Command::CopyBufferRegion {
                    dst,
                    dst_offset,
                    src,
                    src_offset,
                    size,
                } => self.copy_buffer(dst, dst_offset, src, src_offset, size)?,
                Command::CopyResource { dst, src } => {
                    let size = match self.resource(src)? {
                        Resource::Buffer { data, .. } => Some(data.len() as u64),
                        _ => None,
                    };
                    if let Some(size) = size {
                        self.copy_buffer(dst, 0, src, 0, size)?;
                    }
                }
                _ => {}
            }
        }

        let delay = self.next_latency();
        self.send(Job::Execute(delay))?;

        log::trace!("headless execute `{}` ({} commands)", list.label(), list.len());
        self.executed_count += 1;
        let keep = self.config.executed_log;
        if keep > 0 {
            if self.executed.len() >= keep {
                let excess = self.executed.len() + 1 - keep;
                self.executed.drain(..excess);
            }
            self.executed.push(ExecutedList {
                label: list.label().to_string(),
                commands: list.commands().to_vec(),
            });
        }
        Ok(())
    }

    fn swapchain(&self) -> SwapchainInfo {
        self.swapchain
    }

    fn acquire_back_buffer(&mut self) -> EngineResult<ResourceId> {
        if self.acquired {
            return Err(EngineError::Frame("back buffer acquired twice"));
        }
        self.acquired = true;
        Ok(self.swapchain.back_buffers[self.current_back_buffer])
    }

    fn present(&mut self) -> EngineResult<()> {
        if !self.acquired {
            return Err(EngineError::Frame("present without an acquired back buffer"));
        }
        self.acquired = false;
        self.presents += 1;
        self.current_back_buffer = (self.current_back_buffer + 1) % BACK_BUFFER_COUNT;
        Ok(())
    }

    fn discard_back_buffer(&mut self) {
        self.acquired = false;
    }

    fn resize_swapchain(&mut self, extent: Extent) -> EngineResult<()> {
        if extent.is_empty() {
            return Err(EngineError::Surface("zero-sized swapchain".into()));
        }
        for id in self.swapchain.back_buffers {
            if let Some(Resource::Texture { extent: e, .. }) = self.resources.get_mut(id.index()) {
                *e = extent;
            }
        }
        self.swapchain.extent = extent;
        self.current_back_buffer = 0;
        self.acquired = false;
        Ok(())
    }
}

impl Drop for HeadlessBackend {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop.
        self.jobs = None;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("headless GPU thread panicked");
            }
        }
    }
}

impl std::fmt::Debug for HeadlessBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeadlessBackend")
            .field("resources", &self.resources.len())
            .field("executed", &self.executed.len())
            .field("completed", &self.completed_value())
            .finish()
    }
}

fn run_gpu(shared: Arc<Shared>, jobs: mpsc::Receiver<Job>) {
    for job in jobs {
        match job {
            Job::Execute(delay) => {
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
            }
            Job::Signal(value) => {
                let mut state = shared.lock();
                state.completed = state.completed.max(value);
                shared.signaled.notify_all();
            }
            Job::Lose => {
                shared.lock().lost = true;
                shared.signaled.notify_all();
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::Fence;

    fn buffer(backend: &mut HeadlessBackend, size: u64) -> ResourceId {
        backend
            .create_buffer(&BufferDesc {
                label: "buf",
                size,
                memory: MemoryKind::Upload,
            })
            .unwrap()
    }

    #[test]
    fn signals_complete_in_order() {
        let mut backend = HeadlessBackend::new(HeadlessConfig {
            latency: LatencyModel::Fixed(Duration::from_millis(2)),
            ..Default::default()
        });
        let mut fence = Fence::new();

        let mut list = CommandList::new("work");
        list.draw_indexed(3, 1);
        backend.execute(&list).unwrap();
        let v = fence.signal(&mut backend).unwrap();

        fence.wait_until_signaled(&backend, v).unwrap();
        assert!(backend.completed_value() >= v);
    }

    #[test]
    fn copies_apply_to_buffer_contents() {
        let mut backend = HeadlessBackend::new(HeadlessConfig::default());
        let src = buffer(&mut backend, 16);
        let dst = buffer(&mut backend, 16);
        backend.write_buffer(src, 0, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();

        let mut list = CommandList::new("copy");
        list.copy_buffer_region(dst, 8, src, 4, 4);
        backend.execute(&list).unwrap();

        assert_eq!(&backend.read_buffer(dst).unwrap()[8..12], &[5, 6, 7, 8]);
    }

    #[test]
    fn unknown_resources_are_rejected() {
        let mut backend = HeadlessBackend::new(HeadlessConfig::default());
        let mut list = CommandList::new("bad");
        list.copy_resource(ResourceId::from_index(40), ResourceId::from_index(41));

        assert!(matches!(backend.execute(&list), Err(EngineError::Submit(_))));
        assert!(backend.executed().is_empty());
    }

    #[test]
    fn buffer_addresses_do_not_overlap() {
        let mut backend = HeadlessBackend::new(HeadlessConfig::default());
        let a = buffer(&mut backend, 100);
        let b = buffer(&mut backend, 100);
        let (a, b) = (backend.gpu_address(a).unwrap(), backend.gpu_address(b).unwrap());
        assert!(b.0 >= a.0 + 100);
    }

    #[test]
    fn executed_log_keeps_only_the_newest_lists() {
        let mut backend = HeadlessBackend::new(HeadlessConfig {
            executed_log: 2,
            ..Default::default()
        });
        for label in ["a", "b", "c"] {
            backend.execute(&CommandList::new(label)).unwrap();
        }

        let labels: Vec<_> = backend.executed().iter().map(|l| l.label.as_str()).collect();
        assert_eq!(labels, ["b", "c"]);
        assert_eq!(backend.executed_count(), 3);

        let mut silent = HeadlessBackend::new(HeadlessConfig {
            executed_log: 0,
            ..Default::default()
        });
        silent.execute(&CommandList::new("a")).unwrap();
        assert!(silent.executed().is_empty());
        assert_eq!(silent.executed_count(), 1);
    }

    #[test]
    fn present_rotates_back_buffers() {
        let mut backend = HeadlessBackend::new(HeadlessConfig::default());
        let first = backend.acquire_back_buffer().unwrap();
        assert!(backend.acquire_back_buffer().is_err());
        backend.present().unwrap();

        let second = backend.acquire_back_buffer().unwrap();
        assert_ne!(first, second);
        assert!(backend.swapchain().back_buffers.contains(&second));
    }

    #[test]
    fn lost_device_fails_waits_and_signals() {
        let mut backend = HeadlessBackend::new(HeadlessConfig::default());
        let mut fence = Fence::new();
        let done = fence.flush(&mut backend).unwrap();

        let pending = fence.signal(&mut backend).unwrap();
        backend.lose_device();
        // The signal was queued before the loss and still completes.
        fence.wait_until_signaled(&backend, pending).unwrap();
        assert!(pending > done);

        // Nothing after the loss does.
        let mut waited = false;
        for _ in 0..100 {
            if backend.signal(FenceValue::new(99)).is_err() {
                waited = true;
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }
        assert!(waited, "signal should fail once the device is lost");
    }
}
