use crate::backend::{DescriptorHeapInfo, GpuAddress, GpuBackend, ResourceId, ViewDesc};
use crate::error::{ArenaKind, EngineError, EngineResult};

/// Reference to one slot of the shader-visible descriptor heap.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct DescriptorHandle {
    index: u32,
    cpu: u64,
    gpu: GpuAddress,
}

impl DescriptorHandle {
    fn at(heap: &DescriptorHeapInfo, index: u32) -> Self {
        let offset = index as u64 * heap.stride as u64;
        Self {
            index,
            cpu: heap.cpu_base + offset,
            gpu: heap.gpu_base.offset(offset),
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// Address the view was written at.
    pub fn cpu_address(&self) -> u64 {
        self.cpu
    }

    /// Address shaders and descriptor tables refer to.
    pub fn gpu_address(&self) -> GpuAddress {
        self.gpu
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DescriptorEntry {
    pub index: u32,
    pub resource: ResourceId,
    pub view: ViewDesc,
}

/// Fixed-capacity, append-only table of shader-visible views.
///
/// Slot [`UI_ATLAS_SLOT`](Self::UI_ATLAS_SLOT) belongs to the UI glyph atlas when
/// reserved at creation; regular allocations then start at 1. The reserved slot
/// is extra: an arena of capacity `C` always accepts exactly `C` allocations.
#[derive(Debug)]
pub struct DescriptorArena {
    heap: DescriptorHeapInfo,
    reserved: u32,
    entries: Vec<DescriptorEntry>,
}

impl DescriptorArena {
    pub const UI_ATLAS_SLOT: u32 = 0;

    /// Creates the heap with room for `capacity` allocations plus the optional UI slot.
    pub fn create<B>(backend: &mut B, capacity: u32, reserve_ui_slot: bool) -> EngineResult<Self>
    where
        B: GpuBackend + ?Sized,
    {
        let reserved = u32::from(reserve_ui_slot);
        let heap = backend.create_descriptor_heap(capacity + reserved)?;
        if heap.capacity < capacity + reserved {
            return Err(EngineError::Init(format!(
                "descriptor heap holds {} slots, {} requested",
                heap.capacity,
                capacity + reserved
            )));
        }

        if reserve_ui_slot {
            log::debug!("descriptor slot {} reserved for the UI glyph atlas", Self::UI_ATLAS_SLOT);
        }
        Ok(Self::new(heap, reserve_ui_slot))
    }

    /// Wraps an already created heap.
    pub fn new(heap: DescriptorHeapInfo, reserve_ui_slot: bool) -> Self {
        Self {
            heap,
            reserved: u32::from(reserve_ui_slot),
            entries: Vec::new(),
        }
    }

    pub fn heap(&self) -> &DescriptorHeapInfo {
        &self.heap
    }

    /// Allocatable slots, not counting the UI reservation.
    pub fn capacity(&self) -> u32 {
        self.heap.capacity - self.reserved
    }

    /// Slots handed out so far.
    pub fn len(&self) -> u32 {
        self.entries.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn remaining(&self) -> u32 {
        self.capacity() - self.len()
    }

    pub fn entries(&self) -> &[DescriptorEntry] {
        &self.entries
    }

    /// Handle of the UI glyph atlas slot, if it was reserved.
    pub fn ui_atlas_slot(&self) -> Option<DescriptorHandle> {
        (self.reserved > 0).then(|| DescriptorHandle::at(&self.heap, Self::UI_ATLAS_SLOT))
    }

    /// Handle of an already allocated slot.
    pub fn handle(&self, index: u32) -> Option<DescriptorHandle> {
        let first = self.reserved;
        (index >= first && index < first + self.len()).then(|| DescriptorHandle::at(&self.heap, index))
    }

    /// Writes `view` of `resource` into the next free slot.
    ///
    /// The counter only advances once the backend accepted the view.
    pub fn allocate<B>(
        &mut self,
        backend: &mut B,
        view: ViewDesc,
        resource: ResourceId,
    ) -> EngineResult<DescriptorHandle>
    where
        B: GpuBackend + ?Sized,
    {
        if self.remaining() == 0 {
            return Err(EngineError::ArenaExhausted {
                arena: ArenaKind::Descriptor,
                requested: 1,
                remaining: 0,
                capacity: self.capacity() as u64,
            });
        }

        let index = self.reserved + self.len();
        backend.write_descriptor(index, resource, &view)?;

        self.entries.push(DescriptorEntry {
            index,
            resource,
            view,
        });
        log::trace!("descriptor {index} -> {resource:?}");
        Ok(DescriptorHandle::at(&self.heap, index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Extent, HeadlessBackend, HeadlessConfig, TextureDesc, TextureFormat};

    fn texture(backend: &mut HeadlessBackend) -> ResourceId {
        backend
            .create_texture(&TextureDesc {
                label: "tex",
                extent: Extent::new(4, 4),
                format: TextureFormat::Rgba8Unorm,
            })
            .unwrap()
    }

    const VIEW: ViewDesc = ViewDesc::Texture2d {
        format: TextureFormat::Rgba8Unorm,
    };

    #[test]
    fn reserved_slot_shifts_first_index() {
        let mut backend = HeadlessBackend::new(HeadlessConfig::default());
        let tex = texture(&mut backend);
        let mut arena = DescriptorArena::create(&mut backend, 8, true).unwrap();

        assert_eq!(arena.ui_atlas_slot().unwrap().index(), 0);
        let h = arena.allocate(&mut backend, VIEW, tex).unwrap();
        assert_eq!(h.index(), 1);
        assert_eq!(arena.handle(1), Some(h));
        assert_eq!(arena.handle(0), None);
    }

    #[test]
    fn addresses_follow_stride() {
        let mut backend = HeadlessBackend::new(HeadlessConfig::default());
        let tex = texture(&mut backend);
        let mut arena = DescriptorArena::create(&mut backend, 8, false).unwrap();
        let heap = *arena.heap();

        let a = arena.allocate(&mut backend, VIEW, tex).unwrap();
        let b = arena.allocate(&mut backend, VIEW, tex).unwrap();
        assert_eq!(a.index(), 0);
        assert_eq!(b.gpu_address(), heap.gpu_base.offset(heap.stride as u64));
        assert_eq!(b.cpu_address() - a.cpu_address(), heap.stride as u64);
    }

    #[test]
    fn exhaustion_keeps_count() {
        let mut backend = HeadlessBackend::new(HeadlessConfig::default());
        let tex = texture(&mut backend);
        let mut arena = DescriptorArena::create(&mut backend, 2, true).unwrap();

        arena.allocate(&mut backend, VIEW, tex).unwrap();
        arena.allocate(&mut backend, VIEW, tex).unwrap();
        let err = arena.allocate(&mut backend, VIEW, tex).unwrap_err();

        assert!(matches!(err, EngineError::ArenaExhausted { arena: ArenaKind::Descriptor, capacity: 2, .. }));
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn rejected_view_does_not_consume_a_slot() {
        let mut backend = HeadlessBackend::new(HeadlessConfig::default());
        let mut arena = DescriptorArena::create(&mut backend, 2, false).unwrap();

        let bogus = ResourceId::from_index(999);
        assert!(arena.allocate(&mut backend, VIEW, bogus).is_err());
        assert!(arena.is_empty());
    }
}
