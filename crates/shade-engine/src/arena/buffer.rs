use std::fmt;
use std::ops::Range;

use crate::backend::{BufferDesc, GpuAddress, GpuBackend, MemoryKind, ResourceId};
use crate::cmd::BufferSpan;
use crate::error::{ArenaKind, EngineError, EngineResult};

/// Buffer copies and queue writes move whole 4-byte words.
const COPY_ALIGNMENT: u64 = 4;

/// First offset at or after `offset` that is a multiple of `alignment`.
///
/// Saturates to the last aligned offset instead of wrapping, so an oversized
/// request still fails the capacity check.
pub fn align_up(offset: u64, alignment: u64) -> u64 {
    debug_assert_ne!(alignment, 0);
    offset
        .checked_next_multiple_of(alignment)
        .unwrap_or(u64::MAX - u64::MAX % alignment)
}

/// A sub-range handed out by a [`BufferArena`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BufferRegion {
    pub resource: ResourceId,
    pub offset: u64,
    pub size: u64,
    pub gpu_address: GpuAddress,
}

impl BufferRegion {
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }

    pub fn span(&self) -> BufferSpan {
        BufferSpan {
            resource: self.resource,
            offset: self.offset,
            size: self.size,
        }
    }

    /// Sub-range `[offset, offset + size)` relative to the start of this region.
    pub fn slice(&self, offset: u64, size: u64) -> EngineResult<BufferRegion> {
        let end = offset
            .checked_add(size)
            .filter(|&end| end <= self.size)
            .ok_or(EngineError::OutOfBounds {
                offset,
                end: offset.saturating_add(size),
                size: self.size,
            })?;
        debug_assert!(end <= self.size);

        Ok(BufferRegion {
            resource: self.resource,
            offset: self.offset + offset,
            size,
            gpu_address: self.gpu_address.offset(offset),
        })
    }
}

/// Bump allocator over one committed buffer.
///
/// The upload arena keeps a CPU-side mapping that lives as long as the arena;
/// dirty bytes reach the GPU copy on [`flush`](Self::flush). The geometry arena
/// has no CPU mapping and is filled through copy commands.
pub struct BufferArena {
    kind: ArenaKind,
    resource: ResourceId,
    base_address: GpuAddress,
    capacity: u64,
    cursor: u64,
    mapped: Option<Box<[u8]>>,
    dirty: Option<Range<u64>>,
}

impl BufferArena {
    /// Wraps an existing buffer. Upload arenas get a zeroed CPU mapping.
    pub fn new(kind: ArenaKind, resource: ResourceId, base_address: GpuAddress, capacity: u64) -> Self {
        let mapped = (kind == ArenaKind::Upload).then(|| vec![0u8; capacity as usize].into_boxed_slice());
        Self {
            kind,
            resource,
            base_address,
            capacity,
            cursor: 0,
            mapped,
            dirty: None,
        }
    }

    /// Commits a CPU-writable buffer of `capacity` bytes.
    pub fn create_upload<B>(backend: &mut B, label: &str, capacity: u64) -> EngineResult<Self>
    where
        B: GpuBackend + ?Sized,
    {
        Self::create(backend, ArenaKind::Upload, MemoryKind::Upload, label, capacity)
    }

    /// Commits a device-local buffer of `capacity` bytes.
    pub fn create_geometry<B>(backend: &mut B, label: &str, capacity: u64) -> EngineResult<Self>
    where
        B: GpuBackend + ?Sized,
    {
        Self::create(backend, ArenaKind::Geometry, MemoryKind::DeviceLocal, label, capacity)
    }

    fn create<B>(
        backend: &mut B,
        kind: ArenaKind,
        memory: MemoryKind,
        label: &str,
        capacity: u64,
    ) -> EngineResult<Self>
    where
        B: GpuBackend + ?Sized,
    {
        let capacity = align_up(capacity.max(COPY_ALIGNMENT), COPY_ALIGNMENT);
        let resource = backend.create_buffer(&BufferDesc {
            label,
            size: capacity,
            memory,
        })?;
        let base_address = backend.gpu_address(resource)?;

        log::debug!("{kind} `{label}`: {capacity} bytes at {:#x}", base_address.0);
        Ok(Self::new(kind, resource, base_address, capacity))
    }

    pub fn kind(&self) -> ArenaKind {
        self.kind
    }

    pub fn resource(&self) -> ResourceId {
        self.resource
    }

    pub fn base_address(&self) -> GpuAddress {
        self.base_address
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Offset of the next allocation.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn remaining(&self) -> u64 {
        self.capacity - self.cursor
    }

    pub fn is_cpu_visible(&self) -> bool {
        self.mapped.is_some()
    }

    /// Takes `[cursor, cursor + size)` and advances the cursor by `size`.
    pub fn allocate(&mut self, size: u64) -> EngineResult<BufferRegion> {
        self.allocate_aligned(size, 1)
    }

    /// Like [`allocate`](Self::allocate) but starts the region on a multiple of `alignment`.
    pub fn allocate_aligned(&mut self, size: u64, alignment: u64) -> EngineResult<BufferRegion> {
        let start = align_up(self.cursor, alignment.max(1));
        let end = start
            .checked_add(size)
            .filter(|&end| end <= self.capacity)
            .ok_or(EngineError::ArenaExhausted {
                arena: self.kind,
                requested: size,
                remaining: self.remaining(),
                capacity: self.capacity,
            })?;

        self.cursor = end;
        Ok(BufferRegion {
            resource: self.resource,
            offset: start,
            size,
            gpu_address: self.base_address.offset(start),
        })
    }

    /// Allocates a region and fills it with `data`.
    pub fn allocate_with(&mut self, data: &[u8], alignment: u64) -> EngineResult<BufferRegion> {
        if !self.is_cpu_visible() {
            return Err(EngineError::NotCpuVisible(self.kind));
        }
        let region = self.allocate_aligned(data.len() as u64, alignment)?;
        self.mapped_mut(&region)?.copy_from_slice(data);
        Ok(region)
    }

    /// CPU view of an allocated region. Marks the bytes dirty.
    pub fn mapped_mut(&mut self, region: &BufferRegion) -> EngineResult<&mut [u8]> {
        let range = self.checked_range(region)?;
        self.mark_dirty(range.clone());

        let mapped = self
            .mapped
            .as_deref_mut()
            .ok_or(EngineError::NotCpuVisible(self.kind))?;
        Ok(&mut mapped[range.start as usize..range.end as usize])
    }

    pub fn mapped(&self, region: &BufferRegion) -> EngineResult<&[u8]> {
        let range = self.checked_range(region)?;
        let mapped = self
            .mapped
            .as_deref()
            .ok_or(EngineError::NotCpuVisible(self.kind))?;
        Ok(&mapped[range.start as usize..range.end as usize])
    }

    /// Copies `data` into `region` starting `offset` bytes in.
    pub fn write(&mut self, region: &BufferRegion, offset: u64, data: &[u8]) -> EngineResult<()> {
        let target = region.slice(offset, data.len() as u64)?;
        self.mapped_mut(&target)?.copy_from_slice(data);
        Ok(())
    }

    /// Whether CPU writes are waiting for [`flush`](Self::flush).
    pub fn has_pending_writes(&self) -> bool {
        self.dirty.is_some()
    }

    /// Pushes dirty bytes of the CPU mapping to the GPU buffer.
    pub fn flush<B>(&mut self, backend: &mut B) -> EngineResult<()>
    where
        B: GpuBackend + ?Sized,
    {
        let (Some(dirty), Some(mapped)) = (self.dirty.take(), self.mapped.as_deref()) else {
            return Ok(());
        };

        let start = dirty.start / COPY_ALIGNMENT * COPY_ALIGNMENT;
        let end = align_up(dirty.end, COPY_ALIGNMENT).min(self.capacity);
        log::trace!("{} flush [{start}, {end})", self.kind);
        backend.write_buffer(self.resource, start, &mapped[start as usize..end as usize])
    }

    /// Rewinds the cursor to zero.
    ///
    /// The caller must have flushed the fence so no GPU work still reads the
    /// old contents. [`RenderEngine`](crate::engine::RenderEngine) enforces this.
    pub(crate) fn reset(&mut self) {
        self.cursor = 0;
        self.dirty = None;
    }

    fn checked_range(&self, region: &BufferRegion) -> EngineResult<Range<u64>> {
        if region.resource != self.resource || region.end() > self.cursor {
            return Err(EngineError::OutOfBounds {
                offset: region.offset,
                end: region.end(),
                size: self.cursor,
            });
        }
        Ok(region.offset..region.end())
    }

    fn mark_dirty(&mut self, range: Range<u64>) {
        if range.is_empty() {
            return;
        }
        self.dirty = Some(match self.dirty.take() {
            Some(d) => d.start.min(range.start)..d.end.max(range.end),
            None => range,
        });
    }
}

impl fmt::Debug for BufferArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferArena")
            .field("kind", &self.kind)
            .field("resource", &self.resource)
            .field("capacity", &self.capacity)
            .field("cursor", &self.cursor)
            .field("dirty", &self.dirty)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(capacity: u64) -> BufferArena {
        BufferArena::new(ArenaKind::Upload, ResourceId::from_index(0), GpuAddress(0x10_0000), capacity)
    }

    #[test]
    fn offsets_round_to_copy_words_and_constant_blocks() {
        assert_eq!(align_up(96, COPY_ALIGNMENT), 96);
        assert_eq!(align_up(97, COPY_ALIGNMENT), 100);
        assert_eq!(align_up(368, 256), 512);
        assert_eq!(align_up(u64::MAX - 1, 256), u64::MAX - 255);
    }

    #[test]
    fn allocations_are_contiguous() {
        let mut arena = upload(64);
        let a = arena.allocate(12).unwrap();
        let b = arena.allocate(20).unwrap();

        assert_eq!((a.offset, a.size), (0, 12));
        assert_eq!(b.offset, 12);
        assert_eq!(b.gpu_address, GpuAddress(0x10_000c));
        assert_eq!(arena.cursor(), 32);
    }

    #[test]
    fn aligned_allocation_skips_padding() {
        let mut arena = upload(1024);
        arena.allocate(1).unwrap();
        let c = arena.allocate_aligned(256, 256).unwrap();
        assert_eq!(c.offset, 256);
        assert_eq!(arena.cursor(), 512);
    }

    #[test]
    fn overflow_leaves_cursor_alone() {
        let mut arena = upload(64);
        arena.allocate(60).unwrap();

        let err = arena.allocate(8).unwrap_err();
        assert!(matches!(
            err,
            EngineError::ArenaExhausted { arena: ArenaKind::Upload, requested: 8, remaining: 4, capacity: 64 }
        ));
        assert_eq!(arena.cursor(), 60);
        assert_eq!(arena.allocate(4).unwrap().offset, 60);
    }

    #[test]
    fn geometry_arena_has_no_mapping() {
        let mut arena =
            BufferArena::new(ArenaKind::Geometry, ResourceId::from_index(1), GpuAddress(0), 64);
        let region = arena.allocate(16).unwrap();
        assert!(matches!(
            arena.mapped_mut(&region),
            Err(EngineError::NotCpuVisible(ArenaKind::Geometry))
        ));
        assert!(arena.allocate_with(&[0; 4], 1).is_err());
        assert_eq!(arena.cursor(), 16);
    }

    #[test]
    fn writes_land_in_mapping_and_mark_dirty() {
        let mut arena = upload(64);
        let region = arena.allocate(8).unwrap();
        assert!(!arena.has_pending_writes());

        arena.write(&region, 4, &[1, 2, 3, 4]).unwrap();
        assert!(arena.has_pending_writes());
        assert_eq!(arena.mapped(&region).unwrap(), &[0, 0, 0, 0, 1, 2, 3, 4]);
    }

    #[test]
    fn write_outside_region_is_rejected() {
        let mut arena = upload(64);
        let region = arena.allocate(4).unwrap();
        assert!(matches!(
            arena.write(&region, 2, &[0; 4]),
            Err(EngineError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn unallocated_bytes_are_not_reachable() {
        let mut arena = upload(64);
        let stray = BufferRegion {
            resource: arena.resource(),
            offset: 0,
            size: 8,
            gpu_address: arena.base_address(),
        };
        assert!(arena.mapped_mut(&stray).is_err());
    }

    #[test]
    fn reset_rewinds() {
        let mut arena = upload(64);
        arena.allocate(32).unwrap();
        arena.reset();
        assert_eq!(arena.cursor(), 0);
        assert_eq!(arena.remaining(), 64);
    }
}
