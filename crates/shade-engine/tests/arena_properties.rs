use proptest::prelude::*;

use shade_engine::arena::{BufferArena, DescriptorArena};
use shade_engine::backend::{
    Extent, GpuAddress, GpuBackend, HeadlessBackend, HeadlessConfig, ResourceId, TextureDesc,
    TextureFormat, ViewDesc,
};
use shade_engine::error::{ArenaKind, EngineError};

fn texture(backend: &mut HeadlessBackend) -> ResourceId {
    backend
        .create_texture(&TextureDesc {
            label: "tex",
            extent: Extent::new(16, 16),
            format: TextureFormat::Rgba8Unorm,
        })
        .unwrap()
}

const VIEW: ViewDesc = ViewDesc::Texture2d {
    format: TextureFormat::Rgba8Unorm,
};

#[test]
fn capacity_four_descriptor_arena_rejects_the_fifth() {
    let mut backend = HeadlessBackend::new(HeadlessConfig::default());
    let mut arena = DescriptorArena::create(&mut backend, 4, true).unwrap();
    let tex = texture(&mut backend);

    let handles: Vec<_> = (0..4)
        .map(|_| arena.allocate(&mut backend, VIEW, tex).unwrap())
        .collect();
    assert_eq!(
        handles.iter().map(|h| h.index()).collect::<Vec<_>>(),
        [1, 2, 3, 4]
    );

    let err = arena.allocate(&mut backend, VIEW, tex).unwrap_err();
    assert!(matches!(
        err,
        EngineError::ArenaExhausted {
            arena: ArenaKind::Descriptor,
            remaining: 0,
            capacity: 4,
            ..
        }
    ));
    assert_eq!(arena.len(), 4);
    assert_eq!(arena.ui_atlas_slot().map(|h| h.index()), Some(0));
}

#[test]
fn descriptor_addresses_follow_the_stride() {
    let mut backend = HeadlessBackend::new(HeadlessConfig {
        descriptor_stride: 64,
        ..Default::default()
    });
    let mut arena = DescriptorArena::create(&mut backend, 8, true).unwrap();
    let tex = texture(&mut backend);

    let a = arena.allocate(&mut backend, VIEW, tex).unwrap();
    let b = arena.allocate(&mut backend, VIEW, tex).unwrap();
    let base = arena.heap().gpu_base.0;

    assert_eq!(a.gpu_address().0, base + 64);
    assert_eq!(b.gpu_address().0 - a.gpu_address().0, 64);
    assert_eq!(backend.descriptor(b.index()), Some((tex, VIEW)));
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        .. ProptestConfig::default()
    })]

    #[test]
    fn descriptor_count_never_exceeds_capacity(capacity in 1u32..32, attempts in 0u32..48) {
        let mut backend = HeadlessBackend::new(HeadlessConfig::default());
        let mut arena = DescriptorArena::create(&mut backend, capacity, true).unwrap();
        let tex = texture(&mut backend);

        let mut last = 0;
        for i in 0..attempts {
            match arena.allocate(&mut backend, VIEW, tex) {
                Ok(h) => {
                    prop_assert!(i < capacity);
                    prop_assert!(h.index() > last);
                    last = h.index();
                }
                Err(e) => {
                    prop_assert!(i >= capacity);
                    prop_assert!(matches!(e, EngineError::ArenaExhausted { .. }), "unexpected error");
                }
            }
        }
        prop_assert_eq!(arena.len(), attempts.min(capacity));
    }

    #[test]
    fn buffer_allocations_are_ordered_and_disjoint(
        capacity in 64u64..4096,
        sizes in prop::collection::vec(1u64..512, 1..40),
    ) {
        let base = GpuAddress(0x4000_0000);
        let mut arena = BufferArena::new(ArenaKind::Geometry, ResourceId::from_index(0), base, capacity);

        let mut total = 0;
        let mut prev_end = 0;
        for size in sizes {
            let cursor = arena.cursor();
            match arena.allocate(size) {
                Ok(region) => {
                    prop_assert_eq!(region.offset, cursor);
                    prop_assert!(region.offset >= prev_end);
                    prop_assert_eq!(region.gpu_address.0, base.0 + region.offset);
                    prev_end = region.end();
                    total += size;
                }
                Err(EngineError::ArenaExhausted { requested, remaining, .. }) => {
                    prop_assert!(total + size > capacity);
                    prop_assert_eq!(requested, size);
                    prop_assert_eq!(remaining, capacity - total);
                    prop_assert_eq!(arena.cursor(), cursor);
                }
                Err(e) => prop_assert!(false, "unexpected error: {e}"),
            }
        }
        prop_assert!(arena.cursor() <= capacity);
    }
}
