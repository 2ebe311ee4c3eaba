/// Engine construction parameters.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Frame lists that may be queued before `request_frame` blocks.
    ///
    /// With 1, `present_frame` waits for the frame it just submitted.
    pub frames_in_flight: usize,

    /// Allocatable descriptor slots, not counting the UI reservation.
    pub descriptor_capacity: u32,

    /// Keeps descriptor slot 0 for the UI glyph atlas.
    pub reserve_ui_slot: bool,

    /// Bytes of CPU-writable staging and constant memory.
    pub upload_arena_size: u64,

    /// Bytes of device-local vertex and index memory.
    pub geometry_arena_size: u64,

    /// Back buffer clear color, linear RGBA.
    pub clear_color: [f32; 4],
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 1,
            descriptor_capacity: 1024,
            reserve_ui_slot: true,
            upload_arena_size: 8 * 1024 * 1024,
            geometry_arena_size: 8 * 1024 * 1024,
            clear_color: [0.02, 0.02, 0.03, 1.0],
        }
    }
}
