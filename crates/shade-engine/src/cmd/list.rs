use crate::backend::{PipelineId, ResourceId};
use crate::barrier::{Barrier, ResourceState};

/// Byte range inside a buffer resource.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BufferSpan {
    pub resource: ResourceId,
    pub offset: u64,
    pub size: u64,
}

impl BufferSpan {
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct VertexBufferView {
    pub span: BufferSpan,
    pub stride: u32,
}

/// Index data is always 32-bit unsigned.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct IndexBufferView {
    pub span: BufferSpan,
}

impl IndexBufferView {
    pub fn index_count(&self) -> u32 {
        (self.span.size / 4) as u32
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ScissorRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl ScissorRect {
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DrawIndexed {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
    pub first_instance: u32,
}

/// One recorded GPU command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Barrier(Barrier),
    SetPipeline(PipelineId),
    SetViewport(Viewport),
    SetScissor(ScissorRect),
    SetRenderTargets {
        color: ResourceId,
        depth: Option<ResourceId>,
    },
    ClearColor {
        target: ResourceId,
        color: [f32; 4],
    },
    ClearDepth {
        target: ResourceId,
        depth: f32,
    },
    /// Binds a constant buffer range to binding slot `slot` of the current layout.
    SetConstants {
        slot: u32,
        span: BufferSpan,
    },
    SetVertexBuffer {
        slot: u32,
        view: VertexBufferView,
    },
    SetIndexBuffer(IndexBufferView),
    DrawIndexed(DrawIndexed),
    CopyResource {
        dst: ResourceId,
        src: ResourceId,
    },
    CopyBufferRegion {
        dst: ResourceId,
        dst_offset: u64,
        src: ResourceId,
        src_offset: u64,
        size: u64,
    },
}

/// Ordered list of commands for one submission.
#[derive(Debug, Clone, Default)]
pub struct CommandList {
    label: String,
    commands: Vec<Command>,
}

impl CommandList {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            commands: Vec::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn barriers(&self) -> impl Iterator<Item = &Barrier> + '_ {
        self.commands.iter().filter_map(|c| match c {
            Command::Barrier(b) => Some(b),
            _ => None,
        })
    }

    pub(crate) fn clear(&mut self) {
        self.commands.clear();
    }

    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    // ── barriers ──────────────────────────────────────────────────────────

    /// Records exactly one transition barrier.
    ///
    /// The caller vouches that `from` is the resource's true current state.
    /// Use [`crate::barrier::StateTracker`] to have that checked.
    pub fn transition(&mut self, resource: ResourceId, from: ResourceState, to: ResourceState) {
        debug_assert_ne!(from, to, "no-op transition on {resource:?}");
        self.push(Command::Barrier(Barrier {
            resource,
            before: from,
            after: to,
        }));
    }

    // ── pipeline state ────────────────────────────────────────────────────

    pub fn set_pipeline(&mut self, pipeline: PipelineId) {
        self.push(Command::SetPipeline(pipeline));
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.push(Command::SetViewport(viewport));
    }

    pub fn set_scissor(&mut self, scissor: ScissorRect) {
        self.push(Command::SetScissor(scissor));
    }

    pub fn set_render_targets(&mut self, color: ResourceId, depth: Option<ResourceId>) {
        self.push(Command::SetRenderTargets { color, depth });
    }

    pub fn clear_render_target(&mut self, target: ResourceId, color: [f32; 4]) {
        self.push(Command::ClearColor { target, color });
    }

    pub fn clear_depth(&mut self, target: ResourceId, depth: f32) {
        self.push(Command::ClearDepth { target, depth });
    }

    pub fn set_constants(&mut self, slot: u32, span: BufferSpan) {
        self.push(Command::SetConstants { slot, span });
    }

    // ── draws ─────────────────────────────────────────────────────────────

    pub fn set_vertex_buffer(&mut self, slot: u32, view: VertexBufferView) {
        self.push(Command::SetVertexBuffer { slot, view });
    }

    pub fn set_index_buffer(&mut self, view: IndexBufferView) {
        self.push(Command::SetIndexBuffer(view));
    }

    pub fn draw_indexed(&mut self, index_count: u32, instance_count: u32) {
        self.push(Command::DrawIndexed(DrawIndexed {
            index_count,
            instance_count,
            first_index: 0,
            base_vertex: 0,
            first_instance: 0,
        }));
    }

    // ── copies ────────────────────────────────────────────────────────────

    pub fn copy_resource(&mut self, dst: ResourceId, src: ResourceId) {
        self.push(Command::CopyResource { dst, src });
    }

    pub fn copy_buffer_region(
        &mut self,
        dst: ResourceId,
        dst_offset: u64,
        src: ResourceId,
        src_offset: u64,
        size: u64,
    ) {
        self.push(Command::CopyBufferRegion {
            dst,
            dst_offset,
            src,
            src_offset,
            size,
        });
    }
}
