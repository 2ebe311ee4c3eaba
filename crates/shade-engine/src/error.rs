use std::path::PathBuf;

use crate::backend::ResourceId;
use crate::barrier::ResourceState;
use crate::cmd::RecordingState;
use crate::sync::FenceValue;

/// Result alias used throughout the core subsystem.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Coarse classification of an [`EngineError`].
///
/// Callers use this to decide between terminating, skipping a frame, or
/// continuing with a resource marked as absent.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ErrorClass {
    /// Device, queue, fence or heap creation failed. Startup cannot proceed.
    FatalInit,
    /// The queue rejected work or the device was lost. The session is over.
    FatalSubmit,
    /// A descriptor or buffer arena ran out of space.
    ArenaExhausted,
    /// A mesh or shader could not be loaded. The asset is absent; rendering continues.
    Asset,
    /// The API was used out of order (reset while in flight, unbalanced barriers, ...).
    Usage,
    /// Transient surface problem; skip the current frame.
    Surface,
}

/// Which arena an exhaustion error refers to.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ArenaKind {
    Descriptor,
    Upload,
    Geometry,
    ObjectConstants,
}

impl std::fmt::Display for ArenaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ArenaKind::Descriptor => "descriptor arena",
            ArenaKind::Upload => "upload arena",
            ArenaKind::Geometry => "geometry arena",
            ArenaKind::ObjectConstants => "object constant table",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("initialization failed: {0}")]
    Init(String),

    #[error("submission rejected: {0}")]
    Submit(String),

    #[error("device lost while waiting for fence value {value}")]
    DeviceLost { value: FenceValue },

    #[error("{arena} exhausted: requested {requested} with {remaining} of {capacity} remaining")]
    ArenaExhausted {
        arena: ArenaKind,
        requested: u64,
        remaining: u64,
        capacity: u64,
    },

    #[error(
        "recording unit `{label}` cannot be reset: submission {pending} is unsignaled (completed {completed})"
    )]
    UnitInFlight {
        label: String,
        pending: FenceValue,
        completed: FenceValue,
    },

    #[error("recording unit `{label}` is {found:?}, expected {expected}")]
    RecordingState {
        label: String,
        expected: &'static str,
        found: RecordingState,
    },

    #[error("resource {resource:?} is {actual:?}, caller declared {declared:?}")]
    StateMismatch {
        resource: ResourceId,
        declared: ResourceState,
        actual: ResourceState,
    },

    #[error("resource {resource:?} ends the frame {state:?} instead of {baseline:?}")]
    UnbalancedTransition {
        resource: ResourceId,
        state: ResourceState,
        baseline: ResourceState,
    },

    #[error("resource {0:?} is not known to this engine")]
    UnknownResource(ResourceId),

    #[error("{0} is not CPU-visible")]
    NotCpuVisible(ArenaKind),

    #[error("region [{offset}, {end}) lies outside its allocation of {size} bytes")]
    OutOfBounds { offset: u64, end: u64, size: u64 },

    #[error("frame protocol violated: {0}")]
    Frame(&'static str),

    #[error("pipeline `{label}`: {reason}")]
    Pipeline { label: String, reason: String },

    #[error("surface unavailable: {0}")]
    Surface(String),

    #[error(transparent)]
    Asset(#[from] AssetError),
}

impl EngineError {
    pub fn class(&self) -> ErrorClass {
        match self {
            EngineError::Init(_) => ErrorClass::FatalInit,
            EngineError::Submit(_) | EngineError::DeviceLost { .. } => ErrorClass::FatalSubmit,
            EngineError::ArenaExhausted { .. } => ErrorClass::ArenaExhausted,
            EngineError::Asset(_) => ErrorClass::Asset,
            EngineError::Surface(_) => ErrorClass::Surface,
            EngineError::UnitInFlight { .. }
            | EngineError::RecordingState { .. }
            | EngineError::StateMismatch { .. }
            | EngineError::UnbalancedTransition { .. }
            | EngineError::UnknownResource(_)
            | EngineError::NotCpuVisible(_)
            | EngineError::OutOfBounds { .. }
            | EngineError::Frame(_)
            | EngineError::Pipeline { .. } => ErrorClass::Usage,
        }
    }

    /// Fatal errors end the session; everything else leaves the engine usable.
    pub fn is_fatal(&self) -> bool {
        matches!(self.class(), ErrorClass::FatalInit | ErrorClass::FatalSubmit)
    }
}

/// Failures local to asset collaborators (mesh import, shader compilation).
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("cannot read `{}`: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("mesh `{name}`: {reason}")]
    InvalidMesh { name: String, reason: String },

    #[error("shader `{label}` failed to compile: {diagnostics}")]
    ShaderCompile { label: String, diagnostics: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_separate_fatal_from_recoverable() {
        assert!(EngineError::Init("no adapter".into()).is_fatal());
        assert!(EngineError::DeviceLost { value: FenceValue::new(3) }.is_fatal());

        let exhausted = EngineError::ArenaExhausted {
            arena: ArenaKind::Descriptor,
            requested: 1,
            remaining: 0,
            capacity: 4,
        };
        assert_eq!(exhausted.class(), ErrorClass::ArenaExhausted);
        assert!(!exhausted.is_fatal());

        let asset: EngineError = AssetError::InvalidMesh {
            name: "teapot".into(),
            reason: "no faces".into(),
        }
        .into();
        assert_eq!(asset.class(), ErrorClass::Asset);
        assert!(!asset.is_fatal());
    }

    #[test]
    fn exhaustion_message_names_the_arena() {
        let e = EngineError::ArenaExhausted {
            arena: ArenaKind::Upload,
            requested: 64,
            remaining: 16,
            capacity: 1024,
        };
        let msg = e.to_string();
        assert!(msg.starts_with("upload arena exhausted"), "{msg}");
        assert!(msg.contains("64") && msg.contains("16") && msg.contains("1024"));
    }
}
