use crate::hardware::{CameraDevice, CaptureSession, EventSink, FrameSink, RenderTarget};
use crate::request::PendingRequestState;
use crate::types::{DeviceCapabilities, Size};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Externally visible lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Closed,
    Opening,
    Open,
    Configuring,
    Streaming,
    Closing,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Closed => "closed",
            SessionPhase::Opening => "opening",
            SessionPhase::Open => "open",
            SessionPhase::Configuring => "configuring",
            SessionPhase::Streaming => "streaming",
            SessionPhase::Closing => "closing",
        };
        f.write_str(name)
    }
}

/// Callbacks wired to the worker for one lifecycle.
#[derive(Clone)]
pub struct SessionLinks {
    pub events: EventSink,
    /// Called from the frame sink listener with the in-flight capture id.
    pub frames: Arc<dyn Fn(Uuid) + Send + Sync>,
}

/// Everything fixed for one open lifecycle.
#[derive(Clone)]
pub struct Binding {
    pub generation: u64,
    pub capabilities: Arc<DeviceCapabilities>,
    pub target: Arc<dyn RenderTarget>,
    pub preview_size: Size,
    pub links: SessionLinks,
}

/// Each variant owns exactly the handles that exist in that phase.
pub(crate) enum SessionState {
    Closed,
    Opening(Binding),
    Open {
        binding: Binding,
        device: Box<dyn CameraDevice>,
    },
    Configuring {
        binding: Binding,
        device: Box<dyn CameraDevice>,
        sink: Arc<dyn FrameSink>,
    },
    Streaming {
        binding: Binding,
        device: Box<dyn CameraDevice>,
        session: Box<dyn CaptureSession>,
        sink: Arc<dyn FrameSink>,
        pending: PendingRequestState,
    },
    Closing,
}

impl SessionState {
    pub(crate) fn phase(&self) -> SessionPhase {
        match self {
            SessionState::Closed => SessionPhase::Closed,
            SessionState::Opening(_) => SessionPhase::Opening,
            SessionState::Open { .. } => SessionPhase::Open,
            SessionState::Configuring { .. } => SessionPhase::Configuring,
            SessionState::Streaming { .. } => SessionPhase::Streaming,
            SessionState::Closing => SessionPhase::Closing,
        }
    }

    pub(crate) fn binding(&self) -> Option<&Binding> {
        match self {
            SessionState::Opening(binding)
            | SessionState::Open { binding, .. }
            | SessionState::Configuring { binding, .. }
            | SessionState::Streaming { binding, .. } => Some(binding),
            SessionState::Closed | SessionState::Closing => None,
        }
    }
}
