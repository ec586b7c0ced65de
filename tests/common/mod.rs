//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use camgent::hardware::FixedRotation;
use camgent::testing::{
    wait_for, RecordingStorage, VirtualBackend, VirtualBehavior, VirtualDeviceSpec,
    VirtualRenderTarget,
};
use camgent::{CameraController, SessionPhase, Size};
use std::sync::Arc;
use std::time::Duration;

pub const WAIT: Duration = Duration::from_secs(2);

pub struct Rig {
    pub backend: VirtualBackend,
    pub storage: Arc<RecordingStorage>,
    pub controller: CameraController,
}

pub fn rig(behavior: VirtualBehavior) -> Rig {
    rig_with_rotation(behavior, 0)
}

pub fn rig_with_rotation(behavior: VirtualBehavior, rotation: i32) -> Rig {
    let backend = VirtualBackend::new(vec![
        VirtualDeviceSpec::front("1"),
        VirtualDeviceSpec::rear("0"),
    ])
    .with_behavior(behavior);
    let storage = Arc::new(RecordingStorage::new());
    let controller = CameraController::builder(Arc::new(backend.clone()))
        .storage(storage.clone())
        .rotation(Arc::new(FixedRotation(rotation)))
        .build()
        .unwrap();
    Rig {
        backend,
        storage,
        controller,
    }
}

pub fn target() -> Arc<VirtualRenderTarget> {
    Arc::new(VirtualRenderTarget::new(Size::new(1280, 720)))
}

pub fn wait_for_phase(controller: &CameraController, phase: SessionPhase) -> bool {
    wait_for(WAIT, || controller.phase() == phase)
}

/// Open against a fresh render target and wait for the preview to run.
pub fn streaming(behavior: VirtualBehavior) -> Rig {
    let rig = rig(behavior);
    rig.controller.open(target()).unwrap();
    assert!(wait_for_phase(&rig.controller, SessionPhase::Streaming));
    rig
}
