//! Testing utilities for camgent
//!
//! A virtual camera backend plus synthetic JPEG frames, so the controller
//! can be driven end to end without hardware.

pub mod synthetic_data;
pub mod virtual_camera;

pub use synthetic_data::synthetic_jpeg;
pub use virtual_camera::{
    CaptureMode, JournalEntry, RecordingStorage, VirtualBackend, VirtualBehavior,
    VirtualDeviceSpec, VirtualFrameSink, VirtualRenderTarget,
};

use std::time::{Duration, Instant};

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_for<F: FnMut() -> bool>(timeout: Duration, mut condition: F) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
}
