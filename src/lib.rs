//! camgent: exclusive camera session controller
//!
//! Drives an image sensor through a stateful session: open the device,
//! stream a live preview plus a still-capture sink, apply exposure, focus
//! and colour settings to the running stream, and take still pictures with
//! exactly one reply each.
//!
//! # Features
//! - Typed, immutable capture requests rebuilt from accumulated settings
//! - Loosely-typed settings maps decoded per key, with malformed keys reported
//! - Zoom cropping and exposure clamping derived from one capability snapshot
//! - One worker thread per open lifecycle; replies marshalled to the caller
//! - A virtual backend for running everything without hardware
//!
//! # Usage
//! ```rust,no_run
//! use camgent::testing::{wait_for, VirtualBackend, VirtualDeviceSpec, VirtualRenderTarget};
//! use camgent::{CameraController, SessionPhase, Size};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let backend = Arc::new(VirtualBackend::new(vec![VirtualDeviceSpec::rear("0")]));
//! let controller = CameraController::builder(backend).build()?;
//! controller.open(Arc::new(VirtualRenderTarget::new(Size::new(1280, 720))))?;
//! wait_for(Duration::from_secs(1), || controller.phase() == SessionPhase::Streaming);
//! controller.set_zoom(2.0);
//! let location = controller.capture().wait()?;
//! println!("saved {}", location);
//! controller.pause();
//! # Ok::<(), camgent::ControllerError>(())
//! ```
pub mod capture;
pub mod commands;
pub mod config;
pub mod controller;
pub mod discovery;
pub mod errors;
pub mod geometry;
pub mod hardware;
pub mod params;
pub mod request;
pub mod session;
pub mod storage;
pub mod types;
pub mod worker;

// Testing utilities - virtual backend and synthetic frames
pub mod testing;

// Re-exports for convenience
pub use capture::{CaptureResult, CaptureTicket};
pub use commands::{CommandReply, MethodCall};
pub use config::CamgentConfig;
pub use controller::{CameraController, CameraControllerBuilder};
pub use errors::{ControllerError, HardwareError, StorageError};
pub use hardware::{CameraBackend, DisplayRotation, RenderTarget, StorageSink};
pub use params::DecodedSettings;
pub use request::{CaptureRequest, PendingRequestState, RequestParameters};
pub use session::{ApplyOutcome, SessionPhase};
pub use storage::FileStorage;
pub use types::{DeviceCapabilities, LensFacing, MeteringRegion, Rect, Size};
pub use worker::{caller_loop, CallerContext, CallerQueue, InlineCaller};

/// Initialize logging for the camera controller
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "camgent=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
