//! Traits the controller drives hardware through.
//!
//! A backend enumerates devices and opens them asynchronously: completion is
//! reported by delivering a [`HardwareEvent`] to the [`EventSink`] handed to
//! `open_device` / `create_session`. Handles owned by an event are released
//! with [`HardwareEvent::release`] when nobody takes them.

use crate::errors::{HardwareError, StorageError};
use crate::request::CaptureRequest;
use crate::types::{DeviceCharacteristics, Size};
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;

pub type HardwareResult<T> = Result<T, HardwareError>;

/// Fired by a frame sink whenever a new frame becomes available.
pub type FrameListener = Arc<dyn Fn() + Send + Sync>;

pub trait CameraBackend: Send + Sync {
    /// Device ids in enumeration order.
    fn device_ids(&self) -> HardwareResult<Vec<String>>;

    fn characteristics(&self, device_id: &str) -> HardwareResult<DeviceCharacteristics>;

    /// Start opening a device. Success or failure after this call returns is
    /// reported through `events`.
    fn open_device(&self, device_id: &str, events: EventSink) -> HardwareResult<()>;
}

pub trait CameraDevice: Send {
    fn id(&self) -> &str;

    fn create_frame_sink(&mut self, size: Size, max_frames: usize) -> HardwareResult<Arc<dyn FrameSink>>;

    /// Start configuring a session with the preview target and the still sink
    /// as its two outputs. Reports `SessionConfigured` or
    /// `SessionConfigureFailed` through `events`.
    fn create_session(
        &mut self,
        target: Arc<dyn RenderTarget>,
        sink: Arc<dyn FrameSink>,
        events: EventSink,
    ) -> HardwareResult<()>;

    fn close(&mut self);
}

pub trait CaptureSession: Send {
    fn set_repeating_request(&mut self, request: &CaptureRequest) -> HardwareResult<()>;

    fn capture(&mut self, request: &CaptureRequest) -> HardwareResult<()>;

    fn stop_repeating(&mut self) -> HardwareResult<()>;

    fn abort_captures(&mut self) -> HardwareResult<()>;

    fn close(&mut self);
}

/// Bounded queue of encoded still frames.
pub trait FrameSink: Send + Sync {
    /// Most recent frame, discarding any older ones.
    fn acquire_latest(&self) -> HardwareResult<Option<Box<dyn SinkFrame>>>;

    fn set_listener(&self, listener: Option<FrameListener>);

    fn close(&self);
}

/// A frame checked out of a sink. Dropping it returns the slot.
pub trait SinkFrame: Send {
    fn encoded(&self) -> Bytes;
}

pub trait RenderTarget: Send + Sync {
    fn size(&self) -> Size;

    fn is_valid(&self) -> bool;
}

pub trait StorageSink: Send + Sync {
    /// Persist encoded bytes, returning a location string.
    fn save(&self, encoded: &[u8]) -> Result<String, StorageError>;
}

pub trait DisplayRotation: Send + Sync {
    fn current_rotation_degrees(&self) -> i32;
}

/// Rotation that never changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedRotation(pub i32);

impl DisplayRotation for FixedRotation {
    fn current_rotation_degrees(&self) -> i32 {
        self.0
    }
}

pub enum HardwareEvent {
    DeviceOpened(Box<dyn CameraDevice>),
    DeviceDisconnected,
    DeviceError(i32),
    SessionConfigured(Box<dyn CaptureSession>),
    SessionConfigureFailed,
}

impl HardwareEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            HardwareEvent::DeviceOpened(_) => "device_opened",
            HardwareEvent::DeviceDisconnected => "device_disconnected",
            HardwareEvent::DeviceError(_) => "device_error",
            HardwareEvent::SessionConfigured(_) => "session_configured",
            HardwareEvent::SessionConfigureFailed => "session_configure_failed",
        }
    }

    /// Close any handle carried by an event nobody will consume.
    pub fn release(self) {
        match self {
            HardwareEvent::DeviceOpened(mut device) => {
                log::debug!("releasing unclaimed device {}", device.id());
                device.close();
            }
            HardwareEvent::SessionConfigured(mut session) => {
                log::debug!("releasing unclaimed capture session");
                session.close();
            }
            _ => {}
        }
    }
}

impl fmt::Debug for HardwareEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HardwareEvent::DeviceOpened(device) => {
                f.debug_tuple("DeviceOpened").field(&device.id()).finish()
            }
            HardwareEvent::DeviceError(code) => f.debug_tuple("DeviceError").field(code).finish(),
            other => f.write_str(other.kind()),
        }
    }
}

type Dispatch = dyn Fn(HardwareEvent) -> Result<(), HardwareEvent> + Send + Sync;

/// Where a backend delivers asynchronous events for one device lifecycle.
#[derive(Clone)]
pub struct EventSink {
    dispatch: Arc<Dispatch>,
}

impl EventSink {
    /// `dispatch` hands the event back when it cannot accept it.
    pub fn new<F>(dispatch: F) -> Self
    where
        F: Fn(HardwareEvent) -> Result<(), HardwareEvent> + Send + Sync + 'static,
    {
        Self {
            dispatch: Arc::new(dispatch),
        }
    }

    pub fn deliver(&self, event: HardwareEvent) {
        if let Err(event) = (self.dispatch)(event) {
            log::debug!("event {} has no receiver, releasing", event.kind());
            event.release();
        }
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EventSink")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct ClosingSession(Arc<AtomicBool>);

    impl CaptureSession for ClosingSession {
        fn set_repeating_request(&mut self, _: &CaptureRequest) -> HardwareResult<()> {
            Ok(())
        }
        fn capture(&mut self, _: &CaptureRequest) -> HardwareResult<()> {
            Ok(())
        }
        fn stop_repeating(&mut self) -> HardwareResult<()> {
            Ok(())
        }
        fn abort_captures(&mut self) -> HardwareResult<()> {
            Ok(())
        }
        fn close(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_rejected_event_is_released() {
        let closed = Arc::new(AtomicBool::new(false));
        let sink = EventSink::new(|event| Err(event));
        sink.deliver(HardwareEvent::SessionConfigured(Box::new(ClosingSession(
            closed.clone(),
        ))));
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_accepted_event_is_not_released() {
        let closed = Arc::new(AtomicBool::new(false));
        let kept = Arc::new(std::sync::Mutex::new(Vec::new()));
        let slot = kept.clone();
        let sink = EventSink::new(move |event| {
            slot.lock().unwrap().push(event);
            Ok(())
        });
        sink.deliver(HardwareEvent::SessionConfigured(Box::new(ClosingSession(
            closed.clone(),
        ))));
        assert!(!closed.load(Ordering::SeqCst));
        assert_eq!(kept.lock().unwrap().len(), 1);
    }
}
