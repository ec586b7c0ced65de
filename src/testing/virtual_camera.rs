//! In-process camera backend.
//!
//! Behaves like an asynchronous camera stack: opens and session
//! configuration complete by delivering events, still captures arrive as
//! frames pushed into the sink. Every hardware call is recorded in a
//! journal so tests can assert ordering.

use super::synthetic_data::synthetic_jpeg;
use crate::errors::{HardwareError, StorageError};
use crate::hardware::{
    CameraBackend, CameraDevice, CaptureSession, EventSink, FrameListener, FrameSink,
    HardwareEvent, HardwareResult, RenderTarget, SinkFrame, StorageSink,
};
use crate::request::CaptureRequest;
use crate::types::{DeviceCharacteristics, ExposureRange, LensFacing, Rect, Size};
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

const FRAME_WIDTH: u32 = 64;
const FRAME_HEIGHT: u32 = 48;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone)]
pub struct VirtualDeviceSpec {
    pub id: String,
    pub characteristics: DeviceCharacteristics,
}

impl VirtualDeviceSpec {
    /// 12MP rear sensor mounted at 90 degrees, 8x digital zoom.
    pub fn rear(id: &str) -> Self {
        Self {
            id: id.to_string(),
            characteristics: DeviceCharacteristics {
                facing: Some(LensFacing::Back),
                active_array: Some(Rect::new(0, 0, 4000, 3000)),
                max_digital_zoom: Some(8.0),
                exposure_compensation_range: Some(ExposureRange::new(-12, 12)),
                sensor_orientation: Some(90),
                preview_sizes: vec![
                    Size::new(1920, 1080),
                    Size::new(1280, 720),
                    Size::new(640, 480),
                ],
            },
        }
    }

    /// 8MP front sensor mounted at 270 degrees, 4x digital zoom.
    pub fn front(id: &str) -> Self {
        Self {
            id: id.to_string(),
            characteristics: DeviceCharacteristics {
                facing: Some(LensFacing::Front),
                active_array: Some(Rect::new(0, 0, 3264, 2448)),
                max_digital_zoom: Some(4.0),
                exposure_compensation_range: Some(ExposureRange::new(-8, 8)),
                sensor_orientation: Some(270),
                preview_sizes: vec![Size::new(1280, 720), Size::new(640, 480)],
            },
        }
    }

    /// A device that reports no metadata at all.
    pub fn bare(id: &str) -> Self {
        Self {
            id: id.to_string(),
            characteristics: DeviceCharacteristics::default(),
        }
    }
}

/// How the virtual session answers a still capture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CaptureMode {
    /// Push a frame into the sink immediately.
    #[default]
    Deliver,
    /// Keep the frame back until `deliver_held_frame`.
    Hold,
    /// Fire the frame listener without a frame.
    Empty,
    /// Reject the capture request.
    Fail,
}

#[derive(Debug, Clone, Default)]
pub struct VirtualBehavior {
    pub deny_access: bool,
    /// Keep the opened device back until `release_open`.
    pub hold_open: bool,
    pub fail_configure: bool,
    /// Leave a frame in the sink before the session reports configured.
    pub stale_frame_on_configure: bool,
    pub reject_repeating: bool,
    pub capture_mode: CaptureMode,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JournalEntry {
    DeviceOpened(String),
    SinkCreated { size: Size, max_frames: usize },
    SessionCreated,
    RepeatingRequest(CaptureRequest),
    Capture(CaptureRequest),
    StopRepeating,
    AbortCaptures,
    SessionClosed,
    SinkClosed,
    DeviceClosed(String),
}

#[derive(Default)]
struct Rig {
    behavior: VirtualBehavior,
    journal: Vec<JournalEntry>,
    events: Option<EventSink>,
    held_open: Option<(EventSink, VirtualDevice)>,
    sink: Option<Arc<VirtualFrameSink>>,
    held_frames: usize,
    frame_counter: u64,
    opens: usize,
}

impl Rig {
    fn next_frame(&mut self) -> Bytes {
        self.frame_counter += 1;
        Bytes::from(synthetic_jpeg(FRAME_WIDTH, FRAME_HEIGHT, self.frame_counter))
    }
}

#[derive(Clone)]
pub struct VirtualBackend {
    devices: Vec<VirtualDeviceSpec>,
    rig: Arc<Mutex<Rig>>,
}

impl VirtualBackend {
    pub fn new(devices: Vec<VirtualDeviceSpec>) -> Self {
        Self {
            devices,
            rig: Arc::new(Mutex::new(Rig::default())),
        }
    }

    pub fn with_behavior(self, behavior: VirtualBehavior) -> Self {
        lock(&self.rig).behavior = behavior;
        self
    }

    pub fn update_behavior<F: FnOnce(&mut VirtualBehavior)>(&self, f: F) {
        f(&mut lock(&self.rig).behavior);
    }

    pub fn journal(&self) -> Vec<JournalEntry> {
        lock(&self.rig).journal.clone()
    }

    pub fn clear_journal(&self) {
        lock(&self.rig).journal.clear();
    }

    pub fn repeating_requests(&self) -> Vec<CaptureRequest> {
        self.journal()
            .into_iter()
            .filter_map(|entry| match entry {
                JournalEntry::RepeatingRequest(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    pub fn captures(&self) -> Vec<CaptureRequest> {
        self.journal()
            .into_iter()
            .filter_map(|entry| match entry {
                JournalEntry::Capture(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    /// Number of `open_device` calls accepted so far.
    pub fn opens(&self) -> usize {
        lock(&self.rig).opens
    }

    pub fn sink(&self) -> Option<Arc<VirtualFrameSink>> {
        lock(&self.rig).sink.clone()
    }

    /// Deliver a device held back by `hold_open`.
    pub fn release_open(&self) -> bool {
        let held = lock(&self.rig).held_open.take();
        match held {
            Some((events, device)) => {
                events.deliver(HardwareEvent::DeviceOpened(Box::new(device)));
                true
            }
            None => false,
        }
    }

    /// Push the frame for one capture held back in `Hold` mode.
    pub fn deliver_held_frame(&self) -> bool {
        let (sink, frame) = {
            let mut rig = lock(&self.rig);
            if rig.held_frames == 0 {
                return false;
            }
            rig.held_frames -= 1;
            let frame = rig.next_frame();
            (rig.sink.clone(), frame)
        };
        match sink {
            Some(sink) => {
                sink.push(frame);
                true
            }
            None => false,
        }
    }

    /// Push an unsolicited frame into the current sink.
    pub fn inject_frame(&self) -> bool {
        let (sink, frame) = {
            let mut rig = lock(&self.rig);
            let frame = rig.next_frame();
            (rig.sink.clone(), frame)
        };
        match sink {
            Some(sink) => {
                sink.push(frame);
                true
            }
            None => false,
        }
    }

    pub fn disconnect(&self) {
        self.deliver(HardwareEvent::DeviceDisconnected);
    }

    pub fn device_error(&self, code: i32) {
        self.deliver(HardwareEvent::DeviceError(code));
    }

    fn deliver(&self, event: HardwareEvent) {
        let events = lock(&self.rig).events.clone();
        match events {
            Some(events) => events.deliver(event),
            None => event.release(),
        }
    }
}

impl CameraBackend for VirtualBackend {
    fn device_ids(&self) -> HardwareResult<Vec<String>> {
        Ok(self.devices.iter().map(|d| d.id.clone()).collect())
    }

    fn characteristics(&self, device_id: &str) -> HardwareResult<DeviceCharacteristics> {
        self.devices
            .iter()
            .find(|d| d.id == device_id)
            .map(|d| d.characteristics.clone())
            .ok_or_else(|| HardwareError::UnknownDevice(device_id.to_string()))
    }

    fn open_device(&self, device_id: &str, events: EventSink) -> HardwareResult<()> {
        if !self.devices.iter().any(|d| d.id == device_id) {
            return Err(HardwareError::UnknownDevice(device_id.to_string()));
        }

        let device = VirtualDevice {
            id: device_id.to_string(),
            rig: self.rig.clone(),
        };
        let deliver_now = {
            let mut rig = lock(&self.rig);
            if rig.behavior.deny_access {
                return Err(HardwareError::AccessDenied(format!(
                    "camera {} not granted",
                    device_id
                )));
            }
            rig.opens += 1;
            rig.journal.push(JournalEntry::DeviceOpened(device_id.to_string()));
            rig.events = Some(events.clone());
            if rig.behavior.hold_open {
                rig.held_open = Some((events.clone(), device));
                None
            } else {
                Some(device)
            }
        };

        if let Some(device) = deliver_now {
            events.deliver(HardwareEvent::DeviceOpened(Box::new(device)));
        }
        Ok(())
    }
}

struct VirtualDevice {
    id: String,
    rig: Arc<Mutex<Rig>>,
}

impl CameraDevice for VirtualDevice {
    fn id(&self) -> &str {
        &self.id
    }

    fn create_frame_sink(&mut self, size: Size, max_frames: usize) -> HardwareResult<Arc<dyn FrameSink>> {
        let sink = Arc::new(VirtualFrameSink::new(max_frames, Arc::downgrade(&self.rig)));
        let mut rig = lock(&self.rig);
        rig.journal.push(JournalEntry::SinkCreated { size, max_frames });
        rig.sink = Some(sink.clone());
        Ok(sink)
    }

    fn create_session(
        &mut self,
        _target: Arc<dyn RenderTarget>,
        _sink: Arc<dyn FrameSink>,
        events: EventSink,
    ) -> HardwareResult<()> {
        let (fail, stale) = {
            let mut rig = lock(&self.rig);
            rig.journal.push(JournalEntry::SessionCreated);
            let stale = if rig.behavior.stale_frame_on_configure {
                let frame = rig.next_frame();
                rig.sink.clone().map(|sink| (sink, frame))
            } else {
                None
            };
            (rig.behavior.fail_configure, stale)
        };

        if fail {
            events.deliver(HardwareEvent::SessionConfigureFailed);
            return Ok(());
        }
        if let Some((sink, frame)) = stale {
            sink.push(frame);
        }
        events.deliver(HardwareEvent::SessionConfigured(Box::new(VirtualSession {
            rig: self.rig.clone(),
        })));
        Ok(())
    }

    fn close(&mut self) {
        lock(&self.rig)
            .journal
            .push(JournalEntry::DeviceClosed(self.id.clone()));
    }
}

struct VirtualSession {
    rig: Arc<Mutex<Rig>>,
}

impl CaptureSession for VirtualSession {
    fn set_repeating_request(&mut self, request: &CaptureRequest) -> HardwareResult<()> {
        let mut rig = lock(&self.rig);
        if rig.behavior.reject_repeating {
            return Err(HardwareError::Failure("repeating request rejected".into()));
        }
        rig.journal.push(JournalEntry::RepeatingRequest(request.clone()));
        Ok(())
    }

    fn capture(&mut self, request: &CaptureRequest) -> HardwareResult<()> {
        let (mode, sink, frame) = {
            let mut rig = lock(&self.rig);
            let mode = rig.behavior.capture_mode;
            if mode == CaptureMode::Fail {
                return Err(HardwareError::Failure("capture rejected".into()));
            }
            rig.journal.push(JournalEntry::Capture(request.clone()));
            let frame = match mode {
                CaptureMode::Deliver => Some(rig.next_frame()),
                CaptureMode::Hold => {
                    rig.held_frames += 1;
                    None
                }
                _ => None,
            };
            (mode, rig.sink.clone(), frame)
        };

        if let Some(sink) = sink {
            match (mode, frame) {
                (CaptureMode::Deliver, Some(frame)) => sink.push(frame),
                (CaptureMode::Empty, _) => sink.notify(),
                _ => {}
            }
        }
        Ok(())
    }

    fn stop_repeating(&mut self) -> HardwareResult<()> {
        lock(&self.rig).journal.push(JournalEntry::StopRepeating);
        Ok(())
    }

    fn abort_captures(&mut self) -> HardwareResult<()> {
        let mut rig = lock(&self.rig);
        rig.held_frames = 0;
        rig.journal.push(JournalEntry::AbortCaptures);
        Ok(())
    }

    fn close(&mut self) {
        lock(&self.rig).journal.push(JournalEntry::SessionClosed);
    }
}

struct SinkState {
    frames: VecDeque<Bytes>,
    listener: Option<FrameListener>,
    closed: bool,
}

/// Drop-oldest frame queue with a listener fired outside its lock.
pub struct VirtualFrameSink {
    state: Mutex<SinkState>,
    capacity: usize,
    released: Arc<AtomicUsize>,
    rig: Weak<Mutex<Rig>>,
}

impl VirtualFrameSink {
    fn new(capacity: usize, rig: Weak<Mutex<Rig>>) -> Self {
        Self {
            state: Mutex::new(SinkState {
                frames: VecDeque::new(),
                listener: None,
                closed: false,
            }),
            capacity: capacity.max(1),
            released: Arc::new(AtomicUsize::new(0)),
            rig,
        }
    }

    pub fn push(&self, frame: Bytes) {
        let listener = {
            let mut state = lock(&self.state);
            if state.closed {
                return;
            }
            while state.frames.len() >= self.capacity {
                state.frames.pop_front();
                self.released.fetch_add(1, Ordering::SeqCst);
            }
            state.frames.push_back(frame);
            state.listener.clone()
        };
        if let Some(listener) = listener {
            listener();
        }
    }

    /// Fire the listener without queueing anything.
    pub fn notify(&self) {
        let listener = lock(&self.state).listener.clone();
        if let Some(listener) = listener {
            listener();
        }
    }

    pub fn queued(&self) -> usize {
        lock(&self.state).frames.len()
    }

    pub fn has_listener(&self) -> bool {
        lock(&self.state).listener.is_some()
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    /// Frames handed back by consumers or dropped by the queue.
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl FrameSink for VirtualFrameSink {
    fn acquire_latest(&self) -> HardwareResult<Option<Box<dyn SinkFrame>>> {
        let mut state = lock(&self.state);
        if state.closed {
            return Err(HardwareError::Failure("frame sink closed".into()));
        }
        let latest = state.frames.pop_back();
        let older = state.frames.len();
        state.frames.clear();
        self.released.fetch_add(older, Ordering::SeqCst);

        Ok(latest.map(|bytes| {
            Box::new(VirtualFrame {
                bytes,
                released: self.released.clone(),
            }) as Box<dyn SinkFrame>
        }))
    }

    fn set_listener(&self, listener: Option<FrameListener>) {
        lock(&self.state).listener = listener;
    }

    fn close(&self) {
        {
            let mut state = lock(&self.state);
            state.closed = true;
            state.listener = None;
            let dropped = state.frames.len();
            state.frames.clear();
            self.released.fetch_add(dropped, Ordering::SeqCst);
        }
        if let Some(rig) = self.rig.upgrade() {
            lock(&rig).journal.push(JournalEntry::SinkClosed);
        }
    }
}

struct VirtualFrame {
    bytes: Bytes,
    released: Arc<AtomicUsize>,
}

impl SinkFrame for VirtualFrame {
    fn encoded(&self) -> Bytes {
        self.bytes.clone()
    }
}

impl Drop for VirtualFrame {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct VirtualRenderTarget {
    size: Size,
    valid: AtomicBool,
}

impl VirtualRenderTarget {
    pub fn new(size: Size) -> Self {
        Self {
            size,
            valid: AtomicBool::new(true),
        }
    }

    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::SeqCst);
    }
}

impl RenderTarget for VirtualRenderTarget {
    fn size(&self) -> Size {
        self.size
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }
}

/// Keeps saved captures in memory.
#[derive(Default)]
pub struct RecordingStorage {
    saved: Mutex<Vec<Vec<u8>>>,
    failing: AtomicBool,
}

impl RecordingStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn saved(&self) -> Vec<Vec<u8>> {
        lock(&self.saved).clone()
    }

    pub fn saved_count(&self) -> usize {
        lock(&self.saved).len()
    }
}

impl StorageSink for RecordingStorage {
    fn save(&self, encoded: &[u8]) -> Result<String, StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Rejected("storage unavailable".into()));
        }
        let mut saved = lock(&self.saved);
        saved.push(encoded.to_vec());
        Ok(format!("memory://capture/{}", saved.len()))
    }
}
