//! The capture-session state machine.
//!
//! `SessionMachine` is only ever touched under the controller's mutex, from
//! either the host thread (commands) or the worker thread (hardware events
//! and frame notifications). Methods that must reply to a capture return a
//! [`Settlement`] instead of replying, so the reply runs after the lock is
//! released.

mod state;

pub use state::{Binding, SessionLinks, SessionPhase};

use crate::capture::{drain_sink, CaptureProtocol, InFlightCapture, Rejected, ReplyFn, Settlement};
use crate::errors::ControllerError;
use crate::geometry::jpeg_orientation;
use crate::hardware::{CaptureSession, FrameListener, HardwareEvent, RenderTarget};
use crate::params::DecodedSettings;
use crate::request::PendingRequestState;
use crate::types::DeviceCapabilities;
use crate::worker::CallerContext;
use state::SessionState;
use std::mem;
use std::sync::Arc;
use uuid::Uuid;

/// Frames the still sink may hold at once.
pub const STILL_SINK_CAPACITY: usize = 1;

/// What happened to a settings change.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// The stream now runs with the new request.
    Applied {
        revision: u64,
        /// Keys skipped because of their shape.
        ignored: Vec<ControllerError>,
    },
    /// Not streaming; nothing was changed.
    Dropped,
    /// The hardware refused the rebuilt request; the previous one stays live.
    Failed(ControllerError),
}

pub struct SessionMachine {
    state: SessionState,
    next_generation: u64,
    capture: CaptureProtocol,
    caller: Arc<dyn CallerContext>,
}

impl SessionMachine {
    pub fn new(drain_limit: usize, caller: Arc<dyn CallerContext>) -> Self {
        Self {
            state: SessionState::Closed,
            next_generation: 1,
            capture: CaptureProtocol::new(drain_limit),
            caller,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase()
    }

    pub fn capabilities(&self) -> Option<Arc<DeviceCapabilities>> {
        self.state
            .binding()
            .map(|binding| binding.capabilities.clone())
    }

    pub fn pending_request(&self) -> Option<PendingRequestState> {
        match &self.state {
            SessionState::Streaming { pending, .. } => Some(pending.clone()),
            _ => None,
        }
    }

    pub fn capture_in_flight(&self) -> bool {
        self.capture.in_flight()
    }

    pub fn allocate_generation(&mut self) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        generation
    }

    fn is_live(&self, generation: u64) -> bool {
        self.state
            .binding()
            .is_some_and(|binding| binding.generation == generation)
    }

    fn transition(&mut self, next: SessionState) {
        let phase = next.phase();
        self.state = next;
        log::info!("session entered {}", phase);
    }

    /// Enter `Opening`. Only valid from `Closed`.
    pub fn begin_open(&mut self, binding: Binding) -> bool {
        if !matches!(self.state, SessionState::Closed) {
            log::debug!("open ignored in phase {}", self.phase());
            return false;
        }
        log::debug!(
            "opening device {} (generation {}, preview {})",
            binding.capabilities.device_id,
            binding.generation,
            binding.preview_size
        );
        self.transition(SessionState::Opening(binding));
        true
    }

    /// Roll back an open the backend refused synchronously.
    pub fn abandon_open(&mut self, generation: u64) {
        if matches!(&self.state, SessionState::Opening(b) if b.generation == generation) {
            self.transition(SessionState::Closed);
        }
    }

    pub fn on_hardware_event(&mut self, generation: u64, event: HardwareEvent) -> Option<Settlement> {
        if !self.is_live(generation) {
            log::debug!(
                "stale {} for generation {} in phase {}",
                event.kind(),
                generation,
                self.phase()
            );
            event.release();
            return None;
        }

        match event {
            HardwareEvent::DeviceOpened(mut device) => {
                match mem::replace(&mut self.state, SessionState::Closing) {
                    SessionState::Opening(binding) => {
                        log::info!("device {} opened", device.id());
                        self.transition(SessionState::Open { binding, device });
                        self.configure();
                    }
                    other => {
                        self.state = other;
                        device.close();
                    }
                }
                None
            }
            HardwareEvent::SessionConfigured(session) => {
                self.on_configured(session);
                None
            }
            HardwareEvent::SessionConfigureFailed => {
                if let SessionState::Configuring { .. } = self.state {
                    let error = ControllerError::ConfigureFailed("backend rejected outputs".into());
                    log::warn!("{}", error);
                    // no capture can be in flight before streaming
                    let _ = self.release_all();
                    self.transition(SessionState::Closed);
                }
                None
            }
            HardwareEvent::DeviceDisconnected => self.force_close("camera disconnected"),
            HardwareEvent::DeviceError(code) => {
                self.force_close(&format!("camera device error {}", code))
            }
        }
    }

    /// Create the still sink and start configuring a session. A render
    /// target that is gone leaves the machine in `Open`.
    fn configure(&mut self) {
        let (binding, mut device) = match mem::replace(&mut self.state, SessionState::Closing) {
            SessionState::Open { binding, device } => (binding, device),
            other => {
                self.state = other;
                return;
            }
        };

        if !binding.target.is_valid() {
            log::debug!("render target not available, waiting in open");
            self.state = SessionState::Open { binding, device };
            return;
        }

        let sink = match device.create_frame_sink(binding.preview_size, STILL_SINK_CAPACITY) {
            Ok(sink) => sink,
            Err(e) => {
                log::warn!("{}", ControllerError::ConfigureFailed(e.to_string()));
                device.close();
                self.transition(SessionState::Closed);
                return;
            }
        };

        if let Err(e) = device.create_session(
            binding.target.clone(),
            sink.clone(),
            binding.links.events.clone(),
        ) {
            log::warn!("{}", ControllerError::ConfigureFailed(e.to_string()));
            sink.close();
            device.close();
            self.transition(SessionState::Closed);
            return;
        }

        self.transition(SessionState::Configuring {
            binding,
            device,
            sink,
        });
    }

    fn on_configured(&mut self, mut session: Box<dyn CaptureSession>) {
        let (binding, device, sink) = match mem::replace(&mut self.state, SessionState::Closing) {
            SessionState::Configuring {
                binding,
                device,
                sink,
            } => (binding, device, sink),
            other => {
                self.state = other;
                session.close();
                return;
            }
        };

        drain_sink(&*sink, self.capture.drain_limit());

        let pending = PendingRequestState::default();
        if let Err(e) = session.set_repeating_request(&pending.preview_request()) {
            log::warn!("initial preview request rejected: {}", e);
        }

        self.transition(SessionState::Streaming {
            binding,
            device,
            session,
            sink,
            pending,
        });
    }

    /// Point the lifecycle at a new render target, configuring if we were
    /// waiting for one.
    pub fn retarget(&mut self, target: Arc<dyn RenderTarget>) {
        let phase = self.phase();
        match &mut self.state {
            SessionState::Opening(binding) => binding.target = target,
            SessionState::Open { binding, .. } => {
                binding.target = target;
                self.configure();
            }
            _ => log::debug!("render target change ignored in phase {}", phase),
        }
    }

    /// Fold a decoded delta into the pending state and re-issue the preview
    /// request. The new state is kept only if the hardware accepts it.
    pub fn update_request<F>(&mut self, decode: F) -> ApplyOutcome
    where
        F: FnOnce(&DeviceCapabilities) -> DecodedSettings,
    {
        let phase = self.phase();
        let SessionState::Streaming {
            binding,
            session,
            pending,
            ..
        } = &mut self.state
        else {
            log::debug!("settings dropped in phase {}", phase);
            return ApplyOutcome::Dropped;
        };

        let decoded = decode(&binding.capabilities);
        let next = pending.with_delta(&decoded.delta);
        match session.set_repeating_request(&next.preview_request()) {
            Ok(()) => {
                *pending = next;
                log::debug!("preview request updated (revision {})", pending.revision());
                ApplyOutcome::Applied {
                    revision: pending.revision(),
                    ignored: decoded.ignored,
                }
            }
            Err(e) => {
                log::warn!("preview request rejected: {}", e);
                ApplyOutcome::Failed(ControllerError::Hardware(e.to_string()))
            }
        }
    }

    /// Admit and issue a still capture.
    ///
    /// `Err` hands back an unreplied rejection; `Ok(Some(_))` is an issuance
    /// failure to settle after unlocking.
    pub fn start_capture(
        &mut self,
        reply: ReplyFn,
        display_rotation: i32,
    ) -> Result<Option<Settlement>, Rejected> {
        let SessionState::Streaming {
            binding,
            session,
            sink,
            pending,
            ..
        } = &mut self.state
        else {
            return Err(Rejected {
                reply,
                error: ControllerError::NotReady,
            });
        };

        let token = self.capture.admit(reply, self.caller.clone())?;

        let orientation =
            jpeg_orientation(binding.capabilities.sensor_orientation, display_rotation);
        let request = pending.still_request(orientation);
        let id = token.id();
        let frames = binding.links.frames.clone();
        let listener: FrameListener = Arc::new(move || frames(id));

        Ok(self
            .capture
            .begin(token, &mut **session, sink, &request, listener))
    }

    /// Claim the in-flight capture a frame notification refers to.
    pub fn take_capture(&mut self, generation: u64, id: Uuid) -> Option<InFlightCapture> {
        if !self.is_live(generation) {
            return None;
        }
        self.capture.take(id)
    }

    /// Release every handle and enter `Closing`. Returns the aborted capture,
    /// if one was in flight.
    pub fn begin_close(&mut self) -> Option<Settlement> {
        if matches!(self.state, SessionState::Closed | SessionState::Closing) {
            return None;
        }
        let settlement = self.release_all();
        self.transition(SessionState::Closing);
        settlement
    }

    pub fn finish_close(&mut self) {
        if matches!(self.state, SessionState::Closing) {
            self.transition(SessionState::Closed);
        }
    }

    fn force_close(&mut self, reason: &str) -> Option<Settlement> {
        log::warn!("{}; closing session from {}", reason, self.phase());
        let settlement = self.release_all_with(reason);
        self.transition(SessionState::Closed);
        settlement
    }

    fn release_all(&mut self) -> Option<Settlement> {
        self.release_all_with("camera paused")
    }

    /// Tear down in order: listener, repeating request, queued captures,
    /// in-flight token, then session, sink and device.
    fn release_all_with(&mut self, reason: &str) -> Option<Settlement> {
        match mem::replace(&mut self.state, SessionState::Closing) {
            SessionState::Closed | SessionState::Closing | SessionState::Opening(_) => None,
            SessionState::Open { mut device, .. } => {
                device.close();
                None
            }
            SessionState::Configuring {
                mut device, sink, ..
            } => {
                sink.close();
                device.close();
                None
            }
            SessionState::Streaming {
                mut device,
                mut session,
                sink,
                ..
            } => {
                sink.set_listener(None);
                if let Err(e) = session.stop_repeating() {
                    log::warn!("stop repeating failed: {}", e);
                }
                if let Err(e) = session.abort_captures() {
                    log::warn!("abort captures failed: {}", e);
                }
                let settlement = self.capture.abort(reason);
                session.close();
                sink.close();
                device.close();
                settlement
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{CameraDevice, EventSink, FrameSink, HardwareResult};
    use crate::testing::VirtualRenderTarget;
    use crate::types::{DeviceCharacteristics, Size};
    use crate::worker::InlineCaller;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct LoneDevice(Arc<AtomicBool>);

    impl CameraDevice for LoneDevice {
        fn id(&self) -> &str {
            "lone"
        }
        fn create_frame_sink(&mut self, _: Size, _: usize) -> HardwareResult<Arc<dyn FrameSink>> {
            Err(crate::errors::HardwareError::Failure("no sinks".into()))
        }
        fn create_session(
            &mut self,
            _: Arc<dyn RenderTarget>,
            _: Arc<dyn FrameSink>,
            _: EventSink,
        ) -> HardwareResult<()> {
            Ok(())
        }
        fn close(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    fn binding(generation: u64) -> Binding {
        Binding {
            generation,
            capabilities: Arc::new(DeviceCapabilities::from_characteristics(
                "lone",
                DeviceCharacteristics::default(),
            )),
            target: Arc::new(VirtualRenderTarget::new(Size::new(640, 480))),
            preview_size: Size::new(640, 480),
            links: SessionLinks {
                events: EventSink::new(|event| Err(event)),
                frames: Arc::new(|_| {}),
            },
        }
    }

    fn machine() -> SessionMachine {
        SessionMachine::new(4, Arc::new(InlineCaller))
    }

    #[test]
    fn test_open_only_from_closed() {
        let mut m = machine();
        let generation = m.allocate_generation();
        assert!(m.begin_open(binding(generation)));
        assert!(!m.begin_open(binding(generation + 1)));
        assert_eq!(m.phase(), SessionPhase::Opening);
    }

    #[test]
    fn test_stale_event_releases_device() {
        let mut m = machine();
        let stale = m.allocate_generation();
        let live = m.allocate_generation();
        m.begin_open(binding(live));

        let closed = Arc::new(AtomicBool::new(false));
        let settled = m.on_hardware_event(
            stale,
            HardwareEvent::DeviceOpened(Box::new(LoneDevice(closed.clone()))),
        );
        assert!(settled.is_none());
        assert!(closed.load(Ordering::SeqCst));
        assert_eq!(m.phase(), SessionPhase::Opening);
    }

    #[test]
    fn test_sink_failure_closes_device() {
        let mut m = machine();
        let generation = m.allocate_generation();
        m.begin_open(binding(generation));

        let closed = Arc::new(AtomicBool::new(false));
        let _ = m.on_hardware_event(
            generation,
            HardwareEvent::DeviceOpened(Box::new(LoneDevice(closed.clone()))),
        );
        assert!(closed.load(Ordering::SeqCst));
        assert_eq!(m.phase(), SessionPhase::Closed);
    }

    #[test]
    fn test_settings_dropped_when_not_streaming() {
        let mut m = machine();
        let outcome = m.update_request(|_| DecodedSettings::default());
        assert_eq!(outcome, ApplyOutcome::Dropped);
    }

    #[test]
    fn test_capture_not_ready_when_closed() {
        let mut m = machine();
        let rejected = m.start_capture(Box::new(|_| {}), 0).err().unwrap();
        assert_eq!(rejected.error, ControllerError::NotReady);
        assert!(!m.capture_in_flight());
    }

    #[test]
    fn test_abandon_open_returns_to_closed() {
        let mut m = machine();
        let generation = m.allocate_generation();
        m.begin_open(binding(generation));
        m.abandon_open(generation + 7);
        assert_eq!(m.phase(), SessionPhase::Opening);
        m.abandon_open(generation);
        assert_eq!(m.phase(), SessionPhase::Closed);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut m = machine();
        assert!(m.begin_close().is_none());
        m.finish_close();
        assert_eq!(m.phase(), SessionPhase::Closed);
    }
}
