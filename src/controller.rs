//! `CameraController`, the public facade over the session machine.
//!
//! Every facade operation is serialised by a command mutex. Hardware events
//! and frame notifications arrive on the lifecycle's worker thread and take
//! the machine lock directly. No lock is held while the worker is joined or
//! while a reply runs.

use crate::capture::{CaptureResult, CaptureTicket, Settlement};
use crate::config::CamgentConfig;
use crate::discovery::select_device;
use crate::errors::ControllerError;
use crate::geometry::choose_preview_size;
use crate::hardware::{
    CameraBackend, DisplayRotation, EventSink, FixedRotation, HardwareEvent, RenderTarget,
    StorageSink,
};
use crate::params::{decode_settings, exposure_delta, zoom_delta, DecodedSettings};
use crate::request::PendingRequestState;
use crate::session::{ApplyOutcome, Binding, SessionLinks, SessionMachine, SessionPhase};
use crate::storage::FileStorage;
use crate::types::DeviceCapabilities;
use crate::worker::{CallerContext, InlineCaller, Worker, WorkerHandle};
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use uuid::Uuid;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        log::warn!("recovering poisoned lock");
        poisoned.into_inner()
    })
}

struct Shared {
    machine: Mutex<SessionMachine>,
    storage: Arc<dyn StorageSink>,
}

impl Shared {
    fn on_event(&self, generation: u64, event: HardwareEvent) {
        log::debug!("worker handling {:?} (generation {})", event, generation);
        let settlement = lock(&self.machine).on_hardware_event(generation, event);
        if let Some(settlement) = settlement {
            settlement.settle();
        }
    }

    fn on_frame(&self, generation: u64, id: Uuid) {
        let flight = lock(&self.machine).take_capture(generation, id);
        match flight {
            Some(flight) => flight.complete(&*self.storage),
            None => log::debug!("frame notification for {} has no capture waiting", id),
        }
    }
}

/// An event waiting on the worker queue. Released if it is never handled.
struct Parcel(Option<HardwareEvent>);

impl Parcel {
    fn take(&mut self) -> Option<HardwareEvent> {
        self.0.take()
    }
}

impl Drop for Parcel {
    fn drop(&mut self) {
        if let Some(event) = self.0.take() {
            event.release();
        }
    }
}

pub struct CameraControllerBuilder {
    backend: Arc<dyn CameraBackend>,
    storage: Option<Arc<dyn StorageSink>>,
    caller: Option<Arc<dyn CallerContext>>,
    rotation: Option<Arc<dyn DisplayRotation>>,
    config: CamgentConfig,
}

impl CameraControllerBuilder {
    pub fn storage(mut self, storage: Arc<dyn StorageSink>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Context capture replies are delivered on. Defaults to inline.
    pub fn caller(mut self, caller: Arc<dyn CallerContext>) -> Self {
        self.caller = Some(caller);
        self
    }

    pub fn rotation(mut self, rotation: Arc<dyn DisplayRotation>) -> Self {
        self.rotation = Some(rotation);
        self
    }

    pub fn config(mut self, config: CamgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<CameraController, ControllerError> {
        self.config.validate().map_err(ControllerError::Config)?;

        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(FileStorage::from_config(&self.config.capture)));
        let caller = self.caller.unwrap_or_else(|| Arc::new(InlineCaller));
        let rotation = self
            .rotation
            .unwrap_or_else(|| Arc::new(FixedRotation::default()));

        Ok(CameraController {
            shared: Arc::new(Shared {
                machine: Mutex::new(SessionMachine::new(
                    self.config.capture.drain_limit,
                    caller,
                )),
                storage,
            }),
            backend: self.backend,
            rotation,
            config: self.config,
            worker: Mutex::new(None),
            commands: Mutex::new(()),
        })
    }
}

pub struct CameraController {
    shared: Arc<Shared>,
    backend: Arc<dyn CameraBackend>,
    rotation: Arc<dyn DisplayRotation>,
    config: CamgentConfig,
    worker: Mutex<Option<Worker>>,
    commands: Mutex<()>,
}

impl CameraController {
    pub fn builder(backend: Arc<dyn CameraBackend>) -> CameraControllerBuilder {
        CameraControllerBuilder {
            backend,
            storage: None,
            caller: None,
            rotation: None,
            config: CamgentConfig::default(),
        }
    }

    pub fn config(&self) -> &CamgentConfig {
        &self.config
    }

    pub fn phase(&self) -> SessionPhase {
        lock(&self.shared.machine).phase()
    }

    /// Capability snapshot of the device bound to the current lifecycle.
    pub fn capabilities(&self) -> Option<Arc<DeviceCapabilities>> {
        lock(&self.shared.machine).capabilities()
    }

    /// Parameters currently applied to the preview stream.
    pub fn pending_request(&self) -> Option<PendingRequestState> {
        lock(&self.shared.machine).pending_request()
    }

    pub fn capture_in_flight(&self) -> bool {
        lock(&self.shared.machine).capture_in_flight()
    }

    /// Select a device and start opening it against `target`.
    ///
    /// Returns once the backend has accepted the open; streaming starts
    /// asynchronously. A no-op unless the controller is closed.
    pub fn open(&self, target: Arc<dyn RenderTarget>) -> Result<(), ControllerError> {
        let _command = lock(&self.commands);
        self.open_locked(target)
    }

    fn open_locked(&self, target: Arc<dyn RenderTarget>) -> Result<(), ControllerError> {
        let phase = self.phase();
        if phase != SessionPhase::Closed {
            log::debug!("open ignored, session is {}", phase);
            return Ok(());
        }
        self.reap_worker();

        let device_id = select_device(&*self.backend, self.config.camera.preferred_facing)?;
        let raw = self
            .backend
            .characteristics(&device_id)
            .map_err(|e| ControllerError::DeviceUnavailable(e.to_string()))?;
        let capabilities = Arc::new(DeviceCapabilities::from_characteristics(&device_id, raw));
        let target_size = target.size();
        let preview_size = choose_preview_size(
            &capabilities.preview_sizes,
            target_size.width,
            target_size.height,
        );

        let worker = Worker::spawn(&self.config.worker.thread_name)?;
        let generation = lock(&self.shared.machine).allocate_generation();
        let links = self.links(generation, &worker.handle());
        let events = links.events.clone();

        let binding = Binding {
            generation,
            capabilities,
            target,
            preview_size,
            links,
        };
        if !lock(&self.shared.machine).begin_open(binding) {
            return Ok(());
        }
        *lock(&self.worker) = Some(worker);

        log::info!("opening camera {} at {}", device_id, preview_size);
        if let Err(e) = self.backend.open_device(&device_id, events) {
            let error = ControllerError::from_open(e);
            log::warn!("open failed: {}", error);
            lock(&self.shared.machine).abandon_open(generation);
            self.reap_worker();
            return Err(error);
        }
        Ok(())
    }

    fn links(&self, generation: u64, handle: &WorkerHandle) -> SessionLinks {
        let events = {
            let handle = handle.clone();
            let shared = Arc::downgrade(&self.shared);
            EventSink::new(move |event| {
                let shared = shared.clone();
                let mut parcel = Parcel(Some(event));
                let posted = handle.post(move || {
                    let Some(shared) = Weak::upgrade(&shared) else {
                        return;
                    };
                    if let Some(event) = parcel.take() {
                        shared.on_event(generation, event);
                    }
                });
                if !posted {
                    log::debug!("worker gone, event for generation {} released", generation);
                }
                Ok(())
            })
        };

        let frames = {
            let handle = handle.clone();
            let shared = Arc::downgrade(&self.shared);
            Arc::new(move |id: Uuid| {
                let shared = shared.clone();
                handle.post(move || {
                    if let Some(shared) = Weak::upgrade(&shared) {
                        shared.on_frame(generation, id);
                    }
                });
            })
        };

        SessionLinks { events, frames }
    }

    /// Join a worker left behind by a lifecycle that ended on its own.
    fn reap_worker(&self) {
        let worker = lock(&self.worker).take();
        if let Some(worker) = worker {
            log::debug!("reaping worker {}", worker.name());
            if let Err(e) = worker.shutdown(self.config.worker.shutdown_timeout()) {
                log::warn!("{}", e);
            }
        }
    }

    /// Decode a settings map and apply it to the live preview.
    pub fn apply_settings(&self, settings: &Map<String, Value>) -> ApplyOutcome {
        let _command = lock(&self.commands);
        lock(&self.shared.machine).update_request(|caps| decode_settings(settings, caps))
    }

    pub fn set_zoom(&self, zoom: f32) -> ApplyOutcome {
        let _command = lock(&self.commands);
        lock(&self.shared.machine)
            .update_request(|caps| DecodedSettings::from_delta(zoom_delta(zoom, caps)))
    }

    pub fn set_exposure_compensation(&self, exposure: f32) -> ApplyOutcome {
        let _command = lock(&self.commands);
        lock(&self.shared.machine)
            .update_request(|caps| DecodedSettings::from_delta(exposure_delta(exposure, caps)))
    }

    /// Take a still picture. The ticket resolves exactly once.
    pub fn capture(&self) -> CaptureTicket {
        let (reply, ticket) = CaptureTicket::channel();
        self.capture_with(reply);
        ticket
    }

    /// Take a still picture, replying through `reply`.
    ///
    /// Rejections (`NotReady`, `Busy`) reply on the calling thread before this
    /// returns. Everything else replies on the configured caller context.
    pub fn capture_with<F>(&self, reply: F)
    where
        F: FnOnce(CaptureResult) + Send + 'static,
    {
        let outcome = {
            let _command = lock(&self.commands);
            let rotation = self.rotation.current_rotation_degrees();
            lock(&self.shared.machine).start_capture(Box::new(reply), rotation)
        };
        match outcome {
            Ok(None) => {}
            Ok(Some(settlement)) => settlement.settle(),
            Err(rejected) => rejected.reply(),
        }
    }

    /// Stop streaming and release the device. Safe to call in any phase.
    pub fn pause(&self) {
        let settlement = {
            let _command = lock(&self.commands);
            self.close_locked()
        };
        if let Some(settlement) = settlement {
            settlement.settle();
        }
    }

    fn close_locked(&self) -> Option<Settlement> {
        let settlement = lock(&self.shared.machine).begin_close();
        self.reap_worker();
        lock(&self.shared.machine).finish_close();
        settlement
    }

    pub fn dispose(&self) {
        self.pause();
    }

    /// A render target became available. Opens when closed, otherwise
    /// rebinds the current lifecycle to it.
    pub fn on_target_available(&self, target: Arc<dyn RenderTarget>) -> Result<(), ControllerError> {
        let _command = lock(&self.commands);
        if self.phase() == SessionPhase::Closed {
            return self.open_locked(target);
        }
        lock(&self.shared.machine).retarget(target);
        Ok(())
    }

    pub fn on_target_destroyed(&self) {
        log::debug!("render target destroyed, pausing");
        self.pause();
    }
}

impl Drop for CameraController {
    fn drop(&mut self) {
        self.pause();
    }
}
