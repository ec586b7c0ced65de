//! Still capture: exactly one reply per request, whatever happens.

mod common;

use camgent::request::OutputTarget;
use camgent::testing::{CaptureMode, VirtualBehavior};
use camgent::{caller_loop, CameraController, CaptureResult, ControllerError, SessionPhase};
use common::{rig, rig_with_rotation, streaming, target, wait_for_phase, WAIT};
use std::sync::{Arc, Mutex};

fn held() -> VirtualBehavior {
    VirtualBehavior {
        capture_mode: CaptureMode::Hold,
        ..Default::default()
    }
}

fn counted_capture(controller: &CameraController) -> Arc<Mutex<Vec<CaptureResult>>> {
    let replies = Arc::new(Mutex::new(Vec::new()));
    let sink = replies.clone();
    controller.capture_with(move |result| sink.lock().unwrap().push(result));
    replies
}

#[test]
fn test_capture_saves_frame() {
    let rig = streaming(VirtualBehavior::default());
    let location = rig.controller.capture().wait().unwrap();
    assert_eq!(location, "memory://capture/1");

    let saved = rig.storage.saved();
    assert_eq!(saved.len(), 1);
    assert!(image::load_from_memory(&saved[0]).is_ok());
    assert!(!rig.controller.capture_in_flight());
}

#[test]
fn test_sequential_captures() {
    let rig = streaming(VirtualBehavior::default());
    for n in 1..=3 {
        let location = rig.controller.capture().wait().unwrap();
        assert_eq!(location, format!("memory://capture/{}", n));
    }
    assert_eq!(rig.backend.captures().len(), 3);
}

#[test]
fn test_still_request_shape() {
    let rig = rig_with_rotation(VirtualBehavior::default(), 90);
    rig.controller.open(target()).unwrap();
    assert!(wait_for_phase(&rig.controller, SessionPhase::Streaming));

    rig.controller.set_zoom(2.0);
    rig.controller.set_exposure_compensation(3.0);
    rig.controller.capture().wait().unwrap();

    let still = rig.backend.captures().pop().unwrap();
    assert_eq!(still.targets(), &[OutputTarget::StillSink]);
    assert_eq!(still.jpeg_orientation(), Some(180));
    assert_eq!(
        still.params().crop_region,
        Some(camgent::Rect::new(1000, 750, 3000, 2250))
    );
    assert_eq!(still.params().ae_compensation, None);
}

#[test]
fn test_capture_not_ready_when_closed() {
    let rig = rig(VirtualBehavior::default());
    let mut ticket = rig.controller.capture();
    assert_eq!(ticket.try_result(), Some(Err(ControllerError::NotReady)));
}

#[test]
fn test_second_capture_is_busy() {
    let rig = streaming(held());
    let first = rig.controller.capture();
    assert!(rig.controller.capture_in_flight());

    let second = counted_capture(&rig.controller);
    assert_eq!(*second.lock().unwrap(), vec![Err(ControllerError::Busy)]);

    assert!(rig.backend.deliver_held_frame());
    assert_eq!(first.wait().unwrap(), "memory://capture/1");
    assert_eq!(rig.backend.captures().len(), 1);
}

#[test]
fn test_pause_mid_capture_replies_once() {
    let rig = streaming(held());
    let replies = counted_capture(&rig.controller);

    rig.controller.pause();
    assert!(!rig.backend.deliver_held_frame());
    rig.controller.dispose();

    let replies = replies.lock().unwrap();
    assert_eq!(replies.len(), 1);
    assert!(matches!(replies[0], Err(ControllerError::CaptureError(_))));
    assert_eq!(rig.storage.saved_count(), 0);
}

#[test]
fn test_disconnect_mid_capture() {
    let rig = streaming(held());
    let ticket = rig.controller.capture();
    rig.backend.disconnect();

    let err = ticket.wait().unwrap_err();
    assert_eq!(err, ControllerError::CaptureError("camera disconnected".into()));
    assert!(wait_for_phase(&rig.controller, SessionPhase::Closed));
}

#[test]
fn test_capture_issue_failure() {
    let rig = streaming(VirtualBehavior {
        capture_mode: CaptureMode::Fail,
        ..Default::default()
    });
    let err = rig.controller.capture().wait().unwrap_err();
    assert_eq!(err.code(), "CAPTURE_ERR");
    assert!(!rig.controller.capture_in_flight());
    assert!(!rig.backend.sink().unwrap().has_listener());

    // the gate is open again
    rig.backend.update_behavior(|b| b.capture_mode = CaptureMode::Deliver);
    assert!(rig.controller.capture().wait().is_ok());
}

#[test]
fn test_capture_without_image() {
    let rig = streaming(VirtualBehavior {
        capture_mode: CaptureMode::Empty,
        ..Default::default()
    });
    let err = rig.controller.capture().wait().unwrap_err();
    assert_eq!(err, ControllerError::NoImage);
    assert_eq!(err.code(), "NO_IMAGE");
}

#[test]
fn test_storage_failure() {
    let rig = streaming(VirtualBehavior::default());
    rig.storage.set_failing(true);
    let err = rig.controller.capture().wait().unwrap_err();
    assert_eq!(err.code(), "CAPTURE_ERR");

    rig.storage.set_failing(false);
    assert!(rig.controller.capture().wait().is_ok());
}

#[test]
fn test_stray_frame_does_not_reply() {
    let rig = streaming(VirtualBehavior::default());
    assert!(rig.backend.inject_frame());
    assert!(!rig.controller.capture_in_flight());

    let location = rig.controller.capture().wait().unwrap();
    assert_eq!(location, "memory://capture/1");
    assert_eq!(rig.storage.saved_count(), 1);
}

#[test]
fn test_replies_marshalled_to_caller_loop() {
    let (caller, queue) = caller_loop();
    let backend = camgent::testing::VirtualBackend::new(vec![
        camgent::testing::VirtualDeviceSpec::rear("0"),
    ]);
    let storage = Arc::new(camgent::testing::RecordingStorage::new());
    let controller = CameraController::builder(Arc::new(backend))
        .storage(storage)
        .caller(caller)
        .build()
        .unwrap();
    controller.open(target()).unwrap();
    assert!(wait_for_phase(&controller, SessionPhase::Streaming));

    let replies = counted_capture(&controller);
    assert!(queue.run_next(WAIT));
    assert_eq!(
        *replies.lock().unwrap(),
        vec![Ok("memory://capture/1".to_string())]
    );
    assert_eq!(queue.run_pending(), 0);
}

#[test]
fn test_ticket_is_a_future() {
    let rig = streaming(VirtualBehavior::default());
    let location = tokio_test::block_on(rig.controller.capture()).unwrap();
    assert_eq!(location, "memory://capture/1");

    let location = futures::executor::block_on(rig.controller.capture()).unwrap();
    assert_eq!(location, "memory://capture/2");
}

#[test]
fn test_held_ticket_stays_pending() {
    use futures::FutureExt;

    let rig = streaming(held());
    let mut ticket = rig.controller.capture();
    assert!((&mut ticket).now_or_never().is_none());
    assert_eq!(ticket.try_result(), None);

    assert!(rig.backend.deliver_held_frame());
    assert_eq!(ticket.wait().unwrap(), "memory://capture/1");
}
