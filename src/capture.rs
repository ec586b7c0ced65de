//! Exactly-once still capture.
//!
//! A capture is admitted only while streaming and while no other capture
//! holds the gate. The admitted request is represented by a
//! [`CaptureToken`]: consuming it is the only way to reply, and dropping it
//! unresolved replies with an error, so every admitted capture gets exactly
//! one reply.

use crate::errors::ControllerError;
use crate::hardware::{CaptureSession, FrameListener, FrameSink, StorageSink};
use crate::request::CaptureRequest;
use crate::worker::CallerContext;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use uuid::Uuid;

pub type CaptureResult = Result<String, ControllerError>;

pub type ReplyFn = Box<dyn FnOnce(CaptureResult) + Send + 'static>;

/// Held from admission until the reply is delivered on the caller context.
#[derive(Clone, Default)]
pub struct CaptureGate(Arc<AtomicBool>);

impl CaptureGate {
    fn try_acquire(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn release(&self) {
        self.0.store(false, Ordering::Release);
    }

    pub fn is_held(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

pub struct CaptureToken {
    id: Uuid,
    reply: Option<ReplyFn>,
    gate: CaptureGate,
    caller: Arc<dyn CallerContext>,
}

impl CaptureToken {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Deliver the reply on the caller context. The gate opens just before
    /// the reply callback runs.
    pub fn resolve(mut self, result: CaptureResult) {
        self.deliver(result);
    }

    fn deliver(&mut self, result: CaptureResult) {
        let Some(reply) = self.reply.take() else {
            return;
        };
        match &result {
            Ok(location) => log::info!("capture {} saved to {}", self.id, location),
            Err(e) => log::error!("capture {} failed: {}", self.id, e),
        }
        let gate = self.gate.clone();
        self.caller.dispatch(Box::new(move || {
            gate.release();
            reply(result);
        }));
    }
}

impl Drop for CaptureToken {
    fn drop(&mut self) {
        if self.reply.is_some() {
            log::warn!("capture {} dropped without a reply", self.id);
            self.deliver(Err(ControllerError::CaptureError(
                "capture abandoned".to_string(),
            )));
        }
    }
}

impl fmt::Debug for CaptureToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureToken").field("id", &self.id).finish()
    }
}

/// A token paired with the result it must be resolved with once the
/// session lock has been released.
#[must_use = "a settlement must be settled or its caller never hears back"]
pub struct Settlement {
    token: CaptureToken,
    result: CaptureResult,
}

impl Settlement {
    pub fn new(token: CaptureToken, result: CaptureResult) -> Self {
        Self { token, result }
    }

    pub fn settle(self) {
        self.token.resolve(self.result);
    }
}

/// A capture that was refused at admission. The reply has not been called.
pub struct Rejected {
    pub reply: ReplyFn,
    pub error: ControllerError,
}

impl Rejected {
    pub fn reply(self) {
        log::debug!("capture rejected: {}", self.error);
        (self.reply)(Err(self.error));
    }
}

/// Capture request issued, waiting for its frame.
pub struct InFlightCapture {
    token: CaptureToken,
    sink: Arc<dyn FrameSink>,
}

impl InFlightCapture {
    pub fn id(&self) -> Uuid {
        self.token.id()
    }

    /// Acquire the newest frame, hand it to storage and reply.
    ///
    /// Runs without the session lock. The listener is detached before the
    /// reply so a follow-up capture started from the reply keeps its own.
    pub fn complete(self, storage: &dyn StorageSink) {
        let InFlightCapture { token, sink } = self;
        let result = {
            let _detach = DetachListener(&*sink);
            acquire_and_save(&*sink, storage)
        };
        token.resolve(result);
    }
}

struct DetachListener<'a>(&'a dyn FrameSink);

impl Drop for DetachListener<'_> {
    fn drop(&mut self) {
        self.0.set_listener(None);
    }
}

fn acquire_and_save(sink: &dyn FrameSink, storage: &dyn StorageSink) -> CaptureResult {
    let frame = sink
        .acquire_latest()
        .map_err(|e| ControllerError::CaptureError(e.to_string()))?
        .ok_or(ControllerError::NoImage)?;
    let encoded = frame.encoded();
    drop(frame);

    storage
        .save(&encoded)
        .map_err(|e| ControllerError::CaptureError(e.to_string()))
}

/// Discard whatever frames are sitting in the sink. Returns how many.
pub fn drain_sink(sink: &dyn FrameSink, limit: usize) -> usize {
    let mut drained = 0;
    while drained < limit {
        match sink.acquire_latest() {
            Ok(Some(frame)) => {
                drop(frame);
                drained += 1;
            }
            Ok(None) => break,
            Err(e) => {
                log::warn!("drain stopped: {}", e);
                break;
            }
        }
    }
    if drained > 0 {
        log::debug!("drained {} stale frame(s)", drained);
    }
    drained
}

/// Admission and in-flight bookkeeping for one controller.
pub struct CaptureProtocol {
    gate: CaptureGate,
    in_flight: Option<InFlightCapture>,
    drain_limit: usize,
}

impl CaptureProtocol {
    pub fn new(drain_limit: usize) -> Self {
        Self {
            gate: CaptureGate::default(),
            in_flight: None,
            drain_limit: drain_limit.max(1),
        }
    }

    pub fn drain_limit(&self) -> usize {
        self.drain_limit
    }

    pub fn in_flight(&self) -> bool {
        self.gate.is_held()
    }

    /// Claim the gate for a new capture, or hand the reply back with `Busy`.
    pub fn admit(
        &self,
        reply: ReplyFn,
        caller: Arc<dyn CallerContext>,
    ) -> Result<CaptureToken, Rejected> {
        if !self.gate.try_acquire() {
            return Err(Rejected {
                reply,
                error: ControllerError::Busy,
            });
        }
        Ok(CaptureToken {
            id: Uuid::new_v4(),
            reply: Some(reply),
            gate: self.gate.clone(),
            caller,
        })
    }

    /// Drain, attach the frame listener, record the capture and issue it.
    pub fn begin(
        &mut self,
        token: CaptureToken,
        session: &mut dyn CaptureSession,
        sink: &Arc<dyn FrameSink>,
        request: &CaptureRequest,
        listener: FrameListener,
    ) -> Option<Settlement> {
        drain_sink(&**sink, self.drain_limit);
        sink.set_listener(None);
        sink.set_listener(Some(listener));

        log::debug!("issuing still capture {}", token.id());
        self.in_flight = Some(InFlightCapture {
            token,
            sink: sink.clone(),
        });

        if let Err(e) = session.capture(request) {
            sink.set_listener(None);
            let flight = self.in_flight.take()?;
            return Some(Settlement::new(
                flight.token,
                Err(ControllerError::CaptureError(e.to_string())),
            ));
        }
        None
    }

    /// Take the in-flight capture if it is the one identified by `id`.
    pub fn take(&mut self, id: Uuid) -> Option<InFlightCapture> {
        match &self.in_flight {
            Some(flight) if flight.id() == id => self.in_flight.take(),
            _ => None,
        }
    }

    /// Cancel the in-flight capture, if any.
    pub fn abort(&mut self, reason: &str) -> Option<Settlement> {
        let flight = self.in_flight.take()?;
        flight.sink.set_listener(None);
        log::info!("aborting capture {}: {}", flight.id(), reason);
        Some(Settlement::new(
            flight.token,
            Err(ControllerError::CaptureError(reason.to_string())),
        ))
    }
}

/// Receiving half of a capture reply.
///
/// Await it, poll it with [`try_result`](Self::try_result), or block on it
/// with [`wait`](Self::wait) from a thread outside any async runtime.
pub struct CaptureTicket {
    receiver: oneshot::Receiver<CaptureResult>,
}

impl CaptureTicket {
    pub fn channel() -> (ReplyFn, CaptureTicket) {
        let (sender, receiver) = oneshot::channel();
        let reply: ReplyFn = Box::new(move |result| {
            let _ = sender.send(result);
        });
        (reply, CaptureTicket { receiver })
    }

    pub fn try_result(&mut self) -> Option<CaptureResult> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(reply_lost())),
        }
    }

    pub fn wait(self) -> CaptureResult {
        self.receiver.blocking_recv().unwrap_or_else(|_| Err(reply_lost()))
    }
}

impl Future for CaptureTicket {
    type Output = CaptureResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(reply_lost())))
    }
}

fn reply_lost() -> ControllerError {
    ControllerError::CaptureError("reply channel closed".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::InlineCaller;
    use std::sync::Mutex;

    fn recording_reply() -> (ReplyFn, Arc<Mutex<Vec<CaptureResult>>>) {
        let replies = Arc::new(Mutex::new(Vec::new()));
        let sink = replies.clone();
        let reply: ReplyFn = Box::new(move |result| sink.lock().unwrap().push(result));
        (reply, replies)
    }

    #[test]
    fn test_second_admission_is_busy() {
        let protocol = CaptureProtocol::new(4);
        let (first, _) = recording_reply();
        let token = protocol.admit(first, Arc::new(InlineCaller)).ok().unwrap();
        assert!(protocol.in_flight());

        let (second, replies) = recording_reply();
        let rejected = protocol.admit(second, Arc::new(InlineCaller)).err().unwrap();
        assert_eq!(rejected.error, ControllerError::Busy);
        rejected.reply();
        assert_eq!(replies.lock().unwrap().len(), 1);
        drop(token);
    }

    #[test]
    fn test_resolve_opens_gate_and_replies_once() {
        let protocol = CaptureProtocol::new(4);
        let (reply, replies) = recording_reply();
        let token = protocol.admit(reply, Arc::new(InlineCaller)).ok().unwrap();
        token.resolve(Ok("memory://1".into()));
        assert!(!protocol.in_flight());
        assert_eq!(*replies.lock().unwrap(), vec![Ok("memory://1".to_string())]);
    }

    #[test]
    fn test_dropped_token_replies_with_error() {
        let protocol = CaptureProtocol::new(4);
        let (reply, replies) = recording_reply();
        let token = protocol.admit(reply, Arc::new(InlineCaller)).ok().unwrap();
        drop(token);
        let replies = replies.lock().unwrap();
        assert_eq!(replies.len(), 1);
        assert!(matches!(replies[0], Err(ControllerError::CaptureError(_))));
        assert!(!protocol.in_flight());
    }

    #[test]
    fn test_ticket_receives_reply() {
        let (reply, mut ticket) = CaptureTicket::channel();
        assert!(ticket.try_result().is_none());
        reply(Err(ControllerError::NoImage));
        assert_eq!(ticket.try_result(), Some(Err(ControllerError::NoImage)));
    }

    #[test]
    fn test_ticket_reports_lost_reply() {
        let (reply, ticket) = CaptureTicket::channel();
        drop(reply);
        assert!(matches!(ticket.wait(), Err(ControllerError::CaptureError(_))));
    }
}
