//! Native runtime for a [`Host`]: a dedicated thread fed by a channel.
//!
//! Requests are handled strictly one at a time in arrival order.
//! Responses come back on one channel; panics inside the host are caught
//! and reported once each on a separate fault channel, after which the
//! thread keeps serving. A `Terminate` request, or dropping the
//! [`HostThread`], stops it.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::backend::SurfaceBackend;
use crate::error::HostError;
use crate::host::Host;
use crate::protocol::{Request, RequestId, Response};

/// An unexpected failure inside the host, outside normal error handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerFault {
    /// Id of the request being handled when the fault occurred.
    pub id: RequestId,
    /// Panic payload, when it was a string.
    pub message: String,
}

impl From<WorkerFault> for HostError {
    fn from(fault: WorkerFault) -> Self {
        Self::WorkerFault(format!("request {}: {}", fault.id, fault.message))
    }
}

/// Handle to a host running on its own thread.
pub struct HostThread<H> {
    requests: Sender<Request<H>>,
    responses: Receiver<Response<H>>,
    faults: Receiver<WorkerFault>,
    worker: Option<JoinHandle<()>>,
}

impl<H: Send + 'static> HostThread<H> {
    /// Spawn a host thread around `backend`.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be spawned.
    pub fn spawn<B>(backend: B) -> std::io::Result<Self>
    where
        B: SurfaceBackend<Handle = H> + Send + 'static,
    {
        let (request_tx, request_rx) = mpsc::channel::<Request<H>>();
        let (response_tx, response_rx) = mpsc::channel();
        let (fault_tx, fault_rx) = mpsc::channel();

        let worker = thread::Builder::new()
            .name("grainline-host".to_owned())
            .spawn(move || {
                let mut host = Host::new(backend);
                run(&mut host, &request_rx, &response_tx, &fault_tx);
            })?;

        Ok(Self {
            requests: request_tx,
            responses: response_rx,
            faults: fault_rx,
            worker: Some(worker),
        })
    }

    /// Queue a request. Never blocks.
    ///
    /// # Errors
    ///
    /// [`HostError::WorkerFault`] if the thread has exited.
    pub fn send(&self, request: Request<H>) -> Result<(), HostError> {
        self.requests
            .send(request)
            .map_err(|_| exited())
    }

    /// Next response, if one is ready.
    ///
    /// # Errors
    ///
    /// [`HostError::WorkerFault`] if the thread has exited and no
    /// responses remain.
    pub fn try_recv(&self) -> Result<Option<Response<H>>, HostError> {
        match self.responses.try_recv() {
            Ok(response) => Ok(Some(response)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(exited()),
        }
    }

    /// Wait up to `timeout` for the next response.
    ///
    /// # Errors
    ///
    /// [`HostError::WorkerFault`] if the thread has exited and no
    /// responses remain.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<Response<H>>, HostError> {
        match self.responses.recv_timeout(timeout) {
            Ok(response) => Ok(Some(response)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(exited()),
        }
    }

    /// Take the oldest unreported fault. Each fault is returned once.
    #[must_use]
    pub fn take_fault(&self) -> Option<WorkerFault> {
        self.faults.try_recv().ok()
    }

    /// Send `Terminate` and wait for the thread to finish.
    pub fn terminate(mut self, id: RequestId) {
        // The thread may already be gone; joining below covers both.
        let _ = self.requests.send(Request::Terminate { id });
        self.join();
    }

    fn join(&mut self) {
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            tracing::warn!("host thread panicked outside request handling");
        }
    }
}

impl<H> Drop for HostThread<H> {
    fn drop(&mut self) {
        // Closing the request channel ends the loop; the thread is
        // detached rather than joined so drop never blocks on a long run.
        self.worker.take();
    }
}

fn exited() -> HostError {
    HostError::WorkerFault("host thread exited".to_owned())
}

/// Serve requests until `Terminate` or until every sender is dropped.
fn run<B: SurfaceBackend>(
    host: &mut Host<B>,
    requests: &Receiver<Request<B::Handle>>,
    responses: &Sender<Response<B::Handle>>,
    faults: &Sender<WorkerFault>,
) {
    while let Ok(request) = requests.recv() {
        let id = request.id();
        let terminate = matches!(request, Request::Terminate { .. });

        match panic::catch_unwind(AssertUnwindSafe(|| host.handle(request))) {
            Ok(Some(response)) => {
                if responses.send(response).is_err() {
                    tracing::debug!(id, "caller dropped response channel");
                    break;
                }
            }
            Ok(None) => {}
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::warn!(id, %message, "host panicked while handling request");
                let _ = faults.send(WorkerFault { id, message });
            }
        }

        if terminate {
            tracing::debug!(id, "host thread terminating");
            break;
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use grainline_pipeline::PixelSurface;

    use super::*;
    use crate::backend::RasterBackend;
    use crate::protocol::{Capability, Output};

    const WAIT: Duration = Duration::from_secs(10);

    /// Backend whose first probe panics.
    #[derive(Default)]
    struct FlakyBackend {
        probed: bool,
    }

    impl SurfaceBackend for FlakyBackend {
        type Handle = ();

        fn probe(&mut self) -> Capability {
            if !self.probed {
                self.probed = true;
                panic!("probe exploded");
            }
            Capability::RawPixels
        }

        fn read_pixels(&mut self, (): ()) -> Result<PixelSurface, HostError> {
            Err(HostError::NoImageData)
        }

        fn make_handle(&mut self, _surface: PixelSurface) -> Result<(), HostError> {
            Ok(())
        }
    }

    #[test]
    fn responses_arrive_in_request_order() {
        let host = HostThread::spawn(RasterBackend).unwrap();
        host.send(Request::Init { id: 1 }).unwrap();
        let surface = PixelSurface::filled(2, 2, [0, 0, 0, 255]).unwrap();
        host.send(Request::process_surface(2, surface, None)).unwrap();

        let first = host.recv_timeout(WAIT).unwrap().unwrap();
        assert!(matches!(first, Response::Ready { id: 1, .. }));
        let second = host.recv_timeout(WAIT).unwrap().unwrap();
        assert!(
            matches!(
                second,
                Response::ProcessComplete {
                    id: 2,
                    width: 2,
                    height: 2,
                    output: Output::Pixels(_),
                }
            ),
            "unexpected {second:?}"
        );
        host.terminate(3);
    }

    #[test]
    fn panic_is_reported_once_and_thread_survives() {
        let host = HostThread::spawn(FlakyBackend::default()).unwrap();
        host.send(Request::Init { id: 1 }).unwrap();
        host.send(Request::Init { id: 2 }).unwrap();

        // The panicking request gets no response; the next one does.
        let response = host.recv_timeout(WAIT).unwrap().unwrap();
        assert!(matches!(response, Response::Ready { id: 2, .. }));

        let fault = host.take_fault().unwrap();
        assert_eq!(fault.id, 1);
        assert_eq!(fault.message, "probe exploded");
        assert!(host.take_fault().is_none());

        let err = HostError::from(fault);
        assert_eq!(err.to_string(), "worker fault: request 1: probe exploded");
        host.terminate(3);
    }

    #[test]
    fn terminate_stops_the_thread() {
        let host = HostThread::spawn(RasterBackend).unwrap();
        host.send(Request::Terminate { id: 1 }).unwrap();
        // The loop exits and drops its response sender.
        let result = host.recv_timeout(WAIT);
        assert!(matches!(result, Err(HostError::WorkerFault(_))));
        let err = host.send(Request::Init { id: 2 }).unwrap_err();
        assert!(matches!(err, HostError::WorkerFault(_)));
    }

    #[test]
    fn panic_message_handles_payload_types() {
        let s: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(s.as_ref()), "static");
        let s: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(s.as_ref()), "owned");
        let s: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(s.as_ref()), "unknown panic");
    }
}
