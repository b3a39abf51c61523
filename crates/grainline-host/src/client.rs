//! Caller side of the protocol: id allocation and stale-result discard.
//!
//! The host never cancels work, so a burst of settings changes leaves
//! several `Process` requests in flight. Only the most recently issued
//! one may publish: [`LatestRequest`] remembers it and rejects results
//! for anything older, whatever order they arrive in.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use grainline_pipeline::{PixelSurface, ProcessingSettings};

use crate::backend::SurfaceBackend;
use crate::error::HostError;
use crate::protocol::{ProcessRequest, Request, RequestId, Response};
use crate::thread::HostThread;

/// Issues request ids and decides which responses are still wanted.
#[derive(Debug, Default)]
pub struct LatestRequest {
    last_id: RequestId,
    latest_process: Option<RequestId>,
    process_ids: HashSet<RequestId>,
}

impl LatestRequest {
    /// A guard whose first id will be 1.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an id for a non-process request.
    pub const fn next_id(&mut self) -> RequestId {
        self.last_id += 1;
        self.last_id
    }

    /// Allocate an id for a `Process` request and make it the latest.
    pub fn next_process_id(&mut self) -> RequestId {
        let id = self.next_id();
        self.latest_process = Some(id);
        self.process_ids.insert(id);
        id
    }

    /// The most recently issued process id.
    #[must_use]
    pub const fn latest(&self) -> Option<RequestId> {
        self.latest_process
    }

    /// Stop tracking `id`, whose response will never arrive (its handler
    /// panicked and was reported as a fault instead).
    pub fn forget(&mut self, id: RequestId) {
        self.process_ids.remove(&id);
    }

    /// Whether `response` should be published. Results of superseded
    /// process requests are rejected; everything else passes.
    pub fn accept<H>(&mut self, response: &Response<H>) -> bool {
        let id = response.id();
        if !self.process_ids.remove(&id) {
            return true;
        }
        let current = self.latest_process == Some(id);
        if !current {
            tracing::debug!(id, latest = ?self.latest_process, "discarding stale result");
        }
        current
    }
}

/// A [`HostThread`] paired with a [`LatestRequest`] guard.
pub struct HostClient<H> {
    host: HostThread<H>,
    guard: LatestRequest,
}

impl<H: Send + 'static> HostClient<H> {
    /// Spawn a host thread around `backend`.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be spawned.
    pub fn spawn<B>(backend: B) -> std::io::Result<Self>
    where
        B: SurfaceBackend<Handle = H> + Send + 'static,
    {
        Ok(Self {
            host: HostThread::spawn(backend)?,
            guard: LatestRequest::new(),
        })
    }

    /// The id guard.
    #[must_use]
    pub const fn guard(&self) -> &LatestRequest {
        &self.guard
    }

    /// Send `Init`.
    ///
    /// # Errors
    ///
    /// [`HostError::WorkerFault`] if the host thread has exited.
    pub fn init(&mut self) -> Result<RequestId, HostError> {
        let id = self.guard.next_id();
        self.host.send(Request::Init { id })?;
        Ok(id)
    }

    /// Send `UpdateSettings`.
    ///
    /// # Errors
    ///
    /// [`HostError::WorkerFault`] if the host thread has exited.
    pub fn update_settings(&mut self, settings: ProcessingSettings) -> Result<RequestId, HostError> {
        let id = self.guard.next_id();
        self.host.send(Request::UpdateSettings { id, settings })?;
        Ok(id)
    }

    /// Send `Process`, superseding any earlier process request.
    ///
    /// # Errors
    ///
    /// [`HostError::WorkerFault`] if the host thread has exited.
    pub fn process(&mut self, request: ProcessRequest<H>) -> Result<RequestId, HostError> {
        let id = self.guard.next_process_id();
        self.host.send(Request::Process { id, request })?;
        Ok(id)
    }

    /// Send `Process` for a surface, moving its buffer.
    ///
    /// # Errors
    ///
    /// [`HostError::WorkerFault`] if the host thread has exited.
    pub fn process_surface(
        &mut self,
        surface: PixelSurface,
        settings: Option<ProcessingSettings>,
    ) -> Result<RequestId, HostError> {
        self.process(ProcessRequest::from_surface(surface, settings))
    }

    /// Next publishable response, without blocking. Stale results are
    /// dropped on the way.
    ///
    /// # Errors
    ///
    /// A pending [`WorkerFault`](crate::WorkerFault) as
    /// [`HostError::WorkerFault`], or the same if the thread has exited.
    pub fn try_recv(&mut self) -> Result<Option<Response<H>>, HostError> {
        self.check_fault()?;
        while let Some(response) = self.host.try_recv()? {
            if self.guard.accept(&response) {
                return Ok(Some(response));
            }
        }
        Ok(None)
    }

    /// Wait up to `timeout` for the next publishable response.
    ///
    /// # Errors
    ///
    /// See [`try_recv`](Self::try_recv).
    pub fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Response<H>>, HostError> {
        let deadline = Instant::now() + timeout;
        loop {
            self.check_fault()?;
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.host.recv_timeout(remaining)? {
                Some(response) if self.guard.accept(&response) => return Ok(Some(response)),
                Some(_) => {}
                None => return self.check_fault().map(|()| None),
            }
        }
    }

    /// Terminate the host and wait for its thread.
    pub fn terminate(mut self) {
        let id = self.guard.next_id();
        self.host.terminate(id);
    }

    fn check_fault(&mut self) -> Result<(), HostError> {
        match self.host.take_fault() {
            Some(fault) => {
                self.guard.forget(fault.id);
                Err(fault.into())
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::convert::Infallible;

    use super::*;
    use crate::error::ErrorKind;
    use crate::protocol::Capability;

    const WAIT: Duration = Duration::from_secs(10);

    /// Handle backend whose first output panics.
    #[derive(Default)]
    struct PanicOnceBackend {
        panicked: bool,
    }

    impl SurfaceBackend for PanicOnceBackend {
        type Handle = ();

        fn probe(&mut self) -> Capability {
            Capability::Handle
        }

        fn read_pixels(&mut self, (): ()) -> Result<PixelSurface, HostError> {
            Err(HostError::NoImageData)
        }

        fn make_handle(&mut self, _surface: PixelSurface) -> Result<(), HostError> {
            if !self.panicked {
                self.panicked = true;
                panic!("output exploded");
            }
            Ok(())
        }
    }

    fn complete(id: RequestId) -> Response<Infallible> {
        Response::ProcessComplete {
            id,
            width: 1,
            height: 1,
            output: crate::protocol::Output::Pixels(
                PixelSurface::filled(1, 1, [0, 0, 0, 255]).unwrap(),
            ),
        }
    }

    #[test]
    fn ids_increase_across_message_kinds() {
        let mut guard = LatestRequest::new();
        assert_eq!(guard.next_id(), 1);
        assert_eq!(guard.next_process_id(), 2);
        assert_eq!(guard.next_id(), 3);
        assert_eq!(guard.latest(), Some(2));
    }

    #[test]
    fn superseded_result_is_discarded_in_any_order() {
        let mut guard = LatestRequest {
            last_id: 4,
            ..LatestRequest::default()
        };
        assert_eq!(guard.next_process_id(), 5);
        assert_eq!(guard.next_process_id(), 6);

        // 6 arrives first, then the late 5.
        assert!(guard.accept(&complete(6)));
        assert!(!guard.accept(&complete(5)));

        let mut guard = LatestRequest {
            last_id: 4,
            ..LatestRequest::default()
        };
        guard.next_process_id();
        guard.next_process_id();
        // 5 first, then 6.
        assert!(!guard.accept(&complete(5)));
        assert!(guard.accept(&complete(6)));
    }

    #[test]
    fn stale_errors_are_discarded_too() {
        let mut guard = LatestRequest::new();
        let old = guard.next_process_id();
        guard.next_process_id();
        let error = Response::<Infallible>::Error {
            id: old,
            kind: ErrorKind::DecodeFailed,
            message: String::new(),
        };
        assert!(!guard.accept(&error));
    }

    #[test]
    fn acknowledgements_always_pass() {
        let mut guard = LatestRequest::new();
        let init = guard.next_id();
        guard.next_process_id();
        let ready = Response::<Infallible>::Ready {
            id: init,
            capability: Capability::RawPixels,
        };
        assert!(guard.accept(&ready));
    }

    #[test]
    fn forgotten_ids_are_no_longer_tracked() {
        let mut guard = LatestRequest::new();
        let lost = guard.next_process_id();
        let current = guard.next_process_id();
        guard.forget(lost);
        assert!(guard.accept(&complete(current)));
        assert!(guard.process_ids.is_empty());
    }

    #[test]
    fn faulted_process_id_is_released() {
        let mut client = HostClient::spawn(PanicOnceBackend::default()).unwrap();
        let surface = || PixelSurface::filled(2, 2, [0, 0, 0, 255]).unwrap();
        client.process_surface(surface(), None).unwrap();
        let second = client.process_surface(surface(), None).unwrap();

        // The fault and the second result may surface in either order.
        let mut faulted = false;
        let mut completed = None;
        for _ in 0..2 {
            match client.recv_timeout(WAIT) {
                Err(HostError::WorkerFault(message)) => {
                    assert!(message.contains("output exploded"), "{message}");
                    faulted = true;
                }
                Ok(Some(response)) => completed = Some(response.id()),
                other => panic!("unexpected {other:?}"),
            }
        }
        assert!(faulted);
        assert_eq!(completed, Some(second));
        assert!(client.guard().process_ids.is_empty());
        client.terminate();
    }
}
