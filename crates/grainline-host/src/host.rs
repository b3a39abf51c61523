//! The execution host state machine.
//!
//! `Uninitialized -> Ready -> Terminated`. A [`Host`] handles one request
//! at a time and never processes anything on its own initiative: settings
//! updates are stored, not applied, until the next `Process` request.

use grainline_pipeline::{PixelSurface, ProcessingSettings};

use crate::backend::SurfaceBackend;
use crate::error::HostError;
use crate::protocol::{Capability, Output, Payload, ProcessRequest, Request, Response};

/// Lifecycle state of a [`Host`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    /// No capability probe has run yet.
    Uninitialized,
    /// Probed and accepting work.
    Ready(Capability),
    /// Stopped; every request is answered with a fault.
    Terminated,
}

/// Handles protocol requests against a surface backend.
#[derive(Debug)]
pub struct Host<B> {
    backend: B,
    state: HostState,
    settings: Option<ProcessingSettings>,
}

impl<B: SurfaceBackend> Host<B> {
    /// Create an uninitialized host.
    pub const fn new(backend: B) -> Self {
        Self {
            backend,
            state: HostState::Uninitialized,
            settings: None,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> HostState {
        self.state
    }

    /// The stored settings snapshot, if any.
    #[must_use]
    pub const fn settings(&self) -> Option<&ProcessingSettings> {
        self.settings.as_ref()
    }

    /// Handle one request. `Terminate` produces no response.
    pub fn handle(&mut self, request: Request<B::Handle>) -> Option<Response<B::Handle>> {
        let id = request.id();
        tracing::debug!(id, message = request.name(), state = ?self.state, "host received request");

        if self.state == HostState::Terminated {
            return Some(Response::error(
                id,
                &HostError::WorkerFault("host terminated".to_owned()),
            ));
        }

        let response = match request {
            Request::Init { id } => Response::Ready {
                id,
                capability: self.probe(),
            },
            Request::UpdateSettings { id, settings } => {
                self.settings = Some(settings);
                Response::SettingsAck { id }
            }
            Request::Process { id, request } => match self.process(request) {
                Ok((width, height, output)) => Response::ProcessComplete {
                    id,
                    width,
                    height,
                    output,
                },
                Err(err) => {
                    tracing::debug!(id, kind = %err.kind(), %err, "process request failed");
                    Response::error(id, &err)
                }
            },
            Request::Terminate { .. } => {
                self.state = HostState::Terminated;
                return None;
            }
        };
        tracing::trace!(id, message = response.name(), "host responding");
        Some(response)
    }

    fn probe(&mut self) -> Capability {
        let capability = self.backend.probe();
        self.state = HostState::Ready(capability);
        capability
    }

    fn capability(&mut self) -> Capability {
        match self.state {
            HostState::Ready(capability) => capability,
            HostState::Uninitialized | HostState::Terminated => self.probe(),
        }
    }

    fn process(
        &mut self,
        request: ProcessRequest<B::Handle>,
    ) -> Result<(u32, u32, Output<B::Handle>), HostError> {
        let capability = self.capability();

        let ProcessRequest {
            width,
            height,
            settings,
            payload,
        } = request;
        let settings = settings
            .or_else(|| self.settings.clone())
            .unwrap_or_default();

        let surface = match payload {
            Payload::Pixels(bytes) => PixelSurface::from_raw(width, height, bytes)?,
            // A raw-pixel host has no handles to read from.
            Payload::Handle(_) if !capability.supports_handles() => {
                return Err(HostError::NoImageData);
            }
            Payload::Handle(handle) => self.backend.read_pixels(handle)?,
            Payload::Empty => return Err(HostError::NoImageData),
        };

        let processed = grainline_pipeline::process(surface, &settings)?;
        let (width, height) = (processed.width(), processed.height());

        let output = if capability.supports_handles() {
            Output::Handle(self.backend.make_handle(processed)?)
        } else {
            Output::Pixels(processed)
        };
        Ok((width, height, output))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use grainline_pipeline::{ColorDepth, ColorMode, DitherAlgorithm};

    use super::*;
    use crate::backend::RasterBackend;
    use crate::error::ErrorKind;

    /// Handle backend that stores surfaces in a slot table.
    #[derive(Default)]
    struct SlotBackend {
        slots: Vec<Option<PixelSurface>>,
        has_canvas: bool,
        raw_only: bool,
        probes: usize,
        reads: usize,
    }

    impl SurfaceBackend for SlotBackend {
        type Handle = usize;

        fn probe(&mut self) -> Capability {
            self.probes += 1;
            if self.raw_only {
                Capability::RawPixels
            } else {
                Capability::Handle
            }
        }

        fn read_pixels(&mut self, handle: usize) -> Result<PixelSurface, HostError> {
            self.reads += 1;
            if !self.has_canvas {
                return Err(HostError::CanvasUnavailable("no context".into()));
            }
            self.slots
                .get_mut(handle)
                .and_then(Option::take)
                .ok_or(HostError::NoImageData)
        }

        fn make_handle(&mut self, surface: PixelSurface) -> Result<usize, HostError> {
            self.slots.push(Some(surface));
            Ok(self.slots.len() - 1)
        }
    }

    fn binary_gray() -> ProcessingSettings {
        ProcessingSettings {
            algorithm: DitherAlgorithm::None,
            color_depth: ColorDepth::Levels(2),
            color_mode: ColorMode::Grayscale,
            ..ProcessingSettings::default()
        }
    }

    fn gray(value: u8) -> PixelSurface {
        PixelSurface::filled(4, 3, [value, value, value, 255]).unwrap()
    }

    fn first_pixel<H>(response: Option<Response<H>>) -> [u8; 4] {
        match response {
            Some(Response::ProcessComplete {
                output: Output::Pixels(surface),
                ..
            }) => surface.pixel(0, 0).unwrap(),
            _ => panic!("expected pixel output"),
        }
    }

    #[test]
    fn init_reports_capability() {
        let mut host = Host::new(RasterBackend);
        assert_eq!(host.state(), HostState::Uninitialized);
        let response = host.handle(Request::Init { id: 1 });
        assert!(matches!(
            response,
            Some(Response::Ready {
                id: 1,
                capability: Capability::RawPixels
            })
        ));
        assert_eq!(host.state(), HostState::Ready(Capability::RawPixels));
    }

    #[test]
    fn update_settings_stores_without_processing() {
        let mut host = Host::new(RasterBackend);
        let response = host.handle(Request::UpdateSettings {
            id: 2,
            settings: binary_gray(),
        });
        assert!(matches!(response, Some(Response::SettingsAck { id: 2 })));
        assert_eq!(host.settings(), Some(&binary_gray()));
    }

    #[test]
    fn process_before_init_probes_implicitly() {
        let mut host = Host::new(SlotBackend::default());
        let response = host.handle(Request::process_surface(1, gray(10), None));
        assert!(matches!(
            response,
            Some(Response::ProcessComplete {
                output: Output::Handle(0),
                ..
            })
        ));
        assert_eq!(host.state(), HostState::Ready(Capability::Handle));
        assert_eq!(host.backend.probes, 1);
    }

    #[test]
    fn payload_settings_win_over_stored() {
        let mut host = Host::new(RasterBackend);
        host.handle(Request::UpdateSettings {
            id: 1,
            settings: binary_gray(),
        });
        // Stored settings threshold 200 to white.
        assert_eq!(
            first_pixel(host.handle(Request::process_surface(2, gray(200), None))),
            [255, 255, 255, 255]
        );
        // Payload settings darken first, so the same input goes black.
        let darker = ProcessingSettings {
            brightness: -150,
            ..binary_gray()
        };
        assert_eq!(
            first_pixel(host.handle(Request::process_surface(3, gray(200), Some(darker)))),
            [0, 0, 0, 255]
        );
    }

    #[test]
    fn default_settings_apply_without_any_snapshot() {
        let mut host = Host::new(RasterBackend);
        let response = host.handle(Request::process_surface(1, gray(0), None));
        // Black stays black at any level count.
        assert_eq!(first_pixel(response), [0, 0, 0, 255]);
    }

    #[test]
    fn handle_payload_is_read_through_backend() {
        let mut backend = SlotBackend {
            has_canvas: true,
            ..SlotBackend::default()
        };
        backend.slots.push(Some(gray(200)));
        let mut host = Host::new(backend);
        host.handle(Request::UpdateSettings {
            id: 1,
            settings: binary_gray(),
        });
        let response = host.handle(Request::Process {
            id: 2,
            request: ProcessRequest::from_handle(0, 4, 3, None),
        });
        let Some(Response::ProcessComplete {
            width: 4,
            height: 3,
            output: Output::Handle(slot),
            ..
        }) = response
        else {
            panic!("expected handle output");
        };
        let stored = host.backend.slots[slot].as_ref().unwrap();
        assert_eq!(stored.pixel(3, 2), Some([255, 255, 255, 255]));
    }

    #[test]
    fn handle_without_canvas_fails() {
        let mut host = Host::new(SlotBackend::default());
        let response = host.handle(Request::Process {
            id: 7,
            request: ProcessRequest::from_handle(0, 4, 3, None),
        });
        assert!(matches!(
            response,
            Some(Response::Error {
                id: 7,
                kind: ErrorKind::CanvasUnavailable,
                ..
            })
        ));
    }

    #[test]
    fn handle_payload_on_raw_pixel_host_is_no_image_data() {
        let mut backend = SlotBackend {
            has_canvas: true,
            raw_only: true,
            ..SlotBackend::default()
        };
        backend.slots.push(Some(gray(200)));
        let mut host = Host::new(backend);
        host.handle(Request::Init { id: 1 });
        assert_eq!(host.state(), HostState::Ready(Capability::RawPixels));

        let response = host.handle(Request::Process {
            id: 2,
            request: ProcessRequest::from_handle(0, 4, 3, None),
        });
        assert!(matches!(
            response,
            Some(Response::Error {
                id: 2,
                kind: ErrorKind::NoImageData,
                ..
            })
        ));
        assert_eq!(host.backend.reads, 0);
    }

    #[test]
    fn empty_payload_is_no_image_data() {
        let mut host = Host::new(RasterBackend);
        let response = host.handle(Request::Process {
            id: 3,
            request: ProcessRequest {
                width: 4,
                height: 4,
                settings: None,
                payload: Payload::Empty,
            },
        });
        assert!(matches!(
            response,
            Some(Response::Error {
                kind: ErrorKind::NoImageData,
                ..
            })
        ));
    }

    #[test]
    fn mismatched_buffer_is_invalid_dimensions() {
        let mut host = Host::new(RasterBackend);
        let response = host.handle(Request::Process {
            id: 3,
            request: ProcessRequest {
                width: 4,
                height: 4,
                settings: None,
                payload: Payload::Pixels(vec![0; 10]),
            },
        });
        assert!(matches!(
            response,
            Some(Response::Error {
                kind: ErrorKind::InvalidDimensions,
                ..
            })
        ));
    }

    #[test]
    fn terminated_host_answers_with_fault() {
        let mut host = Host::new(RasterBackend);
        assert!(host.handle(Request::Terminate { id: 1 }).is_none());
        assert_eq!(host.state(), HostState::Terminated);
        let Some(Response::Error { id, kind, message }) = host.handle(Request::Init { id: 2 }) else {
            panic!("expected error");
        };
        assert_eq!(id, 2);
        assert_eq!(kind, ErrorKind::WorkerFault);
        assert_eq!(message, "worker fault: host terminated");
    }
}
