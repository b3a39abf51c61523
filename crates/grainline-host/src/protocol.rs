//! Messages exchanged between a caller and the execution host.
//!
//! Every request carries a caller-assigned id that its response echoes.
//! `H` is the backend's opaque image handle type (an `ImageBitmap` in the
//! browser worker; uninhabited on the native raster backend).
//!
//! | request | response |
//! |---|---|
//! | `Init` | `Ready` with the backend capability |
//! | `UpdateSettings` | `SettingsAck` |
//! | `Process` | `ProcessComplete` or `Error` |
//! | `Terminate` | none; the host stops |

use grainline_pipeline::{Dimensions, PixelSurface, ProcessingSettings};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, HostError};

/// Caller-assigned request id. Monotonically increasing per caller.
pub type RequestId = u64;

/// How the host can exchange images with its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Capability {
    /// Only raw RGBA buffers.
    #[default]
    RawPixels,
    /// Backend image handles, read and written through a drawing surface.
    Handle,
}

impl Capability {
    /// Whether results are returned as handles.
    #[must_use]
    pub const fn supports_handles(self) -> bool {
        matches!(self, Self::Handle)
    }
}

/// Image data attached to a process request.
#[derive(Debug)]
pub enum Payload<H> {
    /// Raw RGBA bytes, `width * height * 4` long.
    Pixels(Vec<u8>),
    /// A backend image handle.
    Handle(H),
    /// Nothing attached.
    Empty,
}

/// Body of a `Process` request.
#[derive(Debug)]
pub struct ProcessRequest<H> {
    /// Width of the attached image.
    pub width: u32,
    /// Height of the attached image.
    pub height: u32,
    /// Settings for this run; falls back to the stored snapshot.
    pub settings: Option<ProcessingSettings>,
    /// The image. Ownership moves into the host.
    pub payload: Payload<H>,
}

impl<H> ProcessRequest<H> {
    /// Request processing of a surface, moving its buffer.
    #[must_use]
    pub fn from_surface(surface: PixelSurface, settings: Option<ProcessingSettings>) -> Self {
        let Dimensions { width, height } = surface.dimensions();
        Self {
            width,
            height,
            settings,
            payload: Payload::Pixels(surface.into_raw()),
        }
    }

    /// Request processing of a backend handle.
    #[must_use]
    pub const fn from_handle(
        handle: H,
        width: u32,
        height: u32,
        settings: Option<ProcessingSettings>,
    ) -> Self {
        Self {
            width,
            height,
            settings,
            payload: Payload::Handle(handle),
        }
    }
}

/// Messages to the host.
#[derive(Debug)]
pub enum Request<H> {
    /// Probe the backend and report its capability.
    Init {
        /// Request id.
        id: RequestId,
    },
    /// Replace the stored settings snapshot. Does not trigger processing.
    UpdateSettings {
        /// Request id.
        id: RequestId,
        /// The new snapshot.
        settings: ProcessingSettings,
    },
    /// Run the pipeline on an image.
    Process {
        /// Request id.
        id: RequestId,
        /// Image and optional settings.
        request: ProcessRequest<H>,
    },
    /// Stop the host. Later requests are answered with a fault.
    Terminate {
        /// Request id.
        id: RequestId,
    },
}

impl<H> Request<H> {
    /// A `Process` request carrying a surface's raw pixels.
    #[must_use]
    pub fn process_surface(
        id: RequestId,
        surface: PixelSurface,
        settings: Option<ProcessingSettings>,
    ) -> Self {
        Self::Process {
            id,
            request: ProcessRequest::from_surface(surface, settings),
        }
    }

    /// The request id.
    #[must_use]
    pub const fn id(&self) -> RequestId {
        match self {
            Self::Init { id }
            | Self::UpdateSettings { id, .. }
            | Self::Process { id, .. }
            | Self::Terminate { id } => *id,
        }
    }

    /// Protocol name, for logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Init { .. } => "INIT",
            Self::UpdateSettings { .. } => "UPDATE_SETTINGS",
            Self::Process { .. } => "PROCESS",
            Self::Terminate { .. } => "TERMINATE",
        }
    }
}

/// A processed image as returned to the caller.
#[derive(Debug)]
pub enum Output<H> {
    /// Raw RGBA surface.
    Pixels(PixelSurface),
    /// Backend image handle.
    Handle(H),
}

/// Messages from the host.
#[derive(Debug)]
pub enum Response<H> {
    /// Answer to `Init`.
    Ready {
        /// Echoed request id.
        id: RequestId,
        /// What the backend supports.
        capability: Capability,
    },
    /// Answer to `UpdateSettings`.
    SettingsAck {
        /// Echoed request id.
        id: RequestId,
    },
    /// Successful answer to `Process`.
    ProcessComplete {
        /// Echoed request id.
        id: RequestId,
        /// Output width.
        width: u32,
        /// Output height.
        height: u32,
        /// The result, as a handle when the backend supports them.
        output: Output<H>,
    },
    /// Failure of any request.
    Error {
        /// Echoed request id.
        id: RequestId,
        /// Error category.
        kind: ErrorKind,
        /// Human-readable description.
        message: String,
    },
}

impl<H> Response<H> {
    /// Build an `Error` response from a host error.
    #[must_use]
    pub fn error(id: RequestId, err: &HostError) -> Self {
        Self::Error {
            id,
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// The echoed request id.
    #[must_use]
    pub const fn id(&self) -> RequestId {
        match self {
            Self::Ready { id, .. }
            | Self::SettingsAck { id }
            | Self::ProcessComplete { id, .. }
            | Self::Error { id, .. } => *id,
        }
    }

    /// Protocol name, for logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "READY",
            Self::SettingsAck { .. } => "SETTINGS_ACK",
            Self::ProcessComplete { .. } => "PROCESS_COMPLETE",
            Self::Error { .. } => "ERROR",
        }
    }
}
