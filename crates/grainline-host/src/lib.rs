//! grainline-host: runs the processing pipeline away from the caller.
//!
//! The caller issues numbered requests and never blocks; the host handles
//! them one at a time and answers each with a response echoing its id.
//! Because work is never cancelled, the caller keeps only the result of
//! its latest `Process` request and discards the rest.
//!
//! - [`protocol`]: request and response messages.
//! - [`host`]: the state machine that answers them.
//! - [`backend`]: the seam for handle-based image exchange.
//! - [`thread`]: a native host on a dedicated thread.
//! - [`client`]: id allocation and stale-result discard.
//! - [`counter`]: staleness tokens for caller-driven decodes.

pub mod backend;
pub mod client;
pub mod counter;
pub mod error;
pub mod host;
pub mod protocol;
pub mod thread;

pub use backend::{RasterBackend, SurfaceBackend};
pub use client::{HostClient, LatestRequest};
pub use counter::{OperationCounter, OperationToken};
pub use error::{ErrorKind, HostError};
pub use host::{Host, HostState};
pub use protocol::{Capability, Output, Payload, ProcessRequest, Request, RequestId, Response};
pub use thread::{HostThread, WorkerFault};
