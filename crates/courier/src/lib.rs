//! Client-side HTTP request dispatch and cached file transfers.
//!
//! # Architecture
//!
//! The crate follows the three-layer pattern:
//! - [`data`] - Immutable configuration and value types
//! - [`core`] - Pure transformations
//! - [`effects`] - I/O behind the [`Transport`] trait
//!
//! On top of those sit [`request`] (one exchange and its lifecycle),
//! [`dispatch`] (bounded queues and the manager that builds requests from
//! endpoint definitions), [`trust`] (certificate approvals) and
//! [`transfer`] (downloads into a disk cache and uploads).
//!
//! # Key Features
//!
//! - **Exactly-Once Completion**: every request ends in one terminal state
//!   and its callbacks run once, however completion and cancellation race
//! - **Bounded Concurrency**: FIFO admission with a limit that can change
//!   while requests wait
//! - **Streaming Bodies**: multipart forms and file uploads are never held
//!   in memory whole
//! - **Coalesced Transfers**: concurrent downloads of one URL share a single
//!   exchange and fan progress out to every observer

pub mod config;
pub mod core;
pub mod data;
pub mod dispatch;
pub mod effects;
mod error;
pub mod request;
mod sync;
pub mod transfer;
pub mod trust;

pub use config::CourierConfig;
pub use crate::core::Converted;
pub use data::{
    BodyType, EndpointDefinition, EndpointTable, HeaderList, Method, ProgressObserver, ResultKind, TlsChallenge,
    TlsPolicy,
};
pub use dispatch::{DispatchManager, ExecutionQueue, RequestDefaults};
pub use effects::{MockResponse, MockTransport, Transport};
#[cfg(feature = "reqwest")]
pub use effects::ReqwestTransport;
pub use error::{Error, Result};
pub use request::{Body, Request, RequestConfig, Response, State, Target, TargetHooks, TargetId};
pub use transfer::{
    CacheSchema, DownloadOptions, FileCacheSchema, TransferManager, TransferOutcome, UploadMode, UploadOptions,
};
pub use trust::{ChallengeHandler, ChallengeResponder, TrustCache};

pub use courier_multipart::{Parameter, ParameterValue};
