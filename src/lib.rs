//! camfeed: authenticated frame capture from a remote camera service.
//!
//! A session authenticates with a client-credentials grant, lists the
//! cameras the credential can see, opens a server-streaming gRPC call for
//! one camera and feeds every pushed frame, in order, to a set of sinks
//! (video file, display window, object detection with annotation) until the
//! stream ends, the record length elapses or a stop is requested.
//!
//! # Module Structure
//!
//! - `auth`: bearer credentials and the Keycloak token provider
//! - `directory`: camera directory client
//! - `stream`: gRPC frame stream client
//! - `frame`: stream request and frame types
//! - `sink`: frame sinks and their encoder/viewer backends
//! - `detect`: detector backends used by the inference sink
//! - `session`: the session state machine
//! - `config`, `select`, `ui`, `app`: process-level plumbing

pub mod app;
pub mod auth;
pub mod config;
pub mod detect;
pub mod directory;
pub mod error;
pub mod frame;
pub mod select;
pub mod session;
pub mod sink;
pub mod stream;
pub mod ui;

pub use app::run;
pub use auth::{ClientCredentials, Credential, KeycloakTokenProvider, TokenProvider};
pub use config::CaptureConfig;
pub use detect::{BackendRegistry, Detection, DetectionResult, DetectorBackend, DetectorSettings};
pub use directory::{CameraDescriptor, CameraDirectory, HttpCameraDirectory};
pub use error::{
    AuthError, ConfigError, DirectoryError, EncodeError, InferenceError, SessionError, SinkError,
    StreamError,
};
pub use frame::{Frame, StreamRequest};
pub use session::{
    Clock, SessionPlan, SessionRunner, SessionState, SessionSummary, Selector, SystemClock,
    TerminationReason,
};
pub use sink::{FrameSink, SinkFactory, SinkKind, StandardSinks};
pub use stream::{FrameStream, FrameStreamClient, GrpcFrameStreamClient};
