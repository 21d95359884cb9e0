//! Frame streaming from the camera service.
//!
//! A `FrameStream` is a blocking, fused iterator over frames pushed by the
//! server. It owns the whole transport: dropping it cancels the call and
//! releases the connection, whichever way the consumer loop exits.
//!
//! The stream MUST NOT:
//! - Retry or reconnect on error
//! - Buffer or reorder frames
//! - Share its credential with another call

mod grpc;
pub mod proto;

pub use grpc::GrpcFrameStreamClient;

use crate::auth::Credential;
use crate::error::StreamError;
use crate::frame::{Frame, StreamRequest};

/// Frames in arrival order. Ends on server close; yields at most one error.
pub type FrameStream = Box<dyn Iterator<Item = Result<Frame, StreamError>>>;

pub trait FrameStreamClient {
    /// Open one streaming call. Parameters are fixed for the life of the call.
    fn open(&self, request: &StreamRequest, credential: &Credential)
        -> Result<FrameStream, StreamError>;
}
