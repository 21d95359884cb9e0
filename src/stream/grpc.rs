use std::time::Instant;

use tokio::runtime::Runtime;
use tonic::codec::Streaming;
use tonic::metadata::{Ascii, MetadataValue};
use tonic::transport::{ClientTlsConfig, Endpoint};

use super::proto::{self, CameraControllerClient, StreamResponse};
use super::{FrameStream, FrameStreamClient};
use crate::auth::Credential;
use crate::error::StreamError;
use crate::frame::{Frame, StreamRequest};

/// gRPC client for `icv.camera.v1.CameraController/Stream`.
///
/// Each opened stream gets a private Tokio runtime; the session loop stays
/// synchronous and blocks on one message at a time. There is no
/// per-message timeout.
#[derive(Clone, Debug)]
pub struct GrpcFrameStreamClient {
    endpoint: String,
}

impl GrpcFrameStreamClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn connect_err(&self, reason: impl ToString) -> StreamError {
        StreamError::Connect {
            endpoint: self.endpoint.clone(),
            reason: reason.to_string(),
        }
    }

    fn build_endpoint(&self) -> Result<Endpoint, StreamError> {
        let endpoint =
            Endpoint::from_shared(self.endpoint.clone()).map_err(|e| self.connect_err(e))?;
        if self.endpoint.starts_with("https://") {
            endpoint
                .tls_config(ClientTlsConfig::new().with_webpki_roots())
                .map_err(|e| self.connect_err(e))
        } else {
            Ok(endpoint)
        }
    }
}

impl FrameStreamClient for GrpcFrameStreamClient {
    fn open(
        &self,
        request: &StreamRequest,
        credential: &Credential,
    ) -> Result<FrameStream, StreamError> {
        let wire_request = to_wire(request)?;
        let auth: MetadataValue<Ascii> = credential
            .bearer_header()
            .parse()
            .map_err(|_| StreamError::InvalidRequest("credential is not valid ASCII".into()))?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("camfeed-grpc")
            .enable_all()
            .build()
            .map_err(|e| self.connect_err(format!("start runtime: {}", e)))?;

        let endpoint = self.build_endpoint()?;
        let channel = runtime
            .block_on(endpoint.connect())
            .map_err(|e| self.connect_err(e))?;
        let mut client = CameraControllerClient::new(channel);

        let mut call = tonic::Request::new(wire_request);
        call.metadata_mut().insert("authorization", auth);

        let response = runtime
            .block_on(client.stream(call))
            .map_err(|status| StreamError::Rejected(status_text(&status)))?;
        log::info!(
            "stream opened: camera={} max_fps={} size={} endpoint={}",
            request.camera_id,
            request.max_fps,
            request.quality_size,
            self.endpoint
        );

        Ok(Box::new(GrpcFrameStream {
            responses: Some(response.into_inner()),
            _client: client,
            runtime,
            seq: 0,
        }))
    }
}

/// Field order is drop order: the response stream goes first, the runtime
/// (and with it the connection task) last.
struct GrpcFrameStream {
    responses: Option<Streaming<StreamResponse>>,
    _client: CameraControllerClient,
    runtime: Runtime,
    seq: u64,
}

impl Iterator for GrpcFrameStream {
    type Item = Result<Frame, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        let responses = self.responses.as_mut()?;
        match self.runtime.block_on(responses.message()) {
            Ok(Some(message)) => {
                self.seq += 1;
                Some(Ok(Frame::new(message.frame, self.seq, Instant::now())))
            }
            Ok(None) => {
                log::info!("stream closed by server after {} frames", self.seq);
                self.responses = None;
                None
            }
            Err(status) => {
                self.responses = None;
                Some(Err(StreamError::Transport(status_text(&status))))
            }
        }
    }
}

impl Drop for GrpcFrameStream {
    fn drop(&mut self) {
        if self.responses.take().is_some() {
            log::debug!("cancelling stream after {} frames", self.seq);
        }
    }
}

fn to_wire(request: &StreamRequest) -> Result<proto::StreamRequest, StreamError> {
    let camera_id: i32 = request.camera_id.trim().parse().map_err(|_| {
        StreamError::InvalidRequest(format!(
            "camera id '{}' is not an integer",
            request.camera_id
        ))
    })?;
    let max_fps = i32::try_from(request.max_fps)
        .map_err(|_| StreamError::InvalidRequest("max_fps out of range".into()))?;
    let size = i32::try_from(request.quality_size)
        .map_err(|_| StreamError::InvalidRequest("quality_size out of range".into()))?;
    Ok(proto::StreamRequest {
        camera_id,
        max_fps,
        size,
    })
}

fn status_text(status: &tonic::Status) -> String {
    if status.message().is_empty() {
        format!("{:?}", status.code())
    } else {
        format!("{:?}: {}", status.code(), status.message())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{mpsc, Arc, Mutex};
    use std::time::Duration;

    use tokio::sync::mpsc as async_mpsc;
    use tokio_stream::wrappers::{ReceiverStream, TcpListenerStream};

    use super::*;
    use crate::stream::proto::server::{CameraController, CameraControllerServer};

    const FAILING_CAMERA: &str = "1";
    const CLOSING_CAMERA: &str = "2";
    const ENDLESS_CAMERA: &str = "3";

    /// Camera 1 sends `frames` frames then fails, camera 2 sends them then
    /// closes, anything else streams until the client goes away.
    struct ScriptedCamera {
        frames: u64,
        tokens: Arc<Mutex<Vec<String>>>,
        cancelled: Mutex<mpsc::Sender<u64>>,
    }

    #[tonic::async_trait]
    impl CameraController for ScriptedCamera {
        type StreamStream = ReceiverStream<Result<StreamResponse, tonic::Status>>;

        async fn stream(
            &self,
            request: tonic::Request<proto::StreamRequest>,
        ) -> Result<tonic::Response<Self::StreamStream>, tonic::Status> {
            if let Some(value) = request.metadata().get("authorization") {
                let token = value.to_str().unwrap_or_default().to_string();
                self.tokens.lock().unwrap().push(token);
            }
            let camera = request.into_inner().camera_id.to_string();
            let frames = self.frames;
            let cancelled = self.cancelled.lock().unwrap().clone();
            let (tx, rx) = async_mpsc::channel(1);
            tokio::spawn(async move {
                let mut sent = 0u64;
                loop {
                    if sent == frames && camera == FAILING_CAMERA {
                        let _ = tx.send(Err(tonic::Status::unavailable("camera offline"))).await;
                        return;
                    }
                    if sent == frames && camera == CLOSING_CAMERA {
                        return;
                    }
                    let frame = StreamResponse {
                        frame: vec![0xff, 0xd8, sent as u8],
                    };
                    if tx.send(Ok(frame)).await.is_err() {
                        let _ = cancelled.send(sent);
                        return;
                    }
                    sent += 1;
                }
            });
            Ok(tonic::Response::new(ReceiverStream::new(rx)))
        }
    }

    struct CameraServer {
        runtime: Runtime,
        endpoint: String,
        tokens: Arc<Mutex<Vec<String>>>,
        cancelled: mpsc::Receiver<u64>,
    }

    fn serve(frames: u64) -> CameraServer {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let listener = runtime
            .block_on(tokio::net::TcpListener::bind("127.0.0.1:0"))
            .unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());
        let tokens = Arc::new(Mutex::new(Vec::new()));
        let (cancelled_tx, cancelled) = mpsc::channel();
        let camera = ScriptedCamera {
            frames,
            tokens: Arc::clone(&tokens),
            cancelled: Mutex::new(cancelled_tx),
        };
        runtime.spawn(
            tonic::transport::Server::builder()
                .add_service(CameraControllerServer::new(camera))
                .serve_with_incoming(TcpListenerStream::new(listener)),
        );
        CameraServer {
            runtime,
            endpoint,
            tokens,
            cancelled,
        }
    }

    #[test]
    fn frames_are_numbered_from_one_and_the_error_ends_the_stream() {
        let server = serve(3);
        let mut stream = GrpcFrameStreamClient::new(server.endpoint.clone())
            .open(&StreamRequest::new(FAILING_CAMERA), &Credential::new("tok-9"))
            .unwrap();

        let mut frames = Vec::new();
        let err = loop {
            match stream.next() {
                Some(Ok(frame)) => frames.push(frame),
                Some(Err(err)) => break err,
                None => panic!("stream ended without the server's error"),
            }
        };

        let seqs: Vec<u64> = frames.iter().map(|frame| frame.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(frames[2].bytes(), &[0xff, 0xd8, 2]);
        assert!(matches!(err, StreamError::Transport(ref m) if m.contains("camera offline")));
        assert!(stream.next().is_none());
        assert!(stream.next().is_none());
        assert_eq!(*server.tokens.lock().unwrap(), vec!["Bearer tok-9".to_string()]);
        drop(server.runtime);
    }

    #[test]
    fn server_close_ends_the_stream_without_error() {
        let server = serve(2);
        let stream = GrpcFrameStreamClient::new(server.endpoint.clone())
            .open(&StreamRequest::new(CLOSING_CAMERA), &Credential::new("t"))
            .unwrap();

        let items: Vec<Result<Frame, StreamError>> = stream.collect();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(Result::is_ok));
        drop(server.runtime);
    }

    #[test]
    fn dropping_the_stream_cancels_the_call() {
        let server = serve(0);
        let mut stream = GrpcFrameStreamClient::new(server.endpoint.clone())
            .open(&StreamRequest::new(ENDLESS_CAMERA), &Credential::new("t"))
            .unwrap();
        for expected in 1..=2 {
            assert_eq!(stream.next().unwrap().unwrap().seq, expected);
        }
        drop(stream);

        let sent = server
            .cancelled
            .recv_timeout(Duration::from_secs(10))
            .expect("server saw the call end");
        assert!(sent >= 2);
        drop(server.runtime);
    }

    #[test]
    fn wire_request_parses_camera_id() {
        let wire = to_wire(&StreamRequest {
            camera_id: " 17 ".into(),
            max_fps: 30,
            quality_size: 50,
        })
        .unwrap();
        assert_eq!(wire.camera_id, 17);
        assert_eq!(wire.max_fps, 30);
        assert_eq!(wire.size, 50);
    }

    #[test]
    fn wire_request_rejects_non_numeric_camera() {
        let err = to_wire(&StreamRequest::new("gate-a")).unwrap_err();
        assert!(matches!(err, StreamError::InvalidRequest(_)));
    }

    #[test]
    fn unreachable_endpoint_fails_to_open() {
        // Port 9 (discard) on localhost is closed on test hosts.
        let client = GrpcFrameStreamClient::new("http://127.0.0.1:9");
        let err = client
            .open(&StreamRequest::new("1"), &Credential::new("t"))
            .err()
            .expect("connect must fail");
        assert!(matches!(err, StreamError::Connect { .. }));
    }
}
