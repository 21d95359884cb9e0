//! `icv.camera.v1` wire types and client, matching `proto/camera_controller.proto`.
//!
//! Kept in-tree instead of generated at build time so the crate builds without
//! `protoc`. Field tags must stay in sync with the .proto file.

use tonic::codegen::http;
use tonic::transport::Channel;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StreamRequest {
    #[prost(int32, tag = "1")]
    pub camera_id: i32,
    #[prost(int32, tag = "2")]
    pub max_fps: i32,
    #[prost(int32, tag = "3")]
    pub size: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StreamResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub frame: ::prost::alloc::vec::Vec<u8>,
}

const SERVICE: &str = "icv.camera.v1.CameraController";

#[derive(Debug, Clone)]
pub struct CameraControllerClient {
    inner: tonic::client::Grpc<Channel>,
}

impl CameraControllerClient {
    pub fn new(channel: Channel) -> Self {
        Self {
            inner: tonic::client::Grpc::new(channel),
        }
    }

    /// Server-streaming `Stream` call.
    pub async fn stream(
        &mut self,
        request: impl tonic::IntoRequest<StreamRequest>,
    ) -> Result<tonic::Response<tonic::codec::Streaming<StreamResponse>>, tonic::Status> {
        self.inner.ready().await.map_err(|e| {
            tonic::Status::unknown(format!("Service was not ready: {}", e))
        })?;
        let codec = tonic::codec::ProstCodec::default();
        let path =
            http::uri::PathAndQuery::from_static("/icv.camera.v1.CameraController/Stream");
        let mut req = request.into_request();
        req.extensions_mut()
            .insert(tonic::GrpcMethod::new(SERVICE, "Stream"));
        self.inner.server_streaming(req, path, codec).await
    }
}

/// Server side of `CameraController`, used to run an in-process camera in
/// tests.
#[cfg(test)]
pub(crate) mod server {
    use tonic::codegen::tokio_stream::Stream;
    use tonic::codegen::*;

    use super::{StreamRequest, StreamResponse, SERVICE};

    #[tonic::async_trait]
    pub trait CameraController: Send + Sync + 'static {
        type StreamStream: Stream<Item = Result<StreamResponse, tonic::Status>> + Send + 'static;

        async fn stream(
            &self,
            request: tonic::Request<StreamRequest>,
        ) -> Result<tonic::Response<Self::StreamStream>, tonic::Status>;
    }

    pub struct CameraControllerServer<T> {
        inner: Arc<T>,
    }

    impl<T> CameraControllerServer<T> {
        pub fn new(inner: T) -> Self {
            Self {
                inner: Arc::new(inner),
            }
        }
    }

    impl<T> Clone for CameraControllerServer<T> {
        fn clone(&self) -> Self {
            Self {
                inner: Arc::clone(&self.inner),
            }
        }
    }

    struct StreamSvc<T>(Arc<T>);

    impl<T: CameraController> tonic::server::ServerStreamingService<StreamRequest> for StreamSvc<T> {
        type Response = StreamResponse;
        type ResponseStream = T::StreamStream;
        type Future = BoxFuture<tonic::Response<Self::ResponseStream>, tonic::Status>;

        fn call(&mut self, request: tonic::Request<StreamRequest>) -> Self::Future {
            let inner = Arc::clone(&self.0);
            Box::pin(async move { inner.stream(request).await })
        }
    }

    impl<T, B> Service<http::Request<B>> for CameraControllerServer<T>
    where
        T: CameraController,
        B: Body + Send + 'static,
        B::Error: Into<StdError> + Send + 'static,
    {
        type Response = http::Response<tonic::body::BoxBody>;
        type Error = std::convert::Infallible;
        type Future = BoxFuture<Self::Response, Self::Error>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: http::Request<B>) -> Self::Future {
            let inner = Arc::clone(&self.inner);
            match req.uri().path() {
                "/icv.camera.v1.CameraController/Stream" => Box::pin(async move {
                    let mut grpc = tonic::server::Grpc::new(tonic::codec::ProstCodec::default());
                    Ok(grpc.server_streaming(StreamSvc(inner), req).await)
                }),
                _ => Box::pin(async move {
                    let mut response = http::Response::new(empty_body());
                    let headers = response.headers_mut();
                    headers.insert(
                        tonic::Status::GRPC_STATUS,
                        (tonic::Code::Unimplemented as i32).into(),
                    );
                    headers.insert(
                        http::header::CONTENT_TYPE,
                        tonic::metadata::GRPC_CONTENT_TYPE,
                    );
                    Ok(response)
                }),
            }
        }
    }

    impl<T> tonic::server::NamedService for CameraControllerServer<T> {
        const NAME: &'static str = SERVICE;
    }
}
